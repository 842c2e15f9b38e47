// This file is part of Demand-Core.
// Copyright © 2022, 2023, 2024, 2025 André de Palma, Lucas Javaudin
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Imports / exports through CSV files.
use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, Trim, Writer};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationFactors, CalibrationRecord, ObservedShares};
use crate::coefficients::CoefficientTable;
use crate::population::{
    AreaType, HouseholdId, Mode, PersonId, Population, Purpose, TripId, Zone, ZoneId, Zones,
};
use crate::travel_times::SkimMatrix;

/// Reads all the records of a CSV file with headers.
fn read_records<D: DeserializeOwned>(path: &Path) -> Result<Vec<D>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("Unable to open file `{path:?}`"))?;
    reader
        .deserialize()
        .enumerate()
        .map(|(i, record)| {
            record.with_context(|| format!("Unable to parse record {} of file `{path:?}`", i + 1))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ZoneRecord {
    id: ZoneId,
    region: String,
    #[serde(default)]
    area_type: AreaType,
    #[serde(default)]
    distance_to_transit: f64,
    hbw: f64,
    hbe: f64,
    hbs: f64,
    hbr: f64,
    hbo: f64,
    nhbw: f64,
    nhbo: f64,
}

impl From<ZoneRecord> for Zone {
    fn from(r: ZoneRecord) -> Self {
        Zone {
            id: r.id,
            region: r.region,
            area_type: r.area_type,
            distance_to_transit: r.distance_to_transit,
            // Same order as `Purpose::ALL`.
            attractions: [r.hbw, r.hbe, r.hbs, r.hbr, r.hbo, r.nhbw, r.nhbo],
        }
    }
}

/// Reads the zones.
///
/// Columns: `id,region,area_type,distance_to_transit,hbw,hbe,hbs,hbr,hbo,nhbw,nhbo`.
pub fn read_zones(path: &Path) -> Result<Zones> {
    let records: Vec<ZoneRecord> = read_records(path).context("Failed to read zones")?;
    Zones::new(records.into_iter().map(Zone::from).collect())
}

/// Reads a coefficient table.
///
/// The first column is the name of the variable, the other columns are the alternatives.
pub fn read_coefficients(path: &Path, name: &str) -> Result<CoefficientTable> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("Unable to open file `{path:?}`"))?;
    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        bail!("Coefficient file `{path:?}` has no alternative column");
    }
    let alternatives: Vec<String> = headers.iter().skip(1).map(str::to_owned).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Unable to read file `{path:?}`"))?;
        let variable = record.get(0).unwrap_or_default().to_owned();
        let values = record
            .iter()
            .skip(1)
            .map(|v| {
                v.parse::<f64>().with_context(|| {
                    format!("Invalid value `{v}` for variable `{variable}` in file `{path:?}`")
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push((variable, values));
    }
    CoefficientTable::from_rows(name, &alternatives, rows)
        .with_context(|| format!("Invalid coefficients in file `{path:?}`"))
}

#[derive(Debug, Deserialize)]
struct SkimRecord {
    origin: ZoneId,
    destination: ZoneId,
    value: f64,
}

/// Reads a skim matrix with columns `origin,destination,value`.
pub fn read_skim(path: &Path, zone_ids: &[ZoneId]) -> Result<SkimMatrix> {
    let records: Vec<SkimRecord> = read_records(path)?;
    SkimMatrix::from_entries(
        zone_ids,
        records
            .into_iter()
            .map(|r| (r.origin, r.destination, r.value)),
    )
    .with_context(|| format!("Invalid skim file `{path:?}`"))
}

#[derive(Debug, Deserialize)]
struct ObservedShareRecord {
    region: String,
    purpose: Purpose,
    mode: Mode,
    share: f64,
}

/// Reads the observed mode shares, with columns `region,purpose,mode,share`.
pub fn read_observed_shares(path: &Path) -> Result<ObservedShares> {
    let records: Vec<ObservedShareRecord> =
        read_records(path).context("Failed to read observed shares")?;
    let mut shares = ObservedShares::default();
    for r in records {
        shares.insert(&r.region, r.purpose, r.mode, r.share)?;
    }
    Ok(shares)
}

/// Reads the calibration factors of the last iteration of a calibration output.
pub fn read_calibration_factors(path: &Path) -> Result<CalibrationFactors> {
    let records: Vec<CalibrationRecord> =
        read_records(path).context("Failed to read calibration factors")?;
    Ok(CalibrationFactors::from_records(&records))
}

/// Creates the writer of the calibration output.
pub fn calibration_writer(path: &Path) -> Result<Writer<File>> {
    Writer::from_path(path).with_context(|| format!("Unable to create file `{path:?}`"))
}

#[derive(Debug, Serialize)]
struct TripRecord {
    trip_id: TripId,
    person_id: PersonId,
    household_id: HouseholdId,
    purpose: Purpose,
    origin: Option<ZoneId>,
    destination: Option<ZoneId>,
    mode: Option<Mode>,
}

/// Writes the trips of the population, with their origin, destination and mode.
///
/// Unassigned values are left empty.
pub fn write_trips(population: &Population, path: &Path) -> Result<()> {
    let mut writer =
        Writer::from_path(path).with_context(|| format!("Unable to create file `{path:?}`"))?;
    for (household, person, trip) in population.trips() {
        writer.serialize(TripRecord {
            trip_id: trip.id(),
            person_id: person.id,
            household_id: household.id,
            purpose: trip.purpose(),
            origin: trip.origin(),
            destination: trip.destination(),
            mode: trip.mode(),
        })?;
    }
    writer.flush()?;
    Ok(())
}
