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

//! Reading of the input files and writing of the output files.
pub mod csv;
pub mod json;

use anyhow::{Context, Result};
use hashbrown::HashMap;
use log::info;

use crate::calibration::{CalibrationFactors, ObservedShares};
use crate::coefficients::CoefficientTable;
use crate::parameters::InputFiles;
use crate::population::{Mode, Purpose, Zones};
use crate::travel_times::{SkimMatrix, SkimTravelTimes};

/// Input data of a run, except for the population.
pub struct InputData {
    pub zones: Zones,
    pub distances: SkimMatrix,
    pub travel_times: SkimTravelTimes,
    pub mode_choice_coefficients: Vec<(Purpose, CoefficientTable)>,
    pub mode_restriction_coefficients: Option<CoefficientTable>,
    pub observed_shares: Option<ObservedShares>,
    pub calibration_factors: CalibrationFactors,
}

/// Reads all the input files but the population.
///
/// `speeds` are used for the modes without travel-time file.
pub fn read_input_data(files: &InputFiles, speeds: HashMap<Mode, f64>) -> Result<InputData> {
    info!("Reading zones");
    let zones = csv::read_zones(&files.zones)?;
    info!("{} zones", zones.len());
    let ids = zones.ids();
    info!("Reading skims");
    let distances = csv::read_skim(&files.distances, &ids).context("Failed to read distances")?;
    let mut skims = HashMap::with_capacity(files.travel_times.len());
    for (&mode, path) in files.travel_times.iter() {
        let skim = csv::read_skim(path, &ids)
            .with_context(|| format!("Failed to read travel times of mode {mode}"))?;
        skims.insert(mode, skim);
    }
    let travel_times = SkimTravelTimes::new(skims, distances.clone(), speeds)?;
    info!("Reading coefficients");
    let mode_choice_coefficients = files
        .mode_choice_coefficients
        .iter()
        .map(|(&purpose, path)| {
            let table = csv::read_coefficients(path, &format!("mode_choice_{purpose}"))?;
            Ok((purpose, table))
        })
        .collect::<Result<Vec<_>>>()?;
    let mode_restriction_coefficients = files
        .mode_restriction_coefficients
        .as_deref()
        .map(|path| csv::read_coefficients(path, "mode_restriction"))
        .transpose()?;
    let observed_shares = files
        .observed_shares
        .as_deref()
        .map(csv::read_observed_shares)
        .transpose()?;
    let calibration_factors = match files.calibration_factors.as_deref() {
        Some(path) => csv::read_calibration_factors(path)?,
        None => CalibrationFactors::default(),
    };
    Ok(InputData {
        zones,
        distances,
        travel_times,
        mode_choice_coefficients,
        mode_restriction_coefficients,
        observed_shares,
        calibration_factors,
    })
}
