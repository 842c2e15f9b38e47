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

//! Providers of origin-destination travel distances and travel times.
use anyhow::{anyhow, bail, Result};
use hashbrown::HashMap;

use crate::error::ConfigurationError;
use crate::population::{Mode, ZoneId};

/// Provider of travel distances (in kilometers) between zones.
///
/// Providers are shared by all the worker threads so they must be read-only.
pub trait TravelDistances: Send + Sync {
    fn distance(&self, origin: ZoneId, destination: ZoneId) -> Result<f64>;
}

/// Provider of travel times (in minutes) between zones, by mode and departure time.
pub trait TravelTimes: Send + Sync {
    fn travel_time(
        &self,
        origin: ZoneId,
        destination: ZoneId,
        departure_minutes: f64,
        mode: Mode,
    ) -> Result<f64>;
}

/// A dense zone-to-zone matrix of values (distances or travel times).
///
/// Missing pairs are stored as NaN.
#[derive(Clone, Debug)]
pub struct SkimMatrix {
    index_of: HashMap<ZoneId, usize>,
    values: Vec<f64>,
}

impl SkimMatrix {
    /// Creates a skim matrix for the given zones from a list of `(origin, destination, value)`
    /// entries.
    ///
    /// Returns an error if an entry references an unknown zone or has a negative or non-finite
    /// value.
    pub fn from_entries(
        zone_ids: &[ZoneId],
        entries: impl IntoIterator<Item = (ZoneId, ZoneId, f64)>,
    ) -> Result<Self> {
        let index_of: HashMap<ZoneId, usize> = zone_ids
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();
        let n = zone_ids.len();
        let mut values = vec![f64::NAN; n * n];
        for (origin, destination, value) in entries {
            let (Some(&o), Some(&d)) = (index_of.get(&origin), index_of.get(&destination)) else {
                bail!("Unknown zone in skim entry ({origin}, {destination})");
            };
            if !(value.is_finite() && value >= 0.0) {
                bail!("Invalid skim value for pair ({origin}, {destination}): {value}");
            }
            values[o * n + d] = value;
        }
        Ok(SkimMatrix { index_of, values })
    }

    /// Creates a skim matrix where all pairs take the value returned by the given function.
    pub fn from_fn(zone_ids: &[ZoneId], func: impl Fn(ZoneId, ZoneId) -> f64) -> Result<Self> {
        Self::from_entries(
            zone_ids,
            zone_ids
                .iter()
                .flat_map(|&o| zone_ids.iter().map(move |&d| (o, d)))
                .map(|(o, d)| (o, d, func(o, d))),
        )
    }

    fn nb_zones(&self) -> usize {
        self.index_of.len()
    }

    /// Returns the value for the given pair, or `None` if it is missing.
    pub fn get(&self, origin: ZoneId, destination: ZoneId) -> Option<f64> {
        let o = *self.index_of.get(&origin)?;
        let d = *self.index_of.get(&destination)?;
        let value = self.values[o * self.nb_zones() + d];
        (!value.is_nan()).then_some(value)
    }

    /// Returns the number of pairs with a value.
    pub fn nb_values(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }
}

impl TravelDistances for SkimMatrix {
    fn distance(&self, origin: ZoneId, destination: ZoneId) -> Result<f64> {
        self.get(origin, destination)
            .ok_or_else(|| {
                ConfigurationError::MissingSkimValue {
                    skim: "travel distance".to_owned(),
                    origin,
                    destination,
                }
                .into()
            })
    }
}

/// Travel times read from one skim matrix per mode.
///
/// For the modes with no skim matrix, the travel time is computed from the travel distance and
/// a constant speed.
#[derive(Clone, Debug)]
pub struct SkimTravelTimes {
    skims: HashMap<Mode, SkimMatrix>,
    distances: SkimMatrix,
    speeds: HashMap<Mode, f64>,
}

impl SkimTravelTimes {
    /// Creates the provider.
    ///
    /// `speeds` are in kilometers per hour.
    pub fn new(
        skims: HashMap<Mode, SkimMatrix>,
        distances: SkimMatrix,
        speeds: HashMap<Mode, f64>,
    ) -> Result<Self> {
        for mode in Mode::ALL {
            if skims.contains_key(&mode) {
                continue;
            }
            match speeds.get(&mode) {
                Some(&s) if s.is_finite() && s > 0.0 => {}
                Some(&s) => bail!("Invalid speed for mode {mode}: {s}"),
                None => bail!("Mode {mode} has no travel-time skim and no speed"),
            }
        }
        Ok(SkimTravelTimes {
            skims,
            distances,
            speeds,
        })
    }
}

impl TravelTimes for SkimTravelTimes {
    fn travel_time(
        &self,
        origin: ZoneId,
        destination: ZoneId,
        _departure_minutes: f64,
        mode: Mode,
    ) -> Result<f64> {
        if let Some(skim) = self.skims.get(&mode) {
            return skim.get(origin, destination).ok_or_else(|| {
                ConfigurationError::MissingSkimValue {
                    skim: format!("{mode} travel time"),
                    origin,
                    destination,
                }
                .into()
            });
        }
        let distance = self.distances.distance(origin, destination)?;
        let speed = self
            .speeds
            .get(&mode)
            .copied()
            .ok_or_else(|| anyhow!("No speed for mode {mode}"))?;
        Ok(distance / speed * 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skim_matrix_test() {
        let skim = SkimMatrix::from_entries(&[1, 5], [(1, 5, 2.5), (5, 5, 0.5)]).unwrap();
        assert_eq!(skim.get(1, 5), Some(2.5));
        assert_eq!(skim.get(5, 1), None);
        assert_eq!(skim.get(2, 1), None);
        assert_eq!(skim.nb_values(), 2);
        assert_eq!(skim.distance(5, 5).unwrap(), 0.5);
        let err = skim.distance(5, 1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::MissingSkimValue { origin: 5, destination: 1, .. })
        ));
        assert!(SkimMatrix::from_entries(&[1], [(1, 2, 1.0)]).is_err());
        assert!(SkimMatrix::from_entries(&[1], [(1, 1, -1.0)]).is_err());
    }

    #[test]
    fn skim_travel_times_test() {
        let ids = [1, 2];
        let distances = SkimMatrix::from_fn(&ids, |o, d| if o == d { 1.0 } else { 10.0 }).unwrap();
        let mut skims = HashMap::new();
        skims.insert(
            Mode::AutoDriver,
            SkimMatrix::from_fn(&ids, |_, _| 12.0).unwrap(),
        );
        let speeds: HashMap<Mode, f64> = [
            (Mode::AutoPassenger, 30.0),
            (Mode::PublicTransport, 20.0),
            (Mode::Bicycle, 15.0),
            (Mode::Walk, 5.0),
        ]
        .into_iter()
        .collect();
        let tt = SkimTravelTimes::new(skims.clone(), distances.clone(), speeds.clone()).unwrap();
        assert_eq!(tt.travel_time(1, 2, 480.0, Mode::AutoDriver).unwrap(), 12.0);
        assert_eq!(tt.travel_time(1, 2, 480.0, Mode::Walk).unwrap(), 120.0);
        assert_eq!(tt.travel_time(1, 1, 480.0, Mode::Bicycle).unwrap(), 4.0);
        // A mode with neither skim nor speed is rejected.
        let mut speeds = speeds;
        speeds.remove(&Mode::Walk);
        assert!(SkimTravelTimes::new(skims, distances, speeds).is_err());
    }
}
