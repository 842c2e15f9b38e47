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

//! Destination-utility matrices.
//!
//! The utility of a destination zone `d` for a trip starting from zone `o` is given by a
//! Gompertz-type deterrence function:
//!
//! ```text
//! impedance = impedance_param * exp(distance_param * distance(o, d))
//! utility = exp(impedance) * attraction(d)
//! ```
//!
//! The utility is exactly zero when the attraction of the destination is zero.
use anyhow::{bail, Context, Result};
use hashbrown::HashMap;
use log::debug;
use rayon::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::population::{CarOwnership, Purpose, ZoneId, Zones};
use crate::travel_times::TravelDistances;

/// Parameters of the deterrence function.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct GompertzParameters {
    /// Impedance parameter (typically negative).
    pub impedance: f64,
    /// Distance parameter (typically negative), per kilometer.
    pub distance: f64,
}

impl GompertzParameters {
    /// Returns the utility of a destination with the given attraction at the given distance.
    pub fn utility(&self, attraction: f64, distance: f64) -> f64 {
        if attraction == 0.0 {
            return 0.0;
        }
        let impedance = self.impedance * (self.distance * distance).exp();
        impedance.exp() * attraction
    }
}

/// A dense matrix of destination utilities, with one row per origin zone and one column per
/// destination zone.
#[derive(Clone, Debug, PartialEq)]
pub struct UtilityMatrix {
    zone_ids: Vec<ZoneId>,
    index_of: HashMap<ZoneId, usize>,
    values: Vec<f64>,
}

impl UtilityMatrix {
    /// Creates a matrix from its rows.
    ///
    /// Returns an error if the matrix is not square or if a value is negative or not finite.
    pub fn from_rows(zone_ids: Vec<ZoneId>, rows: Vec<Vec<f64>>) -> Result<Self> {
        let n = zone_ids.len();
        if rows.len() != n {
            bail!("Expected {n} rows, got {}", rows.len());
        }
        let mut values = Vec::with_capacity(n * n);
        for (row, &origin) in rows.into_iter().zip(zone_ids.iter()) {
            if row.len() != n {
                bail!("Row of zone {origin} has {} values, expected {n}", row.len());
            }
            if let Some(v) = row.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
                bail!("Invalid destination utility in row of zone {origin}: {v}");
            }
            values.extend(row);
        }
        let index_of = zone_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        Ok(UtilityMatrix {
            zone_ids,
            index_of,
            values,
        })
    }

    pub fn nb_zones(&self) -> usize {
        self.zone_ids.len()
    }

    /// Returns the zone ids of the columns (and rows).
    pub fn zone_ids(&self) -> &[ZoneId] {
        &self.zone_ids
    }

    pub fn index_of(&self, zone: ZoneId) -> Option<usize> {
        self.index_of.get(&zone).copied()
    }

    /// Returns the utilities of all destinations from the origin at the given index.
    pub fn row(&self, origin_index: usize) -> &[f64] {
        let n = self.nb_zones();
        &self.values[origin_index * n..(origin_index + 1) * n]
    }

    /// Returns the utilities of all destinations from the given origin zone.
    pub fn row_of(&self, origin: ZoneId) -> Option<&[f64]> {
        self.index_of(origin).map(|i| self.row(i))
    }

    pub fn get(&self, origin: ZoneId, destination: ZoneId) -> Option<f64> {
        let d = self.index_of(destination)?;
        self.row_of(origin).map(|row| row[d])
    }
}

/// Request for a destination-utility matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatrixRequest {
    pub purpose: Purpose,
    /// Car-ownership segment, if the parameters are segmented.
    pub segment: Option<CarOwnership>,
    pub parameters: GompertzParameters,
}

/// Builds destination-utility matrices from zone attractions and travel distances.
pub struct DestinationUtilityMatrixBuilder<'a> {
    zones: &'a Zones,
    distances: &'a dyn TravelDistances,
}

impl<'a> DestinationUtilityMatrixBuilder<'a> {
    pub fn new(zones: &'a Zones, distances: &'a dyn TravelDistances) -> Self {
        DestinationUtilityMatrixBuilder { zones, distances }
    }

    /// Builds the matrix of a purpose, given the attraction of each zone (in zone-index order).
    ///
    /// Returns a [ConfigurationError] if an attraction is invalid or if a utility is not finite.
    pub fn build(
        &self,
        purpose: Purpose,
        attractions: &[f64],
        parameters: GompertzParameters,
    ) -> Result<UtilityMatrix> {
        let n = self.zones.len();
        if attractions.len() != n {
            bail!(
                "Got {} attractions for purpose {purpose} but there are {n} zones",
                attractions.len()
            );
        }
        for (zone, &value) in self.zones.iter().zip(attractions) {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigurationError::InvalidAttraction {
                    purpose,
                    zone: zone.id,
                    value,
                }
                .into());
            }
        }
        let mut values = Vec::with_capacity(n * n);
        for origin in self.zones.iter() {
            for (destination, &attraction) in self.zones.iter().zip(attractions) {
                if attraction == 0.0 {
                    values.push(0.0);
                    continue;
                }
                let distance = self.distances.distance(origin.id, destination.id)?;
                let utility = parameters.utility(attraction, distance);
                if !utility.is_finite() {
                    return Err(ConfigurationError::NonFiniteUtility {
                        context: format!(
                            "destination {} from origin {} for purpose {purpose} \
                            (distance: {distance}, parameters: {parameters:?})",
                            destination.id, origin.id
                        ),
                        value: utility,
                    }
                    .into());
                }
                values.push(utility);
            }
        }
        let zone_ids = self.zones.ids();
        let index_of = zone_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        Ok(UtilityMatrix {
            zone_ids,
            index_of,
            values,
        })
    }

    /// Builds all the requested matrices in parallel.
    ///
    /// The function returns once all the matrices are built.
    pub fn build_all(&self, requests: &[MatrixRequest]) -> Result<DestinationMatrices> {
        let matrices = requests
            .par_iter()
            .panic_fuse()
            .map(|request| {
                debug!(
                    "Building destination utilities for purpose {} (segment: {:?})",
                    request.purpose, request.segment
                );
                let attractions = self.zones.attractions(request.purpose);
                self.build(request.purpose, &attractions, request.parameters)
                    .with_context(|| {
                        format!(
                            "Failed to build destination utilities for purpose {}",
                            request.purpose
                        )
                    })
                    .map(|m| ((request.purpose, request.segment), m))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut result = DestinationMatrices::default();
        for ((purpose, segment), matrix) in matrices {
            result.insert(purpose, segment, matrix);
        }
        Ok(result)
    }
}

/// The destination-utility matrices of all purposes and segments.
#[derive(Clone, Debug, Default)]
pub struct DestinationMatrices {
    matrices: HashMap<(Purpose, Option<CarOwnership>), UtilityMatrix>,
}

impl DestinationMatrices {
    pub fn insert(
        &mut self,
        purpose: Purpose,
        segment: Option<CarOwnership>,
        matrix: UtilityMatrix,
    ) {
        self.matrices.insert((purpose, segment), matrix);
    }

    /// Returns the matrix of a purpose for the given segment.
    ///
    /// Falls back to the non-segmented matrix of the purpose when there is no matrix for the
    /// segment.
    pub fn get(&self, purpose: Purpose, segment: CarOwnership) -> Option<&UtilityMatrix> {
        self.matrices
            .get(&(purpose, Some(segment)))
            .or_else(|| self.matrices.get(&(purpose, None)))
    }

    pub fn has_purpose(&self, purpose: Purpose) -> bool {
        self.matrices.keys().any(|(p, _)| *p == purpose)
    }

    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }
}
