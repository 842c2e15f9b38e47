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

//! Destination choice of the trips.
use anyhow::Result;
use choice::{is_samplable, sample};
use hashbrown::HashMap;
use rand::{Rng, RngCore};

use super::Diagnostics;
use crate::destination::{DestinationMatrices, UtilityMatrix};
use crate::error::ConfigurationError;
use crate::executor::PartitionedExecutor;
use crate::population::{Household, Occupation, Person, Purpose, ZoneId, Zones};
use crate::progress_bar::ChoiceProgressBar;

/// Draws an index from a row of destination utilities.
///
/// Returns `None` if no destination has a positive utility.
fn draw<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    if is_samplable(weights) {
        sample(weights, rng).ok()
    } else {
        None
    }
}

/// Returns the destination of a trip when it is known in advance.
fn fixed_destination(person: &Person, purpose: Purpose) -> Option<ZoneId> {
    match (purpose, person.occupation) {
        (Purpose::HBW, Occupation::Worker) | (Purpose::HBE, Occupation::Student) => {
            person.occupation_zone
        }
        _ => None,
    }
}

/// Assigns origins and destinations to the trips of a purpose.
pub struct DistributionModel<'a> {
    zones: &'a Zones,
    matrices: &'a DestinationMatrices,
    /// Weights of the zones when drawing the origin of a non-home-based trip at random.
    fallback_weights: HashMap<Purpose, Vec<f64>>,
}

impl<'a> DistributionModel<'a> {
    pub fn new(zones: &'a Zones, matrices: &'a DestinationMatrices) -> Self {
        let fallback_weights = Purpose::ALL
            .into_iter()
            .filter(|p| !p.is_home_based())
            .map(|purpose| {
                let weights: Vec<f64> = zones
                    .iter()
                    .map(|z| {
                        purpose
                            .origin_purposes()
                            .iter()
                            .map(|&p| z.attraction(p))
                            .sum::<f64>()
                    })
                    .collect();
                (purpose, weights)
            })
            .collect();
        DistributionModel {
            zones,
            matrices,
            fallback_weights,
        }
    }

    /// Assigns a destination to all the trips of the given purpose.
    ///
    /// Non-home-based purposes must run after the purposes their origins depend on.
    pub fn run(
        &self,
        executor: &PartitionedExecutor,
        households: &mut [Household],
        purpose: Purpose,
        master: &mut impl RngCore,
    ) -> Result<Diagnostics> {
        let bp = ChoiceProgressBar::new(households.len())
            .with_message(format!("Destination choice ({purpose})"));
        let output = executor.run(
            &format!("destination choice {purpose}"),
            households,
            master,
            |chunk, ctx| {
                let mut rng = ctx.rng();
                let mut diagnostics = Diagnostics::default();
                for household in chunk.iter_mut() {
                    diagnostics += self.assign_household(household, purpose, &mut rng)?;
                    bp.inc();
                }
                Ok(diagnostics)
            },
        )?;
        bp.finish();
        let mut diagnostics: Diagnostics = output.results.into_iter().sum();
        diagnostics.failed_partitions += output.nb_failed;
        Ok(diagnostics)
    }

    fn matrix(&self, household: &Household, purpose: Purpose) -> Result<&UtilityMatrix> {
        self.matrices
            .get(purpose, household.car_ownership())
            .ok_or_else(|| ConfigurationError::MissingMatrix { purpose }.into())
    }

    fn fallback_origin<R: Rng + ?Sized>(&self, purpose: Purpose, rng: &mut R) -> Option<ZoneId> {
        let weights = self.fallback_weights.get(&purpose)?;
        draw(weights, rng).map(|i| self.zones.at(i).id)
    }

    /// Assigns origins and destinations to the trips of a purpose for all members of a
    /// household.
    pub fn assign_household<R: Rng + ?Sized>(
        &self,
        household: &mut Household,
        purpose: Purpose,
        rng: &mut R,
    ) -> Result<Diagnostics> {
        let mut diagnostics = Diagnostics::default();
        if household.persons.iter().all(|p| p.nb_trips(purpose) == 0) {
            return Ok(diagnostics);
        }
        let matrix = self.matrix(household, purpose)?;
        let home = household.home_zone;
        for person in household.persons.iter_mut() {
            // Destinations of the trips from which the non-home-based trips can start.
            let anchors: Vec<ZoneId> = purpose
                .origin_purposes()
                .iter()
                .flat_map(|&p| person.trips_of(p))
                .filter_map(|t| t.destination())
                .collect();
            let fixed = fixed_destination(person, purpose);
            for trip in person.trips.iter_mut().filter(|t| t.purpose() == purpose) {
                if trip.destination().is_some() {
                    diagnostics.skipped_trips += 1;
                    continue;
                }
                let origin = match trip.origin() {
                    Some(origin) => origin,
                    None if purpose.is_home_based() => home,
                    None if !anchors.is_empty() => anchors[rng.gen_range(0..anchors.len())],
                    None => match self.fallback_origin(purpose, rng) {
                        Some(origin) => {
                            diagnostics.fallback_origins += 1;
                            origin
                        }
                        None => {
                            diagnostics.unresolved_destinations += 1;
                            continue;
                        }
                    },
                };
                trip.set_origin(origin);
                if let Some(zone) = fixed {
                    trip.set_destination(zone);
                    diagnostics.fixed_destinations += 1;
                    continue;
                }
                let origin_index =
                    matrix
                        .index_of(origin)
                        .ok_or_else(|| ConfigurationError::UnknownZone {
                            zone: origin,
                            context: format!("origin of trip {}", trip.id()),
                        })?;
                match draw(matrix.row(origin_index), rng) {
                    Some(i) => trip.set_destination(matrix.zone_ids()[i]),
                    None => diagnostics.unresolved_destinations += 1,
                }
            }
        }
        Ok(diagnostics)
    }
}
