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

//! Mode choice of the trips with an origin and a destination.
use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use choice::ChoiceModel;
use rand::{Rng, RngCore};

use super::{Diagnostics, ModeCounts};
use crate::calibration::CalibrationFactors;
use crate::coefficients::CoefficientTable;
use crate::error::ConfigurationError;
use crate::executor::PartitionedExecutor;
use crate::logging::{send_warning, WarningType};
use crate::population::{Household, Mode, ModeSet, Purpose, Trip, Zones};
use crate::progress_bar::ChoiceProgressBar;
use crate::travel_times::{TravelDistances, TravelTimes};
use crate::utility::{Covariates, GeneralizedCostCalculator, TripTerms, UtilityCalculator};

/// Coefficients and choice structure of the mode-choice model, by purpose.
#[derive(Clone, Debug)]
pub struct ModeChoiceSettings {
    coefficients: BTreeMap<Purpose, CoefficientTable>,
    choice_models: BTreeMap<Purpose, ChoiceModel<Mode>>,
    costs: GeneralizedCostCalculator,
    default_departure_minutes: f64,
}

impl ModeChoiceSettings {
    /// Creates the settings.
    ///
    /// Returns an error if a nesting structure does not cover all the modes.
    pub fn new(
        coefficients: BTreeMap<Purpose, CoefficientTable>,
        choice_models: BTreeMap<Purpose, ChoiceModel<Mode>>,
        costs: GeneralizedCostCalculator,
        default_departure_minutes: f64,
    ) -> Result<Self> {
        for (purpose, model) in choice_models.iter() {
            if let ChoiceModel::Nested(structure) = model {
                if let Some(mode) = Mode::ALL.into_iter().find(|m| {
                    !structure
                        .nests()
                        .iter()
                        .any(|n| n.alternatives.contains(m))
                }) {
                    bail!("Mode {mode} is not part of any nest for purpose {purpose}");
                }
            }
        }
        Ok(ModeChoiceSettings {
            coefficients,
            choice_models,
            costs,
            default_departure_minutes,
        })
    }

    fn table(&self, purpose: Purpose) -> Result<&CoefficientTable, ConfigurationError> {
        self.coefficients
            .get(&purpose)
            .ok_or_else(|| ConfigurationError::MissingTable {
                model: "mode-choice".to_owned(),
                purpose,
            })
    }

    /// Draws a mode from the choice model of the purpose (multinomial logit by default).
    fn choose<R: Rng + ?Sized>(
        &self,
        purpose: Purpose,
        utilities: &[(Mode, f64)],
        rng: &mut R,
    ) -> Result<Option<Mode>> {
        match self.choice_models.get(&purpose) {
            Some(model) => model.choose(utilities, rng),
            None => ChoiceModel::Multinomial.choose(utilities, rng),
        }
    }
}

/// Chooses the mode of all the trips with an origin and a destination.
pub struct ModeChoiceModel<'a> {
    zones: &'a Zones,
    settings: &'a ModeChoiceSettings,
    distances: &'a dyn TravelDistances,
    travel_times: &'a dyn TravelTimes,
    factors: &'a CalibrationFactors,
}

impl<'a> ModeChoiceModel<'a> {
    pub fn new(
        zones: &'a Zones,
        settings: &'a ModeChoiceSettings,
        distances: &'a dyn TravelDistances,
        travel_times: &'a dyn TravelTimes,
        factors: &'a CalibrationFactors,
    ) -> Self {
        ModeChoiceModel {
            zones,
            settings,
            distances,
            travel_times,
            factors,
        }
    }

    /// Chooses the mode of all the trips of the households.
    ///
    /// The modes chosen by a previous run are discarded. Returns the diagnostics and the number
    /// of trips by region of residence, purpose and mode.
    pub fn run(
        &self,
        executor: &PartitionedExecutor,
        households: &mut [Household],
        master: &mut impl RngCore,
    ) -> Result<(Diagnostics, ModeCounts)> {
        let bp = ChoiceProgressBar::new(households.len()).with_message("Mode choice");
        let output = executor.run("mode choice", households, master, |chunk, ctx| {
            let mut rng = ctx.rng();
            let mut diagnostics = Diagnostics::default();
            let mut counts = ModeCounts::default();
            for household in chunk.iter_mut() {
                diagnostics += self.assign_household(household, &mut counts, &mut rng)?;
                bp.inc();
            }
            Ok((diagnostics, counts))
        })?;
        bp.finish();
        let mut diagnostics = Diagnostics {
            failed_partitions: output.nb_failed,
            ..Default::default()
        };
        let mut counts = ModeCounts::default();
        for (d, c) in output.results {
            diagnostics += d;
            counts.merge(&c);
        }
        Ok((diagnostics, counts))
    }

    /// Chooses the mode of the trips of all members of a household.
    pub fn assign_household<R: Rng + ?Sized>(
        &self,
        household: &mut Household,
        counts: &mut ModeCounts,
        rng: &mut R,
    ) -> Result<Diagnostics> {
        let mut diagnostics = Diagnostics::default();
        let home = self
            .zones
            .try_get(household.home_zone, &format!("home of household {}", household.id))?;
        let economic_status = household.economic_status;
        let persons: Vec<(Covariates, ModeSet)> = household
            .persons
            .iter()
            .map(|p| (Covariates::new(p, household, home), p.permitted_modes(household)))
            .collect();
        for (person, (mut covariates, modes)) in household.persons.iter_mut().zip(persons) {
            for trip in person.trips.iter_mut() {
                trip.clear_mode();
                if trip.origin().is_none() || trip.destination().is_none() {
                    diagnostics.skipped_trips += 1;
                    continue;
                }
                let utilities =
                    self.utilities(trip, modes, economic_status, &home.region, &mut covariates)?;
                if utilities.is_empty() {
                    diagnostics.unresolved_modes += 1;
                    continue;
                }
                let chosen = self
                    .settings
                    .choose(trip.purpose(), &utilities, rng)
                    .with_context(|| format!("Failed to choose the mode of trip {}", trip.id()))?;
                match chosen {
                    Some(mode) => {
                        trip.set_mode(mode);
                        counts.add(&home.region, trip.purpose(), mode);
                    }
                    None => diagnostics.unresolved_modes += 1,
                }
            }
        }
        Ok(diagnostics)
    }

    /// Returns the utility of each permitted mode for a trip.
    fn utilities(
        &self,
        trip: &Trip,
        modes: ModeSet,
        economic_status: u8,
        region: &str,
        covariates: &mut Covariates,
    ) -> Result<Vec<(Mode, f64)>> {
        let (Some(origin), Some(destination)) = (trip.origin(), trip.destination()) else {
            return Ok(Vec::new());
        };
        let purpose = trip.purpose();
        let calculator = UtilityCalculator::new(self.settings.table(purpose)?);
        let departure = trip.departure_minutes().unwrap_or_else(|| {
            send_warning(WarningType::DefaultDeparture, || {
                format!(
                    "Some trips have no departure time, using {} minutes after midnight",
                    self.settings.default_departure_minutes
                )
            });
            self.settings.default_departure_minutes
        });
        let distance = self.distances.distance(origin, destination)?;
        let mut utilities = Vec::with_capacity(modes.len());
        for mode in modes.iter() {
            let travel_time = self
                .travel_times
                .travel_time(origin, destination, departure, mode)?;
            let generalized_cost = self.settings.costs.generalized_cost(
                travel_time,
                distance,
                mode,
                purpose,
                economic_status,
            )?;
            covariates.set_trip(TripTerms {
                distance,
                generalized_cost,
            });
            let utility = calculator.utility(mode.as_str(), covariates)?
                + self.factors.get(region, purpose, mode);
            utilities.push((mode, utility));
        }
        Ok(utilities)
    }
}
