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

//! Orchestration of the choice models over the whole population.
use std::collections::BTreeMap;
use std::io;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use serde::Serialize;

use crate::calibration::{CalibrationFactors, CalibrationLoop, CalibrationOutcome, ObservedShares};
use crate::coefficients::CoefficientTable;
use crate::destination::{DestinationMatrices, DestinationUtilityMatrixBuilder, MatrixRequest};
use crate::executor::PartitionedExecutor;
use crate::io::InputData;
use crate::models::distribution::DistributionModel;
use crate::models::mode_choice::{ModeChoiceModel, ModeChoiceSettings};
use crate::models::mode_restriction::ModeRestrictionModel;
use crate::models::{Diagnostics, ModeCounts};
use crate::parameters::{Parameters, PurposeDistributionParameters};
use crate::population::{Household, Population, Purpose, Zones};
use crate::progress_bar::Spinner;
use crate::travel_times::{TravelDistances, TravelTimes};
use crate::utility::GeneralizedCostCalculator;

/// Observed shares and stopping rules of the calibration.
#[derive(Clone, Debug)]
pub struct CalibrationSettings {
    pub observed: ObservedShares,
    pub max_iterations: u32,
    pub tolerance: f64,
}

/// Everything needed to run the choice models, except for the population.
pub struct DemandModel {
    pub zones: Zones,
    pub distances: Box<dyn TravelDistances>,
    pub travel_times: Box<dyn TravelTimes>,
    pub executor: PartitionedExecutor,
    pub distribution: BTreeMap<Purpose, PurposeDistributionParameters>,
    pub mode_choice: ModeChoiceSettings,
    /// Coefficients of the mode-restriction model (the model is skipped when `None`).
    pub mode_restriction: Option<CoefficientTable>,
    /// Calibration of the mode-choice constants (skipped when `None`).
    pub calibration: Option<CalibrationSettings>,
    /// Initial mode-choice constants.
    pub factors: CalibrationFactors,
    pub random_seed: u64,
}

/// Running time of each phase.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunningTimes {
    pub total: Duration,
    pub mode_restriction: Duration,
    pub destination_utilities: Duration,
    pub distribution: Duration,
    /// Includes the calibration.
    pub mode_choice: Duration,
}

/// Results of a run.
#[derive(Debug)]
pub struct RunResults {
    pub random_seed: u64,
    pub mode_restriction: Diagnostics,
    pub distribution: Diagnostics,
    /// Diagnostics of the last mode-choice run.
    pub mode_choice: Diagnostics,
    /// Trips by region, purpose and mode after the last mode-choice run.
    pub mode_counts: ModeCounts,
    pub calibration: Option<CalibrationOutcome>,
    pub running_times: RunningTimes,
}

fn record_time<Res>(func: impl FnOnce() -> Result<Res>) -> Result<(Res, Duration)> {
    let now = Instant::now();
    let result = func()?;
    Ok((result, now.elapsed()))
}

impl DemandModel {
    /// Creates the model from the parameters and the input data.
    pub fn new(parameters: &Parameters, input: InputData) -> Result<Self> {
        let executor = PartitionedExecutor::new(
            parameters.nb_threads,
            parameters.nb_partitions,
            parameters.failure_policy,
        )?;
        let mc = &parameters.mode_choice;
        let choice_models = mc
            .nests
            .keys()
            .map(|&purpose| Ok((purpose, mc.choice_model(purpose)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let mode_choice = ModeChoiceSettings::new(
            input.mode_choice_coefficients.into_iter().collect(),
            choice_models,
            GeneralizedCostCalculator::new(mc.cost_per_km.clone(), mc.value_of_time.clone()),
            mc.default_departure_minutes,
        )?;
        let mode_restriction = if parameters.mode_restriction.enabled {
            Some(
                input
                    .mode_restriction_coefficients
                    .ok_or_else(|| anyhow!("Mode restriction is enabled but has no coefficients"))?,
            )
        } else {
            None
        };
        let calibration = if parameters.calibration.enabled {
            Some(CalibrationSettings {
                observed: input
                    .observed_shares
                    .ok_or_else(|| anyhow!("Calibration is enabled but has no observed shares"))?,
                max_iterations: parameters.calibration.max_iterations,
                tolerance: parameters.calibration.tolerance,
            })
        } else {
            None
        };
        let random_seed = parameters.random_seed.unwrap_or_else(rand::random);
        Ok(DemandModel {
            zones: input.zones,
            distances: Box::new(input.distances),
            travel_times: Box::new(input.travel_times),
            executor,
            distribution: parameters.distribution.clone(),
            mode_choice,
            mode_restriction,
            calibration,
            factors: input.calibration_factors,
            random_seed,
        })
    }

    /// Runs all the choice models on the population.
    ///
    /// When the calibration is enabled, its rows are written to `calibration_output` (if any)
    /// and the final mode choice uses the calibrated constants.
    pub fn run<W: io::Write>(
        &self,
        population: &mut Population,
        calibration_output: Option<&mut csv::Writer<W>>,
    ) -> Result<RunResults> {
        let now = Instant::now();
        population.check_zones(&self.zones)?;
        let purposes = purposes_with_trips(population)?;
        info!(
            "Running the demand model with seed {} ({} threads, {} partitions)",
            self.random_seed,
            self.executor.nb_threads(),
            self.executor.nb_partitions()
        );
        let mut master = XorShiftRng::seed_from_u64(self.random_seed);
        let households = population.households_mut();

        let (mode_restriction, t1) =
            record_time(|| self.run_mode_restriction(households, &mut master))?;
        info!("Building destination utilities");
        let (matrices, t2) = record_time(|| self.build_matrices(&purposes))?;
        info!("Running destination choice");
        let (distribution, t3) =
            record_time(|| self.run_distribution(&matrices, &purposes, households, &mut master))?;
        info!("Running mode choice");
        let ((mode_choice, mode_counts, calibration), t4) = record_time(|| {
            self.run_mode_choice(households, &mut master, calibration_output)
        })?;
        let running_times = RunningTimes {
            total: now.elapsed(),
            mode_restriction: t1,
            destination_utilities: t2,
            distribution: t3,
            mode_choice: t4,
        };
        info!("Done in {:?}", running_times.total);
        Ok(RunResults {
            random_seed: self.random_seed,
            mode_restriction,
            distribution,
            mode_choice,
            mode_counts,
            calibration,
            running_times,
        })
    }

    fn run_mode_restriction(
        &self,
        households: &mut [Household],
        master: &mut XorShiftRng,
    ) -> Result<Diagnostics> {
        let Some(table) = self.mode_restriction.as_ref() else {
            return Ok(Diagnostics::default());
        };
        info!("Running mode restriction");
        let diagnostics =
            ModeRestrictionModel::new(&self.zones, table)?.run(&self.executor, households, master)?;
        diagnostics.log("Mode restriction");
        Ok(diagnostics)
    }

    fn build_matrices(&self, purposes: &[Purpose]) -> Result<DestinationMatrices> {
        let mut requests = Vec::new();
        for &purpose in purposes {
            let params = self
                .distribution
                .get(&purpose)
                .ok_or_else(|| anyhow!("No distribution parameters for purpose {purpose}"))?;
            requests.push(MatrixRequest {
                purpose,
                segment: None,
                parameters: params.base(),
            });
            requests.extend(params.car_ownership.iter().map(|(&segment, &parameters)| {
                MatrixRequest {
                    purpose,
                    segment: Some(segment),
                    parameters,
                }
            }));
        }
        let mut spinner = Spinner::new("Building destination utilities");
        let builder = DestinationUtilityMatrixBuilder::new(&self.zones, self.distances.as_ref());
        let matrices = self.executor.install(|| builder.build_all(&requests));
        spinner.finish();
        matrices
    }

    fn run_distribution(
        &self,
        matrices: &DestinationMatrices,
        purposes: &[Purpose],
        households: &mut [Household],
        master: &mut XorShiftRng,
    ) -> Result<Diagnostics> {
        let model = DistributionModel::new(&self.zones, matrices);
        let mut diagnostics = Diagnostics::default();
        // Home-based purposes come first so that the non-home-based trips can start from
        // their destinations.
        for &purpose in purposes {
            let d = model
                .run(&self.executor, households, purpose, master)
                .with_context(|| format!("Destination choice failed for purpose {purpose}"))?;
            d.log(&format!("Destination choice ({purpose})"));
            diagnostics += d;
        }
        Ok(diagnostics)
    }

    fn run_mode_choice<W: io::Write>(
        &self,
        households: &mut [Household],
        master: &mut XorShiftRng,
        calibration_output: Option<&mut csv::Writer<W>>,
    ) -> Result<(Diagnostics, ModeCounts, Option<CalibrationOutcome>)> {
        let outcome = match self.calibration.as_ref() {
            Some(settings) => {
                info!("Calibrating the mode-choice constants");
                let calibration = CalibrationLoop::new(
                    &settings.observed,
                    settings.max_iterations,
                    settings.tolerance,
                );
                let outcome = calibration.calibrate(
                    self.factors.clone(),
                    |factors| {
                        let (_, counts) = self.mode_choice_pass(households, master, factors)?;
                        Ok(counts)
                    },
                    calibration_output,
                )?;
                Some(outcome)
            }
            None => None,
        };
        let factors = outcome.as_ref().map_or(&self.factors, |o| &o.factors);
        let (diagnostics, counts) = self.mode_choice_pass(households, master, factors)?;
        Ok((diagnostics, counts, outcome))
    }

    fn mode_choice_pass(
        &self,
        households: &mut [Household],
        master: &mut XorShiftRng,
        factors: &CalibrationFactors,
    ) -> Result<(Diagnostics, ModeCounts)> {
        let model = ModeChoiceModel::new(
            &self.zones,
            &self.mode_choice,
            self.distances.as_ref(),
            self.travel_times.as_ref(),
            factors,
        );
        let (diagnostics, counts) = model.run(&self.executor, households, master)?;
        diagnostics.log("Mode choice");
        counts.log_summary();
        Ok((diagnostics, counts))
    }
}

/// Returns the purposes with at least one trip, in the order of [Purpose::ALL].
///
/// Returns an error if there is no trip at all.
fn purposes_with_trips(population: &Population) -> Result<Vec<Purpose>> {
    let mut nb_trips = [0usize; Purpose::COUNT];
    for (_, _, trip) in population.trips() {
        nb_trips[trip.purpose().index()] += 1;
    }
    if nb_trips.iter().all(|&n| n == 0) {
        bail!("The population has no trip");
    }
    let mut purposes = Vec::with_capacity(Purpose::COUNT);
    for purpose in Purpose::ALL {
        match nb_trips[purpose.index()] {
            0 => warn!("No trip for purpose {purpose}"),
            n => {
                info!("{n} trips for purpose {purpose}");
                purposes.push(purpose);
            }
        }
    }
    Ok(purposes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FailurePolicy;
    use crate::population::{AreaType, Mode, Person, Trip, Zone};
    use crate::travel_times::{SkimMatrix, SkimTravelTimes};
    use crate::utility::tests::zero_table;

    fn zones() -> Zones {
        Zones::new(
            (1..=3)
                .map(|id| Zone {
                    id,
                    region: "A".to_owned(),
                    area_type: AreaType::Urban,
                    distance_to_transit: 100.0,
                    attractions: [id as f64; Purpose::COUNT],
                })
                .collect(),
        )
        .unwrap()
    }

    fn model(calibration: Option<CalibrationSettings>) -> DemandModel {
        let zones = zones();
        let ids = zones.ids();
        let distances =
            SkimMatrix::from_fn(&ids, |o, d| if o == d { 0.5 } else { 3.0 }).unwrap();
        let speeds = Mode::ALL.into_iter().map(|m| (m, 20.0)).collect();
        let travel_times =
            SkimTravelTimes::new(Default::default(), distances.clone(), speeds).unwrap();
        let intercepts: Vec<_> = Mode::ALL.iter().map(|m| (m.as_str(), 0.0)).collect();
        let table = zero_table("mode_choice", &intercepts);
        let mode_choice = ModeChoiceSettings::new(
            Purpose::ALL.into_iter().map(|p| (p, table.clone())).collect(),
            BTreeMap::new(),
            GeneralizedCostCalculator::default(),
            480.0,
        )
        .unwrap();
        let distribution = Purpose::ALL
            .into_iter()
            .map(|p| {
                (
                    p,
                    PurposeDistributionParameters {
                        impedance: -1.0,
                        distance: 0.1,
                        car_ownership: BTreeMap::new(),
                    },
                )
            })
            .collect();
        DemandModel {
            zones,
            distances: Box::new(distances),
            travel_times: Box::new(travel_times),
            executor: PartitionedExecutor::new(2, 4, FailurePolicy::FailFast).unwrap(),
            distribution,
            mode_choice,
            mode_restriction: None,
            calibration,
            factors: CalibrationFactors::default(),
            random_seed: 1,
        }
    }

    fn population() -> Population {
        let households = (0..30)
            .map(|i| {
                let mut person = Person::new(i, 30);
                person.trips = vec![
                    Trip::new(2 * i, Purpose::HBS),
                    Trip::new(2 * i + 1, Purpose::NHBO),
                ];
                Household {
                    id: i,
                    home_zone: (i % 3 + 1) as u32,
                    vehicles: 0,
                    economic_status: 1,
                    persons: vec![person],
                }
            })
            .collect();
        Population::new(households).unwrap()
    }

    #[test]
    fn run_test() {
        let model = model(None);
        let mut population = population();
        let results = model
            .run(&mut population, None::<&mut csv::Writer<Vec<u8>>>)
            .unwrap();
        assert_eq!(results.mode_counts.grand_total(), 60);
        assert!(results.calibration.is_none());
        for (hh, _, trip) in population.trips() {
            assert!(trip.destination().is_some());
            assert!(trip.mode().is_some());
            if trip.purpose() == Purpose::HBS {
                assert_eq!(trip.origin(), Some(hh.home_zone));
            }
        }
        // NHBO trips start at the destination of the HBS trip.
        for hh in population.households() {
            let trips = &hh.persons[0].trips;
            assert_eq!(trips[1].origin(), trips[0].destination());
        }
    }

    #[test]
    fn calibration_test() {
        let mut observed = ObservedShares::default();
        for purpose in [Purpose::HBS, Purpose::NHBO] {
            observed.insert("A", purpose, Mode::Walk, 0.6).unwrap();
            observed.insert("A", purpose, Mode::Bicycle, 0.1).unwrap();
            observed.insert("A", purpose, Mode::AutoPassenger, 0.1).unwrap();
            observed
                .insert("A", purpose, Mode::PublicTransport, 0.2)
                .unwrap();
        }
        let model = model(Some(CalibrationSettings {
            observed,
            max_iterations: 3,
            tolerance: 1e-9,
        }));
        let mut population = population();
        let mut writer = csv::Writer::from_writer(Vec::new());
        let results = model.run(&mut population, Some(&mut writer)).unwrap();
        let outcome = results.calibration.unwrap();
        assert_eq!(outcome.iterations, 3);
        assert!(outcome.factors.get("A", Purpose::HBS, Mode::Walk) > 0.0);
        let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert!(output.lines().count() > 1);
        assert_eq!(results.mode_counts.grand_total(), 60);
    }

    #[test]
    fn no_trip_test() {
        let model = model(None);
        let mut population = Population::new(vec![Household {
            id: 1,
            home_zone: 1,
            vehicles: 0,
            economic_status: 1,
            persons: vec![Person::new(1, 20)],
        }])
        .unwrap();
        assert!(model
            .run(&mut population, None::<&mut csv::Writer<Vec<u8>>>)
            .is_err());
    }

    #[test]
    fn missing_distribution_parameters_test() {
        let mut model = model(None);
        model.distribution.remove(&Purpose::NHBO);
        let mut population = population();
        assert!(model
            .run(&mut population, None::<&mut csv::Writer<Vec<u8>>>)
            .is_err());
    }
}
