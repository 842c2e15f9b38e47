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

//! Linear-in-parameters utility functions.
use std::collections::BTreeMap;

use anyhow::Result;

use crate::coefficients::CoefficientTable;
use crate::error::ConfigurationError;
use crate::population::{Gender, Household, Mode, Person, Purpose, Zone};

/// Covariates that must have a coefficient for every alternative.
pub const REQUIRED_VARIABLES: [&str; 16] = [
    "intercept",
    "hh_size",
    "hh_children",
    "hh_econ_status_2",
    "hh_econ_status_3",
    "hh_econ_status_4",
    "hh_urban",
    "hh_no_vehicle",
    "hh_vehicles_per_adult",
    "p_age_under_18",
    "p_age_30_49",
    "p_age_50_59",
    "p_age_60_69",
    "p_age_70_plus",
    "p_female",
    "p_driver_license",
];

/// Trip-specific covariates, required when the utility of a trip is computed.
pub const TRIP_VARIABLES: [&str; 2] = ["t_log_distance", "t_generalized_cost"];

/// Distances below this value (in kilometers) are clamped before taking the logarithm.
pub const MIN_LOG_DISTANCE: f64 = 0.1;

/// Maximum distance (in meters) from home to a transit stop for the transit-proximity term.
pub const TRANSIT_PROXIMITY: f64 = 500.0;

/// Attributes of a trip for a given alternative.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TripTerms {
    /// Travel distance, in kilometers.
    pub distance: f64,
    /// Generalized cost, in minutes.
    pub generalized_cost: f64,
}

/// Values of the explanatory variables of a person.
#[derive(Clone, Debug, PartialEq)]
pub struct Covariates {
    required: Vec<(&'static str, f64)>,
    optional: Vec<(&'static str, f64)>,
}

fn indicator(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

impl Covariates {
    /// Computes the covariates of a person living in the given zone.
    pub fn new(person: &Person, household: &Household, home_zone: &Zone) -> Self {
        let age = person.age;
        let status = household.economic_status;
        let required = vec![
            ("intercept", 1.0),
            ("hh_size", household.size() as f64),
            ("hh_children", household.nb_children() as f64),
            ("hh_econ_status_2", indicator(status == 2)),
            ("hh_econ_status_3", indicator(status == 3)),
            ("hh_econ_status_4", indicator(status == 4)),
            ("hh_urban", indicator(home_zone.is_urban())),
            ("hh_no_vehicle", indicator(household.vehicles == 0)),
            ("hh_vehicles_per_adult", household.vehicles_per_adult()),
            ("p_age_under_18", indicator(age < 18)),
            ("p_age_30_49", indicator((30..50).contains(&age))),
            ("p_age_50_59", indicator((50..60).contains(&age))),
            ("p_age_60_69", indicator((60..70).contains(&age))),
            ("p_age_70_plus", indicator(age >= 70)),
            ("p_female", indicator(person.gender == Gender::Female)),
            ("p_driver_license", indicator(person.has_driver_license)),
        ];
        let mut optional = Vec::with_capacity(Purpose::COUNT + Mode::COUNT + 3);
        optional.push(("p_owns_bicycle", indicator(person.owns_bicycle)));
        for purpose in Purpose::ALL {
            optional.push((
                purpose.trips_sqrt_covariate(),
                (person.nb_trips(purpose) as f64).sqrt(),
            ));
        }
        let nb_nhb_trips = person.nb_trips(Purpose::NHBW) + person.nb_trips(Purpose::NHBO);
        optional.push(("p_trips_nhb_log", (1.0 + nb_nhb_trips as f64).ln()));
        optional.push((
            "hh_transit_within_500m",
            indicator(home_zone.distance_to_transit <= TRANSIT_PROXIMITY),
        ));
        for mode in Mode::ALL {
            optional.push((
                mode.commute_covariate(),
                indicator(person.commute_mode == Some(mode)),
            ));
        }
        Covariates { required, optional }
    }

    /// Adds the covariates of a trip.
    pub fn with_trip(mut self, terms: TripTerms) -> Self {
        self.set_trip(terms);
        self
    }

    /// Sets (or replaces) the covariates of a trip.
    pub fn set_trip(&mut self, terms: TripTerms) {
        self.required
            .retain(|(name, _)| !TRIP_VARIABLES.contains(name));
        self.required.push((
            "t_log_distance",
            terms.distance.max(MIN_LOG_DISTANCE).ln(),
        ));
        self.required
            .push(("t_generalized_cost", terms.generalized_cost));
    }

    /// Returns the value of a covariate.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.required
            .iter()
            .chain(self.optional.iter())
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }
}

/// Computes the utility of alternatives from a table of coefficients.
#[derive(Clone, Copy, Debug)]
pub struct UtilityCalculator<'a> {
    coefficients: &'a CoefficientTable,
}

impl<'a> UtilityCalculator<'a> {
    pub fn new(coefficients: &'a CoefficientTable) -> Self {
        UtilityCalculator { coefficients }
    }

    /// Returns the utility of an alternative for the given covariates.
    ///
    /// Returns a [ConfigurationError] if a required coefficient is missing or if the utility is
    /// not finite.
    pub fn utility(&self, alternative: &str, covariates: &Covariates) -> Result<f64> {
        let mut utility = 0.0;
        for &(name, value) in covariates.required.iter() {
            utility += self.coefficients.get(alternative, name)? * value;
        }
        for &(name, value) in covariates.optional.iter() {
            if value != 0.0 {
                utility += self.coefficients.get_or_zero(alternative, name)? * value;
            }
        }
        if !utility.is_finite() {
            return Err(ConfigurationError::NonFiniteUtility {
                context: format!(
                    "alternative `{alternative}` of table `{}`",
                    self.coefficients.name()
                ),
                value: utility,
            }
            .into());
        }
        Ok(utility)
    }
}

/// Computes generalized costs from travel times, distances and monetary costs.
#[derive(Clone, Debug, Default)]
pub struct GeneralizedCostCalculator {
    /// Monetary cost per kilometer, by mode.
    cost_per_km: BTreeMap<Mode, f64>,
    /// Value of time (money per minute) by purpose, for each economic status.
    value_of_time: BTreeMap<Purpose, [f64; 4]>,
}

impl GeneralizedCostCalculator {
    pub fn new(
        cost_per_km: BTreeMap<Mode, f64>,
        value_of_time: BTreeMap<Purpose, [f64; 4]>,
    ) -> Self {
        GeneralizedCostCalculator {
            cost_per_km,
            value_of_time,
        }
    }

    /// Returns the generalized cost (in minutes) of a trip.
    ///
    /// Modes without a cost per kilometer have no monetary cost.
    pub fn generalized_cost(
        &self,
        travel_time: f64,
        distance: f64,
        mode: Mode,
        purpose: Purpose,
        economic_status: u8,
    ) -> Result<f64> {
        let cost_per_km = self.cost_per_km.get(&mode).copied().unwrap_or(0.0);
        if cost_per_km == 0.0 {
            return Ok(travel_time);
        }
        let vot = self
            .value_of_time
            .get(&purpose)
            .and_then(|values| values.get(usize::from(economic_status).checked_sub(1)?))
            .copied()
            .ok_or(ConfigurationError::MissingValueOfTime {
                purpose,
                economic_status,
            })?;
        Ok(travel_time + distance * cost_per_km / vot)
    }
}
