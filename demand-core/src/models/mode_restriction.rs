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

//! Choice of the subset of modes available to each person.
use anyhow::{bail, Context, Result};
use choice::multinomial_probabilities;
use log::debug;
use rand::{Rng, RngCore};

use super::Diagnostics;
use crate::coefficients::CoefficientTable;
use crate::executor::PartitionedExecutor;
use crate::population::{Household, ModeRestriction, Zones};
use crate::progress_bar::ChoiceProgressBar;
use crate::utility::{Covariates, UtilityCalculator};

/// Multinomial-logit choice of a [ModeRestriction] for each person.
pub struct ModeRestrictionModel<'a> {
    zones: &'a Zones,
    coefficients: &'a CoefficientTable,
    /// Policies with a column in the coefficient table.
    candidates: Vec<ModeRestriction>,
}

impl<'a> ModeRestrictionModel<'a> {
    /// Creates the model.
    ///
    /// Only the policies with coefficients can be chosen. Returns an error if there is none.
    pub fn new(zones: &'a Zones, coefficients: &'a CoefficientTable) -> Result<Self> {
        let candidates: Vec<ModeRestriction> = ModeRestriction::ALL
            .into_iter()
            .filter(|r| coefficients.has_alternative(r.as_str()))
            .collect();
        if candidates.is_empty() {
            bail!(
                "Table `{}` has no coefficient for any mode restriction",
                coefficients.name()
            );
        }
        debug!("Mode-restriction policies: {candidates:?}");
        Ok(ModeRestrictionModel {
            zones,
            coefficients,
            candidates,
        })
    }

    /// Chooses a mode restriction for all the persons without one.
    pub fn run(
        &self,
        executor: &PartitionedExecutor,
        households: &mut [Household],
        master: &mut impl RngCore,
    ) -> Result<Diagnostics> {
        let bp = ChoiceProgressBar::new(households.len()).with_message("Mode restriction");
        let output = executor.run("mode restriction", households, master, |chunk, ctx| {
            let mut rng = ctx.rng();
            let mut diagnostics = Diagnostics::default();
            for household in chunk.iter_mut() {
                diagnostics += self.assign_household(household, &mut rng)?;
                bp.inc();
            }
            Ok(diagnostics)
        })?;
        bp.finish();
        let mut diagnostics: Diagnostics = output.results.into_iter().sum();
        diagnostics.failed_partitions += output.nb_failed;
        Ok(diagnostics)
    }

    /// Chooses a mode restriction for the members of a household.
    ///
    /// Persons with a mode restriction already set are left unchanged.
    pub fn assign_household<R: Rng + ?Sized>(
        &self,
        household: &mut Household,
        rng: &mut R,
    ) -> Result<Diagnostics> {
        let mut diagnostics = Diagnostics::default();
        let home = self
            .zones
            .try_get(household.home_zone, &format!("home of household {}", household.id))?;
        let calculator = UtilityCalculator::new(self.coefficients);
        let mut choices = Vec::with_capacity(household.size());
        for person in household.persons.iter() {
            if person.mode_restriction.is_some() {
                choices.push(person.mode_restriction);
                continue;
            }
            let covariates = Covariates::new(person, household, home);
            let utilities = self
                .candidates
                .iter()
                .map(|&r| Ok((r, calculator.utility(r.as_str(), &covariates)?)))
                .collect::<Result<Vec<_>>>()?;
            let choice = multinomial_probabilities(&utilities)
                .with_context(|| {
                    format!("Failed to choose the mode restriction of person {}", person.id)
                })?
                .sample(rng);
            if choice.is_none() {
                diagnostics.unresolved_restrictions += 1;
            }
            choices.push(choice);
        }
        for (person, choice) in household.persons.iter_mut().zip(choices) {
            person.mode_restriction = choice;
        }
        Ok(diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    use super::*;
    use crate::executor::FailurePolicy;
    use crate::population::Person;
    use crate::utility::tests::{zero_table, zone};

    fn household(id: u64) -> Household {
        Household {
            id,
            home_zone: 1,
            vehicles: 0,
            economic_status: 1,
            persons: vec![Person::new(id * 10, 40), Person::new(id * 10 + 1, 12)],
        }
    }

    #[test]
    fn candidates_test() {
        let zones = Zones::new(vec![zone()]).unwrap();
        let table = zero_table("restriction", &[("Walk", 0.0), ("CycleWalk", 1.0)]);
        let model = ModeRestrictionModel::new(&zones, &table).unwrap();
        assert_eq!(
            model.candidates,
            vec![ModeRestriction::CycleWalk, ModeRestriction::Walk]
        );
        let mut rng = XorShiftRng::seed_from_u64(0);
        let mut hh = household(1);
        hh.persons[1].mode_restriction = Some(ModeRestriction::Pt);
        let d = model.assign_household(&mut hh, &mut rng).unwrap();
        assert_eq!(d, Diagnostics::default());
        assert!(matches!(
            hh.persons[0].mode_restriction,
            Some(ModeRestriction::Walk | ModeRestriction::CycleWalk)
        ));
        // Existing restrictions are kept.
        assert_eq!(hh.persons[1].mode_restriction, Some(ModeRestriction::Pt));
    }

    #[test]
    fn no_candidate_test() {
        let zones = Zones::new(vec![zone()]).unwrap();
        let table = zero_table("restriction", &[("Car", 0.0)]);
        assert!(ModeRestrictionModel::new(&zones, &table).is_err());
    }

    #[test]
    fn shares_test() {
        // Utility difference of ln(3): CycleWalk is chosen 75% of the time.
        let zones = Zones::new(vec![zone()]).unwrap();
        let table = zero_table("restriction", &[("Walk", 0.0), ("CycleWalk", 3f64.ln())]);
        let model = ModeRestrictionModel::new(&zones, &table).unwrap();
        let executor = PartitionedExecutor::new(2, 8, FailurePolicy::FailFast).unwrap();
        let mut households: Vec<Household> = (0..5000).map(household).collect();
        let mut master = XorShiftRng::seed_from_u64(11);
        let d = model.run(&executor, &mut households, &mut master).unwrap();
        assert_eq!(d, Diagnostics::default());
        let nb_cycle_walk = households
            .iter()
            .flat_map(|h| h.persons.iter())
            .filter(|p| p.mode_restriction == Some(ModeRestriction::CycleWalk))
            .count();
        let share = nb_cycle_walk as f64 / 10_000.0;
        assert!((share - 0.75).abs() < 0.02, "share = {share}");
    }

    #[test]
    fn unknown_home_zone_test() {
        let zones = Zones::new(vec![zone()]).unwrap();
        let table = zero_table("restriction", &[("Walk", 0.0)]);
        let model = ModeRestrictionModel::new(&zones, &table).unwrap();
        let mut hh = household(1);
        hh.home_zone = 99;
        let mut rng = XorShiftRng::seed_from_u64(0);
        assert!(model.assign_household(&mut hh, &mut rng).is_err());
    }
}
