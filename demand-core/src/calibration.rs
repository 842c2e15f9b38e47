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

//! Calibration of the mode-choice constants against observed mode shares.
//!
//! At each iteration, the mode-choice model is run and, for each region, purpose and mode with
//! positive simulated and observed shares, the calibration constant is updated with
//!
//! ```text
//! k <- k + ln( ln(simulated share) / ln(observed share) )
//! ```
use std::io;

use anyhow::{bail, Context, Result};
use hashbrown::HashMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::logging::{send_warning, WarningType};
use crate::models::ModeCounts;
use crate::population::{Mode, Purpose};

/// Additive constants of the mode utilities, by region, purpose and mode.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CalibrationFactors {
    values: HashMap<String, HashMap<(Purpose, Mode), f64>>,
}

impl CalibrationFactors {
    /// Returns the constant of a region, purpose and mode (0 if it was never set).
    pub fn get(&self, region: &str, purpose: Purpose, mode: Mode) -> f64 {
        self.values
            .get(region)
            .and_then(|v| v.get(&(purpose, mode)))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn set(&mut self, region: &str, purpose: Purpose, mode: Mode, value: f64) {
        if let Some(v) = self.values.get_mut(region) {
            v.insert((purpose, mode), value);
        } else {
            let mut v = HashMap::new();
            v.insert((purpose, mode), value);
            self.values.insert(region.to_owned(), v);
        }
    }

    pub fn len(&self) -> usize {
        self.values.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns all the constants, sorted by region, purpose and mode.
    pub fn to_vec(&self) -> Vec<(String, Purpose, Mode, f64)> {
        let mut values: Vec<_> = self
            .values
            .iter()
            .flat_map(|(region, v)| {
                v.iter()
                    .map(move |(&(purpose, mode), &k)| (region.clone(), purpose, mode, k))
            })
            .collect();
        values.sort_by(|a, b| (&a.0, a.1, a.2).cmp(&(&b.0, b.1, b.2)));
        values
    }

    /// Reads the constants from the rows of the last iteration of a calibration output.
    pub fn from_records(records: &[CalibrationRecord]) -> Self {
        let mut factors = Self::default();
        if let Some(last) = records.iter().map(|r| r.iteration).max() {
            for r in records.iter().filter(|r| r.iteration == last) {
                factors.set(&r.region, r.purpose, r.mode, r.k);
            }
        }
        factors
    }
}

/// Observed mode shares, by region, purpose and mode.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObservedShares {
    values: HashMap<String, HashMap<(Purpose, Mode), f64>>,
}

impl ObservedShares {
    /// Sets an observed share.
    ///
    /// Returns an error if the share is not between 0 and 1.
    pub fn insert(&mut self, region: &str, purpose: Purpose, mode: Mode, share: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&share) {
            bail!("Invalid observed share for region `{region}`, purpose {purpose} and mode {mode}: {share}");
        }
        self.values
            .entry(region.to_owned())
            .or_default()
            .insert((purpose, mode), share);
        Ok(())
    }

    pub fn get(&self, region: &str, purpose: Purpose, mode: Mode) -> Option<f64> {
        self.values
            .get(region)
            .and_then(|v| v.get(&(purpose, mode)))
            .copied()
    }

    /// Returns the (region, purpose) pairs with at least one observed share.
    pub fn segments(&self) -> Vec<(&str, Purpose)> {
        let mut segments: Vec<(&str, Purpose)> = self
            .values
            .iter()
            .flat_map(|(region, v)| v.keys().map(move |&(p, _)| (region.as_str(), p)))
            .collect();
        segments.sort_unstable();
        segments.dedup();
        segments
    }
}

/// Returns the adjustment of a calibration constant given the simulated and observed shares.
///
/// Returns `None` when the constant must be left unchanged: when one of the shares is zero or
/// when the adjustment is not finite (e.g., a share equal to one).
pub fn adjustment(simulated: f64, observed: f64) -> Option<f64> {
    if !(simulated > 0.0 && observed > 0.0) {
        return None;
    }
    let value = (simulated.ln() / observed.ln()).ln();
    if value.is_finite() {
        Some(value)
    } else {
        send_warning(WarningType::CalibrationAdjustment, || {
            format!(
                "Cannot compute the calibration adjustment for simulated share {simulated} and \
                observed share {observed}; the constant is left unchanged"
            )
        });
        None
    }
}

/// A row of the calibration output.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct CalibrationRecord {
    pub iteration: u32,
    pub region: String,
    pub purpose: Purpose,
    pub mode: Mode,
    pub observed_share: f64,
    pub sim_share: f64,
    /// Value of the constant after the update of this iteration.
    pub k: f64,
    /// Number of simulated trips.
    pub trips: usize,
}

/// Result of a calibration.
#[derive(Clone, Debug)]
pub struct CalibrationOutcome {
    /// Number of iterations run.
    pub iterations: u32,
    /// `true` if the largest adjustment of the last iteration is below the tolerance and no
    /// observed share is missed by more than the tolerance without being adjustable.
    pub converged: bool,
    /// Largest absolute adjustment of the last iteration.
    pub max_adjustment: f64,
    /// Number of observed (region, purpose, mode) shares of the last iteration which differ
    /// from the simulated share but whose constant cannot be adjusted (a share of 0 or 1).
    pub unadjustable: usize,
    /// Calibration constants after the last update.
    pub factors: CalibrationFactors,
}

/// Iterative adjustment of the mode-choice constants.
#[derive(Clone, Copy, Debug)]
pub struct CalibrationLoop<'a> {
    observed: &'a ObservedShares,
    max_iterations: u32,
    tolerance: f64,
}

impl<'a> CalibrationLoop<'a> {
    pub fn new(observed: &'a ObservedShares, max_iterations: u32, tolerance: f64) -> Self {
        CalibrationLoop {
            observed,
            max_iterations,
            tolerance,
        }
    }

    /// Runs the calibration.
    ///
    /// `run_model` runs the mode-choice model with the given constants and returns fresh trip
    /// counts. When a writer is given, one row per region, purpose and mode is written at each
    /// iteration.
    pub fn calibrate<W, F>(
        &self,
        mut factors: CalibrationFactors,
        mut run_model: F,
        mut writer: Option<&mut csv::Writer<W>>,
    ) -> Result<CalibrationOutcome>
    where
        W: io::Write,
        F: FnMut(&CalibrationFactors) -> Result<ModeCounts>,
    {
        let mut iteration = 0;
        let mut max_adjustment = 0.0;
        let mut unadjustable = 0;
        let mut converged = false;
        while iteration < self.max_iterations {
            iteration += 1;
            let counts = run_model(&factors)
                .with_context(|| format!("Failed to run calibration iteration {iteration}"))?;
            let update = self.update(iteration, &counts, &mut factors);
            max_adjustment = update.max_adjustment;
            unadjustable = update.unadjustable;
            if let Some(w) = writer.as_mut() {
                for record in update.records {
                    w.serialize(record)?;
                }
                w.flush()?;
            }
            info!("Calibration iteration {iteration}: largest adjustment = {max_adjustment:.6}");
            if unadjustable > 0 {
                warn!(
                    "Calibration iteration {iteration}: {unadjustable} observed shares are \
                    missed but cannot be adjusted"
                );
            }
            if max_adjustment < self.tolerance && unadjustable == 0 {
                converged = true;
                break;
            }
        }
        if converged {
            info!("Calibration converged after {iteration} iterations");
        } else {
            info!(
                "Calibration stopped after {iteration} iterations without convergence \
                (largest adjustment: {max_adjustment:.6}, tolerance: {})",
                self.tolerance
            );
        }
        Ok(CalibrationOutcome {
            iterations: iteration,
            converged,
            max_adjustment,
            unadjustable,
            factors,
        })
    }

    /// Updates the constants given the simulated counts of an iteration.
    fn update(
        &self,
        iteration: u32,
        counts: &ModeCounts,
        factors: &mut CalibrationFactors,
    ) -> IterationUpdate {
        let mut records = Vec::new();
        let mut max_adjustment: f64 = 0.0;
        let mut unadjustable = 0;
        for (region, purpose) in self.observed.segments() {
            if counts.total(region, purpose) == 0 {
                send_warning(WarningType::UnmatchedObservedShare, || {
                    format!(
                        "No simulated trip for region `{region}` and purpose {purpose}, \
                        the observed shares are ignored"
                    )
                });
            }
        }
        for region in counts.regions() {
            for purpose in Purpose::ALL {
                let total = counts.total(region, purpose);
                if total == 0 {
                    continue;
                }
                for mode in Mode::ALL {
                    let trips = counts.count(region, purpose, mode);
                    let observed = self.observed.get(region, purpose, mode);
                    if trips == 0 && observed.is_none() {
                        continue;
                    }
                    let observed_share = observed.unwrap_or(0.0);
                    let sim_share = trips as f64 / total as f64;
                    let mut k = factors.get(region, purpose, mode);
                    if let Some(adj) = adjustment(sim_share, observed_share) {
                        k += adj;
                        factors.set(region, purpose, mode, k);
                        max_adjustment = max_adjustment.max(adj.abs());
                    } else if observed.is_some()
                        && (sim_share - observed_share).abs() >= self.tolerance
                    {
                        unadjustable += 1;
                    }
                    debug!(
                        "{region} / {purpose} / {mode}: observed = {observed_share:.4}, \
                        simulated = {sim_share:.4}, k = {k:.4}"
                    );
                    records.push(CalibrationRecord {
                        iteration,
                        region: region.to_owned(),
                        purpose,
                        mode,
                        observed_share,
                        sim_share,
                        k,
                        trips,
                    });
                }
            }
        }
        IterationUpdate {
            records,
            max_adjustment,
            unadjustable,
        }
    }
}

struct IterationUpdate {
    records: Vec<CalibrationRecord>,
    /// Largest absolute adjustment.
    max_adjustment: f64,
    unadjustable: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(walk: usize, bike: usize) -> ModeCounts {
        let mut counts = ModeCounts::default();
        for _ in 0..walk {
            counts.add("A", Purpose::HBS, Mode::Walk);
        }
        for _ in 0..bike {
            counts.add("A", Purpose::HBS, Mode::Bicycle);
        }
        counts
    }

    fn observed(walk: f64, bike: f64) -> ObservedShares {
        let mut observed = ObservedShares::default();
        observed.insert("A", Purpose::HBS, Mode::Walk, walk).unwrap();
        observed.insert("A", Purpose::HBS, Mode::Bicycle, bike).unwrap();
        observed
    }

    #[test]
    fn adjustment_test() {
        // Matching shares: no correction.
        assert_eq!(adjustment(0.5, 0.5), Some(0.0));
        // Too many simulated trips: the constant decreases.
        assert!(adjustment(0.6, 0.4).unwrap() < 0.0);
        assert!(adjustment(0.2, 0.4).unwrap() > 0.0);
        assert_eq!(adjustment(0.0, 0.4), None);
        assert_eq!(adjustment(0.4, 0.0), None);
        assert_eq!(adjustment(1.0, 0.4), None);
        assert_eq!(adjustment(0.4, 1.0), None);
    }

    #[test]
    fn unchanged_factor_test() {
        let observed = observed(0.5, 0.5);
        let calibration = CalibrationLoop::new(&observed, 5, 1e-6);
        let mut factors = CalibrationFactors::default();
        factors.set("A", Purpose::HBS, Mode::Walk, 0.3);
        let outcome = calibration
            .calibrate(factors, |_| Ok(counts(50, 50)), None::<&mut csv::Writer<Vec<u8>>>)
            .unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.factors.get("A", Purpose::HBS, Mode::Walk), 0.3);
        assert_eq!(outcome.factors.get("A", Purpose::HBS, Mode::Bicycle), 0.0);
    }

    #[test]
    fn max_iterations_test() {
        // The simulated shares never change so the loop cannot converge.
        let observed = observed(0.8, 0.2);
        let calibration = CalibrationLoop::new(&observed, 3, 1e-6);
        let mut nb_runs = 0;
        let mut writer = csv::Writer::from_writer(Vec::new());
        let outcome = calibration
            .calibrate(
                CalibrationFactors::default(),
                |_| {
                    nb_runs += 1;
                    Ok(counts(50, 50))
                },
                Some(&mut writer),
            )
            .unwrap();
        assert_eq!(nb_runs, 3);
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 3);
        let walk = outcome.factors.get("A", Purpose::HBS, Mode::Walk);
        let expected = 3.0 * (0.5f64.ln() / 0.8f64.ln()).ln();
        assert!((walk - expected).abs() < 1e-12);
        let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let mut lines = output.lines();
        assert_eq!(
            lines.next(),
            Some("iteration,region,purpose,mode,observed_share,sim_share,k,trips")
        );
        // Two modes per iteration.
        assert_eq!(lines.count(), 6);
    }

    #[test]
    fn degenerate_share_does_not_converge_test() {
        // All the simulated trips walk: neither constant can be adjusted but the shares are
        // still far from the observed ones.
        let observed = observed(0.6, 0.4);
        let calibration = CalibrationLoop::new(&observed, 4, 1e-4);
        let mut nb_runs = 0;
        let outcome = calibration
            .calibrate(
                CalibrationFactors::default(),
                |_| {
                    nb_runs += 1;
                    Ok(counts(100, 0))
                },
                None::<&mut csv::Writer<Vec<u8>>>,
            )
            .unwrap();
        assert!(!outcome.converged);
        assert_eq!(nb_runs, 4);
        assert_eq!(outcome.iterations, 4);
        assert_eq!(outcome.max_adjustment, 0.0);
        assert_eq!(outcome.unadjustable, 2);
        assert_eq!(outcome.factors.len(), 0);
        // A share of one that matches the observed share is not a miss.
        let observed = observed_single(1.0);
        let calibration = CalibrationLoop::new(&observed, 4, 1e-4);
        let outcome = calibration
            .calibrate(
                CalibrationFactors::default(),
                |_| Ok(counts(100, 0)),
                None::<&mut csv::Writer<Vec<u8>>>,
            )
            .unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.unadjustable, 0);
    }

    fn observed_single(walk: f64) -> ObservedShares {
        let mut observed = ObservedShares::default();
        observed.insert("A", Purpose::HBS, Mode::Walk, walk).unwrap();
        observed
    }

    #[test]
    fn convergence_test() {
        // A simple model where the walk share is a logistic function of the walk constant.
        let observed = observed(0.7, 0.3);
        let calibration = CalibrationLoop::new(&observed, 100, 1e-4);
        let outcome = calibration
            .calibrate(
                CalibrationFactors::default(),
                |factors| {
                    let du = factors.get("A", Purpose::HBS, Mode::Walk)
                        - factors.get("A", Purpose::HBS, Mode::Bicycle);
                    let p = 1.0 / (1.0 + (-du).exp());
                    let walk = (p * 10_000.0).round() as usize;
                    Ok(counts(walk, 10_000 - walk))
                },
                None::<&mut csv::Writer<Vec<u8>>>,
            )
            .unwrap();
        assert!(outcome.converged);
        assert!(outcome.iterations < 100);
    }

    #[test]
    fn factors_from_records_test() {
        let record = |iteration, k| CalibrationRecord {
            iteration,
            region: "A".to_owned(),
            purpose: Purpose::HBW,
            mode: Mode::Walk,
            observed_share: 0.1,
            sim_share: 0.2,
            k,
            trips: 10,
        };
        let factors = CalibrationFactors::from_records(&[record(1, 0.5), record(2, 0.7)]);
        assert_eq!(factors.get("A", Purpose::HBW, Mode::Walk), 0.7);
        assert_eq!(factors.len(), 1);
        assert_eq!(
            factors.to_vec(),
            vec![("A".to_owned(), Purpose::HBW, Mode::Walk, 0.7)]
        );
    }

    #[test]
    fn invalid_observed_share_test() {
        let mut observed = ObservedShares::default();
        assert!(observed.insert("A", Purpose::HBW, Mode::Walk, 1.5).is_err());
        assert!(observed.insert("A", Purpose::HBW, Mode::Walk, f64::NAN).is_err());
    }
}
