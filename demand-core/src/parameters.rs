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

//! Parameters of a run, read from a JSON file.
use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use choice::{ChoiceModel, Nest, NestingStructure};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::destination::GompertzParameters;
use crate::executor::FailurePolicy;
use crate::population::{CarOwnership, Mode, Purpose};

const fn default_nb_partitions() -> usize {
    16
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("output")
}

const fn default_departure_minutes() -> f64 {
    480.0
}

const fn default_max_iterations() -> u32 {
    10
}

const fn default_tolerance() -> f64 {
    0.01
}

fn default_speeds() -> BTreeMap<Mode, f64> {
    [
        (Mode::AutoDriver, 40.0),
        (Mode::AutoPassenger, 40.0),
        (Mode::PublicTransport, 20.0),
        (Mode::Bicycle, 15.0),
        (Mode::Walk, 5.0),
    ]
    .into_iter()
    .collect()
}

/// Paths to the input files.
///
/// Relative paths are interpreted relative to the directory of the parameters file.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct InputFiles {
    /// CSV file with the zones.
    pub zones: PathBuf,
    /// JSON file (optionally zstd-compressed) with the households, persons and trips.
    pub population: PathBuf,
    /// CSV skim file with the travel distances (in kilometers) between zones.
    pub distances: PathBuf,
    /// CSV skim files with the travel times (in minutes) between zones, by mode.
    ///
    /// Modes without a file use the travel distance and the mode's speed.
    #[serde(default)]
    pub travel_times: BTreeMap<Mode, PathBuf>,
    /// CSV files with the coefficients of the mode-choice models, by purpose.
    pub mode_choice_coefficients: BTreeMap<Purpose, PathBuf>,
    /// CSV file with the coefficients of the mode-restriction model.
    #[serde(default)]
    pub mode_restriction_coefficients: Option<PathBuf>,
    /// CSV file with the observed mode shares, used for calibration.
    #[serde(default)]
    pub observed_shares: Option<PathBuf>,
    /// Calibration output (`calibration.csv`) of a previous run, whose factors are applied.
    #[serde(default)]
    pub calibration_factors: Option<PathBuf>,
}

/// Parameters of the destination choice for one purpose.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct PurposeDistributionParameters {
    pub impedance: f64,
    pub distance: f64,
    /// Parameters specific to some car-ownership segments.
    #[serde(default)]
    pub car_ownership: BTreeMap<CarOwnership, GompertzParameters>,
}

impl PurposeDistributionParameters {
    /// Returns the parameters used for the households of no specific segment.
    pub fn base(&self) -> GompertzParameters {
        GompertzParameters {
            impedance: self.impedance,
            distance: self.distance,
        }
    }
}

/// Parameters of the mode-choice model.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct ModeChoiceParameters {
    /// Nesting structure of the modes, by purpose.
    ///
    /// Purposes without nests use a multinomial logit.
    #[serde(default)]
    pub nests: BTreeMap<Purpose, Vec<Nest<Mode>>>,
    /// Monetary cost per kilometer, by mode.
    #[serde(default)]
    pub cost_per_km: BTreeMap<Mode, f64>,
    /// Value of time (money per minute), by purpose, for economic status 1 to 4.
    #[serde(default)]
    pub value_of_time: BTreeMap<Purpose, [f64; 4]>,
    /// Departure time (minutes after midnight) of the trips without one.
    #[serde(default = "default_departure_minutes")]
    pub default_departure_minutes: f64,
    /// Speed (km/h) of the modes without travel-time file.
    #[serde(default = "default_speeds")]
    pub speeds: BTreeMap<Mode, f64>,
}

impl Default for ModeChoiceParameters {
    fn default() -> Self {
        Self {
            nests: BTreeMap::new(),
            cost_per_km: BTreeMap::new(),
            value_of_time: BTreeMap::new(),
            default_departure_minutes: default_departure_minutes(),
            speeds: default_speeds(),
        }
    }
}

impl ModeChoiceParameters {
    /// Returns the choice model of a purpose.
    pub fn choice_model(&self, purpose: Purpose) -> Result<ChoiceModel<Mode>> {
        match self.nests.get(&purpose) {
            Some(nests) if !nests.is_empty() => Ok(ChoiceModel::Nested(
                NestingStructure::new(nests.clone())
                    .with_context(|| format!("Invalid nests for purpose {purpose}"))?,
            )),
            _ => Ok(ChoiceModel::Multinomial),
        }
    }
}

/// Parameters of the mode-restriction model.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct ModeRestrictionParameters {
    /// If `true`, a mode restriction is chosen for all the persons before mode choice.
    #[serde(default)]
    pub enabled: bool,
}

/// Parameters of the calibration of the mode-choice constants.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct CalibrationParameters {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// The calibration stops when all adjustments are smaller than this value.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for CalibrationParameters {
    fn default() -> Self {
        Self {
            enabled: false,
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

/// Set of parameters of a run.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct Parameters {
    pub input_files: InputFiles,
    /// Directory where the output files are written.
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
    /// Seed of the master random-number generator.
    ///
    /// When not set, a random seed is used (and logged).
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Number of worker threads (0 for one per core).
    #[serde(default)]
    pub nb_threads: usize,
    /// Number of partitions of the households.
    ///
    /// Results are reproducible for a given seed and number of partitions.
    #[serde(default = "default_nb_partitions")]
    pub nb_partitions: usize,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Parameters of the destination choice, by purpose.
    pub distribution: BTreeMap<Purpose, PurposeDistributionParameters>,
    #[serde(default)]
    pub mode_choice: ModeChoiceParameters,
    #[serde(default)]
    pub mode_restriction: ModeRestrictionParameters,
    #[serde(default)]
    pub calibration: CalibrationParameters,
}

fn check_gompertz(parameters: GompertzParameters, what: &str) -> Result<()> {
    if !parameters.impedance.is_finite() || !parameters.distance.is_finite() {
        bail!("Invalid distribution parameters for {what}: {parameters:?}");
    }
    Ok(())
}

impl Parameters {
    /// Returns an error if some parameters are invalid.
    pub fn check_validity(&self) -> Result<()> {
        if self.nb_partitions == 0 {
            bail!("The number of partitions must be positive");
        }
        for (purpose, params) in self.distribution.iter() {
            check_gompertz(params.base(), &format!("purpose {purpose}"))?;
            for (segment, segment_params) in params.car_ownership.iter() {
                check_gompertz(
                    *segment_params,
                    &format!("purpose {purpose} and segment {segment:?}"),
                )?;
            }
        }
        let mc = &self.mode_choice;
        for purpose in mc.nests.keys() {
            mc.choice_model(*purpose)?;
        }
        for (mode, cost) in mc.cost_per_km.iter() {
            if !(cost.is_finite() && *cost >= 0.0) {
                bail!("Invalid cost per km for mode {mode}: {cost}");
            }
        }
        for (purpose, values) in mc.value_of_time.iter() {
            if let Some(v) = values.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
                bail!("Invalid value of time for purpose {purpose}: {v} (must be positive)");
            }
        }
        if let Some((mode, _)) = mc.cost_per_km.iter().find(|(_, cost)| **cost > 0.0) {
            for purpose in self.input_files.mode_choice_coefficients.keys() {
                if !mc.value_of_time.contains_key(purpose) {
                    bail!(
                        "Mode {mode} has a cost per km but purpose {purpose} has no value of time"
                    );
                }
            }
        }
        for (mode, speed) in mc.speeds.iter() {
            if !(speed.is_finite() && *speed > 0.0) {
                bail!("Invalid speed for mode {mode}: {speed}");
            }
        }
        if !(0.0..1440.0).contains(&mc.default_departure_minutes) {
            bail!(
                "Invalid default departure time: {} (must be between 0 and 1440)",
                mc.default_departure_minutes
            );
        }
        if self.mode_restriction.enabled && self.input_files.mode_restriction_coefficients.is_none()
        {
            bail!("Mode restriction is enabled but no coefficient file is given");
        }
        let cal = &self.calibration;
        if cal.enabled {
            if self.input_files.observed_shares.is_none() {
                bail!("Calibration is enabled but no observed-shares file is given");
            }
            if cal.max_iterations == 0 {
                bail!("The maximum number of calibration iterations must be positive");
            }
            if !(cal.tolerance.is_finite() && cal.tolerance > 0.0) {
                bail!("Invalid calibration tolerance: {}", cal.tolerance);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"{
        "input_files": {
            "zones": "zones.csv",
            "population": "population.json",
            "distances": "distances.csv",
            "mode_choice_coefficients": {"HBW": "mc_hbw.csv"}
        },
        "random_seed": 13,
        "distribution": {
            "HBW": {"impedance": -1.5, "distance": -0.05, "car_ownership": {"NoCar": {"impedance": -2.0, "distance": -0.1}}}
        },
        "mode_choice": {
            "nests": {"HBW": [
                {"name": "auto", "alternatives": ["AutoDriver", "AutoPassenger"], "coefficient": 0.6},
                {"name": "other", "alternatives": ["PublicTransport", "Bicycle", "Walk"], "coefficient": 1.0}
            ]},
            "cost_per_km": {"AutoDriver": 0.25},
            "value_of_time": {"HBW": [0.1, 0.15, 0.2, 0.3]}
        }
    }"#;

    #[test]
    fn deserialize_test() {
        let params: Parameters = serde_json::from_str(JSON).unwrap();
        assert_eq!(params.random_seed, Some(13));
        assert_eq!(params.nb_partitions, 16);
        assert_eq!(params.failure_policy, FailurePolicy::FailFast);
        assert_eq!(params.output_directory, PathBuf::from("output"));
        assert_eq!(params.mode_choice.default_departure_minutes, 480.0);
        assert_eq!(params.mode_choice.speeds.len(), Mode::COUNT);
        let hbw = &params.distribution[&Purpose::HBW];
        assert_eq!(hbw.base().impedance, -1.5);
        assert_eq!(hbw.car_ownership[&CarOwnership::NoCar].distance, -0.1);
        assert!(matches!(
            params.mode_choice.choice_model(Purpose::HBW).unwrap(),
            ChoiceModel::Nested(_)
        ));
        assert!(matches!(
            params.mode_choice.choice_model(Purpose::HBS).unwrap(),
            ChoiceModel::Multinomial
        ));
        params.check_validity().unwrap();
    }

    #[test]
    fn invalid_parameters_test() {
        let params: Parameters = serde_json::from_str(JSON).unwrap();
        let mut p = params.clone();
        p.nb_partitions = 0;
        assert!(p.check_validity().is_err());
        let mut p = params.clone();
        p.mode_choice
            .value_of_time
            .insert(Purpose::HBS, [0.1, 0.0, 0.1, 0.1]);
        assert!(p.check_validity().is_err());
        let mut p = params.clone();
        p.mode_choice.nests.insert(
            Purpose::HBS,
            vec![Nest::new("bad", vec![Mode::Walk], 1.5)],
        );
        assert!(p.check_validity().is_err());
        let mut p = params.clone();
        p.calibration.enabled = true;
        assert!(p.check_validity().is_err());
        p.input_files.observed_shares = Some(PathBuf::from("shares.csv"));
        p.check_validity().unwrap();
        p.calibration.tolerance = 0.0;
        assert!(p.check_validity().is_err());
        let mut p = params.clone();
        p.mode_restriction.enabled = true;
        assert!(p.check_validity().is_err());
        // A priced mode requires a value of time for every purpose with mode-choice coefficients.
        let mut p = params;
        p.input_files
            .mode_choice_coefficients
            .insert(Purpose::HBS, PathBuf::from("mc_hbs.csv"));
        assert!(p.check_validity().is_err());
        p.mode_choice.cost_per_km.clear();
        p.check_validity().unwrap();
    }
}
