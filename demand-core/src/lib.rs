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

//! Demand-Core: destination and mode choice for synthetic travel demand.
//!
//! The models are applied to a synthetic population of households, persons and trips:
//!
//! 1. (optional) choice of a mode restriction for each person,
//! 2. destination choice, purpose by purpose, with Gompertz-type destination utilities,
//! 3. mode choice (multinomial or nested logit), optionally calibrated against observed mode
//!    shares.
//!
//! All the random draws are reproducible given the random seed and the number of partitions.
#![doc(html_no_source)]

pub mod calibration;
pub mod coefficients;
pub mod destination;
pub mod error;
pub mod executor;
pub mod io;
pub mod logging;
pub mod models;
pub mod parameters;
pub mod pipeline;
pub mod population;
pub mod progress_bar;
pub mod travel_times;
pub mod utility;

use std::env;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
// Dependencies only used in the bins.
use clap as _;
use log::{error, info, log_enabled};

use crate::pipeline::DemandModel;

/// Reads the input files, runs the demand model and stores the results to the output directory.
///
/// This function takes as argument the path to the `parameters.json` file.
pub fn run_model(path: &Path) -> Result<()> {
    let res = run_model_imp(path, None::<std::io::Empty>);
    if let Err(err) = res {
        if log_enabled!(log::Level::Error) {
            // Use the `error` macro so that the error is logged to all the loggers.
            error!("{err:?}");
            Ok(())
        } else {
            Err(anyhow!(err))
        }
    } else {
        Ok(())
    }
}

/// Reads the input files, runs the demand model and stores the results to the output directory.
///
/// This function takes as argument the path to the `parameters.json` file and a writer for the
/// logs.
pub fn run_model_with_writer<W: std::io::Write + Send + 'static>(
    path: &Path,
    writer: W,
) -> Result<()> {
    let res = run_model_imp(path, Some(writer));
    if let Err(err) = res {
        if log_enabled!(log::Level::Error) {
            error!("{err:?}");
            Ok(())
        } else {
            Err(anyhow!(err))
        }
    } else {
        Ok(())
    }
}

fn run_model_imp<W: std::io::Write + Send + 'static>(path: &Path, writer: Option<W>) -> Result<()> {
    println!(
        "
        Demand-Core v{}
        Copyright (C) 2022-2025 André de Palma, Lucas Javaudin
        This program comes with ABSOLUTELY NO WARRANTY.
        This is free software, and you are welcome to redistribute it
        under certain conditions; see `https://www.gnu.org/licenses/' for details.
        ",
        env!("CARGO_PKG_VERSION")
    );
    let parameters = io::json::get_parameters_from_json(path)?;
    parameters.check_validity()?;

    // Set the working directory to the directory of the `parameters.json` file so that the input
    // paths can be interpreted as being relative to this file.
    if let Some(parent_dir) = path.parent() {
        if parent_dir.to_str().map(|s| !s.is_empty()).unwrap_or(true) {
            env::set_current_dir(parent_dir)
                .with_context(|| format!("Failed to set working directory to `{parent_dir:?}`"))?;
        }
    }

    let output_dir = parameters.output_directory.as_path();
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory `{output_dir:?}`"))?;

    logging::initialize_logging(output_dir, writer)?;

    let speeds = parameters
        .mode_choice
        .speeds
        .iter()
        .map(|(&mode, &speed)| (mode, speed))
        .collect();
    let input = io::read_input_data(&parameters.input_files, speeds)?;
    info!("Reading population");
    let mut population = io::json::read_population(&parameters.input_files.population)?;
    info!(
        "{} households, {} persons, {} trips",
        population.nb_households(),
        population.nb_persons(),
        population.nb_trips()
    );
    let model = DemandModel::new(&parameters, input)?;

    let mut calibration_writer = if model.calibration.is_some() {
        Some(io::csv::calibration_writer(&output_dir.join("calibration.csv"))?)
    } else {
        None
    };
    let results = model.run(&mut population, calibration_writer.as_mut())?;
    if let Some(outcome) = results.calibration.as_ref() {
        info!(
            "Calibration: {} iterations, converged: {}, largest adjustment: {:.6}, \
            unadjustable shares: {}",
            outcome.iterations, outcome.converged, outcome.max_adjustment, outcome.unadjustable
        );
    }

    logging::log_warning_summary();

    info!("Saving results");
    io::csv::write_trips(&population, &output_dir.join("trips.csv"))?;
    io::json::write_json(&results.running_times, output_dir, "running_times")?;
    io::json::write_json(results.mode_counts.by_purpose(), output_dir, "mode_counts")?;
    info!("Done");
    Ok(())
}
