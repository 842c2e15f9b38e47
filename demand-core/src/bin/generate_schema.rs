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

//! Binary to generate the JSON Schemas of the input files.
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use demand_core::parameters::Parameters;
use demand_core::population::Household;
use log::{info, LevelFilter};
use schemars::gen::SchemaSettings;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

/// Generate the JSON Schemas for the input files of Demand-Core
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// The directory where the JSON Schemas should be stored
    path: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logging")?;

    info!("Generating JSON Schemas");
    let settings = SchemaSettings::draft07().with(|s| {
        s.option_nullable = true;
        s.option_add_null_type = false;
    });
    let gen = settings.into_generator();

    // Population.
    let schema = gen.clone().into_root_schema_for::<Vec<Household>>();
    let filename = args.path.join("schema-population.json");
    let mut file = File::create(filename)?;
    write!(file, "{}", serde_json::to_string_pretty(&schema)?)?;

    // Parameters.
    let schema = gen.into_root_schema_for::<Parameters>();
    let filename = args.path.join("schema-parameters.json");
    let mut file = File::create(filename)?;
    write!(file, "{}", serde_json::to_string_pretty(&schema)?)?;

    info!("Done");

    Ok(())
}
