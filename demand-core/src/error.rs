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

//! Errors that callers may need to tell apart from other failures.
use thiserror::Error;

use crate::population::{Purpose, ZoneId};

/// An error caused by invalid input data or parameters.
///
/// These errors must halt the run: they are never caught and ignored.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigurationError {
    /// A coefficient is missing from a coefficient table.
    #[error("Missing coefficient `{variable}` for alternative `{alternative}` in table `{table}`")]
    MissingCoefficient {
        table: String,
        alternative: String,
        variable: String,
    },
    /// An alternative has no column in a coefficient table.
    #[error("Missing alternative `{alternative}` in table `{table}`")]
    MissingAlternative { table: String, alternative: String },
    /// A coefficient value is NaN or infinite.
    #[error("Invalid value {value} for coefficient `{variable}` of alternative `{alternative}` in table `{table}`")]
    InvalidCoefficient {
        table: String,
        alternative: String,
        variable: String,
        value: f64,
    },
    /// A computed utility is NaN or infinite.
    #[error("Non-finite utility {value} for {context}")]
    NonFiniteUtility { context: String, value: f64 },
    /// A zone attraction is negative, NaN or infinite.
    #[error("Invalid attraction {value} for purpose {purpose} in zone {zone}")]
    InvalidAttraction {
        purpose: Purpose,
        zone: ZoneId,
        value: f64,
    },
    /// A purpose has trips but no coefficient table.
    #[error("No {model} coefficients for purpose {purpose}")]
    MissingTable { model: String, purpose: Purpose },
    /// A monetary cost cannot be converted into minutes.
    #[error("No value of time for purpose {purpose} and economic status {economic_status}")]
    MissingValueOfTime { purpose: Purpose, economic_status: u8 },
    /// A skim matrix has no value for a pair of zones.
    #[error("No {skim} from zone {origin} to zone {destination}")]
    MissingSkimValue {
        skim: String,
        origin: ZoneId,
        destination: ZoneId,
    },
    /// No destination-utility matrix was built for a purpose.
    #[error("No destination utilities for purpose {purpose}")]
    MissingMatrix { purpose: Purpose },
    /// A zone is referenced but does not exist.
    #[error("Unknown zone {zone} ({context})")]
    UnknownZone { zone: ZoneId, context: String },
}
