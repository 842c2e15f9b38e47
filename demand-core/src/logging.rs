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

//! Log output of a run and rate-limited warnings.
//!
//! Warnings which can be raised once per trip or per share (e.g., a missing departure time) go
//! through [send_warning]: every occurrence is counted but only the first few are written.
//! [log_warning_summary] reports the occurrences that were not written.
use std::fs::File;
use std::path::Path;
use std::sync::{LazyLock, Mutex, PoisonError};

use anyhow::{Context, Result};
use hashbrown::HashMap;
use log::{info, warn, LevelFilter};
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    ThreadLogMode, WriteLogger,
};

/// Number of occurrences of each warning type since the start of the process.
static WARNING_COUNTS: LazyLock<Mutex<HashMap<WarningType, usize>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Warnings that can be raised many times during a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum WarningType {
    /// A calibration adjustment could not be computed.
    CalibrationAdjustment,
    /// A trip has no departure time and the default one is used.
    DefaultDeparture,
    /// An observed share has no matching simulated trips.
    UnmatchedObservedShare,
}

impl WarningType {
    const ALL: [WarningType; 3] = [
        WarningType::CalibrationAdjustment,
        WarningType::DefaultDeparture,
        WarningType::UnmatchedObservedShare,
    ];

    /// Number of occurrences written to the log.
    const fn limit(self) -> usize {
        match self {
            WarningType::CalibrationAdjustment => 3,
            WarningType::DefaultDeparture => 1,
            WarningType::UnmatchedObservedShare => 5,
        }
    }

    const fn description(self) -> &'static str {
        match self {
            WarningType::CalibrationAdjustment => "calibration adjustments not computed",
            WarningType::DefaultDeparture => "trips with the default departure time",
            WarningType::UnmatchedObservedShare => "observed shares without simulated trips",
        }
    }
}

/// Counts one occurrence of a warning and returns `true` if it must be written.
fn record_occurrence(counts: &mut HashMap<WarningType, usize>, warn_type: WarningType) -> bool {
    let count = counts.entry(warn_type).or_insert(0);
    *count += 1;
    *count <= warn_type.limit()
}

/// Counts one occurrence of a warning and writes it if the limit of its type is not reached.
///
/// The message is only built when it is written.
pub(crate) fn send_warning(warn_type: WarningType, message: impl FnOnce() -> String) {
    let must_write = {
        let mut counts = WARNING_COUNTS
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        record_occurrence(&mut counts, warn_type)
    };
    if must_write {
        warn!("{}", message());
    }
}

fn warning_count(warn_type: WarningType) -> usize {
    WARNING_COUNTS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&warn_type)
        .copied()
        .unwrap_or(0)
}

/// Logs the number of warnings that were counted but not written.
pub fn log_warning_summary() {
    for warn_type in WarningType::ALL {
        let count = warning_count(warn_type);
        if count > warn_type.limit() {
            info!(
                "{count} {} ({} not logged)",
                warn_type.description(),
                count - warn_type.limit()
            );
        }
    }
}

/// Initializes logging to the terminal and to the `log.txt` file of the output directory.
///
/// Debug messages are only written to the file, with the name of the worker thread which sent
/// them. Info messages are also written to `maybe_writer`, if any.
pub fn initialize_logging<W: std::io::Write + Send + 'static>(
    output: &Path,
    maybe_writer: Option<W>,
) -> Result<()> {
    let log_filename = output.join("log.txt");
    let log_file = File::create(&log_filename)
        .with_context(|| format!("Failed to create log file `{log_filename:?}`"))?;
    let file_config = ConfigBuilder::new()
        .set_thread_level(LevelFilter::Debug)
        .set_thread_mode(ThreadLogMode::Names)
        .build();
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Debug, file_config, log_file),
    ];
    if let Some(writer) = maybe_writer {
        loggers.push(WriteLogger::new(LevelFilter::Info, Config::default(), writer));
    }
    CombinedLogger::init(loggers).context("Failed to initialize logging")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_occurrence_test() {
        let mut counts = HashMap::new();
        let limit = WarningType::UnmatchedObservedShare.limit();
        let written = (0..limit + 3)
            .filter(|_| record_occurrence(&mut counts, WarningType::UnmatchedObservedShare))
            .count();
        assert_eq!(written, limit);
        assert_eq!(counts[&WarningType::UnmatchedObservedShare], limit + 3);
        assert!(record_occurrence(&mut counts, WarningType::DefaultDeparture));
        assert!(!record_occurrence(&mut counts, WarningType::DefaultDeparture));
    }

    #[test]
    fn send_warning_test() {
        // Other tests may send warnings concurrently: the count can only grow.
        let before = warning_count(WarningType::CalibrationAdjustment);
        let mut built = 0;
        for _ in 0..10 {
            send_warning(WarningType::CalibrationAdjustment, || {
                built += 1;
                "test warning".to_owned()
            });
        }
        assert!(warning_count(WarningType::CalibrationAdjustment) >= before + 10);
        assert!(built <= WarningType::CalibrationAdjustment.limit());
    }
}
