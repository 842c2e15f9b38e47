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

//! Progress bar and spinner for the choice models.
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::{log_enabled, Level};

/// Progress bars are refreshed each UPDATE events.
const UPDATE: u64 = 1000;
/// Interval in milliseconds when spinners are automatically ticked.
const UPDATE_MS: Duration = Duration::from_millis(1000);

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// A progress bar shared by the worker threads.
///
/// The bar is hidden when the `Info` logging level is disabled.
#[derive(Debug, Clone)]
pub struct ChoiceProgressBar {
    bp: ProgressBar,
    current: Arc<AtomicU64>,
}

impl ChoiceProgressBar {
    /// Returns a [ChoiceProgressBar] of given length.
    pub fn new(length: usize) -> Self {
        let bp = if log_enabled!(Level::Info) {
            ProgressBar::new(length as u64)
        } else {
            ProgressBar::hidden()
        };
        bp.set_style(bar_style("{bar:60} ETA: {eta}"));
        ChoiceProgressBar {
            bp,
            current: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Adds a message to the [ChoiceProgressBar].
    pub fn with_message(self, msg: impl Into<Cow<'static, str>>) -> Self {
        let bp = self.bp.with_message(msg);
        bp.set_style(bar_style("{bar:40} {msg} ({eta})"));
        Self {
            bp,
            current: self.current,
        }
    }

    /// Increments the progress bar by one.
    ///
    /// The bar is refreshed only periodically.
    pub fn inc(&self) {
        let current = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        if current % UPDATE == 0 {
            self.bp.inc(UPDATE);
        }
    }

    /// Returns the number of increments so far.
    pub fn position(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    /// Sets the progress bar to finished.
    pub fn finish(&self) {
        self.bp.finish_and_clear();
    }
}

/// A spinner.
#[derive(Debug)]
pub struct Spinner(ProgressBar);

impl Spinner {
    /// Starts a [Spinner] with the given message.
    pub fn new(msg: &str) -> Self {
        let bp = if log_enabled!(Level::Info) {
            ProgressBar::new(1).with_message(msg.to_owned())
        } else {
            ProgressBar::hidden()
        };
        bp.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bp.enable_steady_tick(UPDATE_MS);
        Spinner(bp)
    }

    /// Sets the spinner to finished.
    pub fn finish(&mut self) {
        self.0.finish_and_clear();
    }
}
