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

//! Choice models applied to the whole population.
//!
//! Each model runs over contiguous partitions of the households and returns its [Diagnostics],
//! which are merged by the caller.
pub mod distribution;
pub mod mode_choice;
pub mod mode_restriction;

use std::collections::BTreeMap;
use std::iter::Sum;
use std::ops::AddAssign;

use hashbrown::HashMap;
use itertools::Itertools;
use log::{info, warn};

use crate::population::{Mode, Purpose};

/// Counters of the events of a phase which are not errors but deserve to be reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Trips whose destination could not be drawn.
    pub unresolved_destinations: usize,
    /// Trips whose mode could not be drawn.
    pub unresolved_modes: usize,
    /// Persons whose mode restriction could not be drawn.
    pub unresolved_restrictions: usize,
    /// Non-home-based trips whose origin was drawn at random.
    pub fallback_origins: usize,
    /// Trips whose destination is the occupation zone of the person.
    pub fixed_destinations: usize,
    /// Trips not processed because they are already assigned or lack an origin or destination.
    pub skipped_trips: usize,
    /// Partitions whose task failed (only with a tolerant failure policy).
    pub failed_partitions: usize,
}

impl AddAssign for Diagnostics {
    fn add_assign(&mut self, other: Self) {
        self.unresolved_destinations += other.unresolved_destinations;
        self.unresolved_modes += other.unresolved_modes;
        self.unresolved_restrictions += other.unresolved_restrictions;
        self.fallback_origins += other.fallback_origins;
        self.fixed_destinations += other.fixed_destinations;
        self.skipped_trips += other.skipped_trips;
        self.failed_partitions += other.failed_partitions;
    }
}

impl Sum for Diagnostics {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Diagnostics::default(), |mut acc, d| {
            acc += d;
            acc
        })
    }
}

impl Diagnostics {
    /// Logs the non-zero counters.
    pub fn log(&self, phase: &str) {
        let counters = [
            ("unresolved destinations", self.unresolved_destinations),
            ("unresolved modes", self.unresolved_modes),
            ("unresolved mode restrictions", self.unresolved_restrictions),
            ("fallback origins", self.fallback_origins),
            ("fixed destinations", self.fixed_destinations),
            ("skipped trips", self.skipped_trips),
        ];
        for (name, count) in counters {
            if count > 0 {
                info!("{phase}: {count} {name}");
            }
        }
        if self.failed_partitions > 0 {
            warn!("{phase}: {} failed partitions", self.failed_partitions);
        }
    }
}

/// Number of trips by region, purpose and mode.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModeCounts {
    counts: HashMap<String, HashMap<(Purpose, Mode), usize>>,
}

impl ModeCounts {
    pub fn add(&mut self, region: &str, purpose: Purpose, mode: Mode) {
        self.add_n(region, purpose, mode, 1);
    }

    fn add_n(&mut self, region: &str, purpose: Purpose, mode: Mode, n: usize) {
        if let Some(region_counts) = self.counts.get_mut(region) {
            *region_counts.entry((purpose, mode)).or_insert(0) += n;
        } else {
            let mut region_counts = HashMap::new();
            region_counts.insert((purpose, mode), n);
            self.counts.insert(region.to_owned(), region_counts);
        }
    }

    /// Adds the counts of another [ModeCounts].
    pub fn merge(&mut self, other: &ModeCounts) {
        for (region, region_counts) in other.counts.iter() {
            for (&(purpose, mode), &n) in region_counts.iter() {
                self.add_n(region, purpose, mode, n);
            }
        }
    }

    pub fn count(&self, region: &str, purpose: Purpose, mode: Mode) -> usize {
        self.counts
            .get(region)
            .and_then(|c| c.get(&(purpose, mode)))
            .copied()
            .unwrap_or(0)
    }

    /// Returns the total number of trips of a region and purpose.
    pub fn total(&self, region: &str, purpose: Purpose) -> usize {
        self.counts
            .get(region)
            .map(|c| {
                c.iter()
                    .filter(|((p, _), _)| *p == purpose)
                    .map(|(_, n)| n)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Returns the share of a mode among the trips of a region and purpose (`None` if there is
    /// no trip).
    pub fn share(&self, region: &str, purpose: Purpose, mode: Mode) -> Option<f64> {
        match self.total(region, purpose) {
            0 => None,
            total => Some(self.count(region, purpose, mode) as f64 / total as f64),
        }
    }

    /// Returns the regions with at least one trip, in alphabetical order.
    pub fn regions(&self) -> Vec<&str> {
        self.counts.keys().map(String::as_str).sorted_unstable().collect()
    }

    /// Returns the number of trips by purpose and mode, over all regions.
    pub fn by_purpose(&self) -> BTreeMap<Purpose, BTreeMap<Mode, usize>> {
        let mut result: BTreeMap<Purpose, BTreeMap<Mode, usize>> = BTreeMap::new();
        for region_counts in self.counts.values() {
            for (&(purpose, mode), &n) in region_counts.iter() {
                *result.entry(purpose).or_default().entry(mode).or_insert(0) += n;
            }
        }
        result
    }

    /// Total number of trips.
    pub fn grand_total(&self) -> usize {
        self.counts.values().flat_map(|c| c.values()).sum()
    }

    /// Logs the mode shares by purpose.
    pub fn log_summary(&self) {
        info!("Mode shares ({} trips):", self.grand_total());
        for (purpose, counts) in self.by_purpose() {
            let total: usize = counts.values().sum();
            let shares = counts
                .iter()
                .map(|(mode, &n)| format!("{mode}: {:.1}%", 100.0 * n as f64 / total as f64))
                .join(", ");
            info!("  {purpose} ({total} trips): {shares}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_sum_test() {
        let a = Diagnostics {
            unresolved_modes: 2,
            fallback_origins: 1,
            ..Default::default()
        };
        let b = Diagnostics {
            unresolved_modes: 1,
            skipped_trips: 4,
            ..Default::default()
        };
        let total: Diagnostics = vec![a, b].into_iter().sum();
        assert_eq!(total.unresolved_modes, 3);
        assert_eq!(total.fallback_origins, 1);
        assert_eq!(total.skipped_trips, 4);
    }

    #[test]
    fn mode_counts_test() {
        let mut counts = ModeCounts::default();
        counts.add("north", Purpose::HBW, Mode::Walk);
        counts.add("north", Purpose::HBW, Mode::Bicycle);
        counts.add("north", Purpose::HBW, Mode::Walk);
        counts.add("south", Purpose::HBW, Mode::Walk);
        let mut other = ModeCounts::default();
        other.add("north", Purpose::HBW, Mode::Walk);
        counts.merge(&other);
        assert_eq!(counts.count("north", Purpose::HBW, Mode::Walk), 3);
        assert_eq!(counts.total("north", Purpose::HBW), 4);
        assert_eq!(counts.share("north", Purpose::HBW, Mode::Bicycle), Some(0.25));
        assert_eq!(counts.share("north", Purpose::HBS, Mode::Walk), None);
        assert_eq!(counts.regions(), vec!["north", "south"]);
        assert_eq!(counts.by_purpose()[&Purpose::HBW][&Mode::Walk], 4);
        assert_eq!(counts.grand_total(), 5);
    }
}
