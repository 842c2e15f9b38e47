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

//! Modes of transportation and sets of permitted modes.
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Mode of transportation used for a trip.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize, JsonSchema,
)]
pub enum Mode {
    AutoDriver,
    AutoPassenger,
    PublicTransport,
    Bicycle,
    Walk,
}

impl Mode {
    /// Number of modes.
    pub const COUNT: usize = 5;

    /// All the modes.
    pub const ALL: [Mode; Self::COUNT] = [
        Self::AutoDriver,
        Self::AutoPassenger,
        Self::PublicTransport,
        Self::Bicycle,
        Self::Walk,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AutoDriver => "AutoDriver",
            Self::AutoPassenger => "AutoPassenger",
            Self::PublicTransport => "PublicTransport",
            Self::Bicycle => "Bicycle",
            Self::Walk => "Walk",
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Name of the covariate indicating that the dominant commute mode of a person is this mode.
    pub(crate) const fn commute_covariate(self) -> &'static str {
        match self {
            Self::AutoDriver => "p_commute_auto_driver",
            Self::AutoPassenger => "p_commute_auto_passenger",
            Self::PublicTransport => "p_commute_public_transport",
            Self::Bicycle => "p_commute_bicycle",
            Self::Walk => "p_commute_walk",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("Unknown mode: `{s}`"))
    }
}

/// A set of [modes](Mode).
///
/// The modes are always iterated over in the order of [Mode::ALL].
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ModeSet(u8);

impl ModeSet {
    /// The set with no mode.
    pub const EMPTY: ModeSet = ModeSet(0);
    /// The set with all the modes.
    pub const ALL: ModeSet = ModeSet((1 << Mode::COUNT) - 1);

    /// Creates a set from a slice of modes.
    pub fn from_modes(modes: &[Mode]) -> Self {
        modes.iter().copied().collect()
    }

    pub fn contains(self, mode: Mode) -> bool {
        self.0 & mode.bit() != 0
    }

    pub fn insert(&mut self, mode: Mode) {
        self.0 |= mode.bit();
    }

    pub fn remove(&mut self, mode: Mode) {
        self.0 &= !mode.bit();
    }

    /// Returns the set without the given mode.
    pub fn without(mut self, mode: Mode) -> Self {
        self.remove(mode);
        self
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns an iterator over the modes of the set.
    pub fn iter(self) -> impl Iterator<Item = Mode> {
        Mode::ALL.into_iter().filter(move |&m| self.contains(m))
    }
}

impl FromIterator<Mode> for ModeSet {
    fn from_iter<I: IntoIterator<Item = Mode>>(iter: I) -> Self {
        let mut set = ModeSet::EMPTY;
        for mode in iter {
            set.insert(mode);
        }
        set
    }
}

impl fmt::Debug for ModeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Subset of modes available to a person, from a closed list of restriction policies.
///
/// The modes are grouped in four groups: Auto (driver and passenger), Pt (public transport),
/// Cycle and Walk. There is one policy for each non-empty combination of groups.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize, JsonSchema,
)]
pub enum ModeRestriction {
    Auto,
    AutoPt,
    AutoCycle,
    AutoWalk,
    AutoPtCycle,
    AutoPtWalk,
    AutoCycleWalk,
    AutoPtCycleWalk,
    Pt,
    PtCycle,
    PtWalk,
    PtCycleWalk,
    Cycle,
    CycleWalk,
    Walk,
}

impl ModeRestriction {
    /// All the restriction policies.
    pub const ALL: [ModeRestriction; 15] = [
        Self::Auto,
        Self::AutoPt,
        Self::AutoCycle,
        Self::AutoWalk,
        Self::AutoPtCycle,
        Self::AutoPtWalk,
        Self::AutoCycleWalk,
        Self::AutoPtCycleWalk,
        Self::Pt,
        Self::PtCycle,
        Self::PtWalk,
        Self::PtCycleWalk,
        Self::Cycle,
        Self::CycleWalk,
        Self::Walk,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "Auto",
            Self::AutoPt => "AutoPt",
            Self::AutoCycle => "AutoCycle",
            Self::AutoWalk => "AutoWalk",
            Self::AutoPtCycle => "AutoPtCycle",
            Self::AutoPtWalk => "AutoPtWalk",
            Self::AutoCycleWalk => "AutoCycleWalk",
            Self::AutoPtCycleWalk => "AutoPtCycleWalk",
            Self::Pt => "Pt",
            Self::PtCycle => "PtCycle",
            Self::PtWalk => "PtWalk",
            Self::PtCycleWalk => "PtCycleWalk",
            Self::Cycle => "Cycle",
            Self::CycleWalk => "CycleWalk",
            Self::Walk => "Walk",
        }
    }

    /// Returns the groups allowed by the policy, as `(auto, pt, cycle, walk)`.
    const fn groups(self) -> (bool, bool, bool, bool) {
        match self {
            Self::Auto => (true, false, false, false),
            Self::AutoPt => (true, true, false, false),
            Self::AutoCycle => (true, false, true, false),
            Self::AutoWalk => (true, false, false, true),
            Self::AutoPtCycle => (true, true, true, false),
            Self::AutoPtWalk => (true, true, false, true),
            Self::AutoCycleWalk => (true, false, true, true),
            Self::AutoPtCycleWalk => (true, true, true, true),
            Self::Pt => (false, true, false, false),
            Self::PtCycle => (false, true, true, false),
            Self::PtWalk => (false, true, false, true),
            Self::PtCycleWalk => (false, true, true, true),
            Self::Cycle => (false, false, true, false),
            Self::CycleWalk => (false, false, true, true),
            Self::Walk => (false, false, false, true),
        }
    }

    /// Returns the set of modes permitted by the policy.
    pub fn modes(self) -> ModeSet {
        let (auto, pt, cycle, walk) = self.groups();
        let mut set = ModeSet::EMPTY;
        if auto {
            set.insert(Mode::AutoDriver);
            set.insert(Mode::AutoPassenger);
        }
        if pt {
            set.insert(Mode::PublicTransport);
        }
        if cycle {
            set.insert(Mode::Bicycle);
        }
        if walk {
            set.insert(Mode::Walk);
        }
        set
    }
}

impl fmt::Display for ModeRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModeRestriction {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("Unknown mode restriction: `{s}`"))
    }
}

#[cfg(test)]
mod tests {
    use hashbrown::HashSet;

    use super::*;

    #[test]
    fn mode_set_test() {
        let mut set = ModeSet::from_modes(&[Mode::Walk, Mode::AutoDriver]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(Mode::Walk));
        assert!(!set.contains(Mode::Bicycle));
        // Iteration follows the canonical order.
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![Mode::AutoDriver, Mode::Walk]
        );
        set.remove(Mode::AutoDriver);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Mode::Walk]);
        assert_eq!(ModeSet::ALL.len(), Mode::COUNT);
        assert!(ModeSet::EMPTY.is_empty());
        assert_eq!(ModeSet::ALL.without(Mode::Bicycle).len(), Mode::COUNT - 1);
    }

    #[test]
    fn mode_restriction_test() {
        // All the policies are distinct and non-empty.
        let sets: HashSet<ModeSet> = ModeRestriction::ALL.iter().map(|r| r.modes()).collect();
        assert_eq!(sets.len(), ModeRestriction::ALL.len());
        assert!(sets.iter().all(|s| !s.is_empty()));
        assert_eq!(
            ModeRestriction::CycleWalk.modes(),
            ModeSet::from_modes(&[Mode::Bicycle, Mode::Walk])
        );
        assert_eq!(ModeRestriction::AutoPtCycleWalk.modes(), ModeSet::ALL);
        assert_eq!(
            "autopt".parse::<ModeRestriction>().unwrap(),
            ModeRestriction::AutoPt
        );
    }
}
