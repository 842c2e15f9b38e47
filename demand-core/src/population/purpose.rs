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

//! Trip purposes.
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Activity motivating a trip.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize, JsonSchema,
)]
pub enum Purpose {
    /// Home-based work.
    HBW,
    /// Home-based education.
    HBE,
    /// Home-based shopping.
    HBS,
    /// Home-based recreation.
    HBR,
    /// Home-based other.
    HBO,
    /// Non-home-based work.
    NHBW,
    /// Non-home-based other.
    NHBO,
}

impl Purpose {
    /// Number of purposes.
    pub const COUNT: usize = 7;

    /// All the purposes, home-based purposes first.
    pub const ALL: [Purpose; Self::COUNT] = [
        Self::HBW,
        Self::HBE,
        Self::HBS,
        Self::HBR,
        Self::HBO,
        Self::NHBW,
        Self::NHBO,
    ];

    /// Returns the position of the purpose in [Purpose::ALL].
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HBW => "HBW",
            Self::HBE => "HBE",
            Self::HBS => "HBS",
            Self::HBR => "HBR",
            Self::HBO => "HBO",
            Self::NHBW => "NHBW",
            Self::NHBO => "NHBO",
        }
    }

    /// Returns `true` if trips of this purpose start at home.
    pub const fn is_home_based(self) -> bool {
        !matches!(self, Self::NHBW | Self::NHBO)
    }

    /// Returns the purposes whose destinations are used as origins of non-home-based trips of
    /// this purpose.
    ///
    /// The slice is empty for home-based purposes.
    pub const fn origin_purposes(self) -> &'static [Purpose] {
        match self {
            Self::NHBW => &[Self::HBW],
            Self::NHBO => &[Self::HBE, Self::HBS, Self::HBR, Self::HBO],
            _ => &[],
        }
    }

    /// Name of the covariate for the square root of the number of trips of this purpose.
    pub(crate) const fn trips_sqrt_covariate(self) -> &'static str {
        match self {
            Self::HBW => "p_trips_hbw_sqrt",
            Self::HBE => "p_trips_hbe_sqrt",
            Self::HBS => "p_trips_hbs_sqrt",
            Self::HBR => "p_trips_hbr_sqrt",
            Self::HBO => "p_trips_hbo_sqrt",
            Self::NHBW => "p_trips_nhbw_sqrt",
            Self::NHBO => "p_trips_nhbo_sqrt",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Purpose {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("Unknown purpose: `{s}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purpose_order_test() {
        for (i, purpose) in Purpose::ALL.into_iter().enumerate() {
            assert_eq!(purpose.index(), i);
        }
        // Non-home-based purposes come after all the purposes they depend on.
        for purpose in Purpose::ALL {
            for dependency in purpose.origin_purposes() {
                assert!(dependency.index() < purpose.index());
                assert!(dependency.is_home_based());
            }
        }
    }

    #[test]
    fn purpose_from_str_test() {
        assert_eq!("HBS".parse::<Purpose>().unwrap(), Purpose::HBS);
        assert_eq!(" nhbo".parse::<Purpose>().unwrap(), Purpose::NHBO);
        assert!("shopping".parse::<Purpose>().is_err());
    }
}
