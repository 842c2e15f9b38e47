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

//! Traffic analysis zones.
use anyhow::{bail, Result};
use hashbrown::HashMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{Purpose, ZoneId};
use crate::error::ConfigurationError;

/// Classification of the area of a zone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum AreaType {
    #[default]
    Urban,
    Rural,
}

/// A traffic analysis zone.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Zone {
    pub id: ZoneId,
    /// Name of the region the zone belongs to (used to segment calibration).
    pub region: String,
    pub area_type: AreaType,
    /// Distance from the zone's centroid to the nearest transit stop, in meters.
    pub distance_to_transit: f64,
    /// Attraction of the zone for each purpose, in the order of [Purpose::ALL].
    pub attractions: [f64; Purpose::COUNT],
}

impl Zone {
    /// Returns the attraction of the zone for the given purpose.
    pub fn attraction(&self, purpose: Purpose) -> f64 {
        self.attractions[purpose.index()]
    }

    pub fn is_urban(&self) -> bool {
        self.area_type == AreaType::Urban
    }
}

/// The set of zones of the study area, with a dense index.
///
/// Zones keep the order in which they were given: the index of a zone is its position in that
/// order.
#[derive(Clone, Debug, Default)]
pub struct Zones {
    zones: Vec<Zone>,
    index_of: HashMap<ZoneId, usize>,
}

impl Zones {
    /// Creates the set of zones.
    ///
    /// Returns an error if two zones share the same id or if an attraction is negative or not
    /// finite.
    pub fn new(zones: Vec<Zone>) -> Result<Self> {
        let mut index_of = HashMap::with_capacity(zones.len());
        for (i, zone) in zones.iter().enumerate() {
            if index_of.insert(zone.id, i).is_some() {
                bail!("Found two zones with id {}", zone.id);
            }
            for purpose in Purpose::ALL {
                let value = zone.attraction(purpose);
                if !(value.is_finite() && value >= 0.0) {
                    return Err(ConfigurationError::InvalidAttraction {
                        purpose,
                        zone: zone.id,
                        value,
                    }
                    .into());
                }
            }
        }
        Ok(Zones { zones, index_of })
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Returns the index of the zone with the given id.
    pub fn index_of(&self, id: ZoneId) -> Option<usize> {
        self.index_of.get(&id).copied()
    }

    /// Returns the zone with the given id.
    pub fn get(&self, id: ZoneId) -> Option<&Zone> {
        self.index_of(id).map(|i| &self.zones[i])
    }

    /// Returns the zone with the given id or a configuration error.
    pub fn try_get(&self, id: ZoneId, context: &str) -> Result<&Zone, ConfigurationError> {
        self.get(id).ok_or_else(|| ConfigurationError::UnknownZone {
            zone: id,
            context: context.to_owned(),
        })
    }

    /// Returns the zone at the given index.
    ///
    /// Panics if the index is out of bounds.
    pub fn at(&self, index: usize) -> &Zone {
        &self.zones[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }

    /// Returns the ids of the zones, in index order.
    pub fn ids(&self) -> Vec<ZoneId> {
        self.zones.iter().map(|z| z.id).collect()
    }

    /// Returns the attractions of all the zones for the given purpose, in index order.
    pub fn attractions(&self, purpose: Purpose) -> Vec<f64> {
        self.zones.iter().map(|z| z.attraction(purpose)).collect()
    }
}
