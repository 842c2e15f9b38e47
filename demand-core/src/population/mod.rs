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

//! Households, persons and their trips.
mod mode;
mod purpose;
mod zone;

use anyhow::{bail, Context, Result};
use hashbrown::HashSet;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use self::mode::{Mode, ModeRestriction, ModeSet};
pub use self::purpose::Purpose;
pub use self::zone::{AreaType, Zone, Zones};

pub type ZoneId = u32;
pub type HouseholdId = u64;
pub type PersonId = u64;
pub type TripId = u64;

/// Age from which a person is considered to be an adult.
pub const ADULT_AGE: u32 = 18;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum Gender {
    #[default]
    Male,
    Female,
}

/// Main occupation of a person.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum Occupation {
    Worker,
    Student,
    #[default]
    Unemployed,
    Retiree,
}

/// Car-ownership segment of a household.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize, JsonSchema)]
pub enum CarOwnership {
    /// The household has no vehicle.
    NoCar,
    /// The household has fewer vehicles than adults.
    Insufficient,
    /// The household has at least one vehicle per adult.
    Sufficient,
}

impl CarOwnership {
    pub const ALL: [CarOwnership; 3] = [Self::NoCar, Self::Insufficient, Self::Sufficient];
}

/// A trip made by a person.
///
/// The purpose of a trip is set at creation and cannot be changed. The origin, destination and
/// mode are filled by the choice models.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Trip {
    id: TripId,
    /// Id of the person making the trip (set when the population is built).
    #[serde(skip)]
    person: PersonId,
    purpose: Purpose,
    #[serde(default)]
    origin: Option<ZoneId>,
    #[serde(default)]
    destination: Option<ZoneId>,
    #[serde(default)]
    mode: Option<Mode>,
    /// Departure time, in minutes after midnight.
    #[serde(default)]
    departure_minutes: Option<f64>,
}

impl Trip {
    pub fn new(id: TripId, purpose: Purpose) -> Self {
        Trip {
            id,
            person: 0,
            purpose,
            origin: None,
            destination: None,
            mode: None,
            departure_minutes: None,
        }
    }

    pub fn with_departure(mut self, minutes: f64) -> Self {
        self.departure_minutes = Some(minutes);
        self
    }

    pub fn id(&self) -> TripId {
        self.id
    }

    pub fn person(&self) -> PersonId {
        self.person
    }

    pub fn purpose(&self) -> Purpose {
        self.purpose
    }

    pub fn origin(&self) -> Option<ZoneId> {
        self.origin
    }

    pub fn destination(&self) -> Option<ZoneId> {
        self.destination
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn departure_minutes(&self) -> Option<f64> {
        self.departure_minutes
    }

    pub fn set_origin(&mut self, origin: ZoneId) {
        self.origin = Some(origin);
    }

    pub fn set_destination(&mut self, destination: ZoneId) {
        self.destination = Some(destination);
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = Some(mode);
    }

    /// Removes the mode of the trip, before it is chosen again.
    pub fn clear_mode(&mut self) {
        self.mode = None;
    }
}

/// A member of a household.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Person {
    pub id: PersonId,
    /// Id of the household of the person (set when the population is built).
    #[serde(skip)]
    pub household: HouseholdId,
    pub age: u32,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub occupation: Occupation,
    #[serde(default)]
    pub has_driver_license: bool,
    #[serde(default)]
    pub owns_bicycle: bool,
    /// Zone of the workplace or school of the person.
    #[serde(default)]
    pub occupation_zone: Option<ZoneId>,
    /// Subset of modes the person can choose from.
    ///
    /// When not set, all modes are allowed.
    #[serde(default)]
    pub mode_restriction: Option<ModeRestriction>,
    /// Mode used by the person for most of their commute trips.
    #[serde(default)]
    pub commute_mode: Option<Mode>,
    #[serde(default)]
    pub trips: Vec<Trip>,
}

impl Person {
    pub fn new(id: PersonId, age: u32) -> Self {
        Person {
            id,
            household: 0,
            age,
            gender: Gender::default(),
            occupation: Occupation::default(),
            has_driver_license: false,
            owns_bicycle: false,
            occupation_zone: None,
            mode_restriction: None,
            commute_mode: None,
            trips: Vec::new(),
        }
    }

    pub fn is_adult(&self) -> bool {
        self.age >= ADULT_AGE
    }

    /// Returns the number of trips of the person for the given purpose.
    pub fn nb_trips(&self, purpose: Purpose) -> usize {
        self.trips.iter().filter(|t| t.purpose == purpose).count()
    }

    /// Returns the trips of the person for the given purpose.
    pub fn trips_of(&self, purpose: Purpose) -> impl Iterator<Item = &Trip> {
        self.trips.iter().filter(move |t| t.purpose == purpose)
    }

    /// Returns the modes the person can choose from.
    ///
    /// The driver mode is removed when the person has no driver license or when their household
    /// has no vehicle.
    pub fn permitted_modes(&self, household: &Household) -> ModeSet {
        let modes = self
            .mode_restriction
            .map(ModeRestriction::modes)
            .unwrap_or(ModeSet::ALL);
        if self.has_driver_license && household.vehicles > 0 {
            modes
        } else {
            modes.without(Mode::AutoDriver)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Household {
    pub id: HouseholdId,
    pub home_zone: ZoneId,
    #[serde(default)]
    pub vehicles: u32,
    /// Economic status, from 1 (lowest) to 4 (highest).
    pub economic_status: u8,
    pub persons: Vec<Person>,
}

impl Household {
    pub fn size(&self) -> usize {
        self.persons.len()
    }

    pub fn nb_adults(&self) -> usize {
        self.persons.iter().filter(|p| p.is_adult()).count()
    }

    pub fn nb_children(&self) -> usize {
        self.size() - self.nb_adults()
    }

    pub fn car_ownership(&self) -> CarOwnership {
        if self.vehicles == 0 {
            CarOwnership::NoCar
        } else if (self.vehicles as usize) < self.nb_adults() {
            CarOwnership::Insufficient
        } else {
            CarOwnership::Sufficient
        }
    }

    /// Number of vehicles per adult (0 when there is no adult).
    pub fn vehicles_per_adult(&self) -> f64 {
        match self.nb_adults() {
            0 => 0.0,
            n => self.vehicles as f64 / n as f64,
        }
    }

    pub fn nb_trips(&self) -> usize {
        self.persons.iter().map(|p| p.trips.len()).sum()
    }
}

/// The synthetic population.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Population {
    households: Vec<Household>,
}

impl Population {
    /// Creates a population from a list of households.
    ///
    /// The back-references from persons to households and from trips to persons are set.
    ///
    /// Returns an error if some ids are duplicated or if an economic status is not in `1..=4`.
    pub fn new(mut households: Vec<Household>) -> Result<Self> {
        let mut hh_ids = HashSet::with_capacity(households.len());
        let mut person_ids = HashSet::new();
        let mut trip_ids = HashSet::new();
        for household in households.iter_mut() {
            if !hh_ids.insert(household.id) {
                bail!("Found two households with id {}", household.id);
            }
            if !(1..=4).contains(&household.economic_status) {
                bail!(
                    "Invalid economic status for household {}: {} (must be between 1 and 4)",
                    household.id,
                    household.economic_status
                );
            }
            for person in household.persons.iter_mut() {
                if !person_ids.insert(person.id) {
                    bail!("Found two persons with id {}", person.id);
                }
                person.household = household.id;
                for trip in person.trips.iter_mut() {
                    if !trip_ids.insert(trip.id) {
                        bail!("Found two trips with id {}", trip.id);
                    }
                    trip.person = person.id;
                }
            }
        }
        Ok(Population { households })
    }

    /// Checks that all the zones referenced by the population exist.
    pub fn check_zones(&self, zones: &Zones) -> Result<()> {
        for household in self.households.iter() {
            zones
                .try_get(household.home_zone, &format!("home of household {}", household.id))?;
            for person in household.persons.iter() {
                if let Some(zone) = person.occupation_zone {
                    zones.try_get(zone, &format!("occupation of person {}", person.id))?;
                }
                for trip in person.trips.iter() {
                    for zone in trip.origin.iter().chain(trip.destination.iter()) {
                        zones
                            .try_get(*zone, &format!("trip {}", trip.id))
                            .with_context(|| format!("Invalid trip for person {}", person.id))?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn households(&self) -> &[Household] {
        &self.households
    }

    /// Returns the households of the population.
    ///
    /// Only the mutable fields of the trips are supposed to be modified.
    pub fn households_mut(&mut self) -> &mut [Household] {
        &mut self.households
    }

    pub fn nb_households(&self) -> usize {
        self.households.len()
    }

    pub fn nb_persons(&self) -> usize {
        self.households.iter().map(|h| h.size()).sum()
    }

    pub fn nb_trips(&self) -> usize {
        self.households.iter().map(|h| h.nb_trips()).sum()
    }

    /// Returns an iterator over the trips of the population, with their person and household.
    pub fn trips(&self) -> impl Iterator<Item = (&Household, &Person, &Trip)> {
        self.households.iter().flat_map(|h| {
            h.persons
                .iter()
                .flat_map(move |p| p.trips.iter().map(move |t| (h, p, t)))
        })
    }

    pub fn into_households(self) -> Vec<Household> {
        self.households
    }
}
