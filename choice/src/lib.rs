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

//! Discrete-choice models between a closed set of alternatives.
//!
//! The candidate set is always given explicitly by the caller, as a slice of
//! `(alternative, utility)` pairs. Alternatives which are not available must simply be left out
//! of the slice: they are never represented by an infinite utility.
mod logit;
mod nested_logit;
mod sampler;

use std::fmt::Debug;
use std::hash::Hash;

use anyhow::Result;
use rand::Rng;

pub use self::logit::{multinomial_probabilities, Probabilities};
pub use self::nested_logit::{Nest, NestingStructure};
pub use self::sampler::{is_samplable, sample};

/// Maximum tolerated difference between the sum of choice probabilities and one.
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// Trait bound for the alternatives of a choice model.
///
/// It is implemented for all small copyable identifiers (typically field-less enums).
pub trait Alternative: Copy + Eq + Hash + Debug {}

impl<A: Copy + Eq + Hash + Debug> Alternative for A {}

/// A logit model between a finite number of alternatives.
#[derive(Clone, Debug)]
pub enum ChoiceModel<A> {
    /// Flat multinomial logit.
    Multinomial,
    /// Two-level nested logit.
    Nested(NestingStructure<A>),
}

impl<A> Default for ChoiceModel<A> {
    fn default() -> Self {
        Self::Multinomial
    }
}

impl<A: Alternative> ChoiceModel<A> {
    /// Returns the choice probabilities of the candidate alternatives, given their utilities.
    ///
    /// Returns an error if the candidate set is empty or if a utility is not finite.
    pub fn probabilities(&self, utilities: &[(A, f64)]) -> Result<Probabilities<A>> {
        match self {
            Self::Multinomial => multinomial_probabilities(utilities),
            Self::Nested(structure) => structure.probabilities(utilities),
        }
    }

    /// Draws an alternative from the candidate set.
    ///
    /// Returns `None` if the probabilities cannot be sampled from (e.g., all of them are zero).
    pub fn choose<R: Rng + ?Sized>(
        &self,
        utilities: &[(A, f64)],
        rng: &mut R,
    ) -> Result<Option<A>> {
        Ok(self.probabilities(utilities)?.sample(rng))
    }
}
