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

use anyhow::{anyhow, bail, Result};
use hashbrown::{HashMap, HashSet};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Alternative, Probabilities};

/// A named group of alternatives sharing a nesting (dissimilarity) coefficient.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Nest<A> {
    /// Name of the nest, used in error messages.
    pub name: String,
    /// Alternatives of the nest.
    pub alternatives: Vec<A>,
    /// Nesting coefficient, in the interval `(0, 1]`.
    pub coefficient: f64,
}

impl<A> Nest<A> {
    /// Creates a new nest.
    pub fn new(name: impl Into<String>, alternatives: Vec<A>, coefficient: f64) -> Self {
        Nest {
            name: name.into(),
            alternatives,
            coefficient,
        }
    }
}

/// A validated partition of a set of alternatives into nests.
///
/// # Example
///
/// ```
/// use choice::{Nest, NestingStructure};
///
/// let structure = NestingStructure::new(vec![
///     Nest::new("motorized", vec!["car", "bus"], 0.5),
///     Nest::new("walk", vec!["walk"], 1.0),
/// ])
/// .unwrap();
/// let probs = structure
///     .probabilities(&[("car", 0.0), ("bus", 0.0), ("walk", 0.0)])
///     .unwrap();
/// assert!((probs.total() - 1.0).abs() < 1e-9);
/// // Car and bus share a nest so they share the probability of the nest.
/// assert_eq!(probs.get("car"), probs.get("bus"));
/// ```
#[derive(Clone, Debug)]
pub struct NestingStructure<A> {
    nests: Vec<Nest<A>>,
    nest_of: HashMap<A, usize>,
}

impl<A: Alternative> NestingStructure<A> {
    /// Creates a nesting structure from a list of nests.
    ///
    /// Returns an error if
    ///
    /// - There is no nest.
    ///
    /// - A nesting coefficient is not in the interval `(0, 1]`.
    ///
    /// - An alternative belongs to more than one nest.
    pub fn new(nests: Vec<Nest<A>>) -> Result<Self> {
        if nests.is_empty() {
            bail!("A nesting structure must have at least one nest");
        }
        let mut nest_of = HashMap::new();
        for (i, nest) in nests.iter().enumerate() {
            if !(nest.coefficient > 0.0 && nest.coefficient <= 1.0) {
                bail!(
                    "Invalid coefficient for nest `{}`: {} (must be in (0, 1])",
                    nest.name,
                    nest.coefficient
                );
            }
            for &alt in nest.alternatives.iter() {
                if nest_of.insert(alt, i).is_some() {
                    bail!("Alternative {alt:?} belongs to more than one nest");
                }
            }
        }
        Ok(NestingStructure { nests, nest_of })
    }

    /// Returns the nests of the structure.
    pub fn nests(&self) -> &[Nest<A>] {
        &self.nests
    }

    /// Returns the nested-logit probabilities of the candidate alternatives.
    ///
    /// For each nest `n` with coefficient `mu_n`, the inclusive value is
    /// `IV_n = ln sum_{a in n} exp(u_a / mu_n)`, where the sum only runs over the candidate
    /// alternatives of the nest. The probability of alternative `a` in nest `n` is then
    /// `exp(u_a / mu_n) / exp(IV_n) * exp(mu_n * IV_n) / sum_m exp(mu_m * IV_m)`.
    ///
    /// Nests with no candidate alternative are ignored.
    ///
    /// Returns an error if
    ///
    /// - The candidate set is empty.
    ///
    /// - A utility is not finite.
    ///
    /// - A candidate alternative does not belong to any nest.
    pub fn probabilities(&self, utilities: &[(A, f64)]) -> Result<Probabilities<A>> {
        if utilities.is_empty() {
            bail!("Cannot compute choice probabilities from an empty set of alternatives");
        }
        if let Some((alt, value)) = utilities.iter().find(|(_, v)| !v.is_finite()) {
            bail!("Found a non-finite utility for alternative {alt:?}: {value}");
        }
        let mut seen = HashSet::with_capacity(utilities.len());
        let nest_ids: Vec<usize> = utilities
            .iter()
            .map(|&(alt, _)| {
                if !seen.insert(alt) {
                    return Err(anyhow!("Alternative {alt:?} is given twice"));
                }
                self.nest_of
                    .get(&alt)
                    .copied()
                    .ok_or_else(|| anyhow!("Alternative {alt:?} does not belong to any nest"))
            })
            .collect::<Result<_>>()?;
        // Each nest is shifted by the maximum utility of its own candidates, a global shift
        // divided by a small coefficient would underflow.
        let mut nest_max = vec![f64::NEG_INFINITY; self.nests.len()];
        for (&(_, v), &n) in utilities.iter().zip(nest_ids.iter()) {
            nest_max[n] = nest_max[n].max(v);
        }
        let mut nest_sums = vec![0.0; self.nests.len()];
        let exp_values: Vec<f64> = utilities
            .iter()
            .zip(nest_ids.iter())
            .map(|(&(_, v), &n)| {
                let exp_v = ((v - nest_max[n]) / self.nests[n].coefficient).exp();
                nest_sums[n] += exp_v;
                exp_v
            })
            .collect();
        // Log of the exponentiated utility of each nest: mu_n * IV_n, with
        // IV_n = m_n / mu_n + ln sum_{a in n} exp((u_a - m_n) / mu_n).
        // Nests without candidate have no value. The sum of a nest with a candidate is at least
        // one.
        let nest_values: Vec<Option<f64>> = nest_sums
            .iter()
            .zip(nest_max.iter())
            .zip(self.nests.iter())
            .map(|((&sum, &m), nest)| (sum > 0.0).then(|| m + nest.coefficient * sum.ln()))
            .collect();
        let root_max = nest_values
            .iter()
            .flatten()
            .fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        let nest_weights: Vec<f64> = nest_values
            .iter()
            .map(|v| v.map_or(0.0, |v| (v - root_max).exp()))
            .collect();
        // At least one nest has a weight of exactly one.
        let root_sum: f64 = nest_weights.iter().sum();
        if !(root_sum >= 1.0 && root_sum.is_finite()) {
            bail!("Invalid nested-logit denominator: {root_sum}");
        }
        let values = utilities
            .iter()
            .zip(exp_values)
            .zip(nest_ids)
            .map(|((&(alt, _), exp_v), n)| {
                (alt, (exp_v / nest_sums[n]) * (nest_weights[n] / root_sum))
            })
            .collect();
        Ok(Probabilities::new(values, root_max + root_sum.ln()))
    }
}
