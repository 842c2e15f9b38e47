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

use anyhow::{bail, Result};
use log::warn;
use rand::Rng;

use crate::{sampler, Alternative, PROBABILITY_TOLERANCE};

/// Choice probabilities of a set of candidate alternatives.
///
/// The alternatives are stored in the order of the candidate set given to the solver.
#[derive(Clone, Debug, PartialEq)]
pub struct Probabilities<A> {
    values: Vec<(A, f64)>,
    logsum: f64,
}

impl<A: Alternative> Probabilities<A> {
    pub(crate) fn new(values: Vec<(A, f64)>, logsum: f64) -> Self {
        let total: f64 = values.iter().map(|(_, p)| p).sum();
        if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
            warn!("Choice probabilities sum to {total} instead of 1");
        }
        Probabilities { values, logsum }
    }

    /// Returns the probability of the given alternative.
    ///
    /// Alternatives that are not part of the candidate set have probability zero.
    pub fn get(&self, alternative: A) -> f64 {
        self.values
            .iter()
            .find(|(a, _)| *a == alternative)
            .map(|&(_, p)| p)
            .unwrap_or(0.0)
    }

    /// Returns an iterator over the `(alternative, probability)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (A, f64)> + '_ {
        self.values.iter().copied()
    }

    /// Returns the number of candidate alternatives.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there is no candidate alternative.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the sum of the probabilities.
    pub fn total(&self) -> f64 {
        self.values.iter().map(|(_, p)| p).sum()
    }

    /// Returns the log-sum of the choice, i.e., the expected maximum utility (without Euler's
    /// constant).
    pub fn logsum(&self) -> f64 {
        self.logsum
    }

    /// Draws an alternative according to the probabilities.
    ///
    /// Returns `None` if no alternative has a positive probability.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<A> {
        let weights: Vec<f64> = self.values.iter().map(|&(_, p)| p).collect();
        sampler::sample(&weights, rng)
            .ok()
            .map(|index| self.values[index].0)
    }
}

/// Returns the multinomial-logit probabilities of the candidate alternatives:
/// `p(a) = exp(u_a) / sum_b exp(u_b)`.
///
/// Returns an error if
///
/// - The candidate set is empty.
///
/// - A utility is not finite (NaN or infinity).
pub fn multinomial_probabilities<A: Alternative>(
    utilities: &[(A, f64)],
) -> Result<Probabilities<A>> {
    if utilities.is_empty() {
        bail!("Cannot compute choice probabilities from an empty set of alternatives");
    }
    if let Some((alt, value)) = utilities.iter().find(|(_, v)| !v.is_finite()) {
        bail!("Found a non-finite utility for alternative {alt:?}: {value}");
    }
    // The maximum value is finite because all values are finite and there is at least one value.
    let max_value = utilities
        .iter()
        .fold(f64::NEG_INFINITY, |m, &(_, v)| m.max(v));
    // (v - max_value) is non-positive so the `exp` cannot overflow.
    let exp_values: Vec<f64> = utilities
        .iter()
        .map(|&(_, v)| (v - max_value).exp())
        .collect();
    // Sigma is between 1.0 and n because the alternative with the maximum value has an
    // exponentiated value of 1.0.
    let sigma: f64 = exp_values.iter().sum();
    let values = utilities
        .iter()
        .zip(exp_values)
        .map(|(&(alt, _), exp_v)| (alt, exp_v / sigma))
        .collect();
    Ok(Probabilities::new(values, max_value + sigma.ln()))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    use super::*;

    #[test]
    fn multinomial_invalid_test() {
        assert!(multinomial_probabilities::<u8>(&[]).is_err());
        assert!(multinomial_probabilities(&[(0, 1.), (1, f64::NAN)]).is_err());
        assert!(multinomial_probabilities(&[(0, 1.), (1, f64::NEG_INFINITY)]).is_err());
        assert!(multinomial_probabilities(&[(0, 1.), (1, f64::INFINITY)]).is_err());
    }

    #[test]
    fn multinomial_probabilities_test() {
        // Only 1 alternative.
        let probs = multinomial_probabilities(&[(3, -12.)]).unwrap();
        assert_eq!(probs.get(3), 1.0);
        assert_eq!(probs.get(4), 0.0);
        assert_eq!(probs.logsum(), -12.);
        // Two alternatives with the same utility.
        let probs = multinomial_probabilities(&[(0, 2.), (1, 2.)]).unwrap();
        assert_eq!(probs.get(0), 0.5);
        assert_eq!(probs.get(1), 0.5);
        assert!((probs.logsum() - (2. + 2.0f64.ln())).abs() < 1e-12);
        // p = e / (1 + e).
        let probs = multinomial_probabilities(&[(0, 1.), (1, 0.)]).unwrap();
        let e = 1.0f64.exp();
        assert!((probs.get(0) - e / (1. + e)).abs() < 1e-12);
        assert!((probs.get(1) - 1. / (1. + e)).abs() < 1e-12);
    }

    #[test]
    fn multinomial_sum_to_one_test() {
        let cases: Vec<Vec<f64>> = vec![
            vec![0.],
            vec![-3.2, 0.5, 1.7, 12.0],
            vec![700., 710., 690.],
            vec![-800., -805., -1000.],
            vec![f64::MAX, f64::MAX],
            vec![f64::MIN, 0.],
            (0..50).map(|i| (i as f64).sin() * 10.).collect(),
        ];
        for values in cases {
            let utilities: Vec<(usize, f64)> = values.into_iter().enumerate().collect();
            let probs = multinomial_probabilities(&utilities).unwrap();
            assert!(probs.iter().all(|(_, p)| p >= 0.0));
            assert!((probs.total() - 1.0).abs() < PROBABILITY_TOLERANCE);
        }
    }

    #[test]
    fn multinomial_monotonicity_test() {
        let mut utilities = vec![(0, 0.3), (1, -1.2), (2, 0.8)];
        let mut previous = multinomial_probabilities(&utilities).unwrap().get(1);
        for _ in 0..20 {
            utilities[1].1 += 0.25;
            let current = multinomial_probabilities(&utilities).unwrap().get(1);
            assert!(current > previous, "{current} <= {previous}");
            previous = current;
        }
    }

    #[test]
    fn probabilities_sample_test() {
        let probs = multinomial_probabilities(&[('a', 0.), ('b', -1000.)]).unwrap();
        // The probability of `b` underflows to zero so it can never be drawn.
        assert_eq!(probs.get('b'), 0.0);
        let mut rng = XorShiftRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(probs.sample(&mut rng), Some('a'));
        }
        // No alternative with a positive probability: nothing is drawn.
        let empty = Probabilities::new(vec![('a', 0.0), ('b', 0.0)], 0.0);
        assert_eq!(empty.sample(&mut rng), None);
    }
}
