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
use rand::Rng;

/// Returns `true` if an index can be drawn from the given (unnormalized) weights.
///
/// The weights can be sampled from if they are all finite and at least one of them is
/// positive. Negative weights are treated as zero.
pub fn is_samplable(weights: &[f64]) -> bool {
    weights.iter().all(|w| w.is_finite()) && weights.iter().any(|&w| w > 0.0)
}

/// Draws an index from a vector of non-negative (unnormalized) weights.
///
/// A value `u` is drawn uniformly in `[0, sum)`, then the weights are accumulated from left to
/// right and the first index whose running sum is at least `u` is returned. Indices with a
/// non-positive weight are never returned.
///
/// Returns an error if the weights cannot be sampled from (see [is_samplable]). Callers are
/// expected to check this beforehand.
///
/// # Example
///
/// ```
/// use choice::sample;
/// use rand::SeedableRng;
/// use rand_xorshift::XorShiftRng;
///
/// let mut rng = XorShiftRng::seed_from_u64(13);
/// let index = sample(&[0.0, 2.0, 0.0], &mut rng).unwrap();
/// assert_eq!(index, 1);
/// ```
pub fn sample<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Result<usize> {
    if !is_samplable(weights) {
        bail!(
            "Cannot sample from {} weights: at least one weight must be positive and all weights \
            must be finite",
            weights.len()
        );
    }
    let total: f64 = weights.iter().filter(|&&w| w > 0.0).sum();
    let u = rng.gen::<f64>() * total;
    let mut cum_weight = 0.0;
    let mut last_valid = 0;
    for (i, &w) in weights.iter().enumerate() {
        if w > 0.0 {
            cum_weight += w;
            last_valid = i;
            if cum_weight >= u {
                return Ok(i);
            }
        }
    }
    // Rounding errors can leave `u` slightly above the final running sum.
    Ok(last_valid)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    use super::*;

    #[test]
    fn is_samplable_test() {
        assert!(!is_samplable(&[]));
        assert!(!is_samplable(&[0.0, 0.0]));
        assert!(!is_samplable(&[-1.0, 0.0]));
        assert!(!is_samplable(&[1.0, f64::NAN]));
        assert!(!is_samplable(&[1.0, f64::INFINITY]));
        assert!(is_samplable(&[0.0, 1e-300]));
        assert!(is_samplable(&[-1.0, 3.0]));
    }

    #[test]
    fn sample_invalid_test() {
        let mut rng = XorShiftRng::seed_from_u64(0);
        assert!(sample(&[], &mut rng).is_err());
        assert!(sample(&[0.0, 0.0, 0.0], &mut rng).is_err());
        assert!(sample(&[f64::NAN, 1.0], &mut rng).is_err());
    }

    #[test]
    fn sample_never_returns_zero_weight_test() {
        let mut rng = XorShiftRng::seed_from_u64(1);
        let weights = [0.0, 0.5, 0.0, -2.0, 0.5, 0.0];
        for _ in 0..10_000 {
            let i = sample(&weights, &mut rng).unwrap();
            assert!(i == 1 || i == 4, "Invalid index {i}");
        }
    }

    #[test]
    fn sample_deterministic_test() {
        let weights = [0.2, 0.3, 0.5];
        let mut rng1 = XorShiftRng::seed_from_u64(42);
        let mut rng2 = XorShiftRng::seed_from_u64(42);
        for _ in 0..1_000 {
            assert_eq!(
                sample(&weights, &mut rng1).unwrap(),
                sample(&weights, &mut rng2).unwrap()
            );
        }
    }

    #[test]
    fn sample_frequencies_test() {
        let weights = [0.2, 0.3, 0.5];
        let n = 100_000;
        let mut rng = XorShiftRng::seed_from_u64(2024);
        let mut counts = [0usize; 3];
        for _ in 0..n {
            counts[sample(&weights, &mut rng).unwrap()] += 1;
        }
        // Chi-square goodness-of-fit test with 2 degrees of freedom.
        let chi2: f64 = counts
            .iter()
            .zip(weights.iter())
            .map(|(&c, &w)| {
                let expected = w * n as f64;
                (c as f64 - expected).powi(2) / expected
            })
            .sum();
        // Critical value at the 1% level.
        assert!(chi2 < 9.21, "chi2 = {chi2}, counts = {counts:?}");
    }

    #[test]
    fn sample_unnormalized_test() {
        // Weights do not have to sum to one.
        let mut rng = XorShiftRng::seed_from_u64(3);
        let n = 20_000;
        let hits = (0..n)
            .filter(|_| sample(&[30.0, 10.0], &mut rng).unwrap() == 0)
            .count();
        let share = hits as f64 / n as f64;
        assert!((share - 0.75).abs() < 0.02, "{share}");
    }
}
