//! Seeded random generator with the sampling primitives the simulation needs.
//!
//! Respects the determinism contract: the generator is a ChaCha8 stream
//! selected by `(seed, stream)`, so a catalog simulated with a given stream
//! is bit-identical regardless of which worker thread ran it.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Poisson};

use crate::stats;

/// Means above this are too large for the Poisson sampler and are rounded.
const POISSON_MAX_MEAN: f64 = 1.0e18;

/// Random generator for catalog simulation.
///
/// Each ensemble worker owns one instance and re-seeds it per catalog with
/// [`reseed`](Self::reseed).
#[derive(Clone, Debug)]
pub struct OEtasRng {
    rng: ChaCha8Rng,
}

impl OEtasRng {
    /// Create a generator for `seed`, positioned at stream 0.
    pub fn seed_from_u64(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Reset to the start of stream `stream` of `seed`.
    pub fn reseed(&mut self, seed: u64, stream: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.rng.set_stream(stream);
    }

    /// Uniform variate in `[0, 1)`.
    pub fn uniform_sample(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    /// Uniform variate in `[lo, hi)`.
    pub fn uniform_sample_range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.uniform_sample()
    }

    /// Poisson variate with mean `lambda`.
    ///
    /// Non-finite or non-positive means yield 0. Means beyond the range of
    /// the sampler yield the rounded mean.
    pub fn poisson_sample_checked(&mut self, lambda: f64) -> u64 {
        if !lambda.is_finite() || lambda <= 0.0 {
            return 0;
        }
        if lambda > POISSON_MAX_MEAN {
            return lambda.round() as u64;
        }
        match Poisson::new(lambda) {
            Ok(dist) => dist.sample(&mut self.rng) as u64,
            Err(_) => lambda.round() as u64,
        }
    }

    /// Magnitude from the GR distribution truncated to `[m1, m2]`.
    pub fn gr_sample(&mut self, b: f64, m1: f64, m2: f64) -> f64 {
        let u = self.uniform_sample();
        stats::gr_inverse_cdf(b, m1, m2, u)
    }

    /// Time from the Omori kernel of a parent at `t0`, truncated to `[t1, t2]`.
    ///
    /// Requires `t1 >= t0`.
    pub fn omori_sample_shifted(&mut self, p: f64, c: f64, t0: f64, t1: f64, t2: f64) -> f64 {
        let u = self.uniform_sample();
        stats::omori_inverse_cdf(p, c, t0, t1, t2, u)
    }

    /// Index drawn with probability proportional to the increments of the
    /// non-decreasing prefix-sum array `cum`.
    ///
    /// An index whose increment is zero is never returned. Returns `None`
    /// for an empty array.
    pub fn cumulative_sample(&mut self, cum: &[f64]) -> Option<usize> {
        let last = cum.len().checked_sub(1)?;
        let target = self.uniform_sample() * cum[last];
        Some(cum.partition_point(|&x| x <= target).min(last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_stream_same_sequence() {
        let mut a = OEtasRng::seed_from_u64(7);
        let mut b = OEtasRng::seed_from_u64(0);
        a.reseed(42, 3);
        b.reseed(42, 3);
        for _ in 0..100 {
            assert_eq!(a.uniform_sample().to_bits(), b.uniform_sample().to_bits());
        }
    }

    #[test]
    fn different_streams_differ() {
        let mut a = OEtasRng::seed_from_u64(0);
        let mut b = OEtasRng::seed_from_u64(0);
        a.reseed(42, 1);
        b.reseed(42, 2);
        let sa: Vec<u64> = (0..8).map(|_| a.uniform_sample().to_bits()).collect();
        let sb: Vec<u64> = (0..8).map(|_| b.uniform_sample().to_bits()).collect();
        assert_ne!(sa, sb);
    }

    #[test]
    fn poisson_degenerate_means() {
        let mut rng = OEtasRng::seed_from_u64(1);
        assert_eq!(rng.poisson_sample_checked(0.0), 0);
        assert_eq!(rng.poisson_sample_checked(-3.0), 0);
        assert_eq!(rng.poisson_sample_checked(f64::NAN), 0);
        assert_eq!(rng.poisson_sample_checked(1.0e19), 10_000_000_000_000_000_000);
    }

    #[test]
    fn poisson_mean_is_close() {
        let mut rng = OEtasRng::seed_from_u64(11);
        let n = 20_000;
        let sum: u64 = (0..n).map(|_| rng.poisson_sample_checked(3.5)).sum();
        let mean = sum as f64 / n as f64;
        assert!((mean - 3.5).abs() < 0.1, "mean {mean}");
    }

    #[test]
    fn cumulative_sample_skips_zero_weights() {
        let mut rng = OEtasRng::seed_from_u64(5);
        let cum = [0.0, 1.0, 1.0, 3.0, 3.0];
        let mut hits = [0usize; 5];
        for _ in 0..10_000 {
            hits[rng.cumulative_sample(&cum).unwrap()] += 1;
        }
        assert_eq!(hits[0], 0);
        assert_eq!(hits[2], 0);
        assert_eq!(hits[4], 0);
        assert!(hits[3] > hits[1]);
    }

    #[test]
    fn cumulative_sample_of_nothing_is_none() {
        let mut rng = OEtasRng::seed_from_u64(6);
        assert_eq!(rng.cumulative_sample(&[]), None);
        assert_eq!(rng.cumulative_sample(&[2.5]), Some(0));
    }

    #[test]
    fn gr_sample_within_range() {
        let mut rng = OEtasRng::seed_from_u64(9);
        for _ in 0..1000 {
            let m = rng.gr_sample(1.0, 3.0, 8.0);
            assert!((3.0..=8.0).contains(&m));
        }
    }
}
