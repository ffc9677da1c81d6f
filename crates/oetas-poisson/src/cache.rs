//! Precomputed truncated Poisson distributions over the value ladder.
//!
//! For each cached mean the cache stores the bucket masses between the
//! `lower_cdf` and `upper_cdf` quantiles, with both tails folded into the
//! end buckets so that every cached distribution sums to 1. Adding a
//! Poisson distribution to an accumulator then costs one pass over the
//! cached support, independent of the size of the mean.
//!
//! The cache is immutable once built and is shared between threads as
//! `Arc<PoissonCache>`.

use std::time::Instant;

use statrs::distribution::{DiscreteCDF, Poisson};
use tracing::debug;

use crate::config::PoissonCacheConfig;
use crate::error::CacheError;
use crate::ladder::{MeanLadder, ValueLadder};

/// Cached distribution for one mean: bucket offset and index range into
/// the shared mass array.
#[derive(Clone, Copy, Debug, PartialEq)]
struct CachedPmf {
    offset: usize,
    start: usize,
    len: usize,
}

/// Stacked-Poisson distribution cache.
#[derive(Debug)]
pub struct PoissonCache {
    config: PoissonCacheConfig,
    values: ValueLadder,
    means: MeanLadder,
    pmfs: Vec<CachedPmf>,
    masses: Vec<f64>,
}

impl PoissonCache {
    /// Build the cache.
    ///
    /// # Errors
    ///
    /// Returns the configuration's validation error, if any.
    pub fn new(config: PoissonCacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        let started = Instant::now();
        let values = ValueLadder::new(config.value_digits, config.value_decades);
        let means = MeanLadder::new(
            config.mean_digits,
            config.lowest_mean_decade,
            values.max_value(),
        );

        let mut pmfs = Vec::with_capacity(means.len());
        let mut masses = Vec::new();
        for i in 0..means.len() {
            let start = masses.len();
            let offset = push_truncated_pmf(&values, means.mean(i), &config, &mut masses);
            pmfs.push(CachedPmf {
                offset,
                start,
                len: masses.len() - start,
            });
        }

        debug!(
            values = values.len(),
            means = means.len(),
            masses = masses.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "built stacked Poisson cache"
        );
        Ok(Self {
            config,
            values,
            means,
            pmfs,
            masses,
        })
    }

    /// Configuration the cache was built with.
    pub fn config(&self) -> &PoissonCacheConfig {
        &self.config
    }

    /// The value ladder.
    pub fn values(&self) -> &ValueLadder {
        &self.values
    }

    /// The mean ladder.
    pub fn means(&self) -> &MeanLadder {
        &self.means
    }

    /// Total number of cached masses.
    pub fn cached_mass_count(&self) -> usize {
        self.masses.len()
    }

    /// Cached distribution for the largest cached mean not above `lambda`.
    ///
    /// Returns the first bucket index and the masses from that bucket on,
    /// or `None` when `lambda` is below the smallest cached mean.
    pub fn lookup(&self, lambda: f64) -> Option<(usize, &[f64])> {
        let i = self.means.floor_index(lambda)?;
        let pmf = self.pmfs[i];
        Some((pmf.offset, &self.masses[pmf.start..pmf.start + pmf.len]))
    }
}

/// Append the truncated bucket masses of Poisson(`lambda`) and return the
/// first bucket index.
fn push_truncated_pmf(
    values: &ValueLadder,
    lambda: f64,
    config: &PoissonCacheConfig,
    masses: &mut Vec<f64>,
) -> usize {
    let dist = match Poisson::new(lambda) {
        Ok(dist) => dist,
        Err(_) => {
            masses.push(1.0);
            return 0;
        }
    };
    let splits = values.splits();
    let n = values.len();
    // Probability that a draw lies in bucket `i` or below.
    let upto = |i: usize| -> f64 {
        if i + 1 >= n {
            1.0
        } else {
            dist.cdf(splits[i] - 1)
        }
    };

    let lo = first_index(n, |i| upto(i) > config.lower_cdf);
    let hi = first_index(n, |i| upto(i) >= config.upper_cdf).max(lo);
    if lo == hi {
        masses.push(1.0);
        return lo;
    }
    let mut below = upto(lo);
    masses.push(below);
    for i in lo + 1..hi {
        let cum = upto(i);
        masses.push((cum - below).max(0.0));
        below = cum;
    }
    masses.push((1.0 - below).max(0.0));
    lo
}

/// First `i` in `0..n` for which the monotone predicate holds, or `n - 1`.
fn first_index(n: usize, pred: impl Fn(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0, n - 1);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid) {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo
}

// Compile-time assertion: the cache is shared across worker threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<PoissonCache>();
};

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> PoissonCache {
        PoissonCache::new(PoissonCacheConfig::compact()).unwrap()
    }

    #[test]
    fn every_cached_pmf_sums_to_one() {
        let cache = cache();
        for i in 0..cache.means().len() {
            let (offset, masses) = cache.lookup(cache.means().mean(i)).unwrap();
            let total: f64 = masses.iter().sum();
            assert!((total - 1.0).abs() < 1e-9, "mean {} sums to {total}", cache.means().mean(i));
            assert!(offset + masses.len() <= cache.values().len());
            assert!(masses.iter().all(|&m| m >= 0.0));
        }
    }

    #[test]
    fn small_mean_concentrates_at_zero() {
        let cache = cache();
        let (offset, masses) = cache.lookup(0.01).unwrap();
        assert_eq!(offset, 0);
        assert!((masses[0] - (-0.01f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn below_smallest_mean_is_none() {
        let cache = cache();
        assert!(cache.lookup(1.0e-6).is_none());
        assert!(cache.lookup(0.0).is_none());
    }

    #[test]
    fn support_is_centred_on_mean() {
        let cache = cache();
        let (offset, masses) = cache.lookup(50.0).unwrap();
        let lo = cache.values().value(offset);
        let hi = cache.values().value(offset + masses.len() - 1);
        assert!(lo < 50 && hi > 50, "support {lo}..={hi}");
        assert!(lo > 10 && hi < 100, "support {lo}..={hi} too wide");
    }

    #[test]
    fn invalid_config_rejected() {
        let config = PoissonCacheConfig {
            mean_digits: 0,
            ..PoissonCacheConfig::compact()
        };
        assert!(PoissonCache::new(config).is_err());
    }
}
