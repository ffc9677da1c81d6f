//! Stacked-Poisson accumulator: a weighted sum of point masses and
//! (shifted) Poisson distributions over the value ladder.

use std::io::{Read, Write};
use std::sync::Arc;

use oetas_core::{MarshalError, MarshalReader, MarshalWriter};

use crate::cache::PoissonCache;
use crate::config::PoissonCacheConfig;

/// Weighted mixture of discrete distributions, bucketed on the cache's
/// value ladder.
///
/// Accumulators are single-threaded and cheap to [`clear`](Self::clear), so
/// they are pooled and reused. Read queries require a prior
/// [`cumulate`](Self::cumulate).
#[derive(Clone, Debug)]
pub struct StackedPoissonAccumulator {
    cache: Arc<PoissonCache>,
    probs: Vec<f64>,
    total_weight: f64,
    cum: Vec<f64>,
}

impl StackedPoissonAccumulator {
    /// Create an empty accumulator over `cache`.
    pub fn new(cache: Arc<PoissonCache>) -> Self {
        Self {
            cache,
            probs: Vec::new(),
            total_weight: 0.0,
            cum: Vec::new(),
        }
    }

    /// The cache this accumulator stacks against.
    pub fn cache(&self) -> &Arc<PoissonCache> {
        &self.cache
    }

    /// Remove all contributions, keeping allocations.
    pub fn clear(&mut self) {
        self.probs.clear();
        self.cum.clear();
        self.total_weight = 0.0;
    }

    /// Total weight added.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Number of populated buckets: one past the highest bucket touched.
    pub fn support(&self) -> usize {
        self.probs.len()
    }

    /// Add weight `w` at value `v`.
    pub fn add_point_mass(&mut self, v: u64, w: f64) {
        let i = self.cache.values().bucket(v);
        grow(&mut self.probs, i + 1);
        self.probs[i] += w;
        self.total_weight += w;
    }

    /// Add a Poisson distribution with mean `lambda`, weighted by `w`.
    ///
    /// `lambda` is rounded down to the nearest cached mean. Means below the
    /// smallest cached mean add a point mass at 0; means above the largest
    /// add a point mass at the rounded mean.
    pub fn add_poisson(&mut self, lambda: f64, w: f64) {
        let Self {
            cache,
            probs,
            total_weight,
            ..
        } = self;
        match classify(cache, lambda) {
            Pmf::Point(v) => {
                let i = cache.values().bucket(v);
                grow(probs, i + 1);
                probs[i] += w;
            }
            Pmf::Cached(offset, masses) => {
                grow(probs, offset + masses.len());
                for (p, &m) in probs[offset..].iter_mut().zip(masses) {
                    *p += w * m;
                }
            }
        }
        *total_weight += w;
    }

    /// Add the distribution of `shift + X`, `X ~ Poisson(lambda)`, weighted
    /// by `w`.
    ///
    /// Each cached bucket is moved to the bucket holding its representative
    /// value plus `shift`; the target bucket only ever moves forward. A mean
    /// that rounds to nothing adds a point mass at `shift`.
    pub fn add_shifted_poisson(&mut self, lambda: f64, shift: u64, w: f64) {
        if shift == 0 {
            self.add_poisson(lambda, w);
            return;
        }
        let Self {
            cache,
            probs,
            total_weight,
            ..
        } = self;
        let values = cache.values();
        match classify(cache, lambda) {
            Pmf::Point(v) => {
                let i = values.bucket(shift.saturating_add(v));
                grow(probs, i + 1);
                probs[i] += w;
            }
            Pmf::Cached(offset, masses) => {
                let splits = values.splits();
                let mut target = values.bucket(values.value(offset).saturating_add(shift));
                for (k, &m) in masses.iter().enumerate() {
                    let v = values.value(offset + k).saturating_add(shift);
                    while target < splits.len() && splits[target] <= v {
                        target += 1;
                    }
                    grow(probs, target + 1);
                    probs[target] += w * m;
                }
            }
        }
        *total_weight += w;
    }

    /// Add every contribution of `other` into `self`.
    ///
    /// # Panics
    ///
    /// Panics if the two accumulators use different caches.
    pub fn combine_with(&mut self, other: &StackedPoissonAccumulator) {
        assert!(
            Arc::ptr_eq(&self.cache, &other.cache),
            "combine_with requires accumulators over the same cache"
        );
        grow(&mut self.probs, other.probs.len());
        for (p, &q) in self.probs.iter_mut().zip(&other.probs) {
            *p += q;
        }
        self.total_weight += other.total_weight;
    }

    /// Build the cumulative distribution used by read queries.
    pub fn cumulate(&mut self) {
        self.cum.clear();
        let mut sum = 0.0;
        self.cum.extend(self.probs.iter().map(|&p| {
            sum += p;
            sum
        }));
    }

    fn cum_at(&self, i: usize) -> f64 {
        match self.cum.get(i) {
            Some(&c) => c,
            None => self.cum.last().copied().unwrap_or(0.0),
        }
    }

    /// Smallest representative value whose cumulative mass exceeds
    /// `fraction` of the total weight.
    pub fn get_fractile(&self, fraction: f64) -> u64 {
        if self.cum.is_empty() {
            return 0;
        }
        let target = fraction * self.total_weight;
        let i = self
            .cum
            .partition_point(|&c| c <= target)
            .min(self.cum.len() - 1);
        self.cache.values().value(i)
    }

    /// Probability that a draw lies in `v`'s bucket or below.
    pub fn get_cum_prob(&self, v: u64) -> f64 {
        if self.total_weight <= 0.0 {
            return 1.0;
        }
        let i = self.cache.values().bucket(v);
        (self.cum_at(i) / self.total_weight).clamp(0.0, 1.0)
    }

    /// Probability that a draw lies above `v`'s bucket.
    pub fn get_probex(&self, v: u64) -> f64 {
        1.0 - self.get_cum_prob(v)
    }

    /// Probability of at least one event.
    pub fn get_prob_occur(&self) -> f64 {
        self.get_probex(0)
    }

    /// Weighted mean of the representative values.
    pub fn get_mean(&self) -> f64 {
        if self.total_weight <= 0.0 {
            return 0.0;
        }
        let values = self.cache.values();
        let sum: f64 = self
            .probs
            .iter()
            .enumerate()
            .map(|(i, &p)| p * values.value(i) as f64)
            .sum();
        sum / self.total_weight
    }

    const MARSHAL_NAME: &'static str = "StackedPoissonAccumulator";
    const MARSHAL_VERSION: u8 = 1;

    /// Write the accumulator, preceded by its cache fingerprint.
    pub fn marshal<W: Write>(&self, w: &mut MarshalWriter<W>) -> Result<(), MarshalError> {
        w.begin_object(Self::MARSHAL_NAME, Self::MARSHAL_VERSION)?;
        self.cache.config().marshal(w)?;
        w.write_f64("total_weight", self.total_weight)?;
        w.write_f64_array("probs", &self.probs)?;
        w.write_bool("cumulated", !self.cum.is_empty())?;
        w.end_object(Self::MARSHAL_NAME)
    }

    /// Read an accumulator written by [`marshal`](Self::marshal).
    ///
    /// # Errors
    ///
    /// Fails with [`MarshalError::Malformed`] if it was written against a
    /// cache with a different configuration.
    pub fn unmarshal<R: Read>(
        r: &mut MarshalReader<R>,
        cache: Arc<PoissonCache>,
    ) -> Result<Self, MarshalError> {
        r.begin_object(Self::MARSHAL_NAME, Self::MARSHAL_VERSION)?;
        let fingerprint = PoissonCacheConfig::unmarshal(r)?;
        if &fingerprint != cache.config() {
            return Err(MarshalError::Malformed {
                detail: "accumulator was written against a different cache".to_string(),
            });
        }
        let total_weight = r.read_f64("total_weight")?;
        let probs = r.read_f64_array("probs")?;
        let cumulated = r.read_bool("cumulated")?;
        r.end_object(Self::MARSHAL_NAME)?;
        if probs.len() > cache.values().len() {
            return Err(MarshalError::Malformed {
                detail: format!(
                    "{} buckets exceed the cache's {}",
                    probs.len(),
                    cache.values().len()
                ),
            });
        }
        let mut accum = Self {
            cache,
            probs,
            total_weight,
            cum: Vec::new(),
        };
        if cumulated {
            accum.cumulate();
        }
        Ok(accum)
    }
}

/// How a mean is added: as a single value or from the cache.
enum Pmf<'a> {
    Point(u64),
    Cached(usize, &'a [f64]),
}

fn classify(cache: &PoissonCache, lambda: f64) -> Pmf<'_> {
    let means = cache.means();
    if !(lambda >= means.mean(0)) {
        return Pmf::Point(0);
    }
    if lambda > means.mean(means.len() - 1) {
        return Pmf::Point(lambda.round() as u64);
    }
    match cache.lookup(lambda) {
        Some((offset, masses)) => Pmf::Cached(offset, masses),
        None => Pmf::Point(0),
    }
}

fn grow(probs: &mut Vec<f64>, len: usize) {
    if probs.len() < len {
        probs.resize(len, 0.0);
    }
}

impl PartialEq for StackedPoissonAccumulator {
    fn eq(&self, other: &Self) -> bool {
        self.cache.config() == other.cache.config()
            && self.total_weight == other.total_weight
            && self.probs == other.probs
            && self.cum == other.cum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PoissonCacheConfig;

    fn cache() -> Arc<PoissonCache> {
        Arc::new(PoissonCache::new(PoissonCacheConfig::compact()).unwrap())
    }

    #[test]
    fn point_masses_give_exact_fractiles() {
        let mut acc = StackedPoissonAccumulator::new(cache());
        for v in [0, 1, 2, 3, 4] {
            acc.add_point_mass(v, 1.0);
        }
        acc.cumulate();
        assert_eq!(acc.get_fractile(0.0), 0);
        assert_eq!(acc.get_fractile(0.5), 2);
        assert_eq!(acc.get_fractile(0.99), 4);
        assert_eq!(acc.get_fractile(1.0), 4);
        assert!((acc.get_prob_occur() - 0.8).abs() < 1e-12);
        assert!((acc.get_mean() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn poisson_median_and_occurrence() {
        let c = cache();
        for lambda in [0.5, 2.0, 7.5, 30.0] {
            let mut acc = StackedPoissonAccumulator::new(Arc::clone(&c));
            acc.add_poisson(lambda, 1.0);
            acc.cumulate();
            let cached = c.means().mean(c.means().floor_index(lambda).unwrap());
            let want = 1.0 - (-cached).exp();
            assert!(
                (acc.get_prob_occur() - want).abs() < 2e-4,
                "lambda {lambda}: {} vs {want}",
                acc.get_prob_occur()
            );
            let median = acc.get_fractile(0.5) as f64;
            // Poisson median lies within [λ - ln 2, λ + 1/3].
            assert!(
                median >= (cached - 0.7).floor() && median <= (cached + 0.34).ceil(),
                "lambda {lambda}: median {median}"
            );
        }
    }

    #[test]
    fn tiny_mean_is_point_mass_at_zero() {
        let mut acc = StackedPoissonAccumulator::new(cache());
        acc.add_poisson(1.0e-9, 2.0);
        acc.cumulate();
        assert_eq!(acc.support(), 1);
        assert_eq!(acc.get_prob_occur(), 0.0);
        assert_eq!(acc.total_weight(), 2.0);
    }

    #[test]
    fn shifted_poisson_moves_support() {
        let c = cache();
        let mut plain = StackedPoissonAccumulator::new(Arc::clone(&c));
        plain.add_poisson(5.0, 1.0);
        plain.cumulate();
        let mut shifted = StackedPoissonAccumulator::new(Arc::clone(&c));
        shifted.add_shifted_poisson(5.0, 10, 1.0);
        shifted.cumulate();
        assert_eq!(shifted.get_fractile(0.5), plain.get_fractile(0.5) + 10);
        assert_eq!(shifted.get_cum_prob(9), 0.0);
        assert!((shifted.get_mean() - plain.get_mean() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn shifted_with_zero_mean_is_point_mass_at_shift() {
        let mut acc = StackedPoissonAccumulator::new(cache());
        acc.add_shifted_poisson(0.0, 7, 1.0);
        acc.cumulate();
        assert_eq!(acc.get_fractile(0.0), 7);
        assert_eq!(acc.get_fractile(1.0), 7);
    }

    #[test]
    fn split_and_combine_equals_single() {
        let c = cache();
        let inputs = [(0.3, 0), (4.0, 2), (12.0, 0), (150.0, 40), (0.0, 5)];
        let mut single = StackedPoissonAccumulator::new(Arc::clone(&c));
        let mut left = StackedPoissonAccumulator::new(Arc::clone(&c));
        let mut right = StackedPoissonAccumulator::new(Arc::clone(&c));
        for (i, &(lambda, shift)) in inputs.iter().enumerate() {
            single.add_shifted_poisson(lambda, shift, 1.0);
            if i % 2 == 0 {
                left.add_shifted_poisson(lambda, shift, 1.0);
            } else {
                right.add_shifted_poisson(lambda, shift, 1.0);
            }
        }
        left.combine_with(&right);
        single.cumulate();
        left.cumulate();
        for f in [0.0, 0.1, 0.5, 0.9] {
            assert_eq!(left.get_fractile(f), single.get_fractile(f));
        }
        for v in [0, 3, 10, 100] {
            assert!((left.get_cum_prob(v) - single.get_cum_prob(v)).abs() < 1e-12);
        }
        assert_eq!(left.total_weight(), single.total_weight());
    }

    #[test]
    fn clear_resets_contents() {
        let mut acc = StackedPoissonAccumulator::new(cache());
        acc.add_poisson(3.0, 1.0);
        acc.cumulate();
        acc.clear();
        assert_eq!(acc.support(), 0);
        assert_eq!(acc.total_weight(), 0.0);
        assert_eq!(acc.get_fractile(0.5), 0);
    }

    #[test]
    fn marshal_roundtrip() {
        let c = cache();
        let mut acc = StackedPoissonAccumulator::new(Arc::clone(&c));
        acc.add_shifted_poisson(20.0, 3, 0.5);
        acc.add_point_mass(1, 1.5);
        acc.cumulate();
        let mut w = MarshalWriter::new(Vec::new());
        acc.marshal(&mut w).unwrap();
        let buf = w.into_inner();
        let back =
            StackedPoissonAccumulator::unmarshal(&mut MarshalReader::new(buf.as_slice()), c)
                .unwrap();
        assert_eq!(back, acc);
    }

    #[test]
    fn unmarshal_rejects_other_cache() {
        let mut acc = StackedPoissonAccumulator::new(cache());
        acc.add_point_mass(2, 1.0);
        let mut w = MarshalWriter::new(Vec::new());
        acc.marshal(&mut w).unwrap();
        let buf = w.into_inner();
        let other = Arc::new(
            PoissonCache::new(PoissonCacheConfig {
                mean_digits: 1,
                ..PoissonCacheConfig::compact()
            })
            .unwrap(),
        );
        let err = StackedPoissonAccumulator::unmarshal(&mut MarshalReader::new(buf.as_slice()), other)
            .unwrap_err();
        assert!(matches!(err, MarshalError::Malformed { .. }));
    }
}
