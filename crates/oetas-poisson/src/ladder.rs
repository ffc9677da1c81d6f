//! Geometric value and mean ladders.
//!
//! The value ladder is the set of representative counts a stacked
//! distribution can hold: every integer below `10^digits`, then each
//! further decade at `digits` significant digits. Bucket `i` covers the
//! integers in `[split[i-1], split[i])`, where `split[i]` is the rounded
//! midpoint of values `i` and `i+1`; the last bucket is open-ended.
//!
//! The mean ladder is the set of Poisson means whose distributions are
//! cached, also at a fixed number of significant digits per decade.

/// Representative values and the split points between their buckets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueLadder {
    values: Vec<u64>,
    splits: Vec<u64>,
}

impl ValueLadder {
    /// Build the ladder with `digits` significant digits and `decades`
    /// sparse decades above the dense region.
    pub fn new(digits: u32, decades: u32) -> Self {
        let dense = 10u64.pow(digits);
        let low_mantissa = 10u64.pow(digits - 1);
        let mut values: Vec<u64> = (0..dense).collect();
        let mut scale = 10u64;
        for _ in 0..decades {
            values.extend((low_mantissa..dense).map(|m| m * scale));
            scale *= 10;
        }
        let splits = values.windows(2).map(|w| (w[0] + w[1] + 1) / 2).collect();
        Self { values, splits }
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the ladder is empty. Never true for a constructed ladder.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Representative value of bucket `i`.
    #[inline]
    pub fn value(&self, i: usize) -> u64 {
        self.values[i]
    }

    /// All representative values.
    pub fn values(&self) -> &[u64] {
        &self.values
    }

    /// Split points: `splits()[i]` is the first integer above bucket `i`.
    pub fn splits(&self) -> &[u64] {
        &self.splits
    }

    /// Largest representative value.
    pub fn max_value(&self) -> u64 {
        self.values.last().copied().unwrap_or(0)
    }

    /// Bucket containing the integer `v`.
    #[inline]
    pub fn bucket(&self, v: u64) -> usize {
        self.splits.partition_point(|&s| s <= v)
    }
}

/// Representative Poisson means, strictly increasing.
#[derive(Clone, Debug, PartialEq)]
pub struct MeanLadder {
    means: Vec<f64>,
}

impl MeanLadder {
    /// Build the ladder from `10^-lowest_decade` up to the largest mean not
    /// above `max_value`, at `digits` significant digits.
    pub fn new(digits: u32, lowest_decade: u32, max_value: u64) -> Self {
        let low_mantissa = 10u64.pow(digits - 1);
        let high_mantissa = 10u64.pow(digits);
        let top = max_value as f64;
        let mut means = Vec::new();
        let mut exponent = -(lowest_decade as i32) - (digits as i32 - 1);
        'decades: loop {
            // Dividing by an exact power of ten keeps each mean the closest
            // double to its decimal value.
            let scale = 10f64.powi(exponent.abs());
            for m in low_mantissa..high_mantissa {
                let mean = if exponent < 0 {
                    m as f64 / scale
                } else {
                    m as f64 * scale
                };
                if mean > top {
                    break 'decades;
                }
                means.push(mean);
            }
            exponent += 1;
        }
        Self { means }
    }

    /// Number of cached means.
    pub fn len(&self) -> usize {
        self.means.len()
    }

    /// Whether the ladder is empty.
    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }

    /// Mean at index `i`.
    #[inline]
    pub fn mean(&self, i: usize) -> f64 {
        self.means[i]
    }

    /// Index of the largest cached mean not above `lambda`, or `None` if
    /// `lambda` is below the smallest cached mean.
    #[inline]
    pub fn floor_index(&self, lambda: f64) -> Option<usize> {
        self.means.partition_point(|&m| m <= lambda).checked_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn dense_then_sparse() {
        let ladder = ValueLadder::new(2, 2);
        assert_eq!(&ladder.values()[..3], &[0, 1, 2]);
        assert_eq!(ladder.value(99), 99);
        assert_eq!(ladder.value(100), 100);
        assert_eq!(ladder.value(101), 110);
        assert_eq!(ladder.value(190), 1000);
        assert_eq!(ladder.max_value(), 9900);
        assert_eq!(ladder.len(), 100 + 90 + 90);
    }

    #[test]
    fn dense_values_map_to_themselves() {
        let ladder = ValueLadder::new(3, 1);
        for v in 0..1000 {
            assert_eq!(ladder.value(ladder.bucket(v)), v);
        }
    }

    #[test]
    fn sparse_values_round_to_nearest() {
        let ladder = ValueLadder::new(2, 2);
        assert_eq!(ladder.value(ladder.bucket(104)), 100);
        assert_eq!(ladder.value(ladder.bucket(105)), 110);
        assert_eq!(ladder.value(ladder.bucket(1_000_000)), 9900);
    }

    #[test]
    fn mean_ladder_floor() {
        let means = MeanLadder::new(2, 2, 1000);
        assert_eq!(means.mean(0), 0.01);
        assert_eq!(means.floor_index(0.001), None);
        let i = means.floor_index(3.14).unwrap();
        assert_eq!(means.mean(i), 3.1);
        assert!(means.mean(means.len() - 1) <= 1000.0);
    }

    #[test]
    fn mean_ladder_stops_at_the_bound() {
        let exact = MeanLadder::new(2, 2, 1000);
        assert_eq!(exact.mean(exact.len() - 1), 1000.0);
        // The next step, 1100, lies above the bound and is left out.
        let between = MeanLadder::new(2, 2, 1050);
        assert_eq!(between.len(), exact.len());
        assert_eq!(between.mean(between.len() - 1), 1000.0);
    }

    proptest! {
        #[test]
        fn spacing_never_decreases(digits in 1u32..5, decades in 1u32..5) {
            let ladder = ValueLadder::new(digits, decades);
            let gaps: Vec<u64> = ladder.values().windows(2).map(|w| w[1] - w[0]).collect();
            for w in gaps.windows(2) {
                prop_assert!(w[0] <= w[1]);
            }
        }

        #[test]
        fn bucket_contains_its_value(digits in 1u32..4, decades in 1u32..4, v in 0u64..10_000_000) {
            let ladder = ValueLadder::new(digits, decades);
            let i = ladder.bucket(v);
            prop_assert_eq!(ladder.bucket(ladder.value(i)), i);
            if i > 0 {
                prop_assert!(v >= ladder.splits()[i - 1]);
            }
            if i + 1 < ladder.len() {
                prop_assert!(v < ladder.splits()[i]);
            }
        }

        #[test]
        fn means_strictly_increase(digits in 1u32..4, lowest in 0u32..5) {
            let means = MeanLadder::new(digits, lowest, 100_000);
            for i in 1..means.len() {
                prop_assert!(means.mean(i) > means.mean(i - 1));
            }
        }
    }
}
