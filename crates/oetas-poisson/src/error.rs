//! Cache configuration errors.

use std::error::Error;
use std::fmt;

/// Errors detected by [`PoissonCacheConfig::validate()`](crate::PoissonCacheConfig::validate).
#[derive(Clone, Debug, PartialEq)]
pub enum CacheError {
    /// An integer setting lies outside its supported range.
    OutOfRange {
        /// Name of the setting.
        name: &'static str,
        /// The rejected value.
        value: u32,
        /// Smallest accepted value.
        min: u32,
        /// Largest accepted value.
        max: u32,
    },
    /// The CDF truncation bounds are not `0 < lower < upper < 1`.
    BadCdfBounds {
        /// Lower truncation bound.
        lower: f64,
        /// Upper truncation bound.
        upper: f64,
    },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange {
                name,
                value,
                min,
                max,
            } => write!(f, "{name} = {value} outside supported range {min}..={max}"),
            Self::BadCdfBounds { lower, upper } => write!(
                f,
                "CDF truncation bounds must satisfy 0 < lower < upper < 1, got {lower} and {upper}"
            ),
        }
    }
}

impl Error for CacheError {}
