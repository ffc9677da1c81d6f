//! Stacked-Poisson cache configuration.

use std::io::{Read, Write};

use oetas_core::{MarshalError, MarshalReader, MarshalWriter};

use crate::error::CacheError;

/// Configuration for [`PoissonCache`](crate::PoissonCache).
///
/// The value ladder holds every integer below `10^value_digits`, then
/// `value_decades` further decades at `value_digits` significant digits.
/// The mean ladder runs from `10^-lowest_mean_decade` up to the top of the
/// value ladder at `mean_digits` significant digits.
#[derive(Clone, Debug, PartialEq)]
pub struct PoissonCacheConfig {
    /// Significant digits of the value ladder, `1..=6`.
    pub value_digits: u32,
    /// Number of sparse decades above the dense region, `1..=9`.
    pub value_decades: u32,
    /// Significant digits of the mean ladder, `1..=6`.
    pub mean_digits: u32,
    /// Smallest cached mean is `10^-lowest_mean_decade`, `0..=9`.
    pub lowest_mean_decade: u32,
    /// Cumulative mass below which a cached distribution is truncated.
    pub lower_cdf: f64,
    /// Cumulative mass above which a cached distribution is truncated.
    pub upper_cdf: f64,
}

impl PoissonCacheConfig {
    /// Default value-ladder precision.
    pub const DEFAULT_VALUE_DIGITS: u32 = 3;
    /// Default number of sparse value decades.
    pub const DEFAULT_VALUE_DECADES: u32 = 6;
    /// Default mean-ladder precision.
    pub const DEFAULT_MEAN_DIGITS: u32 = 3;
    /// Default lowest mean decade.
    pub const DEFAULT_LOWEST_MEAN_DECADE: u32 = 4;
    /// Default lower truncation: 0.01%.
    pub const DEFAULT_LOWER_CDF: f64 = 1.0e-4;
    /// Default upper truncation: 99.99%.
    pub const DEFAULT_UPPER_CDF: f64 = 1.0 - 1.0e-4;

    /// A small cache suitable for tests and demos.
    pub fn compact() -> Self {
        Self {
            value_digits: 2,
            value_decades: 4,
            mean_digits: 2,
            lowest_mean_decade: 3,
            ..Self::default()
        }
    }

    /// Check every setting.
    ///
    /// # Errors
    ///
    /// Returns the first out-of-range setting.
    pub fn validate(&self) -> Result<(), CacheError> {
        for (name, value, min, max) in [
            ("value_digits", self.value_digits, 1, 6),
            ("value_decades", self.value_decades, 1, 9),
            ("mean_digits", self.mean_digits, 1, 6),
            ("lowest_mean_decade", self.lowest_mean_decade, 0, 9),
        ] {
            if !(min..=max).contains(&value) {
                return Err(CacheError::OutOfRange {
                    name,
                    value,
                    min,
                    max,
                });
            }
        }
        let (lower, upper) = (self.lower_cdf, self.upper_cdf);
        if !(lower > 0.0 && lower < upper && upper < 1.0) {
            return Err(CacheError::BadCdfBounds { lower, upper });
        }
        Ok(())
    }

    const MARSHAL_NAME: &'static str = "PoissonCacheConfig";
    const MARSHAL_VERSION: u8 = 1;

    /// Write the configuration, which serves as the cache fingerprint.
    pub fn marshal<W: Write>(&self, w: &mut MarshalWriter<W>) -> Result<(), MarshalError> {
        w.begin_object(Self::MARSHAL_NAME, Self::MARSHAL_VERSION)?;
        w.write_u64("value_digits", u64::from(self.value_digits))?;
        w.write_u64("value_decades", u64::from(self.value_decades))?;
        w.write_u64("mean_digits", u64::from(self.mean_digits))?;
        w.write_u64("lowest_mean_decade", u64::from(self.lowest_mean_decade))?;
        w.write_f64("lower_cdf", self.lower_cdf)?;
        w.write_f64("upper_cdf", self.upper_cdf)?;
        w.end_object(Self::MARSHAL_NAME)
    }

    /// Read a configuration written by [`marshal`](Self::marshal).
    pub fn unmarshal<R: Read>(r: &mut MarshalReader<R>) -> Result<Self, MarshalError> {
        r.begin_object(Self::MARSHAL_NAME, Self::MARSHAL_VERSION)?;
        let small = |r: &mut MarshalReader<R>, name: &str| -> Result<u32, MarshalError> {
            let v = r.read_u64(name)?;
            u32::try_from(v).map_err(|_| MarshalError::Malformed {
                detail: format!("field '{name}': {v} out of range"),
            })
        };
        let config = Self {
            value_digits: small(r, "value_digits")?,
            value_decades: small(r, "value_decades")?,
            mean_digits: small(r, "mean_digits")?,
            lowest_mean_decade: small(r, "lowest_mean_decade")?,
            lower_cdf: r.read_f64("lower_cdf")?,
            upper_cdf: r.read_f64("upper_cdf")?,
        };
        r.end_object(Self::MARSHAL_NAME)?;
        Ok(config)
    }
}

impl Default for PoissonCacheConfig {
    fn default() -> Self {
        Self {
            value_digits: Self::DEFAULT_VALUE_DIGITS,
            value_decades: Self::DEFAULT_VALUE_DECADES,
            mean_digits: Self::DEFAULT_MEAN_DIGITS,
            lowest_mean_decade: Self::DEFAULT_LOWEST_MEAN_DECADE,
            lower_cdf: Self::DEFAULT_LOWER_CDF,
            upper_cdf: Self::DEFAULT_UPPER_CDF,
        }
    }
}
