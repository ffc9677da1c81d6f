//! Time-magnitude grid definition and cumulation.
//!
//! Time boundaries `tv[0..=T]` define `T` bins `(tv[i], tv[i+1]]`.
//! Magnitude boundaries `mv[0..M]` define `M` bins `[mv[j], mv[j+1])`, the
//! last one open-ended. Cells are stored time-major in flat arrays of
//! length `T * M`.
//!
//! A cumulative cell `(t, m)` counts events with time at most `tv[t+1]`
//! and magnitude at least `mv[m]`.

use std::io::{Read, Write};

use oetas_core::{MarshalError, MarshalReader, MarshalWriter};

use crate::error::ConfigError;

/// Validated bin boundaries of a forecast grid.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeMagGrid {
    time_values: Vec<f64>,
    mag_values: Vec<f64>,
}

impl TimeMagGrid {
    /// Minimum number of time boundaries (one bin).
    pub const MIN_TIME_VALUES: usize = 2;
    /// Minimum number of magnitude boundaries (one open-ended bin).
    pub const MIN_MAG_VALUES: usize = 1;

    /// Create a grid from time and magnitude boundaries.
    ///
    /// # Errors
    ///
    /// Fails if either array is too short, holds a non-finite value, or is
    /// not strictly increasing.
    pub fn new(time_values: Vec<f64>, mag_values: Vec<f64>) -> Result<Self, ConfigError> {
        check_axis("time", &time_values, Self::MIN_TIME_VALUES)?;
        check_axis("magnitude", &mag_values, Self::MIN_MAG_VALUES)?;
        Ok(Self {
            time_values,
            mag_values,
        })
    }

    /// Time boundaries.
    pub fn time_values(&self) -> &[f64] {
        &self.time_values
    }

    /// Magnitude boundaries.
    pub fn mag_values(&self) -> &[f64] {
        &self.mag_values
    }

    /// Number of time bins.
    pub fn time_bins(&self) -> usize {
        self.time_values.len() - 1
    }

    /// Number of magnitude bins.
    pub fn mag_bins(&self) -> usize {
        self.mag_values.len()
    }

    /// Number of cells.
    pub fn cell_count(&self) -> usize {
        self.time_bins() * self.mag_bins()
    }

    /// Flat index of cell `(t, m)`.
    #[inline]
    pub fn cell(&self, t: usize, m: usize) -> usize {
        t * self.mag_bins() + m
    }

    /// Lower edge of the grid's time range.
    pub fn time_begin(&self) -> f64 {
        self.time_values[0]
    }

    /// Upper edge of the grid's time range.
    pub fn time_end(&self) -> f64 {
        self.time_values[self.time_bins()]
    }

    /// Time bin holding `t_day`, if any.
    pub fn time_bin(&self, t_day: f64) -> Option<usize> {
        if !(t_day > self.time_begin() && t_day <= self.time_end()) {
            return None;
        }
        // First boundary at or above t_day closes the bin.
        Some(self.time_values.partition_point(|&v| v < t_day) - 1)
    }

    /// Magnitude bin holding `mag`, if any.
    pub fn mag_bin(&self, mag: f64) -> Option<usize> {
        let n = self.mag_values.partition_point(|&v| v <= mag);
        n.checked_sub(1)
    }

    /// Upper edge of magnitude bin `m`, with the last bin capped at `cap`.
    pub fn mag_upper(&self, m: usize, cap: f64) -> f64 {
        self.mag_values.get(m + 1).map_or(cap, |&v| v.min(cap))
    }

    /// Number of time bins lying entirely at or before `t_day`.
    pub fn bins_before(&self, t_day: f64) -> usize {
        self.time_values[1..].partition_point(|&v| v <= t_day)
    }

    /// Turn per-cell counts into cumulative counts in place: a running sum
    /// forward over time, then backward over magnitude.
    pub fn cumulate<T>(&self, cells: &mut [T])
    where
        T: Copy + std::ops::AddAssign,
    {
        debug_assert_eq!(cells.len(), self.cell_count());
        let (n_t, n_m) = (self.time_bins(), self.mag_bins());
        for t in 1..n_t {
            for m in 0..n_m {
                let prev = cells[self.cell(t - 1, m)];
                cells[self.cell(t, m)] += prev;
            }
        }
        for t in 0..n_t {
            for m in (0..n_m.saturating_sub(1)).rev() {
                let above = cells[self.cell(t, m + 1)];
                cells[self.cell(t, m)] += above;
            }
        }
    }

    /// Reshape a flat cell array into `[time][mag]` rows.
    pub fn to_rows<T: Copy>(&self, cells: &[T]) -> Vec<Vec<T>> {
        cells.chunks(self.mag_bins()).map(<[T]>::to_vec).collect()
    }

    const MARSHAL_NAME: &'static str = "TimeMagGrid";
    const MARSHAL_VERSION: u8 = 1;

    /// Write the boundaries.
    pub fn marshal<W: Write>(&self, w: &mut MarshalWriter<W>) -> Result<(), MarshalError> {
        w.begin_object(Self::MARSHAL_NAME, Self::MARSHAL_VERSION)?;
        w.write_f64_array("time_values", &self.time_values)?;
        w.write_f64_array("mag_values", &self.mag_values)?;
        w.end_object(Self::MARSHAL_NAME)
    }

    /// Read boundaries written by [`marshal`](Self::marshal), revalidating
    /// them.
    pub fn unmarshal<R: Read>(r: &mut MarshalReader<R>) -> Result<Self, MarshalError> {
        r.begin_object(Self::MARSHAL_NAME, Self::MARSHAL_VERSION)?;
        let time_values = r.read_f64_array("time_values")?;
        let mag_values = r.read_f64_array("mag_values")?;
        r.end_object(Self::MARSHAL_NAME)?;
        Self::new(time_values, mag_values).map_err(|e| MarshalError::Malformed {
            detail: e.to_string(),
        })
    }
}

fn check_axis(axis: &'static str, values: &[f64], min: usize) -> Result<(), ConfigError> {
    if values.len() < min {
        return Err(ConfigError::TooFewBoundaries {
            axis,
            len: values.len(),
            min,
        });
    }
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(ConfigError::NonFiniteBoundary { axis, index });
    }
    if let Some(i) = values.windows(2).position(|w| w[1] <= w[0]) {
        return Err(ConfigError::NotIncreasing { axis, index: i + 1 });
    }
    Ok(())
}
