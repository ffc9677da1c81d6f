//! Accumulator and readout interfaces consumed by the ensemble driver and
//! by forecast formatting.

use oetas_core::CatalogConsumer;

use crate::grid::TimeMagGrid;

/// A statistic built from many catalogs by concurrent consumers.
///
/// Lifecycle: [`begin_accumulation`](Self::begin_accumulation), any number
/// of consumers from [`make_consumer`](Self::make_consumer) each running
/// open/scan.../close sessions on their own thread, then
/// [`end_accumulation`](Self::end_accumulation) once every consumer is
/// closed. `make_consumer` may be called from any thread at any time, also
/// before `begin_accumulation`.
pub trait EnsembleAccumulator: Send + Sync {
    /// A consumer feeding this accumulator. The consumer belongs to one
    /// thread at a time and processes many catalogs.
    fn make_consumer(&self) -> Box<dyn CatalogConsumer + '_>;

    /// Discard previous results and prepare for up to `capacity` catalogs.
    ///
    /// # Panics
    ///
    /// Panics if a consumer session is open.
    fn begin_accumulation(&self, capacity: usize);

    /// Raise the number of catalogs that may be accumulated. Never lowers
    /// it.
    fn increase_capacity(&self, capacity: usize);

    /// Merge every partial result and make the readout available.
    ///
    /// # Panics
    ///
    /// Panics if a consumer session is open.
    fn end_accumulation(&self);
}

/// Read access to a finished time-magnitude forecast.
///
/// Arrays are indexed `[time_bin][mag_bin]` and hold cumulative values:
/// counts up to the end of the time bin, at or above the magnitude.
pub trait ForecastReadout {
    /// The forecast grid.
    fn grid(&self) -> &TimeMagGrid;

    /// Number of catalogs folded in.
    fn catalog_count(&self) -> usize;

    /// Per-cell fractile of the count distribution.
    fn get_fractile_array(&self, fraction: f64) -> Vec<Vec<u64>>;

    /// Per-cell probability of at least `xcount` events. Cells without
    /// data read 0.
    fn get_prob_occur_array(&self, xcount: u64) -> Vec<Vec<f64>>;

    /// Per-cell mean count.
    fn get_mean_array(&self) -> Vec<Vec<f64>>;

    /// Time boundaries.
    fn time_values(&self) -> &[f64] {
        self.grid().time_values()
    }

    /// Magnitude boundaries.
    fn mag_values(&self) -> &[f64] {
        self.grid().mag_values()
    }
}
