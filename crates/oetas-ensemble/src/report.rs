//! Summary of an ensemble run.

use std::fmt;
use std::time::Duration;

use oetas_core::CatalogResult;

/// What [`run_ensemble`](crate::run_ensemble) did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnsembleReport {
    /// Catalogs simulated and scanned.
    pub catalogs_completed: usize,
    /// Catalogs per result code, indexed by [`CatalogResult::code`].
    pub result_counts: [usize; CatalogResult::COUNT],
    /// Ruptures stored across all catalogs, seeds included.
    pub total_ruptures: u64,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
    /// Whether the wall-clock budget stopped the run early.
    pub timed_out: bool,
    /// Number of worker threads used.
    pub workers: usize,
}

impl EnsembleReport {
    /// Empty report for a run on `workers` threads.
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    /// Tally one finished catalog.
    pub fn record(&mut self, result: CatalogResult, ruptures: usize) {
        self.catalogs_completed += 1;
        self.result_counts[usize::from(result.code())] += 1;
        self.total_ruptures += ruptures as u64;
    }

    /// Number of catalogs that finished with `result`.
    pub fn count(&self, result: CatalogResult) -> usize {
        self.result_counts[usize::from(result.code())]
    }

    /// Number of catalogs stopped by a cap or early stop.
    pub fn truncated(&self) -> usize {
        self.catalogs_completed - self.count(CatalogResult::Ok)
    }

    /// Mean stored ruptures per catalog, 0 for an empty run.
    pub fn mean_catalog_size(&self) -> f64 {
        if self.catalogs_completed == 0 {
            return 0.0;
        }
        self.total_ruptures as f64 / self.catalogs_completed as f64
    }
}

impl fmt::Display for EnsembleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} catalogs in {:.3}s on {} workers, mean size {:.1}",
            self.catalogs_completed,
            self.elapsed.as_secs_f64(),
            self.workers,
            self.mean_catalog_size()
        )?;
        for result in CatalogResult::ALL {
            let n = self.count(result);
            if n > 0 {
                write!(f, ", {result} {n}")?;
            }
        }
        if self.timed_out {
            write!(f, " (timed out)")?;
        }
        Ok(())
    }
}
