//! Benchmark profiles for the Oetas aftershock simulation engine.
//!
//! Provides pre-built scenarios for benchmarking:
//!
//! - [`reference_params`]: the M6, branch ratio 0.5, one-year scenario
//! - [`stress_params`]: a near-critical scenario with large catalogs
//! - [`reference_grid`]: the reference time-magnitude grid

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use oetas_core::{CatalogParams, Rupture};
use oetas_ensemble::{ConfigError, TimeMagGrid};
use oetas_sim::seed_rupture;

/// Reference benchmark profile: b = 1, p = 1.1, c = 0.01 day, one year,
/// branch ratio 0.5, generation size target 100.
pub fn reference_params() -> CatalogParams {
    let base = CatalogParams::default();
    CatalogParams::from_branch_ratio(0.5, base.tend - base.tbegin, base)
}

/// Stress profile: branch ratio 0.95 and a generation size target of
/// 2000, so catalogs reach tens of thousands of ruptures.
pub fn stress_params() -> CatalogParams {
    let base = CatalogParams {
        gen_size_target: 2000.0,
        ..CatalogParams::default()
    };
    CatalogParams::from_branch_ratio(0.95, base.tend - base.tbegin, base)
}

/// A single mainshock of magnitude `mag` at time zero.
pub fn mainshock(params: &CatalogParams, mag: f64) -> Vec<Rupture> {
    vec![seed_rupture(params, 0.0, mag)]
}

/// Time bins {0, 1, 7, 30, 365} days, magnitude bins {3, 4, 5, 6, 7, 10}.
pub fn reference_grid() -> Result<TimeMagGrid, ConfigError> {
    TimeMagGrid::new(
        vec![0.0, 1.0, 7.0, 30.0, 365.0],
        vec![3.0, 4.0, 5.0, 6.0, 7.0, 10.0],
    )
}
