//! Aftershock forecast for a magnitude 6 mainshock.
//!
//! Demonstrates:
//!   1. Deriving catalog parameters from a branch ratio
//!   2. Defining a time-magnitude grid
//!   3. Running a 1000-catalog ensemble into both accumulators
//!   4. Reading medians and exceedance probabilities
//!
//! Run with:
//!   RUST_LOG=oetas_ensemble=debug cargo run --example forecast

use std::sync::Arc;

use oetas_core::CatalogParams;
use oetas_ensemble::{
    run_ensemble, AccumulationModes, ClipPolicy, EnsembleConfig, ForecastReadout, InfillMode,
    OutfillMode, TimeMagCountAccumulator, TimeMagGrid, TimeMagStackedAccumulator,
};
use oetas_poisson::{PoissonCache, PoissonCacheConfig};
use oetas_sim::seed_rupture;
use tracing_subscriber::EnvFilter;

// ─── Scenario ───────────────────────────────────────────────────

const MAINSHOCK_MAG: f64 = 6.0;
const BRANCH_RATIO: f64 = 0.5;
const CATALOGS: usize = 1000;
const TIME_VALUES: [f64; 5] = [0.0, 1.0, 7.0, 30.0, 365.0];
const MAG_VALUES: [f64; 6] = [3.0, 4.0, 5.0, 6.0, 7.0, 10.0];

fn print_rows<T: std::fmt::Display>(title: &str, grid: &TimeMagGrid, rows: &[Vec<T>]) {
    println!("\n{title}");
    let header: Vec<String> = grid.mag_values().iter().map(|m| format!("M>={m:<5}")).collect();
    println!("  {:>8}  {}", "days", header.join(" "));
    for (t, row) in rows.iter().enumerate() {
        let cells: Vec<String> = row.iter().map(|v| format!("{v:<8.3}")).collect();
        println!("  {:>8}  {}", grid.time_values()[t + 1], cells.join(" "));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Operational ETAS forecast ===");
    let base = CatalogParams::default();
    let params = CatalogParams::from_branch_ratio(BRANCH_RATIO, base.tend - base.tbegin, base);
    let seeds = vec![seed_rupture(&params, 0.0, MAINSHOCK_MAG)];
    println!("Mainshock M{MAINSHOCK_MAG}, branch ratio {BRANCH_RATIO}, ten_a {:.4e}", params.ten_a);

    let grid = TimeMagGrid::new(TIME_VALUES.to_vec(), MAG_VALUES.to_vec())?;
    let cache = Arc::new(PoissonCache::new(PoissonCacheConfig::default())?);
    let counts = TimeMagCountAccumulator::new(grid.clone(), InfillMode::Poisson);
    let stacked = TimeMagStackedAccumulator::new(
        grid.clone(),
        cache,
        AccumulationModes {
            infill: InfillMode::Poisson,
            outfill: OutfillMode::PdfDirect,
            clip: ClipPolicy::Range,
        },
    );

    let config = EnsembleConfig::with_catalog_count(CATALOGS);
    let report = run_ensemble(&config, &params, &seeds, &[&counts, &stacked])?;
    println!("{report}");

    print_rows("Median count (sorted catalogs):", &grid, &counts.get_fractile_array(0.5));
    print_rows("Median count (stacked):", &grid, &stacked.get_fractile_array(0.5));
    print_rows("P(at least one):", &grid, &counts.get_prob_occur_array(1));
    print_rows("Mean count (stacked):", &grid, &stacked.get_mean_array());
    Ok(())
}
