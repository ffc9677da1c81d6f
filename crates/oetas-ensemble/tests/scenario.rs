//! Integration test: the reference M6 aftershock scenario end to end.
//!
//! Runs 1000 catalogs through the worker pool into both accumulators and
//! checks reproducibility, the shape of the cumulative grids, and
//! agreement between the two readouts.

use std::sync::Arc;

use oetas_core::CatalogResult;
use oetas_ensemble::{
    run_ensemble, AccumulationModes, EnsembleConfig, ForecastReadout, InfillMode,
    TimeMagCountAccumulator, TimeMagGrid, TimeMagStackedAccumulator,
};
use oetas_poisson::{PoissonCache, PoissonCacheConfig};
use oetas_test_utils::fixtures::{
    mainshock, scenario_params, SCENARIO_MAG_VALUES, SCENARIO_MAINSHOCK_MAG,
    SCENARIO_TIME_VALUES,
};

const CATALOGS: usize = 1000;

fn scenario_grid() -> TimeMagGrid {
    TimeMagGrid::new(SCENARIO_TIME_VALUES.to_vec(), SCENARIO_MAG_VALUES.to_vec()).unwrap()
}

fn config(workers: usize) -> EnsembleConfig {
    EnsembleConfig {
        workers: Some(workers),
        seed: 20_240_101,
        ..EnsembleConfig::with_catalog_count(CATALOGS)
    }
}

fn run_counts(workers: usize, infill: InfillMode) -> TimeMagCountAccumulator {
    let params = scenario_params();
    let seeds = mainshock(&params, SCENARIO_MAINSHOCK_MAG);
    let acc = TimeMagCountAccumulator::new(scenario_grid(), infill);
    let report = run_ensemble(&config(workers), &params, &seeds, &[&acc]).unwrap();
    assert_eq!(report.catalogs_completed, CATALOGS);
    assert!(!report.timed_out);
    acc
}

#[test]
fn fixed_seed_reproduces_the_forecast() {
    let a = run_counts(2, InfillMode::Poisson);
    let b = run_counts(2, InfillMode::Poisson);
    assert_eq!(a.forecast(), b.forecast());

    let median = a.get_fractile_array(0.5);
    assert_eq!(median, b.get_fractile_array(0.5));
    // Roughly 19 direct M3+ aftershocks are expected on day one.
    assert!(median[0][0] > 5, "day-one median {}", median[0][0]);
}

#[test]
fn large_aftershock_is_possible_but_not_certain() {
    let acc = run_counts(4, InfillMode::Poisson);
    let p = acc.get_prob_occur_array(1);
    let p_m6_year = p[3][3];
    assert!(p_m6_year > 0.0 && p_m6_year < 1.0, "P = {p_m6_year}");
    assert!(p_m6_year < 0.5);
}

#[test]
fn cumulative_grids_are_monotone() {
    let acc = run_counts(4, InfillMode::Scale);
    let grid = acc.grid().clone();
    for f in [0.0, 0.25, 0.5, 0.75, 1.0] {
        let rows = acc.get_fractile_array(f);
        for t in 0..grid.time_bins() {
            for m in 0..grid.mag_bins() {
                if m + 1 < grid.mag_bins() {
                    assert!(rows[t][m] >= rows[t][m + 1], "f={f} t={t} m={m}");
                }
                if t > 0 {
                    assert!(rows[t][m] >= rows[t - 1][m], "f={f} t={t} m={m}");
                }
            }
        }
    }
    let low = acc.get_fractile_array(0.0);
    let high = acc.get_fractile_array(1.0);
    let forecast = acc.forecast().unwrap();
    for t in 0..grid.time_bins() {
        for m in 0..grid.mag_bins() {
            let values = forecast.cell_values(t, m);
            assert_eq!(low[t][m], values[0]);
            assert_eq!(high[t][m], values[values.len() - 1]);
        }
    }
}

#[test]
fn both_accumulators_agree_without_infill() {
    let params = scenario_params();
    let seeds = mainshock(&params, SCENARIO_MAINSHOCK_MAG);
    let cache = Arc::new(PoissonCache::new(PoissonCacheConfig::compact()).unwrap());
    let counts = TimeMagCountAccumulator::new(scenario_grid(), InfillMode::None);
    let stacked =
        TimeMagStackedAccumulator::new(scenario_grid(), cache, AccumulationModes::default());
    let report = run_ensemble(&config(3), &params, &seeds, &[&counts, &stacked]).unwrap();
    assert_eq!(stacked.catalog_count(), report.catalogs_completed);
    assert_eq!(
        report.result_counts.iter().sum::<usize>(),
        report.catalogs_completed
    );
    assert!(report.count(CatalogResult::Ok) > 0);

    // Counts below 100 fall in exact buckets, so both readouts coincide.
    let forecast = counts.forecast().unwrap();
    let count_means = counts.get_mean_array();
    let stacked_means = stacked.get_mean_array();
    let fractions = [0.1, 0.5, 0.9];
    let count_fractiles: Vec<_> = fractions.iter().map(|&f| counts.get_fractile_array(f)).collect();
    let stacked_fractiles: Vec<_> =
        fractions.iter().map(|&f| stacked.get_fractile_array(f)).collect();
    let grid = scenario_grid();
    let mut compared = 0;
    for t in 0..grid.time_bins() {
        for m in 0..grid.mag_bins() {
            let values = forecast.cell_values(t, m);
            if values[values.len() - 1] >= 100 {
                continue;
            }
            compared += 1;
            let (a, b) = (count_means[t][m], stacked_means[t][m]);
            assert!((a - b).abs() <= 1e-9 * a.max(1.0), "cell ({t}, {m}): {a} vs {b}");
            for i in 0..fractions.len() {
                assert_eq!(count_fractiles[i][t][m], stacked_fractiles[i][t][m]);
            }
        }
    }
    assert!(compared > 0);
}
