//! Integration test: infill and clip strategies end to end through the
//! stacked accumulator.
//!
//! Sterile infill is checked against a run without infill. Clip policies
//! are checked against a replay that generates the same catalogs, filters
//! them by acceptance and stacks the survivors under a policy that accepts
//! everything.

use std::sync::Arc;

use oetas_arena::{CatalogScanner, CatalogStorage, StorageConfig};
use oetas_core::{CatalogParams, CatalogResult, CatalogView, OEtasRng};
use oetas_ensemble::{
    run_ensemble, AccumulationModes, ClipPolicy, EnsembleAccumulator, EnsembleConfig,
    ForecastReadout, InfillMode, Observation, OutfillMode, TimeMagGrid, TimeMagStackedAccumulator,
};
use oetas_poisson::{PoissonCache, PoissonCacheConfig};
use oetas_sim::CatalogGenerator;
use oetas_test_utils::fixtures::{mainshock, scenario_params, SCENARIO_MAINSHOCK_MAG};

const CATALOGS: usize = 300;
const FRACTILES: [f64; 4] = [0.025, 0.5, 0.9, 0.975];

fn cache() -> Arc<PoissonCache> {
    Arc::new(PoissonCache::new(PoissonCacheConfig::compact()).unwrap())
}

fn config(workers: usize) -> EnsembleConfig {
    EnsembleConfig {
        workers: Some(workers),
        seed: 7_700_123,
        ..EnsembleConfig::with_catalog_count(CATALOGS)
    }
}

fn run(params: &CatalogParams, accumulators: &[&TimeMagStackedAccumulator]) {
    let seeds = mainshock(params, SCENARIO_MAINSHOCK_MAG);
    let accs: Vec<&dyn EnsembleAccumulator> =
        accumulators.iter().map(|&a| a as &dyn EnsembleAccumulator).collect();
    let report = run_ensemble(&config(3), params, &seeds, &accs).unwrap();
    assert_eq!(report.catalogs_completed, CATALOGS);
}

fn assert_same_readout(a: &dyn ForecastReadout, b: &dyn ForecastReadout) {
    assert_eq!(a.catalog_count(), b.catalog_count());
    for f in FRACTILES {
        assert_eq!(a.get_fractile_array(f), b.get_fractile_array(f), "fractile {f}");
    }
    assert_eq!(a.get_prob_occur_array(1), b.get_prob_occur_array(1));
    assert_eq!(a.get_mean_array(), b.get_mean_array());
}

// ── Sterile infill ──────────────────────────────────────────────

/// Every generation is simulated down to M4.5 only.
fn coarse_params() -> CatalogParams {
    scenario_params()
        .with_time_range(0.0, 30.0)
        .with_mag_range(4.5, 4.5, 9.5)
}

fn coarse_grid() -> TimeMagGrid {
    TimeMagGrid::new(vec![0.0, 1.0, 7.0, 30.0], vec![3.0, 4.0, 5.0, 6.0, 10.0]).unwrap()
}

fn stacked_with_infill(cache: &Arc<PoissonCache>, infill: InfillMode) -> TimeMagStackedAccumulator {
    TimeMagStackedAccumulator::new(
        coarse_grid(),
        Arc::clone(cache),
        AccumulationModes {
            infill,
            ..AccumulationModes::default()
        },
    )
}

#[test]
fn sterile_infill_fills_in_the_unsimulated_magnitudes() {
    let cache = cache();
    let params = coarse_params();
    let plain = stacked_with_infill(&cache, InfillMode::None);
    let sterile = stacked_with_infill(&cache, InfillMode::Sterile);
    // Sterile ruptures reach every consumer of a scan, so each mode gets a
    // run of its own over the same catalogs.
    run(&params, &[&plain]);
    run(&params, &[&sterile]);
    assert_eq!(plain.catalog_count(), CATALOGS);
    assert_eq!(sterile.catalog_count(), CATALOGS);

    let plain_median = plain.get_fractile_array(0.5);
    let sterile_median = sterile.get_fractile_array(0.5);
    // Roughly 19 direct M3+ aftershocks on day one, only a few of them
    // M4.5+.
    assert!(
        sterile_median[0][0] > 5,
        "day-one sterile median {}",
        sterile_median[0][0]
    );
    assert!(sterile_median[0][0] > plain_median[0][0]);

    let plain_mean = plain.get_mean_array();
    let sterile_mean = sterile.get_mean_array();
    for f in FRACTILES {
        let lo = plain.get_fractile_array(f);
        let hi = sterile.get_fractile_array(f);
        for t in 0..3 {
            // M3+ and M4+ gain the sterile children.
            for m in 0..2 {
                assert!(hi[t][m] >= lo[t][m], "fractile {f} cell ({t}, {m})");
            }
            // Sterile children all lie below M4.5, so M5+ is untouched.
            for m in 2..5 {
                assert_eq!(hi[t][m], lo[t][m], "fractile {f} cell ({t}, {m})");
            }
        }
    }
    for t in 0..3 {
        assert!(sterile_mean[t][0] > plain_mean[t][0]);
        assert_eq!(sterile_mean[t][2], plain_mean[t][2]);
    }
}

// ── Clip policies ───────────────────────────────────────────────

/// Early stops from events above M5, most of them in the first days.
fn early_stop_params() -> CatalogParams {
    CatalogParams {
        mag_excess: 4.5,
        ..scenario_params()
            .with_time_range(0.0, 30.0)
            .with_mag_range(3.0, 4.5, 5.0)
    }
}

/// A grid that starts one day after the mainshock.
fn late_grid() -> TimeMagGrid {
    TimeMagGrid::new(vec![1.0, 7.0, 30.0], vec![3.0, 4.0, 5.0]).unwrap()
}

fn stacked_with_clip(cache: &Arc<PoissonCache>, clip: ClipPolicy) -> TimeMagStackedAccumulator {
    TimeMagStackedAccumulator::new(
        late_grid(),
        Arc::clone(cache),
        AccumulationModes {
            infill: InfillMode::None,
            outfill: OutfillMode::Omit,
            clip,
        },
    )
}

/// Regenerate the ensemble's catalogs one by one and stack those `policy`
/// accepts into `oracle`, keeping their catalog indices. Returns the
/// number of accepted catalogs.
fn replay_accepted(
    params: &CatalogParams,
    policy: ClipPolicy,
    oracle: &TimeMagStackedAccumulator,
) -> usize {
    let grid = late_grid();
    let seeds = mainshock(params, SCENARIO_MAINSHOCK_MAG);
    let mut storage = CatalogStorage::new(StorageConfig::default()).unwrap();
    let mut generator = CatalogGenerator::new();
    let mut rng = OEtasRng::seed_from_u64(0);
    let mut scanner = CatalogScanner::new();
    oracle.begin_accumulation(CATALOGS);
    scanner.add_consumer(oracle.make_consumer());
    scanner.open();
    let mut accepted = 0;
    for k in 0..CATALOGS {
        rng.reseed(config(1).seed, k as u64);
        generator.generate(&mut storage, &mut rng, params, &seeds);
        if Observation::new(&grid, storage.stop_time(), policy).accepted {
            scanner.scan_indexed(&storage, &mut rng, k);
            accepted += 1;
        }
    }
    scanner.close();
    drop(scanner);
    oracle.end_accumulation();
    accepted
}

#[test]
fn some_catalogs_stop_inside_the_window() {
    let params = early_stop_params();
    let seeds = mainshock(&params, SCENARIO_MAINSHOCK_MAG);
    let mut storage = CatalogStorage::new(StorageConfig::default()).unwrap();
    let mut generator = CatalogGenerator::new();
    let mut rng = OEtasRng::seed_from_u64(0);
    let mut before_grid = 0;
    let mut complete = 0;
    for k in 0..CATALOGS {
        rng.reseed(config(1).seed, k as u64);
        let result = generator.generate(&mut storage, &mut rng, &params, &seeds);
        let stop = storage.stop_time();
        if result == CatalogResult::EarlyStop && stop <= 1.0 {
            before_grid += 1;
        }
        if stop >= params.tend {
            complete += 1;
        }
    }
    // Both clip scenarios below need accepted and rejected catalogs.
    assert!(before_grid > 0, "no catalog stopped before the grid");
    assert!(complete > 0, "every catalog stopped early");
}

#[test]
fn range_policy_stacks_exactly_the_catalogs_it_observes() {
    let cache = cache();
    let params = early_stop_params();
    let range = stacked_with_clip(&cache, ClipPolicy::Range);
    let any = stacked_with_clip(&cache, ClipPolicy::Any);
    run(&params, &[&range, &any]);

    let oracle = stacked_with_clip(&cache, ClipPolicy::Any);
    let accepted = replay_accepted(&params, ClipPolicy::Range, &oracle);
    assert!(accepted < CATALOGS);
    assert_eq!(range.catalog_count(), accepted);
    assert_eq!(any.catalog_count(), CATALOGS);
    assert_same_readout(&range, &oracle);

    // A catalog that stopped before the grid puts no weight in any cell
    // under omitted outfill, so accepting it changes only the count.
    assert!(range.catalog_count() < any.catalog_count());
    for f in FRACTILES {
        assert_eq!(range.get_fractile_array(f), any.get_fractile_array(f), "fractile {f}");
    }
}

#[test]
fn entire_clip_policy_stacks_only_catalogs_reaching_the_last_bin() {
    let cache = cache();
    let params = early_stop_params();
    let entire = stacked_with_clip(&cache, ClipPolicy::EntireClip);
    let range = stacked_with_clip(&cache, ClipPolicy::Range);
    run(&params, &[&entire, &range]);

    // Both policies of the pair discard the partial last bin.
    let oracle = stacked_with_clip(&cache, ClipPolicy::AnyClip);
    let accepted = replay_accepted(&params, ClipPolicy::EntireClip, &oracle);
    assert!(accepted > 0);
    assert_eq!(entire.catalog_count(), accepted);
    assert!(entire.catalog_count() <= range.catalog_count());
    assert_same_readout(&entire, &oracle);

    for f in FRACTILES {
        let fr = entire.get_fractile_array(f);
        for m in 0..3 {
            assert!(fr[0][m] <= fr[1][m], "fractile {f} over time at M{}", 3 + m);
        }
        for row in &fr {
            assert!(row.windows(2).all(|w| w[0] >= w[1]), "fractile {f} over magnitude");
        }
    }
}
