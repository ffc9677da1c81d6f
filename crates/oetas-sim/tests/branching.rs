//! Integration test: statistical behaviour of the branching process.
//!
//! Subcritical processes must conserve the expected total progeny of a
//! Galton-Watson process, supercritical ones must always end on a cap, and
//! a fixed (seed, stream) must reproduce a catalog bit for bit. A
//! generated catalog must replay through the scanner in full.

use std::cell::RefCell;
use std::rc::Rc;

use oetas_arena::{CatalogScanner, CatalogStorage, StorageConfig};
use oetas_core::{CatalogParams, CatalogResult, CatalogView, OEtasRng};
use oetas_sim::{expected_direct_children, seed_ruptures, CatalogGenerator};
use oetas_test_utils::fixtures::{galton_watson_params, scenario_params, seed_swarm};
use oetas_test_utils::{RecordingConsumer, ScanEvent, ScanLog};
use proptest::prelude::*;

fn storage() -> CatalogStorage {
    CatalogStorage::new(StorageConfig::default()).unwrap()
}

fn snapshot(store: &CatalogStorage) -> Vec<(usize, f64, f64, f64, i32)> {
    (0..store.gen_count())
        .flat_map(|i| (0..store.gen_size(i)).map(move |j| (i, j)))
        .map(|(i, j)| {
            let r = store.rup(i, j);
            (i, r.t_day, r.rup_mag, r.k_prod, r.rup_parent)
        })
        .collect()
}

#[test]
fn subcritical_total_matches_geometric_series() {
    let n = 0.5;
    let params = galton_watson_params(n);
    let seeds = seed_ruptures(&params, &[(0.0, 5.0)]);
    let mut store = storage();
    let mut rng = OEtasRng::seed_from_u64(0);
    let mut generator = CatalogGenerator::new();

    let runs = 2000;
    let mut total = 0usize;
    for k in 0..runs {
        rng.reseed(2024, k);
        let result = generator.generate(&mut store, &mut rng, &params, &seeds);
        assert_eq!(result, CatalogResult::Ok);
        total += store.cat_size();
    }
    let mean = total as f64 / runs as f64;
    let want = 1.0 / (1.0 - n);
    assert!((mean - want).abs() < 0.15, "mean total {mean}, want {want}");
}

#[test]
fn supercritical_always_hits_a_cap() {
    let params = CatalogParams {
        gen_count_max: 30,
        max_cat_size: 20_000,
        ..galton_watson_params(1.5)
    };
    let seeds = seed_swarm(&params, 50, 5.0);
    // Each seed must trigger over its whole kernel, or the swarm behaves
    // like a single ancestor and can die out.
    let first_gen = expected_direct_children(&params, &seeds, params.mref);
    assert!(first_gen > 70.0, "swarm expects {first_gen} children");
    let mut store = storage();
    let mut rng = OEtasRng::seed_from_u64(0);
    let mut generator = CatalogGenerator::new();

    for k in 0..20 {
        rng.reseed(7, k);
        let result = generator.generate(&mut store, &mut rng, &params, &seeds);
        assert_ne!(result, CatalogResult::Ok, "run {k} died out");
        assert_eq!(store.result_code(), result);
        assert!(store.stop_time() < params.tend);
    }
}

#[test]
fn storage_reuse_does_not_change_catalogs() {
    let params = scenario_params();
    let seeds = seed_ruptures(&params, &[(0.0, 6.0)]);
    let mut reused = storage();
    let mut generator = CatalogGenerator::new();
    let mut rng = OEtasRng::seed_from_u64(0);

    for k in 0..10 {
        rng.reseed(11, k);
        generator.generate(&mut reused, &mut rng, &params, &seeds);

        let mut fresh = storage();
        rng.reseed(11, k);
        CatalogGenerator::new().generate(&mut fresh, &mut rng, &params, &seeds);

        assert_eq!(snapshot(&reused), snapshot(&fresh), "catalog {k}");
        assert_eq!(reused.stop_time().to_bits(), fresh.stop_time().to_bits());
    }
}

#[test]
fn generated_catalog_replays_through_the_scanner() {
    let params = scenario_params();
    let seeds = seed_ruptures(&params, &[(0.0, 6.5)]);
    let mut store = storage();
    let mut rng = OEtasRng::seed_from_u64(0);
    rng.reseed(3, 0);
    CatalogGenerator::new().generate(&mut store, &mut rng, &params, &seeds);

    let log: ScanLog = Rc::new(RefCell::new(Vec::new()));
    let mut scanner = CatalogScanner::new();
    scanner.add_consumer(Box::new(
        RecordingConsumer::new(Rc::clone(&log)).with_sterile_floor(params.mref),
    ));
    scanner.open();
    scanner.scan_indexed(&store, &mut rng, 5);
    scanner.close();
    drop(scanner);

    let events = log.borrow();
    assert!(matches!(
        events[1],
        ScanEvent::BeginCatalog {
            catalog_index: 5,
            ..
        }
    ));
    let stored = events
        .iter()
        .filter(|e| matches!(e, ScanEvent::SeedRup(_) | ScanEvent::Rup(_)))
        .count();
    assert_eq!(stored, store.cat_size());

    // Only sterile children of the last generation follow its end.
    let last_end = events
        .iter()
        .rposition(|e| {
            matches!(
                e,
                ScanEvent::EndGeneration { .. } | ScanEvent::EndSeedGeneration
            )
        })
        .unwrap();
    assert!(events[last_end + 1..].iter().all(|e| matches!(
        e,
        ScanEvent::SterileRup(_) | ScanEvent::EndCatalog | ScanEvent::Close
    )));
    for e in events.iter() {
        if let ScanEvent::SterileRup(r) = e {
            assert!(r.rup_mag >= params.mref && r.rup_mag <= params.mag_min_hi);
            assert!(r.t_day >= params.tbegin && r.t_day <= params.tend);
            assert_eq!(r.k_prod, 0.0);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn fixed_stream_is_deterministic(seed in any::<u64>(), stream in 0u64..1000, mag in 4.0f64..7.0) {
        let params = scenario_params();
        let seeds = seed_ruptures(&params, &[(0.0, mag)]);
        let run = || {
            let mut store = storage();
            let mut rng = OEtasRng::seed_from_u64(0);
            rng.reseed(seed, stream);
            let result = CatalogGenerator::new().generate(&mut store, &mut rng, &params, &seeds);
            (result, store.stop_time().to_bits(), snapshot(&store))
        };
        prop_assert_eq!(run(), run());
    }
}
