//! Worker-pool ensemble driver.
//!
//! Each worker thread owns a catalog storage, a generator, a random
//! generator and a scanner holding one consumer per accumulator. Workers
//! claim catalog indices from a shared counter until the ensemble is
//! exhausted or the wall-clock budget elapses, and report each finished
//! catalog to the calling thread over a channel.
//!
//! Catalog `k` is generated and scanned from random stream `k` of the base
//! seed and is scanned as catalog `k`, so neither the catalogs of a run nor
//! the order in which accumulators merge them depend on which worker
//! claimed them.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use crossbeam_channel::Sender;
use oetas_arena::{CatalogScanner, CatalogStorage};
use oetas_core::{CatalogParams, CatalogResult, CatalogView, OEtasRng, Rupture};
use oetas_sim::CatalogGenerator;
use tracing::{debug, info, warn};

use crate::accumulator::EnsembleAccumulator;
use crate::config::EnsembleConfig;
use crate::error::ConfigError;
use crate::report::EnsembleReport;

/// One finished catalog, sent from a worker to the driver.
struct CatalogDone {
    result: CatalogResult,
    ruptures: usize,
}

/// State shared by every worker of one run.
struct Shared<'a> {
    config: &'a EnsembleConfig,
    params: &'a CatalogParams,
    seeds: &'a [Rupture],
    accumulators: &'a [&'a dyn EnsembleAccumulator],
    deadline: Option<Instant>,
    next_catalog: AtomicUsize,
    timed_out: AtomicBool,
    abort: AtomicBool,
}

impl Shared<'_> {
    /// Claim the next catalog index, or `None` when the worker should stop.
    fn claim(&self) -> Option<usize> {
        if self.abort.load(Ordering::Acquire) {
            return None;
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            self.timed_out.store(true, Ordering::Release);
            return None;
        }
        let k = self.next_catalog.fetch_add(1, Ordering::Relaxed);
        (k < self.config.catalog_count).then_some(k)
    }
}

/// Simulate `config.catalog_count` catalogs descending from `seeds` and
/// fold every one into each accumulator.
///
/// Calls `begin_accumulation(catalog_count)` on each accumulator before
/// any catalog is simulated and `end_accumulation` after every worker has
/// finished, including when the budget cut the run short.
///
/// # Errors
///
/// Configuration errors are returned before any accumulator is touched.
/// [`ConfigError::ThreadSpawnFailed`] is returned if a worker thread
/// cannot be started; workers already running are stopped and the
/// accumulators are still ended.
///
/// # Panics
///
/// Re-raises a panic from any worker thread.
pub fn run_ensemble(
    config: &EnsembleConfig,
    params: &CatalogParams,
    seeds: &[Rupture],
    accumulators: &[&dyn EnsembleAccumulator],
) -> Result<EnsembleReport, ConfigError> {
    config.validate()?;
    params.validate()?;
    let workers = config.resolved_worker_count();
    let storages = (0..workers)
        .map(|_| CatalogStorage::new(config.storage.clone()))
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        catalogs = config.catalog_count,
        workers,
        seeds = seeds.len(),
        accumulators = accumulators.len(),
        seed = config.seed,
        "ensemble started"
    );
    for acc in accumulators {
        acc.begin_accumulation(config.catalog_count);
    }

    let start = Instant::now();
    let shared = Shared {
        config,
        params,
        seeds,
        accumulators,
        deadline: config.budget.map(|b| start + b),
        next_catalog: AtomicUsize::new(0),
        timed_out: AtomicBool::new(false),
        abort: AtomicBool::new(false),
    };
    let mut report = EnsembleReport::new(workers);
    let (tx, rx) = crossbeam_channel::unbounded::<CatalogDone>();

    let spawn_error = thread::scope(|s| {
        let mut handles = Vec::with_capacity(workers);
        let mut spawn_error = None;
        for (i, storage) in storages.into_iter().enumerate() {
            let tx = tx.clone();
            let shared = &shared;
            let spawned = thread::Builder::new()
                .name(format!("oetas-worker-{i}"))
                .spawn_scoped(s, move || worker_loop(shared, storage, tx));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    shared.abort.store(true, Ordering::Release);
                    spawn_error = Some(ConfigError::ThreadSpawnFailed {
                        reason: e.to_string(),
                    });
                    break;
                }
            }
        }
        // Close our sender so the receive loop ends with the last worker.
        drop(tx);

        for done in &rx {
            report.record(done.result, done.ruptures);
            if report.catalogs_completed % config.progress_interval == 0 {
                debug!(
                    completed = report.catalogs_completed,
                    total = config.catalog_count,
                    truncated = report.truncated(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "ensemble progress"
                );
            }
        }
        for handle in handles {
            if let Err(payload) = handle.join() {
                std::panic::resume_unwind(payload);
            }
        }
        spawn_error
    });

    for acc in accumulators {
        acc.end_accumulation();
    }
    report.elapsed = start.elapsed();
    report.timed_out = shared.timed_out.load(Ordering::Acquire);

    if let Some(e) = spawn_error {
        warn!(error = %e, completed = report.catalogs_completed, "ensemble aborted");
        return Err(e);
    }
    if report.timed_out {
        warn!(
            completed = report.catalogs_completed,
            requested = config.catalog_count,
            budget_ms = config.budget.map_or(0, |b| b.as_millis() as u64),
            "ensemble budget elapsed"
        );
    }
    info!(
        completed = report.catalogs_completed,
        truncated = report.truncated(),
        ruptures = report.total_ruptures,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "ensemble finished"
    );
    Ok(report)
}

/// Body of one worker thread.
fn worker_loop(shared: &Shared<'_>, mut storage: CatalogStorage, tx: Sender<CatalogDone>) {
    let mut generator = CatalogGenerator::new();
    let mut rng = OEtasRng::seed_from_u64(shared.config.seed);
    let mut scanner = CatalogScanner::new();
    for acc in shared.accumulators {
        scanner.add_consumer(acc.make_consumer());
    }
    scanner.open();
    while let Some(k) = shared.claim() {
        rng.reseed(shared.config.seed, k as u64);
        let result = generator.generate(&mut storage, &mut rng, shared.params, shared.seeds);
        scanner.scan_indexed(&storage, &mut rng, k);
        let done = CatalogDone {
            result,
            ruptures: storage.cat_size(),
        };
        if tx.send(done).is_err() {
            break;
        }
    }
    scanner.close();
}
