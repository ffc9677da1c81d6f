//! Branching-process catalog generator.
//!
//! Each generation is simulated from the previous one:
//!
//! 1. Integrate every parent's Omori rate over its part of the window into a
//!    running prefix sum; stop if the total is negligible.
//! 2. Choose the generation floor `m_min` so that the expected size hits the
//!    target, clamped to the allowed range; stop if the expected size is
//!    negligible.
//! 3. Check the size and generation caps. A tripped cap records its result
//!    code, tightens the stop time to the last fully realized instant, and
//!    ends the catalog.
//! 4. Optionally look for events above the maximum simulated magnitude and
//!    tighten the stop time to the earliest one found.
//! 5. Draw the generation size, then each child's parent, time, magnitude
//!    and productivity. Children at or after the stop time are discarded.

use oetas_core::stats::{generation_floor, gr_rate, omori_rate_shifted, productivity};
use oetas_core::{
    CatalogBuilder, CatalogParams, CatalogResult, CatalogView, GenerationInfo, OEtasRng, Rupture,
    UNBOUNDED_STOP_TIME,
};
use tracing::trace;

/// Simulates catalogs into any store that is both builder and view.
///
/// A generator is single-threaded and reusable: it keeps scratch buffers
/// between catalogs. Workers each own one.
#[derive(Debug, Default)]
pub struct CatalogGenerator {
    cum_rate: Vec<f64>,
    stop_time: f64,
    result: CatalogResult,
}

impl CatalogGenerator {
    /// Create a generator.
    pub fn new() -> Self {
        Self {
            cum_rate: Vec::new(),
            stop_time: UNBOUNDED_STOP_TIME,
            result: CatalogResult::Ok,
        }
    }

    /// Simulate one complete catalog descending from `seeds`.
    ///
    /// Opens a catalog in `storage`, stores the seeds as generation 0,
    /// simulates generations until the process dies out or a cap trips,
    /// and closes the catalog. Returns the catalog's result code.
    pub fn generate<S>(
        &mut self,
        storage: &mut S,
        rng: &mut OEtasRng,
        params: &CatalogParams,
        seeds: &[Rupture],
    ) -> CatalogResult
    where
        S: CatalogBuilder + CatalogView,
    {
        self.begin(storage, params, seeds);
        while self.calc_next_gen(storage, rng) > 0 {}
        storage.end_catalog();
        self.result
    }

    /// Open a catalog and store the seed generation.
    ///
    /// Seeds are stored with the full `[mref, msup]` magnitude window.
    pub fn begin<S: CatalogBuilder>(
        &mut self,
        storage: &mut S,
        params: &CatalogParams,
        seeds: &[Rupture],
    ) {
        self.stop_time = UNBOUNDED_STOP_TIME;
        self.result = CatalogResult::Ok;
        storage.begin_catalog(params);
        storage.begin_generation(&GenerationInfo::new(params.mref, params.msup));
        for seed in seeds {
            storage.add_rup(seed);
        }
        storage.end_generation();
    }

    /// Current stop time of the open catalog.
    pub fn stop_time(&self) -> f64 {
        self.stop_time
    }

    /// Current result code of the open catalog.
    pub fn result(&self) -> CatalogResult {
        self.result
    }

    /// Simulate the next generation from the last stored one.
    ///
    /// Returns the number of ruptures stored, or 0 when the catalog is
    /// finished (the process died out or a cap tripped).
    pub fn calc_next_gen<S>(&mut self, storage: &mut S, rng: &mut OEtasRng) -> usize
    where
        S: CatalogBuilder + CatalogView,
    {
        let params = *storage.params();
        let i_parent = storage.gen_count() - 1;
        let eff_tend = params.tend.min(self.stop_time);

        // 1. Rate from each parent, as a running sum.
        self.cum_rate.clear();
        let mut total_rate = 0.0;
        for j in 0..storage.gen_size(i_parent) {
            let (t0, k_prod) = storage.rup_time_prod(i_parent, j);
            let t_lo = params.tbegin.max(t0);
            total_rate += k_prod * omori_rate_shifted(params.p, params.c, t0, t_lo, eff_tend);
            self.cum_rate.push(total_rate);
        }
        if !(total_rate >= params.rate_eps) || total_rate == 0.0 {
            return 0;
        }

        // 2. Generation floor and expected size.
        let m_min = generation_floor(&params, total_rate);
        let expected = total_rate * gr_rate(params.b, params.mref, m_min, params.mag_max_sim);
        if !(expected >= params.count_eps) {
            return 0;
        }

        // 3. Caps.
        if expected > params.max_gen_size as f64 {
            self.truncate(storage, CatalogResult::GenTooLarge);
            return 0;
        }
        if storage.cat_size() > params.max_cat_size {
            self.truncate(storage, CatalogResult::CatTooLarge);
            return 0;
        }
        if storage.gen_count() >= params.gen_count_max {
            self.truncate(storage, CatalogResult::TooManyGen);
            return 0;
        }

        // 4. Events above the maximum simulated magnitude.
        if params.mag_excess > 0.0 {
            let excess_rate = total_rate
                * gr_rate(
                    params.b,
                    params.mref,
                    params.mag_max_sim,
                    params.mag_max_sim + params.mag_excess,
                );
            let n_excess = rng.poisson_sample_checked(excess_rate);
            for _ in 0..n_excess {
                let Some(j) = rng.cumulative_sample(&self.cum_rate) else {
                    break;
                };
                let t0 = storage.rup_time(i_parent, j);
                let t_lo = params.tbegin.max(t0);
                let t = rng.omori_sample_shifted(params.p, params.c, t0, t_lo, eff_tend);
                if t < self.stop_time {
                    self.stop_time = t;
                    self.result = CatalogResult::EarlyStop;
                    storage.set_stop_time(t);
                    storage.set_result_code(CatalogResult::EarlyStop);
                }
            }
        }

        // 5. Children.
        let count = rng.poisson_sample_checked(expected);
        if count == 0 {
            return 0;
        }
        let gen_info = GenerationInfo::new(m_min, params.mag_max_sim);
        storage.begin_generation(&gen_info);
        let mut stored = 0;
        for _ in 0..count {
            let Some(j) = rng.cumulative_sample(&self.cum_rate) else {
                break;
            };
            let (t0, x_km, y_km) = storage.rup_time_xy(i_parent, j);
            let t_lo = params.tbegin.max(t0);
            let t_day = rng.omori_sample_shifted(params.p, params.c, t0, t_lo, eff_tend);
            if t_day >= self.stop_time {
                continue;
            }
            let rup_mag = rng.gr_sample(params.b, m_min, params.mag_max_sim);
            storage.add_rup(&Rupture {
                t_day,
                rup_mag,
                k_prod: productivity(rup_mag, &params, &gen_info),
                rup_parent: j as i32,
                x_km,
                y_km,
            });
            stored += 1;
        }
        storage.end_generation();
        stored
    }

    /// Record `result` and pull the stop time back to the earliest rupture
    /// of the last generation, or to `tbegin` if that is the seed.
    fn truncate<S>(&mut self, storage: &mut S, result: CatalogResult)
    where
        S: CatalogBuilder + CatalogView,
    {
        let params = storage.params();
        let i_last = storage.gen_count() - 1;
        let realized = if i_last == 0 {
            params.tbegin
        } else {
            storage.gen_min_time(i_last).unwrap_or(params.tbegin)
        };
        self.stop_time = self.stop_time.min(realized);
        self.result = result;
        storage.set_stop_time(self.stop_time);
        storage.set_result_code(result);
        trace!(
            result = %result,
            gen_count = storage.gen_count(),
            stop_time = self.stop_time,
            "catalog truncated"
        );
    }
}
