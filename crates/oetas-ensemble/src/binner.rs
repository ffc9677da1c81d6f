//! Per-catalog binning state machine shared by every accumulator.
//!
//! A [`CatalogBinner`] follows the consumer protocol for one catalog at a
//! time and produces, at catalog end:
//!
//! - binned counts of observed (and, for sterile infill, synthesized)
//!   non-seed ruptures;
//! - for Poisson infill, the expected count of unsimulated small events;
//! - for direct outfill, the expected direct aftershocks past the
//!   observation cutoff.
//!
//! Which of these are collected is decided by an [`InfillMode`] and a flag
//! for outfill; the accumulators decide how to fold the result.

use std::sync::Arc;

use oetas_core::stats::{gr_rate, omori_rate_shifted};
use oetas_core::{CatalogParams, GenerationInfo, OEtasRng, Rupture, ScanComm};

use crate::grid::TimeMagGrid;
use crate::modes::{ClipPolicy, InfillMode};

/// How much of the grid one catalog observes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation {
    /// Whether the catalog contributes at all.
    pub accepted: bool,
    /// Number of leading time bins that are observed.
    pub observed_bins: usize,
    /// Ruptures at or after this time are not counted, and trigger rates
    /// are integrated only up to it. Also the start of outfill.
    pub cutoff: f64,
}

impl Observation {
    /// Observation window of a catalog with the given stop time.
    pub fn new(grid: &TimeMagGrid, stop_time: f64, policy: ClipPolicy) -> Self {
        let n_t = grid.time_bins();
        if stop_time >= grid.time_end() {
            return Self {
                accepted: true,
                observed_bins: n_t,
                cutoff: stop_time,
            };
        }
        let full = grid.bins_before(stop_time);
        let partial = stop_time > grid.time_values()[full];
        let clip = partial && policy.discards_partial_bin();
        let observed_bins = if partial && !clip { full + 1 } else { full };
        let cutoff = if clip {
            grid.time_values()[full]
        } else {
            stop_time
        };
        let accepted = match policy {
            ClipPolicy::Any | ClipPolicy::AnyClip => true,
            ClipPolicy::Range => observed_bins > 0,
            ClipPolicy::Entire => false,
            ClipPolicy::EntireClip => full + usize::from(partial) == n_t,
        };
        Self {
            accepted,
            observed_bins,
            cutoff,
        }
    }
}

/// Bins one catalog at a time into a time-magnitude grid.
pub struct CatalogBinner {
    grid: Arc<TimeMagGrid>,
    infill: InfillMode,
    clip: ClipPolicy,
    outfill: bool,
    params: CatalogParams,
    obs: Observation,
    counts: Vec<u64>,
    expected: Vec<f64>,
    gen_counts: Vec<u64>,
    gen_rates: Vec<f64>,
    direct_rates: Vec<f64>,
}

impl CatalogBinner {
    /// Create a binner. `outfill` enables collection of direct outfill
    /// rates.
    pub fn new(grid: Arc<TimeMagGrid>, infill: InfillMode, clip: ClipPolicy, outfill: bool) -> Self {
        let (n_t, n_c) = (grid.time_bins(), grid.cell_count());
        Self {
            infill,
            clip,
            outfill,
            params: CatalogParams::default(),
            obs: Observation {
                accepted: false,
                observed_bins: 0,
                cutoff: f64::NEG_INFINITY,
            },
            counts: vec![0; n_c],
            expected: vec![0.0; n_c],
            gen_counts: vec![0; n_t],
            gen_rates: vec![0.0; n_t],
            direct_rates: vec![0.0; n_t],
            grid,
        }
    }

    /// The grid binned into.
    pub fn grid(&self) -> &TimeMagGrid {
        &self.grid
    }

    /// Observation window of the current catalog.
    pub fn observation(&self) -> Observation {
        self.obs
    }

    /// Binned counts, cumulative after [`cumulate`](Self::cumulate).
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Binned expected infill counts, cumulative after
    /// [`cumulate`](Self::cumulate). All zero unless infill is Poisson.
    pub fn expected(&self) -> &[f64] {
        &self.expected
    }

    /// Expected direct aftershocks in cell `(t, m)` between the cutoff and
    /// the end of time bin `t`. Zero for observed bins or when outfill is
    /// disabled.
    pub fn direct_mean(&self, t: usize, m: usize) -> f64 {
        if !self.outfill || t < self.obs.observed_bins {
            return 0.0;
        }
        let mag = self.grid.mag_values()[m];
        let p = &self.params;
        if mag >= p.mag_max_sim {
            return 0.0;
        }
        self.direct_rates[t] * gr_rate(p.b, p.mref, mag, p.mag_max_sim)
    }

    // ── Protocol ───────────────────────────────────────────────────

    /// Reset for a new catalog.
    pub fn begin_catalog(&mut self, comm: &ScanComm<'_>) {
        self.params = comm.params;
        self.obs = Observation::new(&self.grid, comm.stop_time, self.clip);
        self.counts.fill(0);
        self.expected.fill(0.0);
        self.gen_counts.fill(0);
        self.gen_rates.fill(0.0);
        self.direct_rates.fill(0.0);
    }

    /// A seed rupture: never counted, but it triggers.
    pub fn seed_rup(&mut self, rup: &Rupture) {
        if !self.obs.accepted {
            return;
        }
        self.add_rates(rup);
        self.add_direct(rup);
    }

    /// Start of the seed generation. Sterile infill asks for the seeds'
    /// children here too, which covers a catalog that never got past them.
    pub fn begin_seed_generation(&mut self, comm: &mut ScanComm<'_>) {
        if self.obs.accepted && self.infill == InfillMode::Sterile {
            comm.request_sterile_mag(self.grid.mag_values()[0]);
        }
    }

    /// Start of a non-seed generation.
    pub fn begin_generation(&mut self, comm: &mut ScanComm<'_>) {
        if !self.obs.accepted {
            return;
        }
        match self.infill {
            InfillMode::None => {}
            InfillMode::Scale => self.gen_counts.fill(0),
            InfillMode::Poisson => {
                self.fold_rates(comm.gen_info.gen_mag_min);
                self.gen_rates.fill(0.0);
            }
            InfillMode::Sterile => comm.request_sterile_mag(self.grid.mag_values()[0]),
        }
    }

    /// A stored non-seed rupture.
    pub fn rup(&mut self, rup: &Rupture) {
        if !self.obs.accepted {
            return;
        }
        if let Some(t) = self.count(rup) {
            self.gen_counts[t] += 1;
        }
        self.add_rates(rup);
        self.add_direct(rup);
    }

    /// A synthesized sterile rupture.
    pub fn sterile_rup(&mut self, rup: &Rupture) {
        if self.obs.accepted {
            self.count(rup);
        }
    }

    /// End of a non-seed generation.
    pub fn end_generation(&mut self, gen_info: &GenerationInfo) {
        if self.obs.accepted && self.infill == InfillMode::Scale {
            self.apply_scale(gen_info);
        }
    }

    /// End of the catalog. Children of the last generation are wholly
    /// unsimulated.
    pub fn end_catalog(&mut self) {
        if self.obs.accepted && self.infill == InfillMode::Poisson {
            self.fold_rates(self.params.mag_max_sim);
            self.gen_rates.fill(0.0);
        }
    }

    /// Replace each binned expected count by a Poisson draw added to the
    /// binned counts.
    pub fn draw_infill(&mut self, rng: &mut OEtasRng) {
        for (n, &lambda) in self.counts.iter_mut().zip(&self.expected) {
            if lambda > 0.0 {
                *n += rng.poisson_sample_checked(lambda);
            }
        }
    }

    /// Cumulate counts and expected counts over the grid.
    pub fn cumulate(&mut self) {
        self.grid.cumulate(&mut self.counts);
        self.grid.cumulate(&mut self.expected);
    }

    // ── Internals ──────────────────────────────────────────────────

    /// Count `rup` into its cell. Returns its time bin when counted or when
    /// only its magnitude lies below the grid.
    fn count(&mut self, rup: &Rupture) -> Option<usize> {
        if !(rup.t_day < self.obs.cutoff) {
            return None;
        }
        let t = self.grid.time_bin(rup.t_day)?;
        if let Some(m) = self.grid.mag_bin(rup.rup_mag) {
            let c = self.grid.cell(t, m);
            self.counts[c] += 1;
        }
        Some(t)
    }

    /// Per-time-bin Omori integral of `rup`, clipped to the cutoff.
    fn add_rates(&mut self, rup: &Rupture) {
        if self.infill != InfillMode::Poisson || !(rup.k_prod > 0.0) {
            return;
        }
        let p = &self.params;
        let tv = self.grid.time_values();
        let t_cap = self.obs.cutoff.min(p.tend);
        let t_floor = p.tbegin.max(rup.t_day);
        for (t, rate) in self.gen_rates.iter_mut().enumerate() {
            let lo = tv[t].max(t_floor);
            let hi = tv[t + 1].min(t_cap);
            if hi > lo {
                *rate += rup.k_prod * omori_rate_shifted(p.p, p.c, rup.t_day, lo, hi);
            }
        }
    }

    /// Omori integral of `rup` from the cutoff to the end of each
    /// unobserved time bin.
    fn add_direct(&mut self, rup: &Rupture) {
        let obs = self.obs;
        if !self.outfill
            || obs.observed_bins >= self.grid.time_bins()
            || !(rup.t_day < obs.cutoff)
            || !(rup.k_prod > 0.0)
        {
            return;
        }
        let p = &self.params;
        let tv = self.grid.time_values();
        let lo = obs.cutoff.max(rup.t_day).max(tv[0]).max(p.tbegin);
        for t in obs.observed_bins..self.grid.time_bins() {
            let hi = tv[t + 1].min(p.tend);
            if hi > lo {
                self.direct_rates[t] +=
                    rup.k_prod * omori_rate_shifted(p.p, p.c, rup.t_day, lo, hi);
            }
        }
    }

    /// Turn the pending generation's trigger rates into expected counts of
    /// children with magnitude in `[mv[0], floor)`.
    fn fold_rates(&mut self, floor: f64) {
        let p = &self.params;
        let grid = &self.grid;
        for (m, &mag) in grid.mag_values().iter().enumerate() {
            if mag >= floor {
                break;
            }
            let g = gr_rate(p.b, p.mref, mag, grid.mag_upper(m, floor));
            for (t, &rate) in self.gen_rates.iter().enumerate() {
                self.expected[grid.cell(t, m)] += rate * g;
            }
        }
    }

    /// Add the scaled-up counts of magnitudes below the generation floor.
    fn apply_scale(&mut self, gen_info: &GenerationInfo) {
        let p = &self.params;
        let grid = &self.grid;
        let floor = gen_info.gen_mag_min;
        let simulated = gr_rate(p.b, p.mref, floor, gen_info.gen_mag_max);
        if !(simulated > 0.0) {
            return;
        }
        for (m, &mag) in grid.mag_values().iter().enumerate() {
            if mag >= floor {
                break;
            }
            let ratio = gr_rate(p.b, p.mref, mag, grid.mag_upper(m, floor)) / simulated;
            for (t, &n) in self.gen_counts.iter().enumerate() {
                if n > 0 {
                    self.counts[grid.cell(t, m)] += (n as f64 * ratio).round() as u64;
                }
            }
        }
    }
}
