//! Seed-generation helpers.

use oetas_core::stats::{gr_rate, omori_rate_shifted};
use oetas_core::{CatalogParams, Rupture};

/// A seed rupture of magnitude `mag` at time `t_day`, with the productivity
/// implied by `params`.
pub fn seed_rupture(params: &CatalogParams, t_day: f64, mag: f64) -> Rupture {
    Rupture::seed(t_day, mag, params.seed_productivity(mag))
}

/// Seed ruptures for a list of `(t_day, mag)` pairs, in the given order.
pub fn seed_ruptures(params: &CatalogParams, events: &[(f64, f64)]) -> Vec<Rupture> {
    events
        .iter()
        .map(|&(t_day, mag)| seed_rupture(params, t_day, mag))
        .collect()
}

/// Expected number of direct children of `seeds` with magnitude at least
/// `mag` inside the simulation window.
pub fn expected_direct_children(params: &CatalogParams, seeds: &[Rupture], mag: f64) -> f64 {
    let gr = gr_rate(params.b, params.mref, mag, params.mag_max_sim);
    seeds
        .iter()
        .map(|s| {
            let t_lo = params.tbegin.max(s.t_day);
            s.k_prod * omori_rate_shifted(params.p, params.c, s.t_day, t_lo, params.tend)
        })
        .sum::<f64>()
        * gr
}
