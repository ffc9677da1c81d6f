//! Parameter presets and seed fixtures.

use oetas_core::{CatalogParams, Rupture};

/// Branch ratio of the reference scenario.
pub const SCENARIO_BRANCH_RATIO: f64 = 0.5;

/// Mainshock magnitude of the reference scenario.
pub const SCENARIO_MAINSHOCK_MAG: f64 = 6.0;

/// Time bin boundaries of the reference scenario, in days.
pub const SCENARIO_TIME_VALUES: [f64; 5] = [0.0, 1.0, 7.0, 30.0, 365.0];

/// Magnitude bin boundaries of the reference scenario.
pub const SCENARIO_MAG_VALUES: [f64; 6] = [3.0, 4.0, 5.0, 6.0, 7.0, 10.0];

/// Reference scenario: b = 1, p = 1.1, c = 0.01 day, one year, n = 0.5,
/// generation size target 100.
pub fn scenario_params() -> CatalogParams {
    let base = CatalogParams::new(1.0, 1.1, 0.01, 1.0, 0.0, 3.0, 9.5, 0.0, 365.0);
    let base = CatalogParams {
        gen_size_target: 100.0,
        ..base.with_mag_range(3.0, 7.0, 9.5)
    };
    CatalogParams::from_branch_ratio(SCENARIO_BRANCH_RATIO, base.tend - base.tbegin, base)
}

/// A plain Galton-Watson process with offspring mean `n`.
///
/// Productivity is independent of magnitude, every generation has the same
/// magnitude window, and the Omori kernel is concentrated well inside a very
/// long window, so every rupture has very nearly `n` expected children.
pub fn galton_watson_params(n: f64) -> CatalogParams {
    let base = CatalogParams::new(1.0, 2.0, 0.001, 0.0, 0.0, 3.0, 8.0, 0.0, 1.0e6);
    let base = base.with_mag_range(3.0, 3.0, 8.0);
    CatalogParams::from_branch_ratio(n, base.tend - base.tbegin, base)
}

/// The reference scenario's mainshock at time zero.
pub fn mainshock(params: &CatalogParams, mag: f64) -> Vec<Rupture> {
    vec![Rupture::seed(0.0, mag, params.seed_productivity(mag))]
}

/// `count` seed ruptures spread over the first day of the window.
///
/// The seeds lie at or after `tbegin`, so each one triggers over its whole
/// Omori kernel.
pub fn seed_swarm(params: &CatalogParams, count: usize, mag: f64) -> Vec<Rupture> {
    (0..count)
        .map(|i| {
            let t = params.tbegin + i as f64 / count as f64;
            Rupture::seed(t, mag, params.seed_productivity(mag))
        })
        .collect()
}
