//! Omori and Gutenberg-Richter rate integrals, their inverse CDFs, and the
//! productivity correction.
//!
//! Rates use the normalization shared by the whole workspace: a parent with
//! productivity `k` at time `t0` is expected to produce
//!
//! ```text
//! k * omori_rate_shifted(p, c, t0, t1, t2) * gr_rate(b, mref, m1, m2)
//! ```
//!
//! direct children with times in `[t1, t2]` and magnitudes in `[m1, m2)`.
//! All integrals are written in `expm1`/`ln1p` form so that `p` close to 1
//! and narrow windows stay accurate.

use std::f64::consts::LN_10;

use crate::params::CatalogParams;
use crate::rupture::GenerationInfo;

/// Exponent differences below this are treated as exactly zero.
const EXPONENT_EPS: f64 = 1.0e-14;

/// Integral of the shifted Omori kernel `(t - t0 + c)^(-p)` over `[t1, t2]`.
///
/// Requires `t1 >= t0`. Returns 0 for an empty or inverted window.
pub fn omori_rate_shifted(p: f64, c: f64, t0: f64, t1: f64, t2: f64) -> f64 {
    if t2 <= t1 {
        return 0.0;
    }
    let a = (t1 - t0 + c).ln();
    let b = (t2 - t0 + c).ln();
    let q = 1.0 - p;
    if q.abs() < EXPONENT_EPS {
        return b - a;
    }
    (q * a).exp() * (q * (b - a)).exp_m1() / q
}

/// Inverse CDF of the shifted Omori kernel truncated to `[t1, t2]`.
///
/// `u` is a uniform variate in `[0, 1)`. The result is clamped into
/// `[t1, t2]` to absorb rounding.
pub fn omori_inverse_cdf(p: f64, c: f64, t0: f64, t1: f64, t2: f64, u: f64) -> f64 {
    if t2 <= t1 {
        return t1;
    }
    let a = (t1 - t0 + c).ln();
    let b = (t2 - t0 + c).ln();
    let q = 1.0 - p;
    let s = if q.abs() < EXPONENT_EPS {
        a + u * (b - a)
    } else {
        a + (u * (q * (b - a)).exp_m1()).ln_1p() / q
    };
    (s.exp() + t0 - c).clamp(t1, t2)
}

/// Gutenberg-Richter rate integral `10^(-b(m1-mref)) - 10^(-b(m2-mref))`.
///
/// Returns 0 for an empty or inverted magnitude range.
pub fn gr_rate(b: f64, mref: f64, m1: f64, m2: f64) -> f64 {
    if m2 <= m1 {
        return 0.0;
    }
    let bl = b * LN_10;
    (-bl * (m1 - mref)).exp() * -(-bl * (m2 - m1)).exp_m1()
}

/// Solve `gr_rate(b, mref, m1, m2) == rate` for the lower magnitude `m1`.
///
/// `rate` must be non-negative; a zero rate returns `m2`.
pub fn gr_inv_rate(b: f64, mref: f64, m2: f64, rate: f64) -> f64 {
    if rate <= 0.0 {
        return m2;
    }
    let upper = (-b * LN_10 * (m2 - mref)).exp();
    mref - (rate + upper).log10() / b
}

/// Inverse CDF of the GR magnitude distribution truncated to `[m1, m2]`.
pub fn gr_inverse_cdf(b: f64, m1: f64, m2: f64, u: f64) -> f64 {
    if m2 <= m1 {
        return m1;
    }
    let bl = b * LN_10;
    let m = m1 - (u * (-bl * (m2 - m1)).exp_m1()).ln_1p() / bl;
    m.clamp(m1, m2)
}

/// Integral of `10^(d (m - mref))` over `[m1, m2]`, where `d = alpha - b`.
pub fn mag_weight_integral(d: f64, mref: f64, m1: f64, m2: f64) -> f64 {
    if m2 <= m1 {
        return 0.0;
    }
    if d.abs() < EXPONENT_EPS {
        return m2 - m1;
    }
    let dl = d * LN_10;
    (dl * (m1 - mref)).exp() * (dl * (m2 - m1)).exp_m1() / dl
}

/// Productivity of a rupture of magnitude `mag` simulated inside the
/// generation window `gen_info`.
///
/// The uncorrected productivity `ten_a * 10^(alpha (mag - mref))` is scaled
/// by `Q = I(mref, msup) / I(gen_mag_min, gen_mag_max)` so that the
/// ruptures actually simulated carry the offspring of the whole
/// `[mref, msup]` magnitude range.
pub fn productivity(mag: f64, params: &CatalogParams, gen_info: &GenerationInfo) -> f64 {
    let d = params.alpha - params.b;
    let full = mag_weight_integral(d, params.mref, params.mref, params.msup);
    let sim = mag_weight_integral(d, params.mref, gen_info.gen_mag_min, gen_info.gen_mag_max);
    let q = if sim > 0.0 { full / sim } else { 1.0 };
    params.ten_a * (params.alpha * LN_10 * (mag - params.mref)).exp() * q
}

/// Magnitude floor of a generation whose parents have total trigger rate
/// `total_rate`.
///
/// The floor is chosen so that the expected generation size meets
/// `gen_size_target`, then clamped to `[mag_min_lo, mag_min_hi]`.
pub fn generation_floor(params: &CatalogParams, total_rate: f64) -> f64 {
    let target_rate = params.gen_size_target / total_rate;
    gr_inv_rate(params.b, params.mref, params.mag_max_sim, target_rate)
        .clamp(params.mag_min_lo, params.mag_min_hi)
}

/// Productivity scale `ten_a` that yields branch ratio `n`.
///
/// The branch ratio is the expected number of direct children, over a time
/// interval of length `tint`, of a parent drawn from the GR distribution on
/// `[mref, msup]`.
#[allow(clippy::too_many_arguments)]
pub fn ten_a_from_branch_ratio(
    n: f64,
    b: f64,
    alpha: f64,
    p: f64,
    c: f64,
    mref: f64,
    msup: f64,
    tint: f64,
) -> f64 {
    let omori = omori_rate_shifted(p, c, 0.0, 0.0, tint);
    let mags = mag_weight_integral(alpha - b, mref, mref, msup);
    n / (b * LN_10 * mags * omori)
}

/// Branch ratio implied by `params` over an interval of length `tint`.
pub fn branch_ratio(params: &CatalogParams, tint: f64) -> f64 {
    let omori = omori_rate_shifted(params.p, params.c, 0.0, 0.0, tint);
    let mags = mag_weight_integral(params.alpha - params.b, params.mref, params.mref, params.msup);
    params.ten_a * params.b * LN_10 * mags * omori
}
