//! Catalog simulation parameters.
//!
//! [`CatalogParams`] carries the model constants (Omori, GR, productivity),
//! the time and magnitude windows, and the caps that bound a single catalog.
//! It is `Copy` so that storage, generator and consumers can each hold their
//! own snapshot without sharing.

use std::io::{Read, Write};

use crate::error::{MarshalError, ParamError};
use crate::marshal::{MarshalReader, MarshalWriter};
use crate::stats;

/// Parameters governing the simulation of one catalog.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CatalogParams {
    /// Gutenberg-Richter b-value.
    pub b: f64,
    /// Omori exponent p.
    pub p: f64,
    /// Omori offset c, in days.
    pub c: f64,
    /// Productivity magnitude exponent alpha.
    pub alpha: f64,
    /// Productivity scale `10^a`, referenced to magnitude `mref`.
    pub ten_a: f64,
    /// Reference magnitude: the minimum magnitude of the modeled process.
    pub mref: f64,
    /// Maximum magnitude of the modeled process.
    pub msup: f64,
    /// Start of the simulation window, in days.
    pub tbegin: f64,
    /// End of the simulation window, in days.
    pub tend: f64,
    /// Lowest allowed per-generation magnitude floor.
    pub mag_min_lo: f64,
    /// Highest allowed per-generation magnitude floor.
    pub mag_min_hi: f64,
    /// Maximum simulated magnitude.
    pub mag_max_sim: f64,
    /// Target expected size of each generation, used to pick its floor.
    pub gen_size_target: f64,
    /// Maximum number of generations, seed included.
    pub gen_count_max: usize,
    /// Maximum expected size of a single generation.
    pub max_gen_size: usize,
    /// Maximum total number of ruptures in a catalog.
    pub max_cat_size: usize,
    /// Width of the magnitude band above `mag_max_sim` watched for early
    /// stop. Zero disables the early-stop check.
    pub mag_excess: f64,
    /// Total trigger rates below this end the catalog.
    pub rate_eps: f64,
    /// Expected generation sizes below this end the catalog.
    pub count_eps: f64,
}

impl CatalogParams {
    /// Default branch ratio used by [`Default`].
    pub const DEFAULT_BRANCH_RATIO: f64 = 0.5;

    /// Create parameters from explicit model constants.
    ///
    /// The lowest generation floor is `mref` and the maximum simulated
    /// magnitude is `msup`; caps and thresholds take their defaults.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        b: f64,
        p: f64,
        c: f64,
        alpha: f64,
        ten_a: f64,
        mref: f64,
        msup: f64,
        tbegin: f64,
        tend: f64,
    ) -> Self {
        Self {
            b,
            p,
            c,
            alpha,
            ten_a,
            mref,
            msup,
            tbegin,
            tend,
            mag_min_lo: mref,
            mag_max_sim: msup,
            ..Self::default()
        }
    }

    /// Return a copy of `base` whose productivity yields branch ratio `n`
    /// over an interval of length `tint` days.
    pub fn from_branch_ratio(n: f64, tint: f64, base: CatalogParams) -> Self {
        let ten_a = stats::ten_a_from_branch_ratio(
            n, base.b, base.alpha, base.p, base.c, base.mref, base.msup, tint,
        );
        Self { ten_a, ..base }
    }

    /// Set the simulation time window.
    pub fn with_time_range(mut self, tbegin: f64, tend: f64) -> Self {
        self.tbegin = tbegin;
        self.tend = tend;
        self
    }

    /// Set the range of allowed generation floors and the maximum simulated
    /// magnitude.
    pub fn with_mag_range(mut self, mag_min_lo: f64, mag_min_hi: f64, mag_max_sim: f64) -> Self {
        self.mag_min_lo = mag_min_lo;
        self.mag_min_hi = mag_min_hi;
        self.mag_max_sim = mag_max_sim;
        self
    }

    /// Productivity of a seed rupture of magnitude `mag`.
    ///
    /// Seeds are treated as drawn from the full `[mref, msup]` range, so no
    /// window correction applies.
    pub fn seed_productivity(&self, mag: f64) -> f64 {
        let full = crate::GenerationInfo::new(self.mref, self.msup);
        stats::productivity(mag, self, &full)
    }

    /// Check structural invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ParamError> {
        for (name, value) in self.float_fields() {
            if !value.is_finite() {
                return Err(ParamError::NotFinite { name, value });
            }
        }
        for (name, value) in [
            ("b", self.b),
            ("p", self.p),
            ("c", self.c),
            ("gen_size_target", self.gen_size_target),
        ] {
            if value <= 0.0 {
                return Err(ParamError::NotPositive { name, value });
            }
        }
        for (name, value) in [
            ("ten_a", self.ten_a),
            ("mag_excess", self.mag_excess),
            ("rate_eps", self.rate_eps),
            ("count_eps", self.count_eps),
        ] {
            if value < 0.0 {
                return Err(ParamError::NotPositive { name, value });
            }
        }
        if self.tend <= self.tbegin {
            return Err(ParamError::BadOrdering {
                relation: "tbegin < tend",
            });
        }
        if self.msup <= self.mref {
            return Err(ParamError::BadOrdering {
                relation: "mref < msup",
            });
        }
        if self.mag_min_hi < self.mag_min_lo {
            return Err(ParamError::BadOrdering {
                relation: "mag_min_lo <= mag_min_hi",
            });
        }
        if self.mag_max_sim <= self.mag_min_hi {
            return Err(ParamError::BadOrdering {
                relation: "mag_min_hi < mag_max_sim",
            });
        }
        for (name, value) in [
            ("gen_count_max", self.gen_count_max),
            ("max_gen_size", self.max_gen_size),
            ("max_cat_size", self.max_cat_size),
        ] {
            if value == 0 {
                return Err(ParamError::ZeroCap { name });
            }
        }
        Ok(())
    }

    const MARSHAL_NAME: &'static str = "CatalogParams";
    const MARSHAL_VERSION: u8 = 1;

    /// Write the parameters as a named-field object.
    pub fn marshal<W: Write>(&self, w: &mut MarshalWriter<W>) -> Result<(), MarshalError> {
        w.begin_object(Self::MARSHAL_NAME, Self::MARSHAL_VERSION)?;
        for (name, value) in self.float_fields() {
            w.write_f64(name, value)?;
        }
        w.write_usize("gen_count_max", self.gen_count_max)?;
        w.write_usize("max_gen_size", self.max_gen_size)?;
        w.write_usize("max_cat_size", self.max_cat_size)?;
        w.end_object(Self::MARSHAL_NAME)
    }

    /// Read parameters written by [`marshal`](Self::marshal).
    pub fn unmarshal<R: Read>(r: &mut MarshalReader<R>) -> Result<Self, MarshalError> {
        r.begin_object(Self::MARSHAL_NAME, Self::MARSHAL_VERSION)?;
        let params = Self {
            b: r.read_f64("b")?,
            p: r.read_f64("p")?,
            c: r.read_f64("c")?,
            alpha: r.read_f64("alpha")?,
            ten_a: r.read_f64("ten_a")?,
            mref: r.read_f64("mref")?,
            msup: r.read_f64("msup")?,
            tbegin: r.read_f64("tbegin")?,
            tend: r.read_f64("tend")?,
            mag_min_lo: r.read_f64("mag_min_lo")?,
            mag_min_hi: r.read_f64("mag_min_hi")?,
            mag_max_sim: r.read_f64("mag_max_sim")?,
            gen_size_target: r.read_f64("gen_size_target")?,
            mag_excess: r.read_f64("mag_excess")?,
            rate_eps: r.read_f64("rate_eps")?,
            count_eps: r.read_f64("count_eps")?,
            gen_count_max: r.read_usize("gen_count_max")?,
            max_gen_size: r.read_usize("max_gen_size")?,
            max_cat_size: r.read_usize("max_cat_size")?,
        };
        r.end_object(Self::MARSHAL_NAME)?;
        Ok(params)
    }

    // Order must match `unmarshal`.
    fn float_fields(&self) -> [(&'static str, f64); 16] {
        [
            ("b", self.b),
            ("p", self.p),
            ("c", self.c),
            ("alpha", self.alpha),
            ("ten_a", self.ten_a),
            ("mref", self.mref),
            ("msup", self.msup),
            ("tbegin", self.tbegin),
            ("tend", self.tend),
            ("mag_min_lo", self.mag_min_lo),
            ("mag_min_hi", self.mag_min_hi),
            ("mag_max_sim", self.mag_max_sim),
            ("gen_size_target", self.gen_size_target),
            ("mag_excess", self.mag_excess),
            ("rate_eps", self.rate_eps),
            ("count_eps", self.count_eps),
        ]
    }
}

impl Default for CatalogParams {
    fn default() -> Self {
        let base = Self {
            b: 1.0,
            p: 1.1,
            c: 0.01,
            alpha: 1.0,
            ten_a: 0.0,
            mref: 3.0,
            msup: 9.5,
            tbegin: 0.0,
            tend: 365.0,
            mag_min_lo: 3.0,
            mag_min_hi: 7.0,
            mag_max_sim: 9.5,
            gen_size_target: 100.0,
            gen_count_max: 100,
            max_gen_size: 1_000_000,
            max_cat_size: 1_500_000,
            mag_excess: 0.0,
            rate_eps: 1.0e-14,
            count_eps: 1.0e-4,
        };
        Self::from_branch_ratio(Self::DEFAULT_BRANCH_RATIO, base.tend - base.tbegin, base)
    }
}
