//! Communication block passed from a scanner to its consumers.

use crate::params::CatalogParams;
use crate::rng::OEtasRng;
use crate::rupture::{CatalogResult, GenerationInfo};

/// State shared between a scanner and the consumers it drives.
///
/// Catalog-level fields are valid from `begin_catalog` through
/// `end_catalog`; generation-level fields are valid from `begin_generation`
/// (or `begin_seed_generation`) through the matching end call. The random
/// generator is the scanner's own and may be used by consumers that need to
/// sample (e.g. Poisson infill).
pub struct ScanComm<'a> {
    /// Position of the catalog in its ensemble. Accumulators that merge
    /// per-catalog results use it to fix the merge order.
    pub catalog_index: usize,
    /// Parameters of the catalog being scanned.
    pub params: CatalogParams,
    /// Stop time of the catalog; ruptures at or after it are invalid.
    pub stop_time: f64,
    /// Result code of the catalog.
    pub result_code: CatalogResult,
    /// Number of generations in the catalog, seed included.
    pub gen_count: usize,
    /// Total number of stored ruptures in the catalog.
    pub cat_size: usize,
    /// Index of the current generation (0 = seed).
    pub i_gen: usize,
    /// Magnitude window of the current generation.
    pub gen_info: GenerationInfo,
    /// Number of ruptures in the current generation.
    pub gen_size: usize,
    /// Number of ruptures in the current generation before `stop_time`.
    pub gen_valid_size: usize,
    /// Magnitude window of the next generation, if there is one.
    pub next_gen_info: Option<GenerationInfo>,
    sterile_mag: f64,
    rng: &'a mut OEtasRng,
}

impl<'a> ScanComm<'a> {
    /// Create a communication block around the scanner's random generator.
    pub fn new(params: CatalogParams, rng: &'a mut OEtasRng) -> Self {
        Self {
            catalog_index: 0,
            params,
            stop_time: crate::UNBOUNDED_STOP_TIME,
            result_code: CatalogResult::Ok,
            gen_count: 0,
            cat_size: 0,
            i_gen: 0,
            gen_info: GenerationInfo::new(params.mag_min_lo, params.mag_max_sim),
            gen_size: 0,
            gen_valid_size: 0,
            next_gen_info: None,
            sterile_mag: f64::INFINITY,
            rng,
        }
    }

    /// The scanner's random generator.
    pub fn rng(&mut self) -> &mut OEtasRng {
        self.rng
    }

    /// Whether `t_day` lies before the catalog's stop time.
    pub fn is_valid_time(&self, t_day: f64) -> bool {
        t_day < self.stop_time
    }

    /// Ask the scanner for sterile ruptures of the current generation down
    /// to magnitude `mag`.
    ///
    /// Only meaningful during `begin_generation` or
    /// `begin_seed_generation`. When several consumers ask, the lowest
    /// magnitude wins. Requests at or above the generation floor are
    /// ignored. The request made for the last generation also covers the
    /// children of that generation, which are never simulated.
    pub fn request_sterile_mag(&mut self, mag: f64) {
        if mag < self.sterile_mag {
            self.sterile_mag = mag;
        }
    }

    /// Lowest sterile magnitude requested for the current generation, if any
    /// request lies below the generation floor.
    pub fn sterile_mag(&self) -> Option<f64> {
        self.sterile_mag_below(self.gen_info.gen_mag_min)
    }

    /// Lowest sterile magnitude requested, if it lies below `floor`.
    pub fn sterile_mag_below(&self, floor: f64) -> Option<f64> {
        (self.sterile_mag < floor).then_some(self.sterile_mag)
    }

    /// Clear any sterile request. Called by the scanner at each generation.
    pub fn clear_sterile_request(&mut self) {
        self.sterile_mag = f64::INFINITY;
    }
}
