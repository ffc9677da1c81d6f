//! Oetas: Operational ETAS aftershock simulation and ensemble forecasting.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Oetas sub-crates. For most users, adding `oetas` as a single dependency is
//! sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use oetas::prelude::*;
//!
//! // Reference parameters (b = 1, p = 1.1, branch ratio 0.5) and an M6
//! // mainshock at time zero.
//! let params = CatalogParams::default();
//! let seeds = vec![oetas::sim::seed_rupture(&params, 0.0, 6.0)];
//!
//! let grid = TimeMagGrid::new(vec![0.0, 1.0, 7.0, 30.0], vec![3.0, 5.0, 7.0]).unwrap();
//! let cache = Arc::new(PoissonCache::new(PoissonCacheConfig::compact()).unwrap());
//! let stacked = TimeMagStackedAccumulator::new(grid, cache, AccumulationModes::default());
//!
//! let config = EnsembleConfig::with_catalog_count(20);
//! let report = run_ensemble(&config, &params, &seeds, &[&stacked]).unwrap();
//! assert_eq!(report.catalogs_completed, 20);
//!
//! let p = stacked.get_prob_occur_array(1);
//! assert!((0.0..=1.0).contains(&p[2][0]));
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `oetas-core` | Ruptures, parameters, result codes, statistics, traits, marshaling |
//! | [`arena`] | `oetas-arena` | Block-indexed catalog storage and the catalog scanner |
//! | [`poisson`] | `oetas-poisson` | Stacked-Poisson cache and accumulator |
//! | [`sim`] | `oetas-sim` | Branching-process catalog generator |
//! | [`ensemble`] | `oetas-ensemble` | Time-magnitude accumulators and the ensemble driver |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core records, parameters and traits (`oetas-core`).
///
/// Contains [`types::Rupture`], [`types::CatalogParams`], the
/// [`types::stats`] formulas, the seeded [`types::OEtasRng`], and the
/// builder, view and consumer traits.
pub use oetas_core as types;

/// Catalog storage and scanning (`oetas-arena`).
///
/// [`arena::CatalogStorage`] holds one catalog at a time;
/// [`arena::CatalogScanner`] replays it to consumers.
pub use oetas_arena as arena;

/// Stacked-Poisson distributions (`oetas-poisson`).
///
/// Build one [`poisson::PoissonCache`] per run and share it.
pub use oetas_poisson as poisson;

/// Catalog generation (`oetas-sim`).
pub use oetas_sim as sim;

/// Ensemble accumulation and the worker-pool driver (`oetas-ensemble`).
pub use oetas_ensemble as ensemble;

/// Common imports for typical Oetas usage.
///
/// ```rust
/// use oetas::prelude::*;
/// ```
///
/// This imports the parameters, the accumulators and their readout trait,
/// the grid, the strategy enums, the cache, and the driver.
pub mod prelude {
    // Core types and traits
    pub use oetas_core::{
        CatalogBuilder, CatalogConsumer, CatalogParams, CatalogResult, CatalogView, OEtasRng,
        Rupture,
    };

    // Storage and generation
    pub use oetas_arena::{CatalogScanner, CatalogStorage, StorageConfig};
    pub use oetas_sim::CatalogGenerator;

    // Poisson cache
    pub use oetas_poisson::{PoissonCache, PoissonCacheConfig, StackedPoissonAccumulator};

    // Ensemble
    pub use oetas_ensemble::{
        run_ensemble, AccumulationModes, ClipPolicy, ConfigError, EnsembleAccumulator,
        EnsembleConfig, EnsembleReport, ForecastReadout, InfillMode, OutfillMode,
        TimeMagCountAccumulator, TimeMagGrid, TimeMagStackedAccumulator,
    };
}
