//! Cached stacked-Poisson distributions.
//!
//! Ensemble statistics repeatedly add Poisson distributions, possibly
//! shifted, with means that can reach millions. Building each from its
//! PMF would cost time proportional to the mean. Instead a
//! [`PoissonCache`] precomputes truncated distributions for a geometric
//! ladder of means over a geometric ladder of values, and a
//! [`StackedPoissonAccumulator`] adds them in time proportional to the
//! cached support.
//!
//! Build one cache per run and share it as `Arc<PoissonCache>`.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod accum;
pub mod cache;
pub mod config;
pub mod error;
pub mod ladder;

pub use accum::StackedPoissonAccumulator;
pub use cache::PoissonCache;
pub use config::PoissonCacheConfig;
pub use error::CacheError;
pub use ladder::{MeanLadder, ValueLadder};
