//! Ensemble accumulation of simulated catalogs into time-magnitude
//! forecasts.
//!
//! An ensemble run simulates many catalogs from the same seeds and folds
//! each one into every registered accumulator while it is still in the
//! worker's storage. Two accumulators are provided:
//!
//! - [`TimeMagCountAccumulator`] keeps every catalog's cumulative cell
//!   counts in a preallocated array and reads fractiles from the sorted
//!   per-cell values. Memory grows with the number of catalogs.
//! - [`TimeMagStackedAccumulator`] adds each catalog to a stacked Poisson
//!   distribution per cell. Memory does not grow with the number of
//!   catalogs. Supports outfill of cells past a truncated catalog's stop
//!   time and per-catalog acceptance policies.
//!
//! Both produce the same forecast for a given seed whatever the number of
//! workers: catalog `k` always uses random stream `k`, count forecasts are
//! sorted per cell, and stacked grids merge in catalog order.
//!
//! # Architecture
//!
//! ```text
//! worker i:  CatalogGenerator -> CatalogStorage -> CatalogScanner
//!                                                      |
//!                        one consumer per accumulator  v
//!                          CatalogBinner -> slot / leased PartialGrid
//!                                                      |
//!                                         OrderedMerge v (stacked only)
//! driver:    run_ensemble -> begin_accumulation, spawn, end_accumulation
//! ```
//!
//! Both accumulators share [`CatalogBinner`], which implements the infill
//! strategies of [`InfillMode`] and the observation window of
//! [`ClipPolicy`]. Readout goes through [`ForecastReadout`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod accumulator;
pub mod binner;
pub mod config;
pub mod count_accum;
pub mod driver;
pub mod error;
pub mod grid;
pub mod merge;
pub mod modes;
pub mod pool;
pub mod report;
pub mod stacked_accum;

pub use accumulator::{EnsembleAccumulator, ForecastReadout};
pub use binner::{CatalogBinner, Observation};
pub use config::EnsembleConfig;
pub use count_accum::{CountForecast, TimeMagCountAccumulator};
pub use driver::run_ensemble;
pub use error::ConfigError;
pub use grid::TimeMagGrid;
pub use merge::OrderedMerge;
pub use modes::{AccumulationModes, ClipPolicy, InfillMode, OutfillMode};
pub use pool::{PartialGrid, PartialPool, PoolLease};
pub use report::EnsembleReport;
pub use stacked_accum::{StackedForecast, TimeMagStackedAccumulator};
