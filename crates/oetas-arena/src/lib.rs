//! Block-indexed catalog storage and catalog scanning.
//!
//! A simulated catalog can hold millions of ruptures, so storage keeps one
//! column per field in fixed-size blocks instead of a vector of records:
//!
//! ```text
//! CatalogStorage (builder + view)
//! ├── BlockList → RuptureBlock[] (2^shift ruptures each)
//! │   └── t_day: f64 | rup_mag, k_prod, x_km, y_km: f32 | rup_parent: i32
//! └── per-generation columns: start, size, valid size, magnitude window
//! ```
//!
//! A rupture's linear index `idx` lives at block `idx >> shift`, offset
//! `idx & mask`. Storage is reused across catalogs without freeing blocks.
//!
//! [`CatalogScanner`] streams a finished catalog through any number of
//! [`CatalogConsumer`](oetas_core::CatalogConsumer)s, synthesizing sterile
//! ruptures on request.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod block;
pub mod config;
pub mod error;
pub mod scanner;
pub mod storage;

pub use config::StorageConfig;
pub use error::StorageError;
pub use scanner::CatalogScanner;
pub use storage::CatalogStorage;
