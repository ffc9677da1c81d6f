//! Branching-process catalog generation for Operational ETAS.
//!
//! [`CatalogGenerator`] simulates a catalog generation by generation into
//! any store implementing both
//! [`CatalogBuilder`](oetas_core::CatalogBuilder) and
//! [`CatalogView`](oetas_core::CatalogView). The [`seeds`] module builds
//! seed ruptures with the productivity implied by the parameters.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod generator;
pub mod seeds;

pub use generator::CatalogGenerator;
pub use seeds::{expected_direct_children, seed_rupture, seed_ruptures};
