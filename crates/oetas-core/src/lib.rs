//! Core types and traits for Operational ETAS simulation.
//!
//! This is the leaf crate with no internal dependencies. It defines the
//! rupture record, catalog parameters, result codes, the seeded random
//! generator, the Omori/Gutenberg-Richter statistics, the builder/view/
//! consumer traits that connect the generator, storage and accumulators,
//! and the named-field marshaling format used for persistence.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod marshal;
pub mod params;
pub mod rng;
pub mod rupture;
pub mod scan;
pub mod stats;
pub mod traits;

pub use error::{MarshalError, ParamError};
pub use marshal::{MarshalReader, MarshalWriter};
pub use params::CatalogParams;
pub use rng::OEtasRng;
pub use rupture::{CatalogResult, GenerationInfo, Rupture, SEED_PARENT, UNBOUNDED_STOP_TIME};
pub use scan::ScanComm;
pub use traits::{CatalogBuilder, CatalogConsumer, CatalogView};
