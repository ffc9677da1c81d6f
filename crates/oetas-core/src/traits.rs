//! Core traits: catalog building, catalog reading, and catalog consumption.
//!
//! The generator writes through [`CatalogBuilder`] and reads the previous
//! generation back through [`CatalogView`]. A scanner streams a finished
//! catalog through one or more [`CatalogConsumer`]s.

use crate::params::CatalogParams;
use crate::rupture::{CatalogResult, GenerationInfo, Rupture};
use crate::scan::ScanComm;

/// Write side of a catalog store.
///
/// Call order for one catalog: `begin_catalog`, then one or more
/// `begin_generation` / `add_rup`* / `end_generation` groups (the first is
/// the seed generation), then `end_catalog`. `set_stop_time` and
/// `set_result_code` may be called at any point inside the catalog.
pub trait CatalogBuilder {
    /// Start a new catalog, discarding the previous one.
    fn begin_catalog(&mut self, params: &CatalogParams);

    /// Finish the catalog. Per-generation valid sizes become available.
    fn end_catalog(&mut self);

    /// Start a new generation with the given magnitude window.
    fn begin_generation(&mut self, gen_info: &GenerationInfo);

    /// Finish the current generation.
    fn end_generation(&mut self);

    /// Append a rupture to the current generation.
    fn add_rup(&mut self, rup: &Rupture);

    /// Set the catalog stop time.
    fn set_stop_time(&mut self, stop_time: f64);

    /// Set the catalog result code.
    fn set_result_code(&mut self, result: CatalogResult);
}

/// Read side of a catalog store.
///
/// Ruptures are addressed by `(i_gen, j_rup)`: generation index, then
/// offset within the generation.
pub trait CatalogView {
    /// Parameters the catalog was simulated with.
    fn params(&self) -> &CatalogParams;

    /// Catalog stop time.
    fn stop_time(&self) -> f64;

    /// Catalog result code.
    fn result_code(&self) -> CatalogResult;

    /// Number of generations, seed included.
    fn gen_count(&self) -> usize;

    /// Number of ruptures in generation `i_gen`.
    fn gen_size(&self, i_gen: usize) -> usize;

    /// Number of ruptures in generation `i_gen` strictly before the stop time.
    ///
    /// Only meaningful after `end_catalog`; before that it equals
    /// [`gen_size`](Self::gen_size).
    fn gen_valid_size(&self, i_gen: usize) -> usize;

    /// Magnitude window of generation `i_gen`.
    fn gen_info(&self, i_gen: usize) -> GenerationInfo;

    /// Total number of ruptures across all generations.
    fn cat_size(&self) -> usize;

    /// Full rupture record.
    fn rup(&self, i_gen: usize, j_rup: usize) -> Rupture;

    /// Rupture time only.
    fn rup_time(&self, i_gen: usize, j_rup: usize) -> f64;

    /// Rupture time and productivity.
    fn rup_time_prod(&self, i_gen: usize, j_rup: usize) -> (f64, f64);

    /// Rupture time and coordinates.
    fn rup_time_xy(&self, i_gen: usize, j_rup: usize) -> (f64, f64, f64);

    /// Earliest rupture time in generation `i_gen`, or `None` if it is empty.
    fn gen_min_time(&self, i_gen: usize) -> Option<f64> {
        (0..self.gen_size(i_gen))
            .map(|j| self.rup_time(i_gen, j))
            .reduce(f64::min)
    }
}

/// Push-based visitor over a finished catalog.
///
/// A consumer session is bracketed by `open`/`close`; both are idempotent.
/// Within a session the consumer sees any number of catalogs, each as
/// `begin_catalog`, the seed generation (`begin_seed_generation`,
/// `next_seed_rup`*, `end_seed_generation`), then each later generation
/// (`begin_generation`, `next_rup`*, `next_sterile_rup`*, `end_generation`),
/// then the sterile children of the last generation (`next_sterile_rup`*),
/// then `end_catalog`. A session is never reentered while open.
///
/// Every callback except `open`/`close` receives the scanner's
/// [`ScanComm`]; consumers may request sterile ruptures from
/// `begin_seed_generation` or `begin_generation` through it.
pub trait CatalogConsumer {
    /// Open a consumption session.
    fn open(&mut self);

    /// Close the consumption session, releasing any pooled resources.
    fn close(&mut self);

    /// Start of a catalog.
    fn begin_catalog(&mut self, comm: &mut ScanComm<'_>);

    /// End of a catalog.
    fn end_catalog(&mut self, comm: &mut ScanComm<'_>);

    /// Start of the seed generation.
    fn begin_seed_generation(&mut self, comm: &mut ScanComm<'_>);

    /// End of the seed generation.
    fn end_seed_generation(&mut self, comm: &mut ScanComm<'_>);

    /// A seed rupture.
    fn next_seed_rup(&mut self, comm: &mut ScanComm<'_>, rup: &Rupture);

    /// Start of a non-seed generation.
    fn begin_generation(&mut self, comm: &mut ScanComm<'_>);

    /// End of a non-seed generation.
    fn end_generation(&mut self, comm: &mut ScanComm<'_>);

    /// A stored rupture of a non-seed generation.
    fn next_rup(&mut self, comm: &mut ScanComm<'_>, rup: &Rupture);

    /// A synthetic sterile rupture below the generation floor.
    ///
    /// The default ignores it.
    fn next_sterile_rup(&mut self, comm: &mut ScanComm<'_>, rup: &Rupture) {
        let _ = (comm, rup);
    }
}

impl<C: CatalogConsumer + ?Sized> CatalogConsumer for Box<C> {
    fn open(&mut self) {
        (**self).open();
    }

    fn close(&mut self) {
        (**self).close();
    }

    fn begin_catalog(&mut self, comm: &mut ScanComm<'_>) {
        (**self).begin_catalog(comm);
    }

    fn end_catalog(&mut self, comm: &mut ScanComm<'_>) {
        (**self).end_catalog(comm);
    }

    fn begin_seed_generation(&mut self, comm: &mut ScanComm<'_>) {
        (**self).begin_seed_generation(comm);
    }

    fn end_seed_generation(&mut self, comm: &mut ScanComm<'_>) {
        (**self).end_seed_generation(comm);
    }

    fn next_seed_rup(&mut self, comm: &mut ScanComm<'_>, rup: &Rupture) {
        (**self).next_seed_rup(comm, rup);
    }

    fn begin_generation(&mut self, comm: &mut ScanComm<'_>) {
        (**self).begin_generation(comm);
    }

    fn end_generation(&mut self, comm: &mut ScanComm<'_>) {
        (**self).end_generation(comm);
    }

    fn next_rup(&mut self, comm: &mut ScanComm<'_>, rup: &Rupture) {
        (**self).next_rup(comm, rup);
    }

    fn next_sterile_rup(&mut self, comm: &mut ScanComm<'_>, rup: &Rupture) {
        (**self).next_sterile_rup(comm, rup);
    }
}
