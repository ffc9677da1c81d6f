//! Test fixtures for OETAS development.
//!
//! Provides parameter presets ([`fixtures`]), a [`RecordingConsumer`] that
//! logs every scanner callback, and helpers that fill a
//! [`CatalogStorage`] from literal generations.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::cell::RefCell;
use std::rc::Rc;

use oetas_arena::{CatalogStorage, StorageConfig};
use oetas_core::{
    CatalogBuilder, CatalogConsumer, CatalogParams, CatalogResult, GenerationInfo, Rupture,
    ScanComm,
};

/// One scanner callback, as seen by a [`RecordingConsumer`].
#[derive(Clone, Debug, PartialEq)]
pub enum ScanEvent {
    Open,
    Close,
    BeginCatalog {
        catalog_index: usize,
        gen_count: usize,
        stop_time: f64,
    },
    EndCatalog,
    BeginSeedGeneration { gen_size: usize },
    EndSeedGeneration,
    SeedRup(Rupture),
    BeginGeneration { i_gen: usize, gen_info: GenerationInfo },
    EndGeneration { i_gen: usize },
    Rup(Rupture),
    SterileRup(Rupture),
}

/// Shared log written by one or more [`RecordingConsumer`]s.
pub type ScanLog = Rc<RefCell<Vec<ScanEvent>>>;

/// Consumer that appends every callback to a shared [`ScanLog`].
///
/// Optionally requests sterile ruptures down to a fixed floor at every
/// generation.
pub struct RecordingConsumer {
    log: ScanLog,
    sterile_floor: Option<f64>,
}

impl RecordingConsumer {
    pub fn new(log: ScanLog) -> Self {
        Self {
            log,
            sterile_floor: None,
        }
    }

    /// Request sterile ruptures down to `floor` at each generation.
    pub fn with_sterile_floor(mut self, floor: f64) -> Self {
        self.sterile_floor = Some(floor);
        self
    }

    fn push(&self, event: ScanEvent) {
        self.log.borrow_mut().push(event);
    }
}

impl CatalogConsumer for RecordingConsumer {
    fn open(&mut self) {
        self.push(ScanEvent::Open);
    }

    fn close(&mut self) {
        self.push(ScanEvent::Close);
    }

    fn begin_catalog(&mut self, comm: &mut ScanComm<'_>) {
        self.push(ScanEvent::BeginCatalog {
            catalog_index: comm.catalog_index,
            gen_count: comm.gen_count,
            stop_time: comm.stop_time,
        });
    }

    fn end_catalog(&mut self, _comm: &mut ScanComm<'_>) {
        self.push(ScanEvent::EndCatalog);
    }

    fn begin_seed_generation(&mut self, comm: &mut ScanComm<'_>) {
        if let Some(floor) = self.sterile_floor {
            comm.request_sterile_mag(floor);
        }
        self.push(ScanEvent::BeginSeedGeneration {
            gen_size: comm.gen_size,
        });
    }

    fn end_seed_generation(&mut self, _comm: &mut ScanComm<'_>) {
        self.push(ScanEvent::EndSeedGeneration);
    }

    fn next_seed_rup(&mut self, _comm: &mut ScanComm<'_>, rup: &Rupture) {
        self.push(ScanEvent::SeedRup(*rup));
    }

    fn begin_generation(&mut self, comm: &mut ScanComm<'_>) {
        if let Some(floor) = self.sterile_floor {
            comm.request_sterile_mag(floor);
        }
        self.push(ScanEvent::BeginGeneration {
            i_gen: comm.i_gen,
            gen_info: comm.gen_info,
        });
    }

    fn end_generation(&mut self, comm: &mut ScanComm<'_>) {
        self.push(ScanEvent::EndGeneration { i_gen: comm.i_gen });
    }

    fn next_rup(&mut self, _comm: &mut ScanComm<'_>, rup: &Rupture) {
        self.push(ScanEvent::Rup(*rup));
    }

    fn next_sterile_rup(&mut self, _comm: &mut ScanComm<'_>, rup: &Rupture) {
        self.push(ScanEvent::SterileRup(*rup));
    }
}

/// A generation to be written by [`fill_storage`]: its magnitude window and
/// its ruptures.
#[derive(Clone, Debug)]
pub struct GenerationSpec {
    pub gen_info: GenerationInfo,
    pub ruptures: Vec<Rupture>,
}

impl GenerationSpec {
    pub fn new(gen_mag_min: f64, gen_mag_max: f64, ruptures: Vec<Rupture>) -> Self {
        Self {
            gen_info: GenerationInfo::new(gen_mag_min, gen_mag_max),
            ruptures,
        }
    }
}

/// Write a complete catalog into `storage`.
///
/// `stop` optionally tightens the stop time and sets the result code before
/// the catalog is closed.
pub fn fill_storage(
    storage: &mut CatalogStorage,
    params: &CatalogParams,
    generations: &[GenerationSpec],
    stop: Option<(f64, CatalogResult)>,
) {
    storage.begin_catalog(params);
    for g in generations {
        storage.begin_generation(&g.gen_info);
        for rup in &g.ruptures {
            storage.add_rup(rup);
        }
        storage.end_generation();
    }
    if let Some((stop_time, result)) = stop {
        storage.set_stop_time(stop_time);
        storage.set_result_code(result);
    }
    storage.end_catalog();
}

/// A fresh storage with default configuration holding the given catalog.
pub fn storage_with(
    params: &CatalogParams,
    generations: &[GenerationSpec],
    stop: Option<(f64, CatalogResult)>,
) -> CatalogStorage {
    let mut storage = CatalogStorage::new(StorageConfig::default())
        .unwrap_or_else(|e| panic!("default storage config rejected: {e}"));
    fill_storage(&mut storage, params, generations, stop);
    storage
}

/// A non-seed rupture with zero productivity at the origin, parented on the
/// first rupture of the previous generation.
pub fn child(t_day: f64, rup_mag: f64) -> Rupture {
    Rupture {
        t_day,
        rup_mag,
        k_prod: 0.0,
        rup_parent: 0,
        x_km: 0.0,
        y_km: 0.0,
    }
}
