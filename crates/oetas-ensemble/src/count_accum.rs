//! Fixed-capacity accumulator of per-catalog cumulative counts.
//!
//! Every catalog claims a slot from an atomic counter and writes its
//! cumulative grid into its consumer's session buffer. Buffers travel back
//! to the accumulator over a channel when the session closes.
//! [`end_accumulation`](EnsembleAccumulator::end_accumulation) scatters
//! them into per-cell arrays and sorts each one, so fractiles are direct
//! index lookups.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crossbeam_channel::{Receiver, Sender};
use oetas_core::{CatalogConsumer, MarshalError, MarshalReader, MarshalWriter, Rupture, ScanComm};
use tracing::debug;

use crate::accumulator::{EnsembleAccumulator, ForecastReadout};
use crate::binner::CatalogBinner;
use crate::grid::TimeMagGrid;
use crate::modes::{ClipPolicy, InfillMode};

// ── CountForecast ──────────────────────────────────────────────────

/// Finished result of a [`TimeMagCountAccumulator`]: every catalog's
/// cumulative count in every cell, sorted per cell.
#[derive(Clone, Debug, PartialEq)]
pub struct CountForecast {
    grid: TimeMagGrid,
    infill: InfillMode,
    catalog_count: usize,
    // Cell-major: cell c holds values[c * catalog_count..][..catalog_count].
    values: Vec<u64>,
}

impl CountForecast {
    /// Infill mode the counts were built with.
    pub fn infill(&self) -> InfillMode {
        self.infill
    }

    /// Sorted per-catalog counts of cell `(t, m)`.
    pub fn cell_values(&self, t: usize, m: usize) -> &[u64] {
        let n = self.catalog_count;
        let c = self.grid.cell(t, m);
        &self.values[c * n..(c + 1) * n]
    }

    fn map_cells<T>(&self, f: impl Fn(&[u64]) -> T) -> Vec<Vec<T>> {
        (0..self.grid.time_bins())
            .map(|t| {
                (0..self.grid.mag_bins())
                    .map(|m| f(self.cell_values(t, m)))
                    .collect()
            })
            .collect()
    }

    const MARSHAL_NAME: &'static str = "CountForecast";
    const MARSHAL_VERSION: u8 = 1;

    /// Write the forecast.
    pub fn marshal<W: Write>(&self, w: &mut MarshalWriter<W>) -> Result<(), MarshalError> {
        w.begin_object(Self::MARSHAL_NAME, Self::MARSHAL_VERSION)?;
        self.grid.marshal(w)?;
        w.write_u8("infill", self.infill.code())?;
        w.write_usize("catalog_count", self.catalog_count)?;
        w.write_u64_array("values", &self.values)?;
        w.end_object(Self::MARSHAL_NAME)
    }

    /// Read a forecast written by [`marshal`](Self::marshal).
    pub fn unmarshal<R: Read>(r: &mut MarshalReader<R>) -> Result<Self, MarshalError> {
        r.begin_object(Self::MARSHAL_NAME, Self::MARSHAL_VERSION)?;
        let grid = TimeMagGrid::unmarshal(r)?;
        let infill = InfillMode::try_from(r.read_u8("infill")?).map_err(|e| {
            MarshalError::Malformed {
                detail: e.to_string(),
            }
        })?;
        let catalog_count = r.read_usize("catalog_count")?;
        let values = r.read_u64_array("values")?;
        r.end_object(Self::MARSHAL_NAME)?;
        if Some(values.len()) != grid.cell_count().checked_mul(catalog_count) {
            return Err(MarshalError::Malformed {
                detail: format!(
                    "{} values for {} cells x {catalog_count} catalogs",
                    values.len(),
                    grid.cell_count()
                ),
            });
        }
        Ok(Self {
            grid,
            infill,
            catalog_count,
            values,
        })
    }
}

impl ForecastReadout for CountForecast {
    fn grid(&self) -> &TimeMagGrid {
        &self.grid
    }

    fn catalog_count(&self) -> usize {
        self.catalog_count
    }

    /// Value at index `floor(fraction * n)` of each sorted cell, clamped to
    /// the last catalog.
    fn get_fractile_array(&self, fraction: f64) -> Vec<Vec<u64>> {
        self.map_cells(|v| {
            if v.is_empty() {
                return 0;
            }
            let i = ((fraction * v.len() as f64).floor().max(0.0) as usize).min(v.len() - 1);
            v[i]
        })
    }

    fn get_prob_occur_array(&self, xcount: u64) -> Vec<Vec<f64>> {
        self.map_cells(|v| {
            if v.is_empty() {
                return 0.0;
            }
            let below = v.partition_point(|&x| x < xcount);
            (v.len() - below) as f64 / v.len() as f64
        })
    }

    fn get_mean_array(&self) -> Vec<Vec<f64>> {
        self.map_cells(|v| {
            if v.is_empty() {
                return 0.0;
            }
            v.iter().map(|&x| x as f64).sum::<f64>() / v.len() as f64
        })
    }
}

// ── TimeMagCountAccumulator ────────────────────────────────────────

/// Per-session output: claimed slots and their cumulative grids, in order.
#[derive(Default)]
struct SessionBuffer {
    slots: Vec<usize>,
    cells: Vec<u64>,
}

/// Ensemble accumulator keeping every catalog's cumulative count per cell.
///
/// Memory is `capacity * cells` counts. Supports every [`InfillMode`];
/// Poisson infill draws one count per binned cell at catalog end.
/// Catalogs are always accepted and cells past a catalog's stop time carry
/// its last counts.
pub struct TimeMagCountAccumulator {
    grid: Arc<TimeMagGrid>,
    infill: InfillMode,
    capacity: AtomicUsize,
    next_slot: AtomicUsize,
    open_sessions: AtomicUsize,
    session_tx: Sender<SessionBuffer>,
    session_rx: Receiver<SessionBuffer>,
    forecast: RwLock<Option<Arc<CountForecast>>>,
}

// Compile-time assertion: the accumulator is shared by reference across
// worker threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<TimeMagCountAccumulator>();
};

impl TimeMagCountAccumulator {
    /// Create an accumulator over `grid` with zero capacity.
    pub fn new(grid: TimeMagGrid, infill: InfillMode) -> Self {
        let (session_tx, session_rx) = crossbeam_channel::unbounded();
        Self {
            grid: Arc::new(grid),
            infill,
            capacity: AtomicUsize::new(0),
            next_slot: AtomicUsize::new(0),
            open_sessions: AtomicUsize::new(0),
            session_tx,
            session_rx,
            forecast: RwLock::new(None),
        }
    }

    /// Infill mode.
    pub fn infill(&self) -> InfillMode {
        self.infill
    }

    /// Current capacity.
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// The finished forecast, once [`end_accumulation`] has run.
    ///
    /// [`end_accumulation`]: EnsembleAccumulator::end_accumulation
    pub fn forecast(&self) -> Option<Arc<CountForecast>> {
        self.forecast
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn finished(&self) -> Arc<CountForecast> {
        match self.forecast() {
            Some(f) => f,
            None => panic!("count accumulator read before end_accumulation"),
        }
    }

    fn claim_slot(&self) -> usize {
        let slot = self.next_slot.fetch_add(1, Ordering::AcqRel);
        let capacity = self.capacity.load(Ordering::Acquire);
        assert!(
            slot < capacity,
            "count accumulator capacity {capacity} exceeded"
        );
        slot
    }
}

impl EnsembleAccumulator for TimeMagCountAccumulator {
    fn make_consumer(&self) -> Box<dyn CatalogConsumer + '_> {
        Box::new(CountConsumer {
            acc: self,
            binner: CatalogBinner::new(
                Arc::clone(&self.grid),
                self.infill,
                ClipPolicy::Any,
                false,
            ),
            session: None,
        })
    }

    fn begin_accumulation(&self, capacity: usize) {
        assert_eq!(
            self.open_sessions.load(Ordering::Acquire),
            0,
            "begin_accumulation with open consumer sessions"
        );
        let stale = self.session_rx.try_iter().count();
        self.next_slot.store(0, Ordering::Release);
        self.capacity.store(capacity, Ordering::Release);
        *self.forecast.write().unwrap_or_else(PoisonError::into_inner) = None;
        debug!(capacity, stale, infill = %self.infill, "count accumulation started");
    }

    fn increase_capacity(&self, capacity: usize) {
        self.capacity.fetch_max(capacity, Ordering::AcqRel);
    }

    fn end_accumulation(&self) {
        assert_eq!(
            self.open_sessions.load(Ordering::Acquire),
            0,
            "end_accumulation with open consumer sessions"
        );
        let n = self.next_slot.load(Ordering::Acquire);
        let cells = self.grid.cell_count();
        let mut values = vec![0u64; cells * n];
        let mut sessions = 0usize;
        for buf in self.session_rx.try_iter() {
            sessions += 1;
            for (row, &slot) in buf.cells.chunks(cells).zip(&buf.slots) {
                for (c, &v) in row.iter().enumerate() {
                    values[c * n + slot] = v;
                }
            }
        }
        if n > 0 {
            for cell in values.chunks_mut(n) {
                cell.sort_unstable();
            }
        }
        debug!(catalogs = n, sessions, "count accumulation finished");
        let forecast = CountForecast {
            grid: (*self.grid).clone(),
            infill: self.infill,
            catalog_count: n,
            values,
        };
        *self.forecast.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(forecast));
    }
}

/// Readout of the finished forecast.
///
/// # Panics
///
/// Every method except `grid` and the boundary accessors panics if called
/// before `end_accumulation`.
impl ForecastReadout for TimeMagCountAccumulator {
    fn grid(&self) -> &TimeMagGrid {
        &self.grid
    }

    fn catalog_count(&self) -> usize {
        self.finished().catalog_count
    }

    fn get_fractile_array(&self, fraction: f64) -> Vec<Vec<u64>> {
        self.finished().get_fractile_array(fraction)
    }

    fn get_prob_occur_array(&self, xcount: u64) -> Vec<Vec<f64>> {
        self.finished().get_prob_occur_array(xcount)
    }

    fn get_mean_array(&self) -> Vec<Vec<f64>> {
        self.finished().get_mean_array()
    }
}

// ── CountConsumer ──────────────────────────────────────────────────

struct CountConsumer<'a> {
    acc: &'a TimeMagCountAccumulator,
    binner: CatalogBinner,
    session: Option<SessionBuffer>,
}

impl CatalogConsumer for CountConsumer<'_> {
    fn open(&mut self) {
        if self.session.is_none() {
            self.acc.open_sessions.fetch_add(1, Ordering::AcqRel);
            self.session = Some(SessionBuffer::default());
        }
    }

    fn close(&mut self) {
        if let Some(buf) = self.session.take() {
            if !buf.slots.is_empty() {
                // The accumulator owns the receiver, so this cannot fail.
                let _ = self.acc.session_tx.send(buf);
            }
            self.acc.open_sessions.fetch_sub(1, Ordering::AcqRel);
        }
    }

    fn begin_catalog(&mut self, comm: &mut ScanComm<'_>) {
        self.binner.begin_catalog(comm);
    }

    fn end_catalog(&mut self, comm: &mut ScanComm<'_>) {
        self.binner.end_catalog();
        self.binner.draw_infill(comm.rng());
        self.binner.cumulate();
        let Some(session) = self.session.as_mut() else {
            panic!("catalog scanned outside an open consumer session");
        };
        let slot = self.acc.claim_slot();
        session.slots.push(slot);
        session.cells.extend_from_slice(self.binner.counts());
    }

    fn begin_seed_generation(&mut self, comm: &mut ScanComm<'_>) {
        self.binner.begin_seed_generation(comm);
    }

    fn end_seed_generation(&mut self, _comm: &mut ScanComm<'_>) {}

    fn next_seed_rup(&mut self, _comm: &mut ScanComm<'_>, rup: &Rupture) {
        self.binner.seed_rup(rup);
    }

    fn begin_generation(&mut self, comm: &mut ScanComm<'_>) {
        self.binner.begin_generation(comm);
    }

    fn end_generation(&mut self, comm: &mut ScanComm<'_>) {
        self.binner.end_generation(&comm.gen_info);
    }

    fn next_rup(&mut self, _comm: &mut ScanComm<'_>, rup: &Rupture) {
        self.binner.rup(rup);
    }

    fn next_sterile_rup(&mut self, _comm: &mut ScanComm<'_>, rup: &Rupture) {
        self.binner.sterile_rup(rup);
    }
}

impl Drop for CountConsumer<'_> {
    fn drop(&mut self) {
        self.close();
    }
}
