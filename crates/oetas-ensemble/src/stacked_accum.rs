//! Stacked-distribution accumulator with outfill and catalog acceptance.
//!
//! Each cell holds a live [`StackedPoissonAccumulator`]. A catalog adds to
//! every cell the distribution of its observed cumulative count, shifted
//! Poisson when infill or outfill supplies an expectation. Consumers fold
//! each catalog into a [`PartialGrid`] leased from a lock-free pool and
//! hand it to an [`OrderedMerge`], which adds it to the total in catalog
//! order. The forecast is therefore identical for any number of workers.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use oetas_core::{CatalogConsumer, MarshalError, MarshalReader, MarshalWriter, Rupture, ScanComm};
use oetas_poisson::{PoissonCache, StackedPoissonAccumulator};
use tracing::debug;

use crate::accumulator::{EnsembleAccumulator, ForecastReadout};
use crate::binner::CatalogBinner;
use crate::grid::TimeMagGrid;
use crate::merge::OrderedMerge;
use crate::modes::{AccumulationModes, OutfillMode};
use crate::pool::{PartialGrid, PartialPool};

// ── StackedForecast ────────────────────────────────────────────────

/// Finished result of a [`TimeMagStackedAccumulator`]: one cumulated
/// distribution per cell.
///
/// Cells can carry different total weights when outfill omits unobserved
/// cells.
#[derive(Clone, Debug, PartialEq)]
pub struct StackedForecast {
    grid: TimeMagGrid,
    modes: AccumulationModes,
    catalog_count: usize,
    cells: Vec<StackedPoissonAccumulator>,
}

impl StackedForecast {
    /// Strategies the forecast was built with.
    pub fn modes(&self) -> AccumulationModes {
        self.modes
    }

    /// Distribution of cell `(t, m)`.
    pub fn cell(&self, t: usize, m: usize) -> &StackedPoissonAccumulator {
        &self.cells[self.grid.cell(t, m)]
    }

    fn map_cells<T>(&self, f: impl Fn(&StackedPoissonAccumulator) -> T) -> Vec<Vec<T>> {
        self.cells
            .chunks(self.grid.mag_bins())
            .map(|row| row.iter().map(&f).collect())
            .collect()
    }

    const MARSHAL_NAME: &'static str = "StackedForecast";
    const MARSHAL_VERSION: u8 = 1;

    /// Write the forecast.
    pub fn marshal<W: Write>(&self, w: &mut MarshalWriter<W>) -> Result<(), MarshalError> {
        w.begin_object(Self::MARSHAL_NAME, Self::MARSHAL_VERSION)?;
        self.grid.marshal(w)?;
        w.write_u8("infill", self.modes.infill.code())?;
        w.write_u8("outfill", self.modes.outfill.code())?;
        w.write_u8("clip", self.modes.clip.code())?;
        w.write_usize("catalog_count", self.catalog_count)?;
        for cell in &self.cells {
            cell.marshal(w)?;
        }
        w.end_object(Self::MARSHAL_NAME)
    }

    /// Read a forecast written by [`marshal`](Self::marshal) against an
    /// identically configured cache.
    pub fn unmarshal<R: Read>(
        r: &mut MarshalReader<R>,
        cache: &Arc<PoissonCache>,
    ) -> Result<Self, MarshalError> {
        r.begin_object(Self::MARSHAL_NAME, Self::MARSHAL_VERSION)?;
        let grid = TimeMagGrid::unmarshal(r)?;
        let infill = r.read_u8("infill")?;
        let outfill = r.read_u8("outfill")?;
        let clip = r.read_u8("clip")?;
        let modes = AccumulationModes::from_codes(infill, outfill, clip).map_err(|e| {
            MarshalError::Malformed {
                detail: e.to_string(),
            }
        })?;
        let catalog_count = r.read_usize("catalog_count")?;
        let cells = (0..grid.cell_count())
            .map(|_| StackedPoissonAccumulator::unmarshal(r, Arc::clone(cache)))
            .collect::<Result<Vec<_>, _>>()?;
        r.end_object(Self::MARSHAL_NAME)?;
        Ok(Self {
            grid,
            modes,
            catalog_count,
            cells,
        })
    }
}

impl ForecastReadout for StackedForecast {
    fn grid(&self) -> &TimeMagGrid {
        &self.grid
    }

    fn catalog_count(&self) -> usize {
        self.catalog_count
    }

    fn get_fractile_array(&self, fraction: f64) -> Vec<Vec<u64>> {
        self.map_cells(|c| c.get_fractile(fraction))
    }

    fn get_prob_occur_array(&self, xcount: u64) -> Vec<Vec<f64>> {
        self.map_cells(|c| match xcount {
            _ if c.total_weight() <= 0.0 => 0.0,
            0 => 1.0,
            x => c.get_probex(x - 1),
        })
    }

    fn get_mean_array(&self) -> Vec<Vec<f64>> {
        self.map_cells(StackedPoissonAccumulator::get_mean)
    }
}

// ── TimeMagStackedAccumulator ──────────────────────────────────────

/// Ensemble accumulator holding a stacked distribution per cell.
///
/// Memory is independent of the number of catalogs: one grid of
/// distributions per catalog in flight or waiting for its turn to merge,
/// pooled and reused.
pub struct TimeMagStackedAccumulator {
    grid: Arc<TimeMagGrid>,
    cache: Arc<PoissonCache>,
    modes: AccumulationModes,
    pool: PartialPool,
    merge: OrderedMerge,
    open_sessions: AtomicUsize,
    forecast: RwLock<Option<Arc<StackedForecast>>>,
}

// Compile-time assertion: the accumulator is shared by reference across
// worker threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<TimeMagStackedAccumulator>();
};

impl TimeMagStackedAccumulator {
    /// Create an accumulator over `grid`, stacking against `cache`.
    pub fn new(grid: TimeMagGrid, cache: Arc<PoissonCache>, modes: AccumulationModes) -> Self {
        let pool = PartialPool::new(Arc::clone(&cache), grid.cell_count());
        let merge = OrderedMerge::new(PartialGrid::new(&cache, grid.cell_count()));
        Self {
            grid: Arc::new(grid),
            cache,
            modes,
            pool,
            merge,
            open_sessions: AtomicUsize::new(0),
            forecast: RwLock::new(None),
        }
    }

    /// Strategy table.
    pub fn modes(&self) -> AccumulationModes {
        self.modes
    }

    /// The shared cache.
    pub fn cache(&self) -> &Arc<PoissonCache> {
        &self.cache
    }

    /// Number of per-catalog grids built so far.
    pub fn partials_created(&self) -> usize {
        self.pool.created()
    }

    /// The finished forecast, once [`end_accumulation`] has run.
    ///
    /// [`end_accumulation`]: EnsembleAccumulator::end_accumulation
    pub fn forecast(&self) -> Option<Arc<StackedForecast>> {
        self.forecast
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn finished(&self) -> Arc<StackedForecast> {
        match self.forecast() {
            Some(f) => f,
            None => panic!("stacked accumulator read before end_accumulation"),
        }
    }

    fn empty_total(&self) -> PartialGrid {
        PartialGrid::new(&self.cache, self.grid.cell_count())
    }

    fn assert_no_sessions(&self, what: &str) {
        assert_eq!(
            self.open_sessions.load(Ordering::Acquire),
            0,
            "{what} with open consumer sessions"
        );
    }
}

impl EnsembleAccumulator for TimeMagStackedAccumulator {
    fn make_consumer(&self) -> Box<dyn CatalogConsumer + '_> {
        let modes = self.modes;
        Box::new(StackedConsumer {
            acc: self,
            binner: CatalogBinner::new(
                Arc::clone(&self.grid),
                modes.infill,
                modes.clip,
                modes.outfill == OutfillMode::PdfDirect,
            ),
            session_open: false,
        })
    }

    fn begin_accumulation(&self, capacity: usize) {
        self.assert_no_sessions("begin_accumulation");
        let pooled = self.pool.drain();
        let reused = pooled.len();
        for mut partial in pooled {
            partial.clear();
            self.pool.give_back(partial);
        }
        self.merge.reset(self.empty_total(), &self.pool);
        *self.forecast.write().unwrap_or_else(PoisonError::into_inner) = None;
        debug!(
            capacity,
            reused,
            infill = %self.modes.infill,
            outfill = %self.modes.outfill,
            clip = %self.modes.clip,
            "stacked accumulation started"
        );
    }

    /// Memory does not grow with the catalog count, so there is nothing to
    /// reserve.
    fn increase_capacity(&self, _capacity: usize) {}

    fn end_accumulation(&self) {
        self.assert_no_sessions("end_accumulation");
        let (mut merged, peak_pending) = self.merge.finish(self.empty_total(), &self.pool);
        for cell in &mut merged.cells {
            cell.cumulate();
        }
        debug!(
            catalogs = merged.catalogs,
            grids = self.pool.created(),
            peak_pending,
            "stacked accumulation finished"
        );
        let forecast = StackedForecast {
            grid: (*self.grid).clone(),
            modes: self.modes,
            catalog_count: merged.catalogs,
            cells: merged.cells,
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
impl ForecastReadout for TimeMagStackedAccumulator {
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

// ── StackedConsumer ────────────────────────────────────────────────

struct StackedConsumer<'a> {
    acc: &'a TimeMagStackedAccumulator,
    binner: CatalogBinner,
    session_open: bool,
}

impl StackedConsumer<'_> {
    /// Fold the binned catalog into `part`.
    fn fold(&self, part: &mut PartialGrid) {
        let binner = &self.binner;
        let obs = binner.observation();
        let grid = binner.grid();
        let (counts, expected) = (binner.counts(), binner.expected());
        for t in 0..grid.time_bins() {
            for m in 0..grid.mag_bins() {
                let c = grid.cell(t, m);
                let mean = if t < obs.observed_bins {
                    expected[c]
                } else {
                    match self.acc.modes.outfill {
                        OutfillMode::None => expected[c],
                        OutfillMode::Omit => continue,
                        OutfillMode::PdfDirect => expected[c] + binner.direct_mean(t, m),
                    }
                };
                part.cells[c].add_shifted_poisson(mean, counts[c], 1.0);
            }
        }
        part.catalogs += 1;
    }
}

impl CatalogConsumer for StackedConsumer<'_> {
    fn open(&mut self) {
        if !self.session_open {
            self.acc.open_sessions.fetch_add(1, Ordering::AcqRel);
            self.session_open = true;
        }
    }

    fn close(&mut self) {
        if self.session_open {
            self.acc.open_sessions.fetch_sub(1, Ordering::AcqRel);
            self.session_open = false;
        }
    }

    fn begin_catalog(&mut self, comm: &mut ScanComm<'_>) {
        self.binner.begin_catalog(comm);
    }

    fn end_catalog(&mut self, comm: &mut ScanComm<'_>) {
        assert!(
            self.session_open,
            "catalog scanned outside an open consumer session"
        );
        self.binner.end_catalog();
        let acc = self.acc;
        if !self.binner.observation().accepted {
            acc.merge.submit(comm.catalog_index, None, &acc.pool);
            return;
        }
        self.binner.cumulate();
        let mut lease = acc.pool.checkout();
        self.fold(&mut lease);
        acc.merge
            .submit(comm.catalog_index, Some(lease.into_grid()), &acc.pool);
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

impl Drop for StackedConsumer<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::{ClipPolicy, InfillMode};
    use oetas_arena::{CatalogScanner, CatalogStorage};
    use oetas_core::{CatalogParams, CatalogResult, OEtasRng};
    use oetas_poisson::PoissonCacheConfig;
    use oetas_test_utils::{child, storage_with, GenerationSpec};

    fn cache() -> Arc<PoissonCache> {
        Arc::new(PoissonCache::new(PoissonCacheConfig::compact()).unwrap())
    }

    fn grid() -> TimeMagGrid {
        TimeMagGrid::new(vec![0.0, 1.0, 10.0], vec![3.0, 5.0]).unwrap()
    }

    fn catalog(children: Vec<Rupture>, stop: Option<f64>) -> CatalogStorage {
        let params = CatalogParams::default();
        let seed = Rupture::seed(0.0, 6.0, params.seed_productivity(6.0));
        storage_with(
            &params,
            &[
                GenerationSpec::new(3.0, 9.5, vec![seed]),
                GenerationSpec::new(3.0, 9.5, children),
            ],
            stop.map(|t| (t, CatalogResult::EarlyStop)),
        )
    }

    fn run(acc: &TimeMagStackedAccumulator, stores: &[CatalogStorage]) {
        acc.begin_accumulation(stores.len());
        let mut rng = OEtasRng::seed_from_u64(0);
        let mut scanner = CatalogScanner::new();
        scanner.add_consumer(acc.make_consumer());
        scanner.open();
        for store in stores {
            scanner.scan(store, &mut rng);
        }
        scanner.close();
        acc.end_accumulation();
    }

    fn modes(outfill: OutfillMode, clip: ClipPolicy) -> AccumulationModes {
        AccumulationModes {
            infill: InfillMode::None,
            outfill,
            clip,
        }
    }

    #[test]
    fn point_masses_without_infill() {
        let acc = TimeMagStackedAccumulator::new(grid(), cache(), AccumulationModes::default());
        run(
            &acc,
            &[
                catalog(vec![child(0.5, 3.5), child(2.0, 5.5)], None),
                catalog(vec![], None),
            ],
        );
        assert_eq!(acc.catalog_count(), 2);
        assert_eq!(acc.get_mean_array(), vec![vec![0.5, 0.0], vec![1.0, 0.5]]);
        assert_eq!(acc.get_prob_occur_array(1), vec![vec![0.5, 0.0], vec![0.5, 0.5]]);
        assert_eq!(acc.get_prob_occur_array(0)[0][1], 1.0);
        assert_eq!(acc.get_fractile_array(0.9)[1][0], 2);
    }

    #[test]
    fn entire_policy_rejects_truncated_catalogs() {
        let acc = TimeMagStackedAccumulator::new(
            grid(),
            cache(),
            modes(OutfillMode::None, ClipPolicy::Entire),
        );
        run(
            &acc,
            &[
                catalog(vec![child(0.5, 3.5)], Some(5.0)),
                catalog(vec![], None),
            ],
        );
        assert_eq!(acc.catalog_count(), 1);
        assert_eq!(acc.get_mean_array()[1][0], 0.0);
    }

    #[test]
    fn omit_leaves_unobserved_cells_out() {
        let acc = TimeMagStackedAccumulator::new(
            grid(),
            cache(),
            modes(OutfillMode::Omit, ClipPolicy::AnyClip),
        );
        run(
            &acc,
            &[
                catalog(vec![child(0.5, 3.5), child(2.0, 3.5)], Some(5.0)),
                catalog(vec![child(0.5, 3.5)], None),
            ],
        );
        let f = acc.forecast().unwrap();
        assert_eq!(f.cell(0, 0).total_weight(), 2.0);
        assert_eq!(f.cell(1, 0).total_weight(), 1.0);
        assert_eq!(acc.get_mean_array()[1][0], 1.0);
    }

    #[test]
    fn direct_outfill_raises_unobserved_cells() {
        let stores = [catalog(vec![child(0.5, 3.5)], Some(0.8))];
        let plain = TimeMagStackedAccumulator::new(
            grid(),
            cache(),
            modes(OutfillMode::None, ClipPolicy::Any),
        );
        run(&plain, &stores);
        let direct = TimeMagStackedAccumulator::new(
            grid(),
            cache(),
            modes(OutfillMode::PdfDirect, ClipPolicy::Any),
        );
        run(&direct, &stores);

        let (p, d) = (plain.get_mean_array(), direct.get_mean_array());
        assert_eq!(p[0][0], d[0][0]);
        assert_eq!(p[1][0], 1.0);
        assert!(d[1][0] > p[1][0]);
    }

    #[test]
    fn sessions_reuse_pooled_grids() {
        let acc = TimeMagStackedAccumulator::new(grid(), cache(), AccumulationModes::default());
        run(&acc, &[catalog(vec![], None)]);
        run(&acc, &[catalog(vec![child(0.5, 3.5)], None)]);
        assert_eq!(acc.partials_created(), 1);
        assert_eq!(acc.catalog_count(), 1);
        assert_eq!(acc.get_mean_array()[0][0], 1.0);
    }

    #[test]
    fn forecast_marshal_roundtrip() {
        let cache = cache();
        let acc = TimeMagStackedAccumulator::new(
            grid(),
            Arc::clone(&cache),
            AccumulationModes {
                infill: InfillMode::Poisson,
                outfill: OutfillMode::PdfDirect,
                clip: ClipPolicy::Range,
            },
        );
        run(
            &acc,
            &[
                catalog(vec![child(0.5, 3.5)], Some(3.0)),
                catalog(vec![child(4.0, 5.5)], None),
            ],
        );
        let forecast = acc.forecast().unwrap();
        let mut w = MarshalWriter::new(Vec::new());
        forecast.marshal(&mut w).unwrap();
        let buf = w.into_inner();
        let back =
            StackedForecast::unmarshal(&mut MarshalReader::new(buf.as_slice()), &cache).unwrap();
        assert_eq!(&back, forecast.as_ref());
    }
}
