//! Catalog scanner: drives consumers through one pass over a catalog.
//!
//! The scanner delivers the seed generation first, then every later
//! generation in order, each rupture in storage order. When a consumer
//! asks for sterile ruptures during `begin_generation`, the scanner
//! synthesizes below-floor children of the previous generation and
//! delivers them after the stored ruptures, without storing them. The
//! last generation's request also covers that generation's own children,
//! which are delivered after its `end_generation` and before
//! `end_catalog`.

use oetas_core::stats::{generation_floor, gr_rate, omori_rate_shifted};
use oetas_core::{CatalogConsumer, CatalogParams, CatalogView, OEtasRng, Rupture, ScanComm};

/// Drives one or more [`CatalogConsumer`]s over finished catalogs.
///
/// Consumers are borrowed for the scanner's lifetime `'c`. A scanner is
/// typically opened once per worker, used for many catalogs, then closed.
pub struct CatalogScanner<'c> {
    consumers: Vec<Box<dyn CatalogConsumer + 'c>>,
    is_open: bool,
    cum_rate: Vec<f64>,
    next_index: usize,
}

impl<'c> CatalogScanner<'c> {
    /// Create a scanner with no consumers.
    pub fn new() -> Self {
        Self {
            consumers: Vec::new(),
            is_open: false,
            cum_rate: Vec::new(),
            next_index: 0,
        }
    }

    /// Add a consumer. Takes effect at the next [`open`](Self::open).
    ///
    /// # Panics
    ///
    /// Panics if the scanner is open.
    pub fn add_consumer(&mut self, consumer: Box<dyn CatalogConsumer + 'c>) {
        assert!(!self.is_open, "cannot add a consumer to an open scanner");
        self.consumers.push(consumer);
    }

    /// Number of attached consumers.
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Whether the scanner is open.
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Open every consumer. Does nothing if already open.
    pub fn open(&mut self) {
        if self.is_open {
            return;
        }
        for c in &mut self.consumers {
            c.open();
        }
        self.is_open = true;
    }

    /// Close every consumer. Does nothing if already closed.
    pub fn close(&mut self) {
        if !self.is_open {
            return;
        }
        for c in &mut self.consumers {
            c.close();
        }
        self.is_open = false;
    }

    /// Stream the finished catalog `view` through every consumer, indexed
    /// one past the previously scanned catalog (0 for the first).
    ///
    /// `rng` is lent to consumers and used for sterile rupture synthesis.
    ///
    /// # Panics
    ///
    /// Panics if the scanner is not open.
    pub fn scan<V: CatalogView + ?Sized>(&mut self, view: &V, rng: &mut OEtasRng) {
        let index = self.next_index;
        self.scan_indexed(view, rng, index);
    }

    /// Stream the finished catalog `view` through every consumer as
    /// catalog `catalog_index` of its ensemble.
    ///
    /// # Panics
    ///
    /// Panics if the scanner is not open.
    pub fn scan_indexed<V: CatalogView + ?Sized>(
        &mut self,
        view: &V,
        rng: &mut OEtasRng,
        catalog_index: usize,
    ) {
        assert!(self.is_open, "scan called on a closed scanner");
        self.next_index = catalog_index + 1;
        let mut comm = ScanComm::new(*view.params(), rng);
        comm.catalog_index = catalog_index;
        comm.stop_time = view.stop_time();
        comm.result_code = view.result_code();
        comm.gen_count = view.gen_count();
        comm.cat_size = view.cat_size();

        for c in &mut self.consumers {
            c.begin_catalog(&mut comm);
        }

        if comm.gen_count > 0 {
            set_generation(&mut comm, view, 0);
            comm.clear_sterile_request();
            for c in &mut self.consumers {
                c.begin_seed_generation(&mut comm);
            }
            for j in 0..comm.gen_size {
                let rup = view.rup(0, j);
                for c in &mut self.consumers {
                    c.next_seed_rup(&mut comm, &rup);
                }
            }
            for c in &mut self.consumers {
                c.end_seed_generation(&mut comm);
            }
        }

        for i_gen in 1..comm.gen_count {
            set_generation(&mut comm, view, i_gen);
            comm.clear_sterile_request();
            for c in &mut self.consumers {
                c.begin_generation(&mut comm);
            }
            for j in 0..comm.gen_size {
                let rup = view.rup(i_gen, j);
                for c in &mut self.consumers {
                    c.next_rup(&mut comm, &rup);
                }
            }
            if let Some(sterile_mag) = comm.sterile_mag() {
                emit_sterile(
                    view,
                    i_gen,
                    sterile_mag,
                    &mut comm,
                    &mut self.cum_rate,
                    &mut self.consumers,
                );
            }
            for c in &mut self.consumers {
                c.end_generation(&mut comm);
            }
        }

        if comm.gen_count > 0 {
            emit_final_sterile(view, &mut comm, &mut self.cum_rate, &mut self.consumers);
        }

        for c in &mut self.consumers {
            c.end_catalog(&mut comm);
        }
    }
}

impl Default for CatalogScanner<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CatalogScanner<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

fn set_generation<V: CatalogView + ?Sized>(comm: &mut ScanComm<'_>, view: &V, i_gen: usize) {
    comm.i_gen = i_gen;
    comm.gen_info = view.gen_info(i_gen);
    comm.gen_size = view.gen_size(i_gen);
    comm.gen_valid_size = view.gen_valid_size(i_gen);
    comm.next_gen_info = (i_gen + 1 < comm.gen_count).then(|| view.gen_info(i_gen + 1));
}

/// Prefix sums of the trigger rates of generation `i_parent`, integrated up
/// to the stop time. Returns the total.
fn parent_rates<V: CatalogView + ?Sized>(
    view: &V,
    i_parent: usize,
    params: &CatalogParams,
    stop_time: f64,
    cum_rate: &mut Vec<f64>,
) -> f64 {
    let t_hi = params.tend.min(stop_time);
    cum_rate.clear();
    let mut total = 0.0;
    for j in 0..view.gen_size(i_parent) {
        let (t0, k) = view.rup_time_prod(i_parent, j);
        let t_lo = params.tbegin.max(t0);
        total += k * omori_rate_shifted(params.p, params.c, t0, t_lo, t_hi);
        cum_rate.push(total);
    }
    total
}

/// Synthesize children of generation `i_gen - 1` with magnitudes in
/// `[sterile_mag, gen_mag_min)` of generation `i_gen`.
fn emit_sterile<V: CatalogView + ?Sized>(
    view: &V,
    i_gen: usize,
    sterile_mag: f64,
    comm: &mut ScanComm<'_>,
    cum_rate: &mut Vec<f64>,
    consumers: &mut [Box<dyn CatalogConsumer + '_>],
) {
    let params = comm.params;
    let total = parent_rates(view, i_gen - 1, &params, comm.stop_time, cum_rate);
    if total <= params.rate_eps {
        return;
    }
    let floor = comm.gen_info.gen_mag_min;
    sample_sterile(view, i_gen - 1, (sterile_mag, floor), total, comm, cum_rate, consumers);
}

/// Synthesize the below-floor children of the last generation.
///
/// Their floor is the one the generator picks for a generation with the
/// same parents. Children at or after the stop time are dropped, so a
/// catalog truncated at its last generation gets none.
fn emit_final_sterile<V: CatalogView + ?Sized>(
    view: &V,
    comm: &mut ScanComm<'_>,
    cum_rate: &mut Vec<f64>,
    consumers: &mut [Box<dyn CatalogConsumer + '_>],
) {
    let params = comm.params;
    let i_last = comm.gen_count - 1;
    let total = parent_rates(view, i_last, &params, comm.stop_time, cum_rate);
    if total <= params.rate_eps {
        return;
    }
    let floor = generation_floor(&params, total);
    let Some(sterile_mag) = comm.sterile_mag_below(floor) else {
        return;
    };
    sample_sterile(view, i_last, (sterile_mag, floor), total, comm, cum_rate, consumers);
}

/// Draw the children of generation `i_parent` with magnitudes in
/// `[mag_lo, mag_hi)` and deliver those before the stop time.
fn sample_sterile<V: CatalogView + ?Sized>(
    view: &V,
    i_parent: usize,
    (mag_lo, mag_hi): (f64, f64),
    total: f64,
    comm: &mut ScanComm<'_>,
    cum_rate: &[f64],
    consumers: &mut [Box<dyn CatalogConsumer + '_>],
) {
    let params = comm.params;
    let t_hi = params.tend.min(comm.stop_time);
    let expected = total * gr_rate(params.b, params.mref, mag_lo, mag_hi);
    let count = comm.rng().poisson_sample_checked(expected);
    for _ in 0..count {
        let Some(j) = comm.rng().cumulative_sample(cum_rate) else {
            break;
        };
        let (t0, x_km, y_km) = view.rup_time_xy(i_parent, j);
        let t_lo = params.tbegin.max(t0);
        let t_day = comm
            .rng()
            .omori_sample_shifted(params.p, params.c, t0, t_lo, t_hi);
        if !comm.is_valid_time(t_day) {
            continue;
        }
        let rup_mag = comm.rng().gr_sample(params.b, mag_lo, mag_hi);
        let rup = Rupture {
            t_day,
            rup_mag,
            k_prod: 0.0,
            rup_parent: j as i32,
            x_km,
            y_km,
        };
        for c in consumers.iter_mut() {
            c.next_sterile_rup(comm, &rup);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CatalogStorage, StorageConfig};
    use oetas_core::{CatalogBuilder, CatalogParams, GenerationInfo};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log {
        events: Vec<String>,
        indices: Vec<usize>,
        sterile: Vec<Rupture>,
        opens: usize,
        closes: usize,
    }

    struct Recorder {
        log: Rc<RefCell<Log>>,
        sterile_floor: Option<f64>,
    }

    impl CatalogConsumer for Recorder {
        fn open(&mut self) {
            self.log.borrow_mut().opens += 1;
        }
        fn close(&mut self) {
            self.log.borrow_mut().closes += 1;
        }
        fn begin_catalog(&mut self, comm: &mut ScanComm<'_>) {
            let mut log = self.log.borrow_mut();
            log.events.push(format!("begin_catalog {}", comm.gen_count));
            log.indices.push(comm.catalog_index);
        }
        fn end_catalog(&mut self, _comm: &mut ScanComm<'_>) {
            self.log.borrow_mut().events.push("end_catalog".into());
        }
        fn begin_seed_generation(&mut self, comm: &mut ScanComm<'_>) {
            if let Some(floor) = self.sterile_floor {
                comm.request_sterile_mag(floor);
            }
            self.log.borrow_mut().events.push("begin_seed".into());
        }
        fn end_seed_generation(&mut self, _comm: &mut ScanComm<'_>) {
            self.log.borrow_mut().events.push("end_seed".into());
        }
        fn next_seed_rup(&mut self, _comm: &mut ScanComm<'_>, rup: &Rupture) {
            self.log
                .borrow_mut()
                .events
                .push(format!("seed {}", rup.rup_mag));
        }
        fn begin_generation(&mut self, comm: &mut ScanComm<'_>) {
            if let Some(floor) = self.sterile_floor {
                comm.request_sterile_mag(floor);
            }
            self.log
                .borrow_mut()
                .events
                .push(format!("begin_gen {}", comm.i_gen));
        }
        fn end_generation(&mut self, comm: &mut ScanComm<'_>) {
            self.log
                .borrow_mut()
                .events
                .push(format!("end_gen {}", comm.i_gen));
        }
        fn next_rup(&mut self, _comm: &mut ScanComm<'_>, rup: &Rupture) {
            self.log
                .borrow_mut()
                .events
                .push(format!("rup {}", rup.t_day));
        }
        fn next_sterile_rup(&mut self, _comm: &mut ScanComm<'_>, rup: &Rupture) {
            self.log.borrow_mut().sterile.push(*rup);
        }
    }

    fn catalog(ten_a_scale: f64) -> CatalogStorage {
        let params = CatalogParams::default();
        let mut storage = CatalogStorage::new(StorageConfig::default()).unwrap();
        storage.begin_catalog(&params);
        storage.begin_generation(&GenerationInfo::new(3.0, 9.5));
        storage.add_rup(&Rupture::seed(0.0, 6.0, params.seed_productivity(6.0) * ten_a_scale));
        storage.end_generation();
        storage.begin_generation(&GenerationInfo::new(4.5, 9.5));
        for t in [0.25, 1.5] {
            storage.add_rup(&Rupture {
                t_day: t,
                rup_mag: 5.0,
                k_prod: 0.1,
                rup_parent: 0,
                x_km: 0.0,
                y_km: 0.0,
            });
        }
        storage.end_generation();
        storage.end_catalog();
        storage
    }

    fn record(storage: &CatalogStorage, sterile_floor: Option<f64>, seed: u64) -> Log {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut rng = OEtasRng::seed_from_u64(seed);
        let mut scanner = CatalogScanner::new();
        scanner.add_consumer(Box::new(Recorder {
            log: Rc::clone(&log),
            sterile_floor,
        }));
        scanner.open();
        scanner.scan(storage, &mut rng);
        scanner.close();
        drop(scanner);
        Rc::try_unwrap(log).ok().unwrap().into_inner()
    }

    #[test]
    fn delivers_in_protocol_order() {
        let log = Rc::new(RefCell::new(Log::default()));
        let storage = catalog(1.0);
        let mut rng = OEtasRng::seed_from_u64(1);
        let mut scanner = CatalogScanner::new();
        scanner.add_consumer(Box::new(Recorder {
            log: Rc::clone(&log),
            sterile_floor: None,
        }));
        scanner.open();
        scanner.scan(&storage, &mut rng);
        scanner.close();

        let events = log.borrow().events.clone();
        assert_eq!(
            events,
            vec![
                "begin_catalog 2",
                "begin_seed",
                "seed 6",
                "end_seed",
                "begin_gen 1",
                "rup 0.25",
                "rup 1.5",
                "end_gen 1",
                "end_catalog",
            ]
        );
        assert!(log.borrow().sterile.is_empty());
    }

    #[test]
    fn open_and_close_are_idempotent() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut scanner = CatalogScanner::new();
        scanner.add_consumer(Box::new(Recorder {
            log: Rc::clone(&log),
            sterile_floor: None,
        }));
        scanner.open();
        scanner.open();
        scanner.close();
        scanner.close();
        scanner.open();
        drop(scanner);
        assert_eq!(log.borrow().opens, 2);
        assert_eq!(log.borrow().closes, 2);
    }

    #[test]
    fn sterile_ruptures_lie_below_floor() {
        let log = Rc::new(RefCell::new(Log::default()));
        let storage = catalog(1.0);
        let mut rng = OEtasRng::seed_from_u64(3);
        let mut scanner = CatalogScanner::new();
        scanner.add_consumer(Box::new(Recorder {
            log: Rc::clone(&log),
            sterile_floor: Some(3.0),
        }));
        scanner.open();
        scanner.scan(&storage, &mut rng);
        scanner.close();

        let log = log.borrow();
        assert!(!log.sterile.is_empty());
        for rup in &log.sterile {
            assert!((3.0..4.5).contains(&rup.rup_mag), "mag {}", rup.rup_mag);
            assert_eq!(rup.k_prod, 0.0);
            assert_eq!(rup.rup_parent, 0);
            assert!(rup.t_day >= 0.0 && rup.t_day <= 365.0);
        }
        // Stored ruptures are still delivered in full.
        assert_eq!(
            log.events.iter().filter(|e| e.starts_with("rup ")).count(),
            2
        );
    }

    #[test]
    fn sterile_ruptures_respect_stop_time() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut storage = catalog(1.0);
        storage.begin_catalog(&CatalogParams::default());
        storage.begin_generation(&GenerationInfo::new(3.0, 9.5));
        storage.add_rup(&Rupture::seed(0.0, 6.5, 50.0));
        storage.end_generation();
        storage.begin_generation(&GenerationInfo::new(5.0, 9.5));
        storage.end_generation();
        storage.set_stop_time(2.0);
        storage.end_catalog();

        let mut rng = OEtasRng::seed_from_u64(4);
        let mut scanner = CatalogScanner::new();
        scanner.add_consumer(Box::new(Recorder {
            log: Rc::clone(&log),
            sterile_floor: Some(3.0),
        }));
        scanner.open();
        scanner.scan(&storage, &mut rng);
        scanner.close();

        let log = log.borrow();
        assert!(!log.sterile.is_empty());
        assert!(log.sterile.iter().all(|r| r.t_day < 2.0));
    }

    #[test]
    fn catalog_index_follows_scan_order() {
        let log = Rc::new(RefCell::new(Log::default()));
        let storage = catalog(1.0);
        let mut rng = OEtasRng::seed_from_u64(1);
        let mut scanner = CatalogScanner::new();
        scanner.add_consumer(Box::new(Recorder {
            log: Rc::clone(&log),
            sterile_floor: None,
        }));
        scanner.open();
        scanner.scan(&storage, &mut rng);
        scanner.scan(&storage, &mut rng);
        scanner.scan_indexed(&storage, &mut rng, 7);
        scanner.scan(&storage, &mut rng);
        scanner.close();
        assert_eq!(log.borrow().indices, vec![0, 1, 7, 8]);
    }

    #[test]
    fn last_generation_children_are_synthesized_up_to_stop_time() {
        // A sterile seed, and a last generation that is productive but
        // cut short by an early stop.
        let params = CatalogParams::default();
        let mut storage = CatalogStorage::new(StorageConfig::default()).unwrap();
        storage.begin_catalog(&params);
        storage.begin_generation(&GenerationInfo::new(3.0, 9.5));
        storage.add_rup(&Rupture::seed(0.0, 6.0, 0.0));
        storage.end_generation();
        storage.begin_generation(&GenerationInfo::new(4.5, 9.5));
        for t in [0.25, 1.5] {
            storage.add_rup(&Rupture {
                t_day: t,
                rup_mag: 5.0,
                k_prod: 50.0,
                rup_parent: 0,
                x_km: 0.0,
                y_km: 0.0,
            });
        }
        storage.end_generation();
        storage.set_stop_time(2.0);
        storage.set_result_code(oetas_core::CatalogResult::EarlyStop);
        storage.end_catalog();

        let log = record(&storage, Some(3.0), 8);
        assert!(!log.sterile.is_empty());
        for rup in &log.sterile {
            assert!(rup.t_day >= 0.25 && rup.t_day < 2.0, "t {}", rup.t_day);
            assert!(rup.rup_mag >= 3.0 && rup.rup_mag <= params.mag_min_hi);
            assert_eq!(rup.k_prod, 0.0);
        }
        assert!(log.sterile.iter().any(|r| r.rup_parent == 1));
        assert!(log
            .sterile
            .iter()
            .filter(|r| r.rup_parent == 1)
            .all(|r| r.t_day >= 1.5));
        // Delivered after the last generation closes.
        let events = &log.events;
        assert_eq!(events[events.len() - 2], "end_gen 1");
        assert_eq!(events[events.len() - 1], "end_catalog");
    }

    #[test]
    fn seed_only_catalog_gets_sterile_children() {
        let params = CatalogParams::default();
        let mut storage = CatalogStorage::new(StorageConfig::default()).unwrap();
        storage.begin_catalog(&params);
        storage.begin_generation(&GenerationInfo::new(3.0, 9.5));
        storage.add_rup(&Rupture::seed(0.0, 6.5, 50.0));
        storage.end_generation();
        storage.end_catalog();

        let log = record(&storage, Some(3.0), 9);
        assert!(!log.sterile.is_empty());
        assert!(log
            .sterile
            .iter()
            .all(|r| r.rup_parent == 0 && r.rup_mag >= 3.0 && r.t_day >= 0.0));
    }

    #[test]
    fn truncated_catalog_gets_no_final_sterile_children() {
        // Truncation pulls the stop time back to the last generation's
        // earliest rupture, so none of its children are valid.
        let params = CatalogParams::default();
        let mut storage = CatalogStorage::new(StorageConfig::default()).unwrap();
        storage.begin_catalog(&params);
        storage.begin_generation(&GenerationInfo::new(3.0, 9.5));
        storage.add_rup(&Rupture::seed(0.0, 6.0, 0.0));
        storage.end_generation();
        storage.begin_generation(&GenerationInfo::new(4.5, 9.5));
        storage.add_rup(&Rupture {
            t_day: 3.0,
            rup_mag: 5.0,
            k_prod: 50.0,
            rup_parent: 0,
            x_km: 0.0,
            y_km: 0.0,
        });
        storage.end_generation();
        storage.set_stop_time(3.0);
        storage.set_result_code(oetas_core::CatalogResult::TooManyGen);
        storage.end_catalog();

        let log = record(&storage, Some(3.0), 10);
        assert!(log.sterile.is_empty());
    }
}
