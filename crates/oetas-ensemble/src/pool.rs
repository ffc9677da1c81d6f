//! Pool of reusable partial stacked grids.
//!
//! Consumers check a [`PartialGrid`] out for each catalog they fold. The
//! [`PoolLease`] puts it back when dropped, so a grid is returned on every
//! exit path, unless the holder hands it on with
//! [`into_grid`](PoolLease::into_grid). The pool itself is a lock-free
//! channel; a checkout with the pool empty builds a fresh grid.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use oetas_poisson::{PoissonCache, StackedPoissonAccumulator};

/// One stacked distribution per grid cell, plus the number of catalogs
/// folded in.
#[derive(Clone, Debug, Default)]
pub struct PartialGrid {
    /// Per-cell distributions, time-major.
    pub cells: Vec<StackedPoissonAccumulator>,
    /// Catalogs folded into this grid.
    pub catalogs: usize,
}

impl PartialGrid {
    /// An empty grid of `cell_count` cells over `cache`.
    pub fn new(cache: &Arc<PoissonCache>, cell_count: usize) -> Self {
        Self {
            cells: (0..cell_count)
                .map(|_| StackedPoissonAccumulator::new(Arc::clone(cache)))
                .collect(),
            catalogs: 0,
        }
    }

    /// Remove all contributions, keeping allocations.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.catalogs = 0;
    }

    /// Add every contribution of `other` into `self`.
    pub fn combine_with(&mut self, other: &PartialGrid) {
        for (a, b) in self.cells.iter_mut().zip(&other.cells) {
            a.combine_with(b);
        }
        self.catalogs += other.catalogs;
    }
}

/// Lock-free pool of [`PartialGrid`]s.
pub struct PartialPool {
    cache: Arc<PoissonCache>,
    cell_count: usize,
    tx: Sender<PartialGrid>,
    rx: Receiver<PartialGrid>,
    created: AtomicUsize,
}

impl PartialPool {
    /// An empty pool of grids with `cell_count` cells.
    pub fn new(cache: Arc<PoissonCache>, cell_count: usize) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            cache,
            cell_count,
            tx,
            rx,
            created: AtomicUsize::new(0),
        }
    }

    /// Take a grid from the pool, or build one if the pool is empty.
    pub fn checkout(&self) -> PoolLease<'_> {
        let grid = match self.rx.try_recv() {
            Ok(grid) => grid,
            Err(_) => {
                self.created.fetch_add(1, Ordering::Relaxed);
                PartialGrid::new(&self.cache, self.cell_count)
            }
        };
        PoolLease { pool: self, grid }
    }

    /// Remove and return every pooled grid.
    pub fn drain(&self) -> Vec<PartialGrid> {
        self.rx.try_iter().collect()
    }

    /// Number of grids built since the pool was created.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Return a grid to the pool.
    pub fn give_back(&self, grid: PartialGrid) {
        // The pool owns the receiver, so this cannot fail.
        let _ = self.tx.send(grid);
    }
}

/// A checked-out [`PartialGrid`], returned to its pool on drop.
pub struct PoolLease<'p> {
    pool: &'p PartialPool,
    grid: PartialGrid,
}

impl PoolLease<'_> {
    /// Take the grid out of the lease. The caller becomes responsible for
    /// returning it with [`PartialPool::give_back`].
    pub fn into_grid(mut self) -> PartialGrid {
        std::mem::take(&mut self.grid)
    }
}

impl Deref for PoolLease<'_> {
    type Target = PartialGrid;

    fn deref(&self) -> &PartialGrid {
        &self.grid
    }
}

impl DerefMut for PoolLease<'_> {
    fn deref_mut(&mut self) -> &mut PartialGrid {
        &mut self.grid
    }
}

impl Drop for PoolLease<'_> {
    fn drop(&mut self) {
        // An empty grid means the lease was consumed by `into_grid`.
        if !self.grid.cells.is_empty() {
            self.pool.give_back(std::mem::take(&mut self.grid));
        }
    }
}
