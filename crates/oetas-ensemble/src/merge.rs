//! Catalog-ordered merge of per-catalog partial grids.
//!
//! Floating-point sums depend on the order of their terms. Workers finish
//! catalogs in whatever order the scheduler allows, so each catalog is
//! folded into a grid of its own and [`OrderedMerge`] adds the grids to the
//! running total strictly by catalog index. The total is then the same for
//! any number of workers.
//!
//! Grids that arrive ahead of their turn wait in a pending map until every
//! lower index has been merged. Merged grids are cleared and returned to
//! the [`PartialPool`].

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::pool::{PartialGrid, PartialPool};

/// Running total of per-catalog grids, merged by catalog index.
pub struct OrderedMerge {
    state: Mutex<MergeState>,
}

struct MergeState {
    merged: PartialGrid,
    next_index: usize,
    /// Grids waiting for a lower index. `None` marks a catalog that
    /// contributed nothing but still holds its place in the order.
    pending: BTreeMap<usize, Vec<Option<PartialGrid>>>,
    peak_pending: usize,
}

impl MergeState {
    fn absorb(&mut self, part: Option<PartialGrid>, pool: &PartialPool) {
        if let Some(mut grid) = part {
            self.merged.combine_with(&grid);
            grid.clear();
            pool.give_back(grid);
        }
    }

    /// Merge every pending entry that is now in turn.
    fn advance(&mut self, pool: &PartialPool) {
        while let Some(parts) = self.pending.remove(&self.next_index) {
            for part in parts {
                self.absorb(part, pool);
            }
            self.next_index += 1;
        }
    }
}

impl OrderedMerge {
    /// Start from the empty total `merged`.
    pub fn new(merged: PartialGrid) -> Self {
        Self {
            state: Mutex::new(MergeState {
                merged,
                next_index: 0,
                pending: BTreeMap::new(),
                peak_pending: 0,
            }),
        }
    }

    /// Discard any state and start again from the empty total `merged`.
    ///
    /// Pending grids are cleared and returned to `pool`.
    pub fn reset(&self, merged: PartialGrid, pool: &PartialPool) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for mut grid in std::mem::take(&mut state.pending).into_values().flatten().flatten() {
            grid.clear();
            pool.give_back(grid);
        }
        state.merged = merged;
        state.next_index = 0;
        state.peak_pending = 0;
    }

    /// Hand over the grid of catalog `catalog_index`, or `None` if the
    /// catalog contributed nothing.
    ///
    /// Indices below the next expected one (a catalog scanned twice under
    /// the same index) are merged at once.
    pub fn submit(&self, catalog_index: usize, part: Option<PartialGrid>, pool: &PartialPool) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if catalog_index < state.next_index {
            state.absorb(part, pool);
            return;
        }
        state.pending.entry(catalog_index).or_default().push(part);
        state.advance(pool);
        let waiting = state.pending.values().map(Vec::len).sum::<usize>();
        state.peak_pending = state.peak_pending.max(waiting);
    }

    /// Merge whatever is still pending, in index order, and return the
    /// total together with the largest number of grids that waited at once.
    ///
    /// Indices that never arrived are skipped. The merge is left holding
    /// `empty`.
    pub fn finish(&self, empty: PartialGrid, pool: &PartialPool) -> (PartialGrid, usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for part in std::mem::take(&mut state.pending).into_values().flatten() {
            state.absorb(part, pool);
        }
        state.next_index = 0;
        let peak = std::mem::take(&mut state.peak_pending);
        (std::mem::replace(&mut state.merged, empty), peak)
    }
}

// Compile-time assertion: the merge is shared by reference across worker
// threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<OrderedMerge>();
};
