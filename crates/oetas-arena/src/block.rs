//! Fixed-size rupture blocks and the growable block list.
//!
//! A [`RuptureBlock`] holds one column per rupture field for `2^shift`
//! ruptures. A [`BlockList`] addresses ruptures by linear index, split into
//! `(index >> shift, index & mask)`, and appends blocks as the index grows.
//! Blocks are never freed during a run; [`BlockList`] only grows.

use oetas_core::Rupture;

/// One block of rupture columns.
///
/// Time is stored as `f64`; magnitude, productivity and coordinates as
/// `f32`; the parent index as `i32`.
pub struct RuptureBlock {
    t_day: Box<[f64]>,
    rup_mag: Box<[f32]>,
    k_prod: Box<[f32]>,
    x_km: Box<[f32]>,
    y_km: Box<[f32]>,
    rup_parent: Box<[i32]>,
}

impl RuptureBlock {
    /// Create a zero-initialised block of `len` slots.
    pub fn new(len: usize) -> Self {
        Self {
            t_day: vec![0.0; len].into_boxed_slice(),
            rup_mag: vec![0.0; len].into_boxed_slice(),
            k_prod: vec![0.0; len].into_boxed_slice(),
            x_km: vec![0.0; len].into_boxed_slice(),
            y_km: vec![0.0; len].into_boxed_slice(),
            rup_parent: vec![0; len].into_boxed_slice(),
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.t_day.len()
    }

    /// Whether the block has no slots.
    pub fn is_empty(&self) -> bool {
        self.t_day.is_empty()
    }

    /// Memory usage of the columns in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.len() * (8 + 4 * 4 + 4)
    }
}

/// Growable list of [`RuptureBlock`]s addressed by linear rupture index.
pub struct BlockList {
    blocks: Vec<RuptureBlock>,
    shift: u32,
    mask: usize,
}

impl BlockList {
    /// Create an empty list of blocks of `2^shift` ruptures, reserving
    /// `initial_capacity` block pointers.
    pub fn new(shift: u32, initial_capacity: usize) -> Self {
        Self {
            blocks: Vec::with_capacity(initial_capacity.max(1)),
            shift,
            mask: (1usize << shift) - 1,
        }
    }

    #[inline]
    fn locate(&self, index: usize) -> (usize, usize) {
        (index >> self.shift, index & self.mask)
    }

    /// Make sure slots `0..len` exist, appending blocks as needed.
    ///
    /// The block-pointer array doubles when full.
    pub fn ensure_capacity(&mut self, len: usize) {
        let needed = len.div_ceil(1usize << self.shift);
        while self.blocks.len() < needed {
            if self.blocks.len() == self.blocks.capacity() {
                self.blocks.reserve_exact(self.blocks.len().max(1));
            }
            self.blocks.push(RuptureBlock::new(1 << self.shift));
        }
    }

    /// Store `rup` at `index`, reducing its fields to storage precision.
    ///
    /// # Panics
    ///
    /// Panics if `index` is beyond the current capacity.
    pub fn put(&mut self, index: usize, rup: &Rupture) {
        let (b, o) = self.locate(index);
        let block = &mut self.blocks[b];
        block.t_day[o] = rup.t_day;
        block.rup_mag[o] = rup.rup_mag as f32;
        block.k_prod[o] = rup.k_prod as f32;
        block.x_km[o] = rup.x_km as f32;
        block.y_km[o] = rup.y_km as f32;
        block.rup_parent[o] = rup.rup_parent;
    }

    /// Full rupture record at `index`.
    pub fn get(&self, index: usize) -> Rupture {
        let (b, o) = self.locate(index);
        let block = &self.blocks[b];
        Rupture {
            t_day: block.t_day[o],
            rup_mag: f64::from(block.rup_mag[o]),
            k_prod: f64::from(block.k_prod[o]),
            rup_parent: block.rup_parent[o],
            x_km: f64::from(block.x_km[o]),
            y_km: f64::from(block.y_km[o]),
        }
    }

    /// Time at `index`.
    #[inline]
    pub fn time(&self, index: usize) -> f64 {
        let (b, o) = self.locate(index);
        self.blocks[b].t_day[o]
    }

    /// Time and productivity at `index`.
    #[inline]
    pub fn time_prod(&self, index: usize) -> (f64, f64) {
        let (b, o) = self.locate(index);
        let block = &self.blocks[b];
        (block.t_day[o], f64::from(block.k_prod[o]))
    }

    /// Time and coordinates at `index`.
    #[inline]
    pub fn time_xy(&self, index: usize) -> (f64, f64, f64) {
        let (b, o) = self.locate(index);
        let block = &self.blocks[b];
        (
            block.t_day[o],
            f64::from(block.x_km[o]),
            f64::from(block.y_km[o]),
        )
    }

    /// Number of slots currently backed by blocks.
    pub fn capacity(&self) -> usize {
        self.blocks.len() << self.shift
    }

    /// Number of blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total memory usage across all blocks in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.blocks.iter().map(RuptureBlock::memory_bytes).sum()
    }
}
