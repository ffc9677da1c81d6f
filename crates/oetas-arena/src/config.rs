//! Catalog storage configuration parameters.

use crate::error::StorageError;

/// Configuration for [`CatalogStorage`](crate::CatalogStorage).
///
/// Controls block sizing and the initial length of the block-pointer
/// array. Validated at construction; immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    /// Base-2 logarithm of the number of ruptures per block.
    ///
    /// Default: 14 (16384 ruptures per block). Must lie in
    /// `MIN_BLOCK_SHIFT..=MAX_BLOCK_SHIFT`.
    pub block_shift: u32,

    /// Number of block pointers reserved up front.
    ///
    /// The pointer array doubles when it fills, so this only affects how
    /// early the first reallocation happens.
    pub initial_block_capacity: usize,
}

impl StorageConfig {
    /// Default block shift: 16384 ruptures per block.
    pub const DEFAULT_BLOCK_SHIFT: u32 = 14;

    /// Default block-pointer capacity.
    pub const DEFAULT_INITIAL_BLOCK_CAPACITY: usize = 16;

    /// Smallest accepted block shift.
    pub const MIN_BLOCK_SHIFT: u32 = 2;

    /// Largest accepted block shift.
    pub const MAX_BLOCK_SHIFT: u32 = 24;

    /// Create a config with the given block shift.
    pub fn with_block_shift(block_shift: u32) -> Self {
        Self {
            block_shift,
            ..Self::default()
        }
    }

    /// Number of ruptures per block.
    pub fn block_size(&self) -> usize {
        1 << self.block_shift
    }

    /// Check that the block shift is in range.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BlockShiftOutOfRange`] otherwise.
    pub fn validate(&self) -> Result<(), StorageError> {
        if !(Self::MIN_BLOCK_SHIFT..=Self::MAX_BLOCK_SHIFT).contains(&self.block_shift) {
            return Err(StorageError::BlockShiftOutOfRange {
                shift: self.block_shift,
                min: Self::MIN_BLOCK_SHIFT,
                max: Self::MAX_BLOCK_SHIFT,
            });
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            block_shift: Self::DEFAULT_BLOCK_SHIFT,
            initial_block_capacity: Self::DEFAULT_INITIAL_BLOCK_CAPACITY,
        }
    }
}
