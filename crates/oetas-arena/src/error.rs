//! Storage-specific error types.

use std::error::Error;
use std::fmt;

/// Errors from catalog storage configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageError {
    /// The block shift lies outside the supported range.
    BlockShiftOutOfRange {
        /// The rejected shift.
        shift: u32,
        /// Smallest accepted shift.
        min: u32,
        /// Largest accepted shift.
        max: u32,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockShiftOutOfRange { shift, min, max } => {
                write!(f, "block shift {shift} outside supported range {min}..={max}")
            }
        }
    }
}

impl Error for StorageError {}
