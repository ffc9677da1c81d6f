//! Ensemble configuration errors.

use std::error::Error;
use std::fmt;

use oetas_arena::StorageError;
use oetas_core::ParamError;
use oetas_poisson::CacheError;

/// Errors detected while setting up grids, strategies or an ensemble run.
///
/// All of these are raised before any catalog is simulated.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// A boundary array has fewer entries than required.
    TooFewBoundaries {
        /// Which axis: `"time"` or `"magnitude"`.
        axis: &'static str,
        /// Number of boundaries supplied.
        len: usize,
        /// Minimum number required.
        min: usize,
    },
    /// A boundary is NaN or infinite.
    NonFiniteBoundary {
        /// Which axis.
        axis: &'static str,
        /// Position of the offending boundary.
        index: usize,
    },
    /// Boundaries are not strictly increasing.
    NotIncreasing {
        /// Which axis.
        axis: &'static str,
        /// Position of the first boundary not above its predecessor.
        index: usize,
    },
    /// An integer strategy code names no strategy.
    InvalidMode {
        /// Which strategy enum.
        kind: &'static str,
        /// The rejected code.
        code: u8,
    },
    /// An [`EnsembleConfig`](crate::EnsembleConfig) setting is unusable.
    InvalidEnsemble {
        /// Description of the problem.
        reason: String,
    },
    /// Catalog parameters failed validation.
    Params(ParamError),
    /// Poisson cache configuration failed validation.
    Cache(CacheError),
    /// Worker storage configuration failed validation.
    Storage(StorageError),
    /// The operating system refused to start a worker thread.
    ThreadSpawnFailed {
        /// Description from the OS error.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewBoundaries { axis, len, min } => {
                write!(f, "{axis} grid needs at least {min} boundaries, got {len}")
            }
            Self::NonFiniteBoundary { axis, index } => {
                write!(f, "{axis} boundary {index} is not finite")
            }
            Self::NotIncreasing { axis, index } => {
                write!(f, "{axis} boundaries not strictly increasing at index {index}")
            }
            Self::InvalidMode { kind, code } => write!(f, "invalid {kind} code {code}"),
            Self::InvalidEnsemble { reason } => write!(f, "invalid ensemble config: {reason}"),
            Self::Params(e) => write!(f, "catalog parameters: {e}"),
            Self::Cache(e) => write!(f, "poisson cache: {e}"),
            Self::Storage(e) => write!(f, "catalog storage: {e}"),
            Self::ThreadSpawnFailed { reason } => {
                write!(f, "failed to spawn worker thread: {reason}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Params(e) => Some(e),
            Self::Cache(e) => Some(e),
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParamError> for ConfigError {
    fn from(e: ParamError) -> Self {
        Self::Params(e)
    }
}

impl From<CacheError> for ConfigError {
    fn from(e: CacheError) -> Self {
        Self::Cache(e)
    }
}

impl From<StorageError> for ConfigError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}
