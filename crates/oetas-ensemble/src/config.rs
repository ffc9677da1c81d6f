//! Ensemble run configuration.

use std::time::Duration;

use oetas_arena::StorageConfig;

use crate::error::ConfigError;

/// Configuration for [`run_ensemble`](crate::run_ensemble).
#[derive(Clone, Debug, PartialEq)]
pub struct EnsembleConfig {
    /// Number of catalogs to simulate.
    pub catalog_count: usize,
    /// Number of worker threads. `None` = auto-detect from
    /// `available_parallelism`, clamped to `[1, MAX_WORKERS]`.
    pub workers: Option<usize>,
    /// Base seed. Catalog `k` uses random stream `k` of this seed.
    pub seed: u64,
    /// Wall-clock budget. Workers stop claiming catalogs once it elapses.
    pub budget: Option<Duration>,
    /// A progress message is emitted every this many completed catalogs.
    pub progress_interval: usize,
    /// Storage configuration for each worker's catalog arena.
    pub storage: StorageConfig,
}

impl EnsembleConfig {
    /// Default number of catalogs.
    pub const DEFAULT_CATALOG_COUNT: usize = 1000;
    /// Default base seed.
    pub const DEFAULT_SEED: u64 = 0x0E7A_5EED;
    /// Default progress interval.
    pub const DEFAULT_PROGRESS_INTERVAL: usize = 100;
    /// Upper bound on the worker count.
    pub const MAX_WORKERS: usize = 256;

    /// Default configuration for `catalog_count` catalogs.
    pub fn with_catalog_count(catalog_count: usize) -> Self {
        Self {
            catalog_count,
            ..Self::default()
        }
    }

    /// Resolve the worker count, applying auto-detection if `None`.
    ///
    /// Never more workers than catalogs.
    pub fn resolved_worker_count(&self) -> usize {
        let n = match self.workers {
            Some(n) => n,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        };
        n.clamp(1, Self::MAX_WORKERS)
            .min(self.catalog_count.max(1))
    }

    /// Check every setting.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnsemble`] describing the first
    /// unusable setting, or [`ConfigError::Storage`] for a bad storage
    /// configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.catalog_count == 0 {
            return Err(ConfigError::InvalidEnsemble {
                reason: "catalog_count must be positive".into(),
            });
        }
        if self.workers == Some(0) {
            return Err(ConfigError::InvalidEnsemble {
                reason: "workers must be positive".into(),
            });
        }
        if self.progress_interval == 0 {
            return Err(ConfigError::InvalidEnsemble {
                reason: "progress_interval must be positive".into(),
            });
        }
        if self.budget == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidEnsemble {
                reason: "budget must be positive".into(),
            });
        }
        self.storage.validate()?;
        Ok(())
    }
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            catalog_count: Self::DEFAULT_CATALOG_COUNT,
            workers: None,
            seed: Self::DEFAULT_SEED,
            budget: None,
            progress_interval: Self::DEFAULT_PROGRESS_INTERVAL,
            storage: StorageConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(EnsembleConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_settings_rejected() {
        for config in [
            EnsembleConfig::with_catalog_count(0),
            EnsembleConfig {
                workers: Some(0),
                ..EnsembleConfig::default()
            },
            EnsembleConfig {
                progress_interval: 0,
                ..EnsembleConfig::default()
            },
            EnsembleConfig {
                budget: Some(Duration::ZERO),
                ..EnsembleConfig::default()
            },
        ] {
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidEnsemble { .. })
            ));
        }
    }

    #[test]
    fn bad_storage_rejected() {
        let config = EnsembleConfig {
            storage: StorageConfig::with_block_shift(40),
            ..EnsembleConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Storage(_))));
    }

    #[test]
    fn workers_never_exceed_catalogs() {
        let config = EnsembleConfig {
            workers: Some(8),
            ..EnsembleConfig::with_catalog_count(3)
        };
        assert_eq!(config.resolved_worker_count(), 3);
        let auto = EnsembleConfig::with_catalog_count(1);
        assert_eq!(auto.resolved_worker_count(), 1);
    }
}
