//! Versioned, atomically replaced analysis configuration

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::error::ConfigError;

/// One accepted configuration and its version
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    /// Starts at 1 and increases by one per accepted change
    pub version: u64,
    pub config: Arc<AnalysisConfig>,
}

/// Shared holder of the current [`ConfigSnapshot`].
///
/// Readers take the current snapshot with one pointer clone. Writers build a
/// whole new configuration and swap it in; nobody ever observes a partially
/// applied change.
#[derive(Debug)]
pub struct ConfigHandle {
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigHandle {
    /// Create a handle; the configuration must satisfy every invariant
    pub fn new(config: AnalysisConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(ConfigSnapshot {
                version: 1,
                config: Arc::new(config),
            })),
        })
    }

    /// Current snapshot
    pub fn load(&self) -> Arc<ConfigSnapshot> {
        self.current.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// Replace the whole configuration. Returns the new version.
    pub fn replace(&self, config: AnalysisConfig) -> Result<u64, ConfigError> {
        config.validate()?;
        let mut current = self.current.write();
        let version = current.version + 1;
        *current = Arc::new(ConfigSnapshot {
            version,
            config: Arc::new(config),
        });
        debug!("Configuration replaced (v{})", version);
        Ok(version)
    }

    /// Apply `change` to a copy of the current configuration and publish it.
    ///
    /// Concurrent updates are serialized, so none is lost. The version only
    /// moves when the configuration actually changed. If `change` fails or the
    /// result is invalid, nothing is published.
    pub fn update<T, F>(&self, change: F) -> Result<T, ConfigError>
    where
        F: FnOnce(&mut AnalysisConfig) -> Result<T, ConfigError>,
    {
        let mut current = self.current.write();
        let mut config = AnalysisConfig::clone(&current.config);
        let value = change(&mut config)?;
        config.validate()?;

        if config != *current.config {
            let version = current.version + 1;
            *current = Arc::new(ConfigSnapshot {
                version,
                config: Arc::new(config),
            });
            debug!("Configuration updated (v{})", version);
        }
        Ok(value)
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(ConfigSnapshot {
                version: 1,
                config: Arc::new(AnalysisConfig::default()),
            })),
        }
    }
}
