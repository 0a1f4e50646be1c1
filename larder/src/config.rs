//! Cache configuration.

use std::path::PathBuf;

use crate::error::LarderError;

/// Default disk budget in megabytes.
pub const DEFAULT_MAX_PERSISTENCE_MB: u64 = 100;

/// Configuration for a cache instance.
#[derive(Debug, Clone)]
pub struct LarderConfig {
    /// Root directory of the persistence store. Required.
    pub cache_directory: PathBuf,

    /// Serve a prior (possibly expired) record when the loader fails or
    /// returns nothing.
    pub use_expired_data_if_loader_not_available: bool,

    /// Disk budget in megabytes. Exceeding it after a write triggers
    /// reclamation of expirable records.
    pub max_persistence_mb: u64,

    /// Percent-escape the reserved separator in user-supplied key
    /// segments instead of rejecting them.
    pub escape_keys: bool,
}

impl LarderConfig {
    /// Configuration with defaults for everything but the cache directory.
    pub fn new(cache_directory: impl Into<PathBuf>) -> Self {
        Self {
            cache_directory: cache_directory.into(),
            use_expired_data_if_loader_not_available: false,
            max_persistence_mb: DEFAULT_MAX_PERSISTENCE_MB,
            escape_keys: false,
        }
    }

    /// Enable or disable serving stale records on loader failure.
    pub fn with_expired_data_fallback(mut self, enabled: bool) -> Self {
        self.use_expired_data_if_loader_not_available = enabled;
        self
    }

    /// Set the disk budget in megabytes.
    pub fn with_max_persistence_mb(mut self, mb: u64) -> Self {
        self.max_persistence_mb = mb;
        self
    }

    /// Escape reserved separators in keys instead of rejecting them.
    pub fn with_escaped_keys(mut self, enabled: bool) -> Self {
        self.escape_keys = enabled;
        self
    }

    /// Check that required fields are usable.
    pub(crate) fn validate(&self) -> Result<(), LarderError> {
        if self.cache_directory.as_os_str().is_empty() {
            return Err(LarderError::InvalidConfig {
                field: "cache_directory",
            });
        }
        Ok(())
    }

    /// The disk budget in bytes.
    pub(crate) fn max_persistence_bytes(&self) -> u64 {
        self.max_persistence_mb.saturating_mul(1024 * 1024)
    }
}
