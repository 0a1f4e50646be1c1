//! Library error types.
//!
//! Persistence I/O failures are never surfaced through these variants; the
//! cache recovers from them locally by treating the affected entry as a miss.
//! What callers see is limited to loader failures without a usable fallback,
//! latched startup failures, configuration problems, and per-request payload
//! copy failures.

use thiserror::Error;

/// Boxed error type carried by failing loaders.
pub type LoaderError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced to cache callers.
#[derive(Debug, Error)]
pub enum LarderError {
    /// The loader returned no payload (or failed) and no usable cached
    /// fallback existed.
    #[error("no data from loader for provider '{provider_key}'")]
    NoDataFromLoader {
        /// Provider whose loader came up empty.
        provider_key: String,
        /// The loader's own failure, when it failed rather than returning
        /// nothing.
        #[source]
        cause: Option<LoaderError>,
    },

    /// A startup schema migration aborted. The failure latches: every
    /// subsequent request observes this same error.
    #[error("schema migration to version {version} failed: {cause}")]
    MigrationFailed {
        /// Version of the migration step that failed.
        version: u32,
        /// Description of the underlying failure.
        cause: String,
    },

    /// Required configuration was missing or unusable.
    #[error("invalid configuration: {field}")]
    InvalidConfig {
        /// Name of the offending configuration field.
        field: &'static str,
    },

    /// A user-supplied key segment contained the reserved separator
    /// character and escaping is not enabled.
    #[error("key segment '{key}' contains the reserved separator")]
    KeySeparatorCollision {
        /// The offending key segment.
        key: String,
    },

    /// Payload encoding or decoding failed. Fatal for the request that hit
    /// it, harmless to the rest of the cache.
    #[error("payload copy failed: {cause}")]
    DeepCopy {
        /// Description of the codec failure.
        cause: String,
    },
}
