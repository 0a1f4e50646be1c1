//! The public cache handle.
//!
//! [`Larder`] owns the two-layer engine and the startup machinery. It is
//! built through [`LarderBuilder`], which validates configuration, opens
//! the persistence directory, registers schema migrations, and spawns the
//! startup task (migrations, then the expired-record sweep) before
//! returning. Requests submitted before startup settles simply wait on
//! the gate.
//!
//! # Example
//!
//! ```ignore
//! use larder::{Larder, RequestDescriptor};
//! use std::time::Duration;
//!
//! let cache = Larder::builder("/var/cache/myapp").start().await?;
//!
//! let user: serde_json::Value = cache
//!     .execute(
//!         RequestDescriptor::new("users", || async { fetch_user(1).await })
//!             .with_dynamic_key("1")
//!             .with_lifetime(Duration::from_secs(60)),
//!     )
//!     .await?
//!     .into_payload();
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::info;

use crate::boot::{self, Migration, MigrationRunner, StartupGate};
use crate::config::LarderConfig;
use crate::engine::TwoTierCache;
use crate::error::LarderError;
use crate::record::{Reply, Source};
use crate::request::{pipeline, RequestDescriptor};
use crate::stats::{CacheStats, StatsSnapshot};
use crate::store::{DiskStore, MemoryStore};

/// What a request hands back: the bare payload, or the payload tagged
/// with its source when the descriptor asked for a detailed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheResponse<T> {
    /// The payload alone.
    Payload(T),
    /// The payload plus the layer that provided it.
    Detailed(Reply<T>),
}

impl<T> CacheResponse<T> {
    /// Unwrap to the payload, discarding the source tag if present.
    pub fn into_payload(self) -> T {
        match self {
            CacheResponse::Payload(payload) => payload,
            CacheResponse::Detailed(reply) => reply.payload,
        }
    }

    /// The source tag, if this was a detailed response.
    pub fn source(&self) -> Option<Source> {
        match self {
            CacheResponse::Payload(_) => None,
            CacheResponse::Detailed(reply) => Some(reply.source),
        }
    }
}

/// Builder for a [`Larder`] instance.
pub struct LarderBuilder {
    config: LarderConfig,
    migrations: Vec<Migration>,
}

impl LarderBuilder {
    /// Start from an explicit configuration.
    pub fn from_config(config: LarderConfig) -> Self {
        Self {
            config,
            migrations: Vec::new(),
        }
    }

    /// Serve a prior (possibly expired) record when the loader fails.
    pub fn use_expired_data_if_loader_not_available(mut self, enabled: bool) -> Self {
        self.config.use_expired_data_if_loader_not_available = enabled;
        self
    }

    /// Set the disk budget in megabytes.
    pub fn max_persistence_mb(mut self, mb: u64) -> Self {
        self.config.max_persistence_mb = mb;
        self
    }

    /// Escape reserved separators in keys instead of rejecting them.
    pub fn escape_keys(mut self, enabled: bool) -> Self {
        self.config.escape_keys = enabled;
        self
    }

    /// Register a schema migration step. Steps may be registered in any
    /// order; they apply ascending by version.
    pub fn migration(mut self, migration: Migration) -> Self {
        self.migrations.push(migration);
        self
    }

    /// Validate the configuration, open the store, and spawn startup.
    ///
    /// Returns as soon as the cache is constructed; migrations and the
    /// expired-record sweep run in the background, and requests wait on
    /// them.
    pub async fn start(self) -> Result<Larder, LarderError> {
        self.config.validate()?;

        let disk = DiskStore::open(self.config.cache_directory.clone())
            .await
            .map_err(|_| LarderError::InvalidConfig {
                field: "cache_directory",
            })?;
        let disk = Arc::new(disk);
        let memory = Arc::new(MemoryStore::new());
        let stats = Arc::new(CacheStats::new());

        let engine = Arc::new(TwoTierCache::new(
            Arc::clone(&memory),
            Arc::clone(&disk),
            self.config.max_persistence_bytes(),
            self.config.escape_keys,
            Arc::clone(&stats),
        ));

        let gate = StartupGate::new();
        let startup = boot::spawn_startup(
            disk,
            memory,
            MigrationRunner::new(self.migrations),
            gate.clone(),
        );

        info!(
            directory = %self.config.cache_directory.display(),
            max_persistence_mb = self.config.max_persistence_mb,
            "Cache started"
        );

        Ok(Larder {
            engine,
            gate,
            stats,
            use_expired_fallback: self.config.use_expired_data_if_loader_not_available,
            startup,
        })
    }
}

/// A two-tier keyed cache for asynchronous data providers.
pub struct Larder {
    engine: Arc<TwoTierCache>,
    gate: StartupGate,
    stats: Arc<CacheStats>,
    use_expired_fallback: bool,
    /// Startup task handle (retained; the task detaches on drop).
    #[allow(dead_code)]
    startup: JoinHandle<()>,
}

impl Larder {
    /// Build a cache rooted at `cache_directory`.
    pub fn builder(cache_directory: impl Into<PathBuf>) -> LarderBuilder {
        LarderBuilder::from_config(LarderConfig::new(cache_directory))
    }

    /// Execute one provider request through the cache.
    pub async fn execute<T>(
        &self,
        descriptor: RequestDescriptor<T>,
    ) -> Result<CacheResponse<T>, LarderError>
    where
        T: Serialize + DeserializeOwned,
    {
        let detailed = descriptor.requires_detailed_response;
        let reply = pipeline::execute(
            &self.engine,
            &self.gate,
            self.use_expired_fallback,
            &self.stats,
            descriptor,
        )
        .await?;

        Ok(if detailed {
            CacheResponse::Detailed(reply)
        } else {
            CacheResponse::Payload(reply.payload)
        })
    }

    /// Wait for startup (migrations + sweep) to settle. Requests do this
    /// implicitly; exposed for callers that want to front-load the cost.
    pub async fn ready(&self) -> Result<(), LarderError> {
        self.gate.wait().await
    }

    /// Remove every entry under a provider, in both layers.
    pub async fn evict_provider(&self, provider_key: &str) -> Result<(), LarderError> {
        self.engine.evict_provider(provider_key).await
    }

    /// Remove every group under `(provider, dynamic)`, in both layers.
    pub async fn evict_dynamic_key(
        &self,
        provider_key: &str,
        dynamic_key: &str,
    ) -> Result<(), LarderError> {
        self.engine.evict_dynamic_key(provider_key, dynamic_key).await
    }

    /// Remove the single `(provider, dynamic, group)` entry.
    pub async fn evict_dynamic_key_group(
        &self,
        provider_key: &str,
        dynamic_key: &str,
        group_key: &str,
    ) -> Result<(), LarderError> {
        self.engine
            .evict_dynamic_key_group(provider_key, dynamic_key, group_key)
            .await
    }

    /// Clear both layers entirely.
    pub async fn evict_all(&self) {
        self.engine.evict_all().await;
    }

    /// Point-in-time cache statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Best-effort disk usage in megabytes.
    pub async fn stored_mb(&self) -> f64 {
        self.engine.stored_mb().await
    }

    /// Number of records currently in the memory layer.
    pub fn memory_entry_count(&self) -> usize {
        self.engine.memory().len()
    }
}
