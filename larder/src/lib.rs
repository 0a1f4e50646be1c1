//! Larder - a reactive two-tier keyed cache for data providers.
//!
//! Applications wrap expensive asynchronous fetches ("providers") in
//! [`RequestDescriptor`]s. For each request the cache answers from memory
//! or disk when it can, and otherwise runs the provider's loader, stores
//! the result in both layers, and hands back a structurally independent
//! copy of the payload.
//!
//! The moving parts:
//!
//! - per-record time-to-live, with `0` meaning "never expires";
//! - selective eviction by provider, dynamic key, or group scope;
//! - a disk-size budget with deterministic reclamation of expirable
//!   records;
//! - ordered schema migrations applied at startup;
//! - a startup sweep that clears expired records before any request
//!   completes;
//! - an optional policy of serving expired data when a loader fails.

pub mod boot;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod key;
pub mod record;
pub mod request;
pub mod service;
pub mod stats;
pub mod store;

pub use boot::{Migration, MigrationAction, SweepReport};
pub use config::LarderConfig;
pub use error::{LarderError, LoaderError};
pub use key::CompositeKey;
pub use record::{Record, Reply, Source};
pub use request::{EvictDirective, RequestDescriptor};
pub use service::{CacheResponse, Larder, LarderBuilder};
pub use stats::StatsSnapshot;
