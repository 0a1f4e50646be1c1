//! Cached records and the replies built from them.
//!
//! A [`Record`] is what the cache stores: encoded payload bytes plus the
//! metadata needed for expiry, migration, and budget decisions. A
//! [`Reply`] is what leaves the cache: a decoded payload tagged with the
//! layer that satisfied the read.

use serde::{Deserialize, Serialize};

/// Which layer a payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Served from the in-process map.
    Memory,
    /// Served from the persistence directory.
    Disk,
    /// Freshly produced by the provider's loader.
    Cloud,
}

impl Default for Source {
    fn default() -> Self {
        // Deserialization only happens on disk reads.
        Source::Disk
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Memory => write!(f, "memory"),
            Source::Disk => write!(f, "disk"),
            Source::Cloud => write!(f, "cloud"),
        }
    }
}

/// A stored cache entry.
///
/// The payload is kept encoded; decoding on the way out is what gives
/// callers structurally independent copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Encoded payload bytes.
    pub payload: Vec<u8>,
    /// Structural type tag of the payload, used by schema migrations.
    pub type_tag: String,
    /// Wall-clock creation time in milliseconds since the epoch.
    pub created_at_millis: i64,
    /// Configured lifetime in milliseconds. `0` means the record never
    /// expires.
    pub lifetime_millis: u64,
    /// Whether the sweeper and budget reclamation may remove this record.
    pub expirable: bool,
    /// Layer that satisfied the read. Assigned on the way out of the
    /// cache, never persisted.
    #[serde(skip)]
    pub source: Source,
}

impl Record {
    /// Create a record stamped with the current wall-clock time and tagged
    /// [`Source::Cloud`] (fresh from a loader).
    pub fn new(
        payload: Vec<u8>,
        type_tag: impl Into<String>,
        lifetime_millis: u64,
        expirable: bool,
    ) -> Self {
        Self {
            payload,
            type_tag: type_tag.into(),
            created_at_millis: now_millis(),
            lifetime_millis,
            expirable,
            source: Source::Cloud,
        }
    }

    /// Whether this record's own lifetime has elapsed at `now_millis`.
    pub fn is_expired(&self, now_millis: i64) -> bool {
        lifetime_elapsed(self.created_at_millis, self.lifetime_millis, now_millis)
    }

    /// Retag the record with the layer that satisfied the read.
    pub(crate) fn from_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }
}

/// The expiry law: a lifetime of `0` never elapses; otherwise an entry is
/// expired once strictly more than `lifetime_millis` has passed since
/// creation.
pub fn lifetime_elapsed(created_at_millis: i64, lifetime_millis: u64, now_millis: i64) -> bool {
    if lifetime_millis == 0 {
        return false;
    }
    (now_millis as i128 - created_at_millis as i128) > lifetime_millis as i128
}

/// A payload plus the layer it came from. Returned to callers that asked
/// for a detailed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply<T> {
    /// The decoded payload.
    pub payload: T,
    /// Layer that satisfied the request.
    pub source: Source,
}

/// Current wall-clock time in milliseconds since the epoch.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_cloud_sourced() {
        let record = Record::new(vec![1, 2, 3], "User", 60_000, true);
        assert_eq!(record.source, Source::Cloud);
        assert_eq!(record.lifetime_millis, 60_000);
        assert!(record.expirable);
    }

    #[test]
    fn test_zero_lifetime_never_expires() {
        let record = Record::new(vec![], "User", 0, true);
        assert!(!record.is_expired(record.created_at_millis + i64::MAX / 2));
    }

    #[test]
    fn test_expiry_is_strictly_after_lifetime() {
        let record = Record::new(vec![], "User", 100, true);
        let created = record.created_at_millis;
        assert!(!record.is_expired(created + 100));
        assert!(record.is_expired(created + 101));
    }

    #[test]
    fn test_lifetime_elapsed_tolerates_clock_skew() {
        // A record stamped in the future is simply not expired yet.
        assert!(!lifetime_elapsed(i64::MAX - 10, 100, 0));
    }

    #[test]
    fn test_round_trip_preserves_all_fields() {
        let record = Record::new(vec![9, 8, 7], "Order", 5_000, false);
        let bytes = bincode::serialize(&record).unwrap();
        let back: Record = bincode::deserialize(&bytes).unwrap();

        assert_eq!(back.payload, record.payload);
        assert_eq!(back.type_tag, record.type_tag);
        assert_eq!(back.created_at_millis, record.created_at_millis);
        assert_eq!(back.lifetime_millis, record.lifetime_millis);
        assert_eq!(back.expirable, record.expirable);
        // The source tag is read-side only.
        assert_eq!(back.source, Source::Disk);
    }

    #[test]
    fn test_source_display() {
        assert_eq!(Source::Memory.to_string(), "memory");
        assert_eq!(Source::Disk.to_string(), "disk");
        assert_eq!(Source::Cloud.to_string(), "cloud");
    }
}
