//! Startup sweep of expired records.
//!
//! One pass over every persisted key: records that are expirable and past
//! their own stored lifetime are evicted from both layers. The sweep
//! fails soft: an unreadable key is skipped, never fatal.

use tracing::{debug, warn};

use crate::record;
use crate::store::{DiskStore, MemoryStore};

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Keys examined.
    pub scanned: usize,
    /// Expired records evicted.
    pub evicted: usize,
}

/// Run one expired-record pass over the persisted store.
pub async fn sweep(disk: &DiskStore, memory: &MemoryStore) -> SweepReport {
    let keys = match disk.all_keys().await {
        Ok(keys) => keys,
        Err(e) => {
            warn!(error = %e, "Could not list persisted keys; skipping sweep");
            return SweepReport::default();
        }
    };

    let now = record::now_millis();
    let mut report = SweepReport::default();

    for key in keys {
        report.scanned += 1;
        let found = match disk.retrieve(&key).await {
            Ok(Some(found)) => found,
            Ok(None) => continue,
            Err(e) => {
                debug!(key = %key, error = %e, "Skipping unreadable record during sweep");
                continue;
            }
        };

        if found.expirable && found.is_expired(now) {
            match disk.evict(&key).await {
                Ok(_) => {
                    memory.remove(&key);
                    report.evicted += 1;
                }
                Err(e) => debug!(key = %key, error = %e, "Failed to evict expired record"),
            }
        }
    }

    report
}
