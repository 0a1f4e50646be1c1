//! Two-layer cache engine.
//!
//! Coordinates the memory and disk stores behind a single read/write
//! surface: reads check memory first and promote disk hits, writes land in
//! both layers, and every write is followed by a budget check that
//! reclaims expirable disk records when usage exceeds the configured
//! limit.
//!
//! Persistence I/O failures never escape this layer; they degrade to a
//! miss (reads) or a memory-only record (writes), logged at `warn!`.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::LarderError;
use crate::key::CompositeKey;
use crate::record::{self, Record, Source};
use crate::stats::CacheStats;
use crate::store::{DiskStore, MemoryStore};

/// Memory + disk cache with TTL checks, scope eviction, and a disk-size
/// budget.
pub struct TwoTierCache {
    memory: Arc<MemoryStore>,
    disk: Arc<DiskStore>,
    max_persistence_bytes: u64,
    escape_keys: bool,
    stats: Arc<CacheStats>,
}

impl TwoTierCache {
    /// Assemble the engine over its two stores.
    pub fn new(
        memory: Arc<MemoryStore>,
        disk: Arc<DiskStore>,
        max_persistence_bytes: u64,
        escape_keys: bool,
        stats: Arc<CacheStats>,
    ) -> Self {
        Self {
            memory,
            disk,
            max_persistence_bytes,
            escape_keys,
            stats,
        }
    }

    pub(crate) fn memory(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.memory)
    }

    pub(crate) fn disk(&self) -> Arc<DiskStore> {
        Arc::clone(&self.disk)
    }

    /// Look up a record.
    ///
    /// Memory is consulted first; a disk hit is promoted into memory. The
    /// returned record is tagged with the layer that satisfied the read.
    ///
    /// Expiry is judged against `lifetime_millis` (the caller's current
    /// configuration, `0` meaning immortal), not the stored lifetime. An
    /// expired record is returned as-is when `allow_expired` is set
    /// (whether to serve it is the caller's policy decision) and otherwise
    /// evicted from both layers.
    pub async fn retrieve(
        &self,
        key: &CompositeKey,
        allow_expired: bool,
        lifetime_millis: u64,
    ) -> Result<Option<Record>, LarderError> {
        let canonical = key.canonical(self.escape_keys)?;

        let found = if let Some(found) = self.memory.get(&canonical) {
            Some(found.from_source(Source::Memory))
        } else {
            match self.disk.retrieve(&canonical).await {
                Ok(Some(found)) => {
                    self.memory.put(canonical.clone(), found.clone());
                    Some(found.from_source(Source::Disk))
                }
                Ok(None) => None,
                Err(e) => {
                    warn!(key = %canonical, error = %e, "Disk read failed; treating as miss");
                    None
                }
            }
        };

        let Some(found) = found else {
            self.stats.miss();
            return Ok(None);
        };

        let now = record::now_millis();
        if !record::lifetime_elapsed(found.created_at_millis, lifetime_millis, now) {
            match found.source {
                Source::Memory => self.stats.memory_hit(),
                _ => self.stats.disk_hit(),
            }
            return Ok(Some(found));
        }

        if allow_expired {
            debug!(key = %canonical, source = %found.source, "Returning expired record for caller to judge");
            return Ok(Some(found));
        }

        self.memory.remove(&canonical);
        if let Err(e) = self.disk.evict(&canonical).await {
            warn!(key = %canonical, error = %e, "Failed to evict expired record");
        }
        self.stats.evicted(1);
        self.stats.miss();
        Ok(None)
    }

    /// Store a payload under a key, in both layers.
    ///
    /// The disk write is best-effort. After the write, if disk usage
    /// exceeds the budget, expirable records are reclaimed in canonical
    /// key order until usage is back under the limit or only non-expirable
    /// records remain. This is why a zero budget makes every expirable
    /// save evict itself right after landing.
    pub async fn save(
        &self,
        key: &CompositeKey,
        payload: Vec<u8>,
        type_tag: String,
        lifetime_millis: u64,
        expirable: bool,
    ) -> Result<Record, LarderError> {
        let canonical = key.canonical(self.escape_keys)?;
        let record = Record::new(payload, type_tag, lifetime_millis, expirable);

        self.memory.put(canonical.clone(), record.clone());
        if let Err(e) = self.disk.save(&canonical, &record).await {
            warn!(key = %canonical, error = %e, "Disk write failed; record kept in memory only");
        }

        self.reclaim_if_over_budget().await;
        Ok(record)
    }

    /// Budget reclamation: delete expirable disk records in sorted key
    /// order until usage falls under the limit. Non-expirable records are
    /// never touched. Memory twins of deleted records are removed too.
    async fn reclaim_if_over_budget(&self) {
        let mut used = match self.disk.stored_bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Could not measure disk usage; skipping reclamation");
                return;
            }
        };
        if used <= self.max_persistence_bytes {
            return;
        }

        self.stats.reclamation_pass();
        let mut keys = match self.disk.all_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Could not list disk keys; skipping reclamation");
                return;
            }
        };
        keys.sort();

        let mut evicted = 0u64;
        for key in keys {
            if used <= self.max_persistence_bytes {
                break;
            }
            let expirable = match self.disk.retrieve(&key).await {
                Ok(Some(found)) => found.expirable,
                Ok(None) => continue,
                Err(e) => {
                    debug!(key = %key, error = %e, "Skipping unreadable record during reclamation");
                    continue;
                }
            };
            if !expirable {
                continue;
            }
            match self.disk.evict(&key).await {
                Ok(freed) => {
                    used = used.saturating_sub(freed);
                    self.memory.remove(&key);
                    evicted += 1;
                }
                Err(e) => {
                    debug!(key = %key, error = %e, "Failed to reclaim record");
                }
            }
        }

        self.stats.evicted(evicted);
        debug!(
            evicted,
            used_bytes = used,
            budget_bytes = self.max_persistence_bytes,
            "Budget reclamation complete"
        );
    }

    /// Remove every entry under a provider, in both layers.
    pub async fn evict_provider(&self, provider: &str) -> Result<(), LarderError> {
        let prefix = CompositeKey::provider_prefix(provider, self.escape_keys)?;
        self.evict_prefix(&prefix).await;
        Ok(())
    }

    /// Remove every group under `(provider, dynamic)`, in both layers.
    pub async fn evict_dynamic_key(
        &self,
        provider: &str,
        dynamic: &str,
    ) -> Result<(), LarderError> {
        let prefix = CompositeKey::dynamic_prefix(provider, dynamic, self.escape_keys)?;
        self.evict_prefix(&prefix).await;
        Ok(())
    }

    /// Remove the single entry addressed by the full triple.
    pub async fn evict_dynamic_key_group(
        &self,
        provider: &str,
        dynamic: &str,
        group: &str,
    ) -> Result<(), LarderError> {
        let canonical = CompositeKey::new(provider)
            .with_dynamic(dynamic)
            .with_group(group)
            .canonical(self.escape_keys)?;

        let in_memory = self.memory.remove(&canonical);
        let on_disk = match self.disk.evict(&canonical).await {
            Ok(freed) => freed > 0,
            Err(e) => {
                warn!(key = %canonical, error = %e, "Failed to evict record");
                false
            }
        };
        if in_memory || on_disk {
            self.stats.evicted(1);
        }
        Ok(())
    }

    /// Clear both layers entirely.
    pub async fn evict_all(&self) {
        let mut removed: HashSet<String> =
            self.memory.remove_by_prefix("").into_iter().collect();

        match self.disk.all_keys().await {
            Ok(keys) => removed.extend(keys),
            Err(e) => warn!(error = %e, "Could not list disk keys; eviction count is partial"),
        }
        if let Err(e) = self.disk.evict_all().await {
            warn!(error = %e, "Failed to clear disk store");
        }

        self.stats.evicted(removed.len() as u64);
    }

    async fn evict_prefix(&self, prefix: &str) {
        let mut removed: HashSet<String> =
            self.memory.remove_by_prefix(prefix).into_iter().collect();

        match self.disk.all_keys().await {
            Ok(keys) => {
                for key in keys.into_iter().filter(|k| k.starts_with(prefix)) {
                    match self.disk.evict(&key).await {
                        Ok(freed) if freed > 0 => {
                            removed.insert(key);
                        }
                        Ok(_) => {}
                        Err(e) => debug!(key = %key, error = %e, "Failed to evict record"),
                    }
                }
            }
            Err(e) => warn!(error = %e, "Could not list disk keys for scope eviction"),
        }

        self.stats.evicted(removed.len() as u64);
        debug!(prefix = %prefix, removed = removed.len(), "Scope eviction complete");
    }

    /// Best-effort disk usage in megabytes.
    pub async fn stored_mb(&self) -> f64 {
        self.disk.stored_mb().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn engine_with_budget(dir: &std::path::Path, max_bytes: u64) -> TwoTierCache {
        TwoTierCache::new(
            Arc::new(MemoryStore::new()),
            Arc::new(DiskStore::open(dir.to_path_buf()).await.unwrap()),
            max_bytes,
            false,
            Arc::new(CacheStats::new()),
        )
    }

    fn users_key(dynamic: &str, group: &str) -> CompositeKey {
        CompositeKey::new("users")
            .with_dynamic(dynamic)
            .with_group(group)
    }

    #[tokio::test]
    async fn test_save_then_retrieve_hits_memory() {
        let dir = tempdir().unwrap();
        let engine = engine_with_budget(dir.path(), u64::MAX).await;
        let key = users_key("v1", "g1");

        engine
            .save(&key, b"{\"id\":1}".to_vec(), "User".to_string(), 60_000, true)
            .await
            .unwrap();

        let found = engine.retrieve(&key, false, 60_000).await.unwrap().unwrap();
        assert_eq!(found.payload, b"{\"id\":1}");
        assert_eq!(found.source, Source::Memory);
    }

    #[tokio::test]
    async fn test_disk_hit_promotes_to_memory() {
        let dir = tempdir().unwrap();
        let engine = engine_with_budget(dir.path(), u64::MAX).await;
        let key = users_key("v1", "g1");

        engine
            .save(&key, b"a".to_vec(), "User".to_string(), 0, true)
            .await
            .unwrap();
        engine.memory().clear();

        let first = engine.retrieve(&key, false, 0).await.unwrap().unwrap();
        assert_eq!(first.source, Source::Disk);

        let second = engine.retrieve(&key, false, 0).await.unwrap().unwrap();
        assert_eq!(second.source, Source::Memory);
    }

    #[tokio::test]
    async fn test_expired_record_evicted_when_expired_disallowed() {
        let dir = tempdir().unwrap();
        let engine = engine_with_budget(dir.path(), u64::MAX).await;
        let key = users_key("v1", "g1");

        engine
            .save(&key, b"a".to_vec(), "User".to_string(), 1, true)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(engine.retrieve(&key, false, 1).await.unwrap().is_none());
        // Evicted from both layers.
        assert!(engine.memory().get(&key.canonical(false).unwrap()).is_none());
        assert!(engine
            .disk()
            .retrieve(&key.canonical(false).unwrap())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_expired_record_returned_when_allowed() {
        let dir = tempdir().unwrap();
        let engine = engine_with_budget(dir.path(), u64::MAX).await;
        let key = users_key("v1", "g1");

        engine
            .save(&key, b"a".to_vec(), "User".to_string(), 1, true)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let found = engine.retrieve(&key, true, 1).await.unwrap().unwrap();
        assert_eq!(found.payload, b"a");
    }

    #[tokio::test]
    async fn test_zero_lifetime_is_immortal() {
        let dir = tempdir().unwrap();
        let engine = engine_with_budget(dir.path(), u64::MAX).await;
        let key = users_key("v1", "g1");

        engine
            .save(&key, b"a".to_vec(), "User".to_string(), 0, true)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(engine.retrieve(&key, false, 0).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_provider_eviction_clears_all_dynamic_keys() {
        let dir = tempdir().unwrap();
        let engine = engine_with_budget(dir.path(), u64::MAX).await;

        for (dynamic, group) in [("v1", "g1"), ("v1", "g2"), ("v2", "g1")] {
            engine
                .save(
                    &users_key(dynamic, group),
                    b"x".to_vec(),
                    "User".to_string(),
                    0,
                    true,
                )
                .await
                .unwrap();
        }
        engine
            .save(
                &CompositeKey::new("orders"),
                b"y".to_vec(),
                "Order".to_string(),
                0,
                true,
            )
            .await
            .unwrap();

        engine.evict_provider("users").await.unwrap();

        for (dynamic, group) in [("v1", "g1"), ("v1", "g2"), ("v2", "g1")] {
            assert!(engine
                .retrieve(&users_key(dynamic, group), true, 0)
                .await
                .unwrap()
                .is_none());
        }
        assert!(engine
            .retrieve(&CompositeKey::new("orders"), true, 0)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_dynamic_key_eviction_spares_other_dynamic_keys() {
        let dir = tempdir().unwrap();
        let engine = engine_with_budget(dir.path(), u64::MAX).await;

        for (dynamic, group) in [("v1", "g1"), ("v1", "g2"), ("v2", "g1")] {
            engine
                .save(
                    &users_key(dynamic, group),
                    b"x".to_vec(),
                    "User".to_string(),
                    0,
                    true,
                )
                .await
                .unwrap();
        }

        engine.evict_dynamic_key("users", "v1").await.unwrap();

        assert!(engine
            .retrieve(&users_key("v1", "g1"), true, 0)
            .await
            .unwrap()
            .is_none());
        assert!(engine
            .retrieve(&users_key("v1", "g2"), true, 0)
            .await
            .unwrap()
            .is_none());
        assert!(engine
            .retrieve(&users_key("v2", "g1"), true, 0)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_group_eviction_is_exact_not_prefix() {
        let dir = tempdir().unwrap();
        let engine = engine_with_budget(dir.path(), u64::MAX).await;

        engine
            .save(&users_key("v1", "g1"), b"a".to_vec(), "User".to_string(), 0, true)
            .await
            .unwrap();
        engine
            .save(&users_key("v1", "g12"), b"b".to_vec(), "User".to_string(), 0, true)
            .await
            .unwrap();

        engine
            .evict_dynamic_key_group("users", "v1", "g1")
            .await
            .unwrap();

        assert!(engine
            .retrieve(&users_key("v1", "g1"), true, 0)
            .await
            .unwrap()
            .is_none());
        assert!(engine
            .retrieve(&users_key("v1", "g12"), true, 0)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_eviction_counts_distinct_keys_across_layers() {
        let dir = tempdir().unwrap();
        let stats = Arc::new(CacheStats::new());
        let memory = Arc::new(MemoryStore::new());
        let disk = Arc::new(DiskStore::open(dir.path().to_path_buf()).await.unwrap());
        let engine = TwoTierCache::new(
            Arc::clone(&memory),
            Arc::clone(&disk),
            u64::MAX,
            false,
            Arc::clone(&stats),
        );

        // One key in both layers, one present in memory only.
        engine
            .save(&users_key("v1", "g1"), b"a".to_vec(), "User".to_string(), 0, true)
            .await
            .unwrap();
        memory.put(
            "users$d$v1$g$g2".to_string(),
            Record::new(b"b".to_vec(), "User", 0, true),
        );

        engine.evict_dynamic_key("users", "v1").await.unwrap();
        assert_eq!(stats.snapshot().records_evicted, 2);

        // A repeat on the now-empty scope removes nothing.
        engine.evict_dynamic_key("users", "v1").await.unwrap();
        assert_eq!(stats.snapshot().records_evicted, 2);

        // A memory-only record counts through group eviction too.
        memory.put(
            "users$d$v2$g$g1".to_string(),
            Record::new(b"c".to_vec(), "User", 0, true),
        );
        engine
            .evict_dynamic_key_group("users", "v2", "g1")
            .await
            .unwrap();
        assert_eq!(stats.snapshot().records_evicted, 3);
    }

    #[tokio::test]
    async fn test_evict_all_clears_both_layers() {
        let dir = tempdir().unwrap();
        let engine = engine_with_budget(dir.path(), u64::MAX).await;

        engine
            .save(&users_key("v1", "g1"), b"a".to_vec(), "User".to_string(), 0, true)
            .await
            .unwrap();
        engine.evict_all().await;

        assert!(engine
            .retrieve(&users_key("v1", "g1"), true, 0)
            .await
            .unwrap()
            .is_none());
        assert!(engine.memory().is_empty());
    }

    #[tokio::test]
    async fn test_reclamation_stays_under_budget() {
        let dir = tempdir().unwrap();
        // Room for roughly two 10 KB records.
        let engine = engine_with_budget(dir.path(), 20 * 1024).await;

        for i in 0..6 {
            engine
                .save(
                    &users_key(&format!("v{i}"), "g"),
                    vec![0u8; 10 * 1024],
                    "User".to_string(),
                    0,
                    true,
                )
                .await
                .unwrap();
        }

        let used = engine.disk().stored_bytes().await.unwrap();
        assert!(used <= 20 * 1024, "expected <= 20480 bytes, got {used}");
    }

    #[tokio::test]
    async fn test_reclamation_never_touches_non_expirable() {
        let dir = tempdir().unwrap();
        let engine = engine_with_budget(dir.path(), 0).await;

        engine
            .save(
                &users_key("keep", "g"),
                vec![0u8; 1024],
                "User".to_string(),
                0,
                false,
            )
            .await
            .unwrap();
        engine
            .save(
                &users_key("drop", "g"),
                vec![0u8; 1024],
                "User".to_string(),
                0,
                true,
            )
            .await
            .unwrap();

        // The expirable record evicted itself after landing; the
        // non-expirable one still exceeds the zero budget but is exempt.
        assert!(engine
            .retrieve(&users_key("drop", "g"), true, 0)
            .await
            .unwrap()
            .is_none());
        assert!(engine
            .retrieve(&users_key("keep", "g"), true, 0)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_reclaimed_records_leave_memory_too() {
        let dir = tempdir().unwrap();
        let engine = engine_with_budget(dir.path(), 0).await;
        let key = users_key("v1", "g1");

        engine
            .save(&key, vec![0u8; 512], "User".to_string(), 0, true)
            .await
            .unwrap();

        assert!(engine.memory().get(&key.canonical(false).unwrap()).is_none());
    }
}
