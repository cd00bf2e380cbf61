use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::DedupError;
use crate::store::{Claim, DedupConfig, DedupState, DedupStore};

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: DedupState,
    claimed_at: u64,
}

/// In-process dedup store: a fixed set of LRU shards, each behind its own
/// lock, with time-based expiry read from an injected [`Clock`].
pub struct MemoryDedupStore {
    shards: Box<[Mutex<LruCache<String, Entry>>]>,
    retention_ms: u64,
    clock: Arc<dyn Clock>,
}

impl MemoryDedupStore {
    pub fn new(config: &DedupConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn with_clock(config: &DedupConfig, clock: Arc<dyn Clock>) -> Self {
        let shard_count = config.shards.max(1);
        // Twice the fair share, so hash skew does not evict while the store
        // as a whole is still under `max_entries`.
        let fair_share = config.max_entries.div_ceil(shard_count);
        let per_shard = NonZeroUsize::new(fair_share.saturating_mul(2).min(config.max_entries))
            .unwrap_or(NonZeroUsize::MIN);
        let shards = (0..shard_count)
            .map(|_| Mutex::new(LruCache::new(per_shard)))
            .collect();

        Self {
            shards,
            retention_ms: config.retention.as_millis() as u64,
            clock,
        }
    }

    /// Live and expired-but-not-yet-purged entries.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[allow(clippy::cast_possible_truncation)]
    fn shard(&self, key: &str) -> &Mutex<LruCache<String, Entry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    fn is_live(&self, entry: &Entry, now: u64) -> bool {
        now.saturating_sub(entry.claimed_at) < self.retention_ms
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn try_claim(&self, key: &str) -> Result<Claim, DedupError> {
        let now = self.clock.now_millis();
        let mut shard = self.shard(key).lock();

        if let Some(entry) = shard.get(key) {
            if self.is_live(entry, now) {
                return Ok(Claim::Duplicate(entry.state));
            }
            tracing::debug!(%key, "dedup entry expired, reclaiming");
        }

        let evicted = shard.push(
            key.to_string(),
            Entry {
                state: DedupState::Dispatching,
                claimed_at: now,
            },
        );
        if let Some((old_key, _)) = evicted
            && old_key != key
        {
            tracing::debug!(evicted = %old_key, "dedup shard at capacity, evicted LRU entry");
        }
        Ok(Claim::Claimed)
    }

    async fn finish(&self, key: &str, state: DedupState) -> Result<(), DedupError> {
        let now = self.clock.now_millis();
        let mut shard = self.shard(key).lock();
        match shard.get_mut(key) {
            Some(entry) => entry.state = state,
            // Evicted mid-cycle; re-record so the finished cycle still suppresses.
            None => {
                shard.put(
                    key.to_string(),
                    Entry {
                        state,
                        claimed_at: now,
                    },
                );
            }
        }
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), DedupError> {
        self.shard(key).lock().pop(key);
        Ok(())
    }

    async fn state(&self, key: &str) -> Result<Option<DedupState>, DedupError> {
        let now = self.clock.now_millis();
        let shard = self.shard(key).lock();
        Ok(shard
            .peek(key)
            .filter(|entry| self.is_live(entry, now))
            .map(|entry| entry.state))
    }

    async fn purge_expired(&self) -> Result<usize, DedupError> {
        let now = self.clock.now_millis();
        let mut purged = 0;
        for shard in &*self.shards {
            let mut shard = shard.lock();
            let expired: Vec<String> = shard
                .iter()
                .filter(|(_, entry)| !self.is_live(entry, now))
                .map(|(key, _)| key.clone())
                .collect();
            for key in expired {
                shard.pop(&key);
                purged += 1;
            }
        }
        Ok(purged)
    }

    async fn ping(&self) -> Result<bool, DedupError> {
        Ok(true)
    }
}
