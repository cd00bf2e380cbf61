use async_trait::async_trait;
use std::str::FromStr;
use std::time::Duration;

use crate::error::DedupError;

/// Tracks which dedup keys have had a notification cycle, so a redelivered
/// event inside the retention window does not notify twice.
///
/// Per key: `UNSEEN → DISPATCHING → {COMPLETED, PARTIALLY_FAILED} → EXPIRED`.
/// Expired keys are indistinguishable from unseen ones.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Atomically claim `key` for a new cycle. Check and insert happen as
    /// one step, so of two concurrent callers exactly one gets `Claimed`.
    async fn try_claim(&self, key: &str) -> Result<Claim, DedupError>;

    /// Record the terminal outcome of a claimed cycle.
    async fn finish(&self, key: &str, state: DedupState) -> Result<(), DedupError>;

    /// Drop a claim whose cycle never started delivering.
    async fn release(&self, key: &str) -> Result<(), DedupError>;

    async fn state(&self, key: &str) -> Result<Option<DedupState>, DedupError>;

    /// Evict expired entries now. Returns how many were removed.
    /// Backends with native expiry return 0.
    async fn purge_expired(&self) -> Result<usize, DedupError> {
        Ok(0)
    }

    async fn ping(&self) -> Result<bool, DedupError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Caller owns the cycle and must `finish` or `release` it.
    Claimed,
    /// A live entry exists; the caller must not deliver.
    Duplicate(DedupState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupState {
    Dispatching,
    Completed,
    PartiallyFailed,
}

impl DedupState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dispatching => "dispatching",
            Self::Completed => "completed",
            Self::PartiallyFailed => "partially_failed",
        }
    }
}

impl FromStr for DedupState {
    type Err = DedupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dispatching" => Ok(Self::Dispatching),
            "completed" => Ok(Self::Completed),
            "partially_failed" => Ok(Self::PartiallyFailed),
            other => Err(DedupError::Corrupt {
                key: String::new(),
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for DedupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retention bounds. An entry leaves the store when it is older than
/// `retention` or is the least recently used once `max_entries` is hit,
/// whichever comes first.
///
/// The in-memory store splits `max_entries` across `shards` and lets each
/// shard hold up to twice its share, so a shard only evicts early when
/// hashing puts more than double its share of keys on it. The store can
/// then hold more than `max_entries` keys, up to about twice as many.
#[derive(Debug, Clone)]
pub struct DedupConfig {
    pub retention: Duration,
    pub max_entries: usize,
    pub shards: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(24 * 60 * 60),
            max_entries: 100_000,
            shards: 16,
        }
    }
}
