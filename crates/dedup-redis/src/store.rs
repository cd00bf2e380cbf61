use async_trait::async_trait;
use std::time::Duration;

use jobwatch_dedup::{Claim, DedupError, DedupState, DedupStore};

use crate::error::map_redis_err;

/// Claim the key, or report the state that is already there.
/// Empty string means claimed.
const CLAIM_SCRIPT: &str = r"
if redis.call('SET', KEYS[1], ARGV[1], 'NX', 'PX', ARGV[2]) then
    return ''
end
return redis.call('GET', KEYS[1])
";

/// Overwrite state keeping the TTL; re-create with a fresh TTL if the
/// entry already expired.
const FINISH_SCRIPT: &str = r"
if redis.call('SET', KEYS[1], ARGV[1], 'XX', 'KEEPTTL') then
    return 1
end
redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
return 0
";

#[derive(Debug, Clone)]
pub struct RedisDedupConfig {
    /// Redis connection URL (e.g. `redis://localhost:6379`).
    pub url: String,
    /// Prepended to every dedup key.
    pub key_prefix: String,
    pub retention: Duration,
}

impl Default for RedisDedupConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "jobwatch:dedup:".to_string(),
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Dedup store shared by every jobwatch instance pointed at the same
/// Redis. Expiry is native (`PX`), so `purge_expired` is a no-op.
pub struct RedisDedupStore {
    conn: redis::aio::ConnectionManager,
    key_prefix: String,
    retention_ms: u64,
}

impl RedisDedupStore {
    #[allow(clippy::cast_possible_truncation)]
    pub async fn connect(config: RedisDedupConfig) -> Result<Self, DedupError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| DedupError::Connection(e.to_string()))?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| DedupError::Connection(e.to_string()))?;
        Ok(Self {
            conn,
            key_prefix: config.key_prefix,
            retention_ms: (config.retention.as_millis() as u64).max(1),
        })
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }

    fn parse_state(&self, key: &str, raw: &str) -> Result<DedupState, DedupError> {
        raw.parse().map_err(|_| DedupError::Corrupt {
            key: self.redis_key(key),
            value: raw.to_string(),
        })
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn try_claim(&self, key: &str) -> Result<Claim, DedupError> {
        let mut conn = self.conn.clone();
        let existing: String = redis::Script::new(CLAIM_SCRIPT)
            .key(self.redis_key(key))
            .arg(DedupState::Dispatching.as_str())
            .arg(self.retention_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        if existing.is_empty() {
            return Ok(Claim::Claimed);
        }
        Ok(Claim::Duplicate(self.parse_state(key, &existing)?))
    }

    async fn finish(&self, key: &str, state: DedupState) -> Result<(), DedupError> {
        let mut conn = self.conn.clone();
        let kept: i32 = redis::Script::new(FINISH_SCRIPT)
            .key(self.redis_key(key))
            .arg(state.as_str())
            .arg(self.retention_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        if kept == 0 {
            tracing::debug!(%key, "dedup entry expired mid-cycle, re-recorded");
        }
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), DedupError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(self.redis_key(key))
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_redis_err)
    }

    async fn state(&self, key: &str) -> Result<Option<DedupState>, DedupError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.redis_key(key))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        raw.map(|raw| self.parse_state(key, &raw)).transpose()
    }

    async fn ping(&self) -> Result<bool, DedupError> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(pong == "PONG")
    }
}
