use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drip_common::{Address, ChainId};
use redis::{AsyncCommands, Client as RedisClient};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{cooldown_key, CooldownRecord, CooldownStore, RemainingInfo};
use crate::error::{FaucetError, FaucetResult};

/// Cooldowns as JSON values under `cooldown:{chain}:{address}` with a TTL
/// equal to the cooldown, so Redis expires them on its own and they survive
/// faucet restarts.
#[derive(Clone)]
pub struct RedisCooldownStore {
    redis: Arc<RedisClient>,
    cooldown: Duration,
}

impl RedisCooldownStore {
    pub fn new(redis: Arc<RedisClient>, cooldown: Duration) -> Self {
        Self { redis, cooldown }
    }

    async fn get_record(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        key: &str,
    ) -> FaucetResult<Option<CooldownRecord>> {
        let result: Option<String> = conn.get(key).await?;
        match result {
            Some(json) => {
                let record = serde_json::from_str(&json)
                    .map_err(|e| FaucetError::Store(format!("Corrupt cooldown record {}: {}", key, e)))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CooldownStore for RedisCooldownStore {
    async fn can_claim(&self, network: ChainId, user: &Address, now: DateTime<Utc>) -> FaucetResult<bool> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let key = cooldown_key(network, user);

        match self.get_record(&mut conn, &key).await? {
            None => Ok(true),
            Some(record) if record.is_live(now) => Ok(false),
            Some(_) => {
                let _: () = conn.del(&key).await?;
                debug!("Purged expired cooldown {}", key);
                Ok(true)
            }
        }
    }

    async fn commit(&self, network: ChainId, user: &Address, now: DateTime<Utc>) -> FaucetResult<CooldownRecord> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let key = cooldown_key(network, user);

        let record = CooldownRecord::new(now, self.cooldown);
        let json = serde_json::to_string(&record)
            .map_err(|e| FaucetError::Internal(format!("Failed to encode cooldown: {}", e)))?;

        let ttl_ms = self.cooldown.as_millis().max(1) as u64;
        let _: () = redis::cmd("SET")
            .arg(&key)
            .arg(json)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        Ok(record)
    }

    async fn peek_remaining(
        &self,
        network: ChainId,
        user: &Address,
        now: DateTime<Utc>,
    ) -> FaucetResult<Option<RemainingInfo>> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let key = cooldown_key(network, user);

        Ok(self
            .get_record(&mut conn, &key)
            .await?
            .filter(|record| record.is_live(now))
            .map(|record| record.remaining(now)))
    }

    fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
