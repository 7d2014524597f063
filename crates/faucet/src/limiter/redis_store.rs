use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drip_common::ChainId;
use redis::{AsyncCommands, Client as RedisClient, Script};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::{Admission, AdmissionLimiter, Reservation, WindowPolicy, WindowStatus};
use crate::error::{FaucetError, FaucetResult};

/// Prune, count and conditionally add in one round trip so two faucet
/// instances sharing the server cannot both take the last slot.
///
/// Returns `{admitted, count, oldest_score}`.
const RESERVE_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local capacity = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
if count >= capacity then
    local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
    local score = now
    if oldest[2] then
        score = tonumber(oldest[2])
    end
    return {0, count, score}
end

redis.call('ZADD', key, now, ARGV[4])
redis.call('PEXPIRE', key, window)
return {1, count + 1, 0}
"#;

/// Sliding windows as sorted sets under `network:claims:{chain}`, scored by
/// admission time in milliseconds. Members are `{ms}:{uuid}`.
#[derive(Clone)]
pub struct RedisAdmissionLimiter {
    redis: Arc<RedisClient>,
    policy: WindowPolicy,
    reserve_script: Script,
}

impl RedisAdmissionLimiter {
    pub fn new(redis: Arc<RedisClient>, policy: WindowPolicy) -> Self {
        Self {
            redis,
            policy,
            reserve_script: Script::new(RESERVE_SCRIPT),
        }
    }

    fn window_key(network: ChainId) -> String {
        format!("network:claims:{}", network)
    }

    fn member(at: DateTime<Utc>, id: &Uuid) -> String {
        format!("{}:{}", at.timestamp_millis(), id)
    }

    fn window_ms(&self) -> i64 {
        self.policy.window_chrono().num_milliseconds()
    }
}

fn from_millis(ms: i64) -> FaucetResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| FaucetError::Store(format!("Timestamp out of range: {}", ms)))
}

#[async_trait]
impl AdmissionLimiter for RedisAdmissionLimiter {
    async fn reserve(&self, network: ChainId, now: DateTime<Utc>) -> FaucetResult<Admission> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let id = Uuid::new_v4();

        let reply: Vec<i64> = self
            .reserve_script
            .key(Self::window_key(network))
            .arg(now.timestamp_millis())
            .arg(self.window_ms())
            .arg(self.policy.capacity)
            .arg(Self::member(now, &id))
            .invoke_async(&mut conn)
            .await?;

        let (admitted, count, oldest) = match reply.as_slice() {
            [admitted, count, oldest] => (*admitted, *count, *oldest),
            other => {
                return Err(FaucetError::Store(format!(
                    "Unexpected reserve reply: {:?}",
                    other
                )))
            }
        };

        if admitted == 0 {
            return Ok(Admission::RateLimited {
                reset_time: from_millis(oldest)? + self.policy.window_chrono(),
            });
        }

        debug!("Reserved slot {} on chain {} ({}/{})", id, network, count, self.policy.capacity);
        Ok(Admission::Reserved(Reservation {
            network,
            id,
            at: now,
            remaining: self.policy.capacity.saturating_sub(count as u32),
        }))
    }

    async fn release(&self, reservation: &Reservation) -> FaucetResult<()> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let removed: i64 = conn
            .zrem(
                Self::window_key(reservation.network),
                Self::member(reservation.at, &reservation.id),
            )
            .await?;
        if removed > 0 {
            debug!("Released slot {} on chain {}", reservation.id, reservation.network);
        }
        Ok(())
    }

    async fn status(&self, network: ChainId, now: DateTime<Utc>) -> FaucetResult<WindowStatus> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let key = Self::window_key(network);
        let min = format!("({}", self.policy.cutoff(now).timestamp_millis());

        let count: u32 = conn.zcount(&key, &min, "+inf").await?;
        let oldest: Vec<(String, f64)> = conn
            .zrangebyscore_limit_withscores(&key, &min, "+inf", 0, 1)
            .await?;

        let reset_time = match oldest.first() {
            Some((_, score)) => from_millis(*score as i64)? + self.policy.window_chrono(),
            None => now + self.policy.window_chrono(),
        };

        Ok(WindowStatus {
            remaining: self.policy.capacity.saturating_sub(count),
            reset_time,
        })
    }

    fn policy(&self) -> WindowPolicy {
        self.policy
    }
}
