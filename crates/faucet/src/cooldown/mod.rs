//! Per-(network, user) claim cooldowns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drip_common::{Address, ChainId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::FaucetResult;

mod memory;
mod redis_store;

pub use memory::MemoryCooldownStore;
pub use redis_store::RedisCooldownStore;

/// Last successful claim of one user on one network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownRecord {
    #[serde(rename = "lastClaim", with = "chrono::serde::ts_milliseconds")]
    pub last_claim_at: DateTime<Utc>,
    #[serde(rename = "expiresAt", with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl CooldownRecord {
    pub fn new(last_claim_at: DateTime<Utc>, cooldown: Duration) -> Self {
        Self {
            last_claim_at,
            expires_at: last_claim_at + to_chrono(cooldown),
        }
    }

    /// A record at or past `expires_at` no longer exists as far as callers care
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> RemainingInfo {
        let millis = (self.expires_at - now).num_milliseconds().max(0) as u64;
        RemainingInfo {
            expires_at: self.expires_at,
            remaining_seconds: millis.div_ceil(1000),
        }
    }
}

/// When a user may claim again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemainingInfo {
    pub expires_at: DateTime<Utc>,
    pub remaining_seconds: u64,
}

#[async_trait]
pub trait CooldownStore: Send + Sync {
    /// True when no live record exists. Expired records are purged.
    async fn can_claim(&self, network: ChainId, user: &Address, now: DateTime<Utc>) -> FaucetResult<bool>;

    /// Start a fresh cooldown at `now`, replacing any previous record
    async fn commit(&self, network: ChainId, user: &Address, now: DateTime<Utc>) -> FaucetResult<CooldownRecord>;

    /// Read-only view of a live record
    async fn peek_remaining(
        &self,
        network: ChainId,
        user: &Address,
        now: DateTime<Utc>,
    ) -> FaucetResult<Option<RemainingInfo>>;

    fn cooldown(&self) -> Duration;
}

pub(crate) fn cooldown_key(network: ChainId, user: &Address) -> String {
    format!("cooldown:{}:{}", network, user.to_lower_hex())
}

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_expiry_boundary() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = CooldownRecord::new(start, Duration::from_secs(86400));

        assert_eq!(record.expires_at, start + chrono::Duration::hours(24));
        assert!(record.is_live(start));
        assert!(record.is_live(record.expires_at - chrono::Duration::milliseconds(1)));
        assert!(!record.is_live(record.expires_at));
    }

    #[test]
    fn test_remaining_rounds_up() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = CooldownRecord::new(start, Duration::from_secs(10));

        let info = record.remaining(start + chrono::Duration::milliseconds(8_500));
        assert_eq!(info.remaining_seconds, 2);
        assert_eq!(record.remaining(start).remaining_seconds, 10);
    }

    #[test]
    fn test_record_json_shape() {
        let start = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let record = CooldownRecord::new(start, Duration::from_secs(1));
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["lastClaim"], 1_700_000_000_000i64);
        assert_eq!(json["expiresAt"], 1_700_000_001_000i64);
    }

    #[test]
    fn test_key_is_case_normalized() {
        let user: Address = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".parse().unwrap();
        assert_eq!(
            cooldown_key(11155111, &user),
            "cooldown:11155111:0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"
        );
    }
}
