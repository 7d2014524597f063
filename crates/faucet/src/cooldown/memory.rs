use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drip_common::{Address, ChainId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::{CooldownRecord, CooldownStore, RemainingInfo};
use crate::error::FaucetResult;

/// In-process cooldowns. Lost on restart.
#[derive(Debug)]
pub struct MemoryCooldownStore {
    cooldown: Duration,
    records: RwLock<HashMap<(ChainId, Address), CooldownRecord>>,
}

impl MemoryCooldownStore {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored records, expired ones included until purged
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CooldownStore for MemoryCooldownStore {
    async fn can_claim(&self, network: ChainId, user: &Address, now: DateTime<Utc>) -> FaucetResult<bool> {
        let mut records = self.records.write().await;
        match records.get(&(network, *user)) {
            None => Ok(true),
            Some(record) if record.is_live(now) => Ok(false),
            Some(_) => {
                records.remove(&(network, *user));
                debug!("Purged expired cooldown for {} on chain {}", user, network);
                Ok(true)
            }
        }
    }

    async fn commit(&self, network: ChainId, user: &Address, now: DateTime<Utc>) -> FaucetResult<CooldownRecord> {
        let record = CooldownRecord::new(now, self.cooldown);
        self.records.write().await.insert((network, *user), record);
        Ok(record)
    }

    async fn peek_remaining(
        &self,
        network: ChainId,
        user: &Address,
        now: DateTime<Utc>,
    ) -> FaucetResult<Option<RemainingInfo>> {
        let records = self.records.read().await;
        Ok(records
            .get(&(network, *user))
            .filter(|record| record.is_live(now))
            .map(|record| record.remaining(now)))
    }

    fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
