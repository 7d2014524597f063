use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drip_common::ChainId;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{Admission, AdmissionLimiter, Reservation, WindowPolicy, WindowStatus};
use crate::error::FaucetResult;

/// Sliding windows kept in process memory, one deque of `(admitted at, id)`
/// per network
#[derive(Debug)]
pub struct MemoryAdmissionLimiter {
    policy: WindowPolicy,
    windows: Mutex<HashMap<ChainId, VecDeque<(DateTime<Utc>, Uuid)>>>,
}

impl MemoryAdmissionLimiter {
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            policy,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn status_of(&self, entries: Option<&VecDeque<(DateTime<Utc>, Uuid)>>, now: DateTime<Utc>) -> WindowStatus {
        let cutoff = self.policy.cutoff(now);
        let live: Vec<DateTime<Utc>> = entries
            .into_iter()
            .flatten()
            .map(|(at, _)| *at)
            .filter(|at| *at > cutoff)
            .collect();
        let oldest = live.iter().min().copied();

        WindowStatus {
            remaining: self.policy.capacity.saturating_sub(live.len() as u32),
            reset_time: oldest.unwrap_or(now) + self.policy.window_chrono(),
        }
    }
}

#[async_trait]
impl AdmissionLimiter for MemoryAdmissionLimiter {
    async fn reserve(&self, network: ChainId, now: DateTime<Utc>) -> FaucetResult<Admission> {
        let cutoff = self.policy.cutoff(now);
        let mut windows = self.windows.lock().await;
        let entries = windows.entry(network).or_default();
        entries.retain(|(at, _)| *at > cutoff);

        let count = entries.len() as u32;
        if count >= self.policy.capacity {
            let oldest = entries.iter().map(|(at, _)| *at).min().unwrap_or(now);
            return Ok(Admission::RateLimited {
                reset_time: oldest + self.policy.window_chrono(),
            });
        }

        let id = Uuid::new_v4();
        entries.push_back((now, id));
        debug!("Reserved slot {} on chain {} ({}/{})", id, network, count + 1, self.policy.capacity);

        Ok(Admission::Reserved(Reservation {
            network,
            id,
            at: now,
            remaining: self.policy.capacity - count - 1,
        }))
    }

    async fn release(&self, reservation: &Reservation) -> FaucetResult<()> {
        let mut windows = self.windows.lock().await;
        if let Some(entries) = windows.get_mut(&reservation.network) {
            if let Some(pos) = entries.iter().position(|(_, id)| *id == reservation.id) {
                entries.remove(pos);
                debug!("Released slot {} on chain {}", reservation.id, reservation.network);
            }
        }
        Ok(())
    }

    async fn status(&self, network: ChainId, now: DateTime<Utc>) -> FaucetResult<WindowStatus> {
        let windows = self.windows.lock().await;
        Ok(self.status_of(windows.get(&network), now))
    }

    fn policy(&self) -> WindowPolicy {
        self.policy
    }
}
