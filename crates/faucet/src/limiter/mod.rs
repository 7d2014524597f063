//! Per-network admission control.
//!
//! Every network shares one sliding window of `capacity` claims per
//! `window`. A claim reserves its slot before any expensive work and gives it
//! back if the attempt is abandoned. Reservations carry a unique id so a
//! release removes exactly the entry it created, however requests interleave.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drip_common::ChainId;
use std::time::Duration;
use uuid::Uuid;

use crate::error::FaucetResult;

mod guard;
mod memory;
mod redis_store;

pub use guard::AdmissionGuard;
pub use memory::MemoryAdmissionLimiter;
pub use redis_store::RedisAdmissionLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub capacity: u32,
    pub window: Duration,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            capacity: 20,
            window: Duration::from_secs(3600),
        }
    }
}

impl WindowPolicy {
    pub fn window_chrono(&self) -> chrono::Duration {
        crate::cooldown::to_chrono(self.window)
    }

    /// Entries at or before this instant have left the window
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window_chrono()
    }
}

/// Handle to one admitted slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub network: ChainId,
    pub id: Uuid,
    pub at: DateTime<Utc>,
    /// Slots left in the window right after this one was taken
    pub remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Reserved(Reservation),
    RateLimited { reset_time: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStatus {
    pub remaining: u32,
    /// When the oldest live entry leaves the window, or one window from now
    /// if the window is empty
    pub reset_time: DateTime<Utc>,
}

#[async_trait]
pub trait AdmissionLimiter: Send + Sync {
    async fn reserve(&self, network: ChainId, now: DateTime<Utc>) -> FaucetResult<Admission>;

    /// Remove exactly the entry `reserve` created. Unknown or already pruned
    /// reservations are ignored.
    async fn release(&self, reservation: &Reservation) -> FaucetResult<()>;

    async fn status(&self, network: ChainId, now: DateTime<Utc>) -> FaucetResult<WindowStatus>;

    fn policy(&self) -> WindowPolicy;
}
