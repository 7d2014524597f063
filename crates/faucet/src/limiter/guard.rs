use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::{AdmissionLimiter, Reservation};
use crate::error::FaucetResult;

/// Owns one reservation for the lifetime of a claim attempt.
///
/// The attempt either `consume`s the slot once the transaction is out, or
/// `release`s it on any earlier failure. A guard dropped while still holding
/// its slot (the attempt was cancelled or panicked) releases it on a spawned
/// task.
pub struct AdmissionGuard {
    limiter: Arc<dyn AdmissionLimiter>,
    reservation: Option<Reservation>,
}

impl AdmissionGuard {
    pub fn new(limiter: Arc<dyn AdmissionLimiter>, reservation: Reservation) -> Self {
        Self {
            limiter,
            reservation: Some(reservation),
        }
    }

    /// Slots left in the window after this reservation
    pub fn remaining(&self) -> u32 {
        self.reservation.as_ref().map_or(0, |r| r.remaining)
    }

    /// Keep the slot for good
    pub fn consume(mut self) -> Option<Reservation> {
        self.reservation.take()
    }

    /// Give the slot back now
    pub async fn release(mut self) -> FaucetResult<()> {
        match self.reservation.take() {
            Some(reservation) => self.limiter.release(&reservation).await,
            None => Ok(()),
        }
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        let Some(reservation) = self.reservation.take() else {
            return;
        };

        match Handle::try_current() {
            Ok(handle) => {
                let limiter = self.limiter.clone();
                handle.spawn(async move {
                    match limiter.release(&reservation).await {
                        Ok(()) => debug!("Released abandoned slot {}", reservation.id),
                        Err(e) => warn!("Failed to release abandoned slot {}: {}", reservation.id, e),
                    }
                });
            }
            Err(_) => warn!(
                "No runtime to release slot {} on chain {}; it expires with the window",
                reservation.id, reservation.network
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::tests::{expect_reserved, start};
    use crate::limiter::{MemoryAdmissionLimiter, WindowPolicy};

    fn limiter() -> Arc<dyn AdmissionLimiter> {
        Arc::new(MemoryAdmissionLimiter::new(WindowPolicy::default()))
    }

    async fn remaining(limiter: &Arc<dyn AdmissionLimiter>) -> u32 {
        limiter.status(1, start()).await.unwrap().remaining
    }

    #[tokio::test]
    async fn test_consume_keeps_slot() {
        let limiter = limiter();
        let reservation = expect_reserved(limiter.as_ref(), 1, start()).await;
        let guard = AdmissionGuard::new(limiter.clone(), reservation.clone());
        assert_eq!(guard.remaining(), 19);

        assert_eq!(guard.consume(), Some(reservation));
        tokio::task::yield_now().await;
        assert_eq!(remaining(&limiter).await, 19);
    }

    #[tokio::test]
    async fn test_release_returns_slot() {
        let limiter = limiter();
        let reservation = expect_reserved(limiter.as_ref(), 1, start()).await;
        AdmissionGuard::new(limiter.clone(), reservation).release().await.unwrap();
        assert_eq!(remaining(&limiter).await, 20);
    }

    #[tokio::test]
    async fn test_drop_returns_slot() {
        let limiter = limiter();
        let reservation = expect_reserved(limiter.as_ref(), 1, start()).await;
        drop(AdmissionGuard::new(limiter.clone(), reservation));

        for _ in 0..10 {
            if remaining(&limiter).await == 20 {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("dropped guard did not release its slot");
    }
}
