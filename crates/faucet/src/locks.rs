//! Per-(network, user) serialization of claim attempts within one process.

use drip_common::{Address, ChainId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockKey = (ChainId, Address);
type LockTable = Arc<Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>>;

/// An entry lives exactly as long as someone holds or waits on it, so a held
/// lock is never dropped from the table.
#[derive(Clone, Default)]
pub struct ClaimLocks {
    locks: LockTable,
}

/// Held for the duration of one claim attempt
pub struct ClaimLockGuard {
    _guard: OwnedMutexGuard<()>,
    _slot: LockSlot,
}

/// One reference to a table entry; the last one out removes it
struct LockSlot {
    table: LockTable,
    key: LockKey,
    lock: Arc<AsyncMutex<()>>,
}

fn table(locks: &LockTable) -> MutexGuard<'_, HashMap<LockKey, Arc<AsyncMutex<()>>>> {
    locks.lock().unwrap_or_else(|e| e.into_inner())
}

impl ClaimLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, network: ChainId, user: &Address) -> ClaimLockGuard {
        let key = (network, *user);
        let lock = table(&self.locks)
            .entry(key)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let slot = LockSlot {
            table: self.locks.clone(),
            key,
            lock,
        };

        let guard = slot.lock.clone().lock_owned().await;
        ClaimLockGuard {
            _guard: guard,
            _slot: slot,
        }
    }

    /// Number of (network, user) pairs currently held or awaited
    pub fn len(&self) -> usize {
        table(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for LockSlot {
    fn drop(&mut self) {
        let mut locks = table(&self.table);
        // the table and this slot are the only owners left
        if Arc::strong_count(&self.lock) <= 2 {
            if let Some(current) = locks.get(&self.key) {
                if Arc::ptr_eq(current, &self.lock) {
                    locks.remove(&self.key);
                }
            }
        }
    }
}
