//! Scriptable in-memory chain for tests and local runs

use async_trait::async_trait;
use drip_common::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{ChainClient, ChainError, ChainResult, DripCall};

#[derive(Debug, Default)]
struct MockState {
    gas: u64,
    estimate_error: Option<ChainError>,
    send_error: Option<ChainError>,
    estimate_delay: Option<Duration>,
    send_delay: Option<Duration>,
    estimate_calls: usize,
    sent: Vec<(DripCall, u64)>,
}

#[derive(Debug)]
pub struct MockChainClient {
    state: Mutex<MockState>,
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl MockChainClient {
    pub fn new(gas: u64) -> Self {
        Self {
            state: Mutex::new(MockState {
                gas,
                ..MockState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail_estimate(&self, error: ChainError) {
        self.state().estimate_error = Some(error);
    }

    pub fn fail_send(&self, error: ChainError) {
        self.state().send_error = Some(error);
    }

    pub fn delay_estimate(&self, delay: Duration) {
        self.state().estimate_delay = Some(delay);
    }

    /// Delay every send, e.g. past the coordinator's timeout
    pub fn delay_send(&self, delay: Duration) {
        self.state().send_delay = Some(delay);
    }

    pub fn estimate_calls(&self) -> usize {
        self.state().estimate_calls
    }

    /// Every submitted call with the gas limit it was sent with
    pub fn sent_transactions(&self) -> Vec<(DripCall, u64)> {
        self.state().sent.clone()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn estimate_gas(&self, _call: &DripCall) -> ChainResult<u64> {
        let delay = {
            let mut state = self.state();
            state.estimate_calls += 1;
            state.estimate_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state();
        match &state.estimate_error {
            Some(error) => Err(error.clone()),
            None => Ok(state.gas),
        }
    }

    async fn send_transaction(&self, call: &DripCall, gas_limit: u64) -> ChainResult<Hash> {
        let delay = self.state().send_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if let Some(error) = &state.send_error {
            return Err(error.clone());
        }
        state.sent.push((call.clone(), gas_limit));

        let mut preimage = call.calldata();
        preimage.extend_from_slice(&(state.sent.len() as u64).to_be_bytes());
        Ok(Hash::keccak(preimage))
    }
}
