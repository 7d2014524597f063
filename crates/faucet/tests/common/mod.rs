#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use drip_common::{Address, ChainId};
use drip_crypto::{ClaimRequest, KeyPair, U256};
use drip_faucet::chain::mock::MockChainClient;
use drip_faucet::clock::ManualClock;
use drip_faucet::config::Network;
use drip_faucet::cooldown::{CooldownRecord, CooldownStore, MemoryCooldownStore, RemainingInfo};
use drip_faucet::limiter::{AdmissionLimiter, MemoryAdmissionLimiter, WindowPolicy};
use drip_faucet::{ClaimCoordinator, ClaimSettings, FaucetError, FaucetMetrics, FaucetResult, NetworkRegistry};
use std::sync::Arc;
use std::time::Duration;

pub const SEPOLIA: ChainId = 11155111;
pub const ARBITRUM_SEPOLIA: ChainId = 421614;

pub fn faucet_address() -> Address {
    "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".parse().unwrap()
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Coordinator over in-memory stores, a manual clock and mock chains
pub struct Harness {
    pub coordinator: Arc<ClaimCoordinator>,
    pub chain: Arc<MockChainClient>,
    pub limiter: Arc<MemoryAdmissionLimiter>,
    pub cooldowns: Arc<MemoryCooldownStore>,
    pub clock: Arc<ManualClock>,
    pub metrics: FaucetMetrics,
    pub relayer: KeyPair,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(20, ClaimSettings::default())
    }

    pub fn with_settings(capacity: u32, settings: ClaimSettings) -> Self {
        Self::build(capacity, settings, false)
    }

    /// Cooldown reads work but every commit fails, as if the store went away
    /// right after the broadcast
    pub fn with_failing_commits() -> Self {
        Self::build(20, ClaimSettings::default(), true)
    }

    fn build(capacity: u32, settings: ClaimSettings, fail_commits: bool) -> Self {
        let registry = NetworkRegistry::from_networks([
            Network {
                chain_id: SEPOLIA,
                name: "Sepolia".to_string(),
                rpc_url: "http://sepolia.invalid".to_string(),
                faucet_address: faucet_address(),
            },
            Network {
                chain_id: ARBITRUM_SEPOLIA,
                name: "Arbitrum Sepolia".to_string(),
                rpc_url: "http://arbitrum.invalid".to_string(),
                faucet_address: faucet_address(),
            },
        ]);

        let chain = Arc::new(MockChainClient::new(100_000));
        let limiter = Arc::new(MemoryAdmissionLimiter::new(WindowPolicy {
            capacity,
            window: Duration::from_secs(3600),
        }));
        let cooldowns = Arc::new(MemoryCooldownStore::new(Duration::from_secs(86400)));
        let clock = Arc::new(ManualClock::new(start()));
        let metrics = FaucetMetrics::new().unwrap();
        let relayer = KeyPair::random();
        let store: Arc<dyn CooldownStore> = if fail_commits {
            Arc::new(FailingCommits {
                inner: cooldowns.clone(),
            })
        } else {
            cooldowns.clone()
        };

        let coordinator = ClaimCoordinator::new(
            Arc::new(registry),
            relayer.address(),
            limiter.clone() as Arc<dyn AdmissionLimiter>,
            store,
            settings,
        )
        .with_clock(clock.clone())
        .with_metrics(metrics.clone())
        .with_chain_client(SEPOLIA, chain.clone())
        .with_chain_client(ARBITRUM_SEPOLIA, chain.clone());

        Self {
            coordinator: Arc::new(coordinator),
            chain,
            limiter,
            cooldowns,
            clock,
            metrics,
            relayer,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        drip_faucet::clock::Clock::now(self.clock.as_ref())
    }

    /// A claim signed by `user` the way the wallet UI signs it
    pub fn signed(&self, user: &KeyPair, chain_id: ChainId, nonce: u64, deadline: u64) -> ClaimRequest {
        let signature = user
            .sign_claim(U256::from(nonce), deadline, chain_id, &faucet_address())
            .unwrap();
        ClaimRequest {
            user: user.address(),
            nonce: U256::from(nonce),
            deadline,
            signature: signature.to_vec(),
            network_id: chain_id,
        }
    }

    /// Valid for five minutes from the harness clock
    pub fn valid_claim(&self, user: &KeyPair, nonce: u64) -> ClaimRequest {
        let deadline = self.now().timestamp() as u64 + 300;
        self.signed(user, SEPOLIA, nonce, deadline)
    }

    pub async fn window_remaining(&self, chain_id: ChainId) -> u32 {
        self.limiter.status(chain_id, self.now()).await.unwrap().remaining
    }

    /// Give spawned release tasks a chance to run
    pub async fn settle(&self) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }
}

/// Delegates reads to a memory store and refuses every commit
pub struct FailingCommits {
    inner: Arc<MemoryCooldownStore>,
}

#[async_trait]
impl CooldownStore for FailingCommits {
    async fn can_claim(&self, network: ChainId, user: &Address, now: DateTime<Utc>) -> FaucetResult<bool> {
        self.inner.can_claim(network, user, now).await
    }

    async fn commit(&self, _network: ChainId, _user: &Address, _now: DateTime<Utc>) -> FaucetResult<CooldownRecord> {
        Err(FaucetError::Store("connection reset by peer".to_string()))
    }

    async fn peek_remaining(
        &self,
        network: ChainId,
        user: &Address,
        now: DateTime<Utc>,
    ) -> FaucetResult<Option<RemainingInfo>> {
        self.inner.peek_remaining(network, user, now).await
    }

    fn cooldown(&self) -> Duration {
        self.inner.cooldown()
    }
}
