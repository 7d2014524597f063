//! Claim coordination.
//!
//! One claim runs through
//!
//! ```text
//! Received -> AdmissionReserved -> CooldownChecked -> SignatureVerified
//!          -> GasEstimated -> Broadcast -> CooldownCommitted
//! ```
//!
//! and stops at the first failing step. Everything before the broadcast is
//! undone on failure: the admission slot goes back and the cooldown is left
//! alone. Once the transaction is out the slot stays taken, even if the
//! cooldown cannot be written.

use chrono::{DateTime, Utc};
use drip_common::{Address, ChainId, Hash};
use drip_crypto::ClaimRequest;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::chain::{ChainClient, ChainError, DripCall};
use crate::clock::{Clock, SystemClock};
use crate::config::{Network, NetworkRegistry};
use crate::cooldown::{CooldownRecord, CooldownStore, RemainingInfo};
use crate::error::{FaucetError, FaucetResult};
use crate::limiter::{Admission, AdmissionGuard, AdmissionLimiter, WindowStatus};
use crate::locks::ClaimLocks;
use crate::metrics::FaucetMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStage {
    Received,
    AdmissionReserved,
    CooldownChecked,
    SignatureVerified,
    GasEstimated,
    Broadcast,
    CooldownCommitted,
}

impl fmt::Display for ClaimStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClaimStage::Received => "received",
            ClaimStage::AdmissionReserved => "admission reserved",
            ClaimStage::CooldownChecked => "cooldown checked",
            ClaimStage::SignatureVerified => "signature verified",
            ClaimStage::GasEstimated => "gas estimated",
            ClaimStage::Broadcast => "broadcast",
            ClaimStage::CooldownCommitted => "cooldown committed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimSettings {
    /// Extra gas on top of the estimate, in percent
    pub gas_headroom_percent: u64,
    /// Applied separately to gas estimation and broadcast
    pub chain_timeout: Duration,
}

impl Default for ClaimSettings {
    fn default() -> Self {
        Self {
            gas_headroom_percent: 20,
            chain_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of a successful claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub tx_hash: Hash,
    pub chain_id: ChainId,
    pub network_name: String,
    pub faucet_address: Address,
    pub user: Address,
    pub next_claim_time: DateTime<Utc>,
    pub network_rate_limit_remaining: u32,
}

/// Admission window of one network as reported to clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkStatus {
    pub chain_id: ChainId,
    pub name: String,
    pub faucet_address: Address,
    pub window: WindowStatus,
}

/// `estimate * (100 + percent) / 100`, saturating
pub fn with_headroom(estimate: u64, percent: u64) -> u64 {
    let scaled = u128::from(estimate) * (100 + u128::from(percent)) / 100;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

pub struct ClaimCoordinator {
    registry: Arc<NetworkRegistry>,
    relayer_address: Address,
    chains: HashMap<ChainId, Arc<dyn ChainClient>>,
    limiter: Arc<dyn AdmissionLimiter>,
    cooldowns: Arc<dyn CooldownStore>,
    locks: ClaimLocks,
    clock: Arc<dyn Clock>,
    metrics: Option<FaucetMetrics>,
    settings: ClaimSettings,
}

impl ClaimCoordinator {
    pub fn new(
        registry: Arc<NetworkRegistry>,
        relayer_address: Address,
        limiter: Arc<dyn AdmissionLimiter>,
        cooldowns: Arc<dyn CooldownStore>,
        settings: ClaimSettings,
    ) -> Self {
        Self {
            registry,
            relayer_address,
            chains: HashMap::new(),
            limiter,
            cooldowns,
            locks: ClaimLocks::default(),
            clock: Arc::new(SystemClock),
            metrics: None,
            settings,
        }
    }

    pub fn with_chain_client(mut self, chain_id: ChainId, client: Arc<dyn ChainClient>) -> Self {
        self.chains.insert(chain_id, client);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: FaucetMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    pub fn relayer_address(&self) -> Address {
        self.relayer_address
    }

    pub fn metrics(&self) -> Option<&FaucetMetrics> {
        self.metrics.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Error for a chain id that is not served, however it was spelled
    pub fn unsupported_chain(&self, chain_id: impl Into<String>) -> FaucetError {
        FaucetError::UnsupportedChain {
            chain_id: chain_id.into(),
            available: self.registry.chain_ids(),
        }
    }

    pub fn network(&self, chain_id: ChainId) -> FaucetResult<&Network> {
        self.registry
            .get(chain_id)
            .ok_or_else(|| self.unsupported_chain(chain_id.to_string()))
    }

    /// Run one claim to completion and record its outcome
    pub async fn claim(&self, request: ClaimRequest) -> FaucetResult<ClaimReceipt> {
        let started = Instant::now();
        let result = self.run_claim(&request).await;

        let outcome = match &result {
            Ok(receipt) => {
                info!(
                    "Dripped to {} on {} (chainId: {}), tx: {}",
                    receipt.user, receipt.network_name, receipt.chain_id, receipt.tx_hash
                );
                "success"
            }
            Err(e) if e.is_rejection() => {
                warn!("Claim by {} on chain {} rejected: {}", request.user, request.network_id, e);
                e.code()
            }
            Err(e) => {
                error!("Claim by {} on chain {} failed: {}", request.user, request.network_id, e);
                e.code()
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_claim(outcome, started.elapsed().as_secs_f64());
        }
        result
    }

    async fn run_claim(&self, request: &ClaimRequest) -> FaucetResult<ClaimReceipt> {
        self.trace(request, ClaimStage::Received);

        let network = self.network(request.network_id)?;
        let chain = self.chains.get(&network.chain_id).ok_or_else(|| {
            FaucetError::Config(format!("No chain client for {} (chainId: {})", network.name, network.chain_id))
        })?;

        let now = self.clock.now();
        let now_secs = u64::try_from(now.timestamp()).unwrap_or(0);
        if now_secs > request.deadline {
            return Err(FaucetError::Expired {
                deadline: request.deadline,
                now: now.timestamp(),
            });
        }

        let reservation = match self.limiter.reserve(network.chain_id, now).await? {
            Admission::Reserved(reservation) => reservation,
            Admission::RateLimited { reset_time } => return Err(FaucetError::RateLimited { reset_time }),
        };
        self.trace(request, ClaimStage::AdmissionReserved);

        let guard = AdmissionGuard::new(self.limiter.clone(), reservation);
        let remaining = guard.remaining();

        match self.attempt(request, network, chain.as_ref()).await {
            Ok((tx_hash, record)) => {
                guard.consume();
                Ok(ClaimReceipt {
                    tx_hash,
                    chain_id: network.chain_id,
                    network_name: network.name.clone(),
                    faucet_address: network.faucet_address,
                    user: request.user,
                    next_claim_time: record.expires_at,
                    network_rate_limit_remaining: remaining,
                })
            }
            Err(e @ FaucetError::CommitFailed { .. }) => {
                guard.consume();
                Err(e)
            }
            Err(e) => {
                if let Err(release_err) = guard.release().await {
                    error!(
                        "Failed to release admission slot on chain {}: {}",
                        network.chain_id, release_err
                    );
                }
                Err(e)
            }
        }
    }

    /// Everything between reservation and commit, serialized per user
    async fn attempt(
        &self,
        request: &ClaimRequest,
        network: &Network,
        chain: &dyn ChainClient,
    ) -> FaucetResult<(Hash, CooldownRecord)> {
        let _user_lock = self.locks.acquire(network.chain_id, &request.user).await;

        let now = self.clock.now();
        if !self.cooldowns.can_claim(network.chain_id, &request.user, now).await? {
            let info = self
                .cooldowns
                .peek_remaining(network.chain_id, &request.user, now)
                .await?;
            let (remaining_seconds, next_claim_time) = match info {
                Some(info) => (info.remaining_seconds, info.expires_at),
                None => (0, now),
            };
            return Err(FaucetError::CooldownActive {
                remaining_seconds,
                next_claim_time,
            });
        }
        self.trace(request, ClaimStage::CooldownChecked);

        if !drip_crypto::verify(request, &network.faucet_address)? {
            return Err(FaucetError::BadSignature);
        }
        self.trace(request, ClaimStage::SignatureVerified);

        let call = DripCall {
            chain_id: network.chain_id,
            faucet: network.faucet_address,
            user: request.user,
            nonce: request.nonce,
            deadline: request.deadline,
            signature: request.signature.clone(),
        };

        let estimate = self
            .with_timeout("gas estimation", chain.estimate_gas(&call))
            .await?
            .map_err(|e| FaucetError::WouldRevert(describe(e)))?;
        let gas_limit = with_headroom(estimate, self.settings.gas_headroom_percent);
        debug!("Gas estimate {} for {}, sending with {}", estimate, request.user, gas_limit);
        self.trace(request, ClaimStage::GasEstimated);

        let tx_hash = self
            .with_timeout("broadcast", chain.send_transaction(&call, gas_limit))
            .await?
            .map_err(|e| FaucetError::SendFailed(describe(e)))?;
        self.trace(request, ClaimStage::Broadcast);

        let record = self
            .cooldowns
            .commit(network.chain_id, &request.user, self.clock.now())
            .await
            .map_err(|e| FaucetError::CommitFailed {
                tx_hash: tx_hash.to_string(),
                reason: e.to_string(),
            })?;
        self.trace(request, ClaimStage::CooldownCommitted);

        Ok((tx_hash, record))
    }

    async fn with_timeout<T>(&self, stage: &'static str, future: impl Future<Output = T>) -> FaucetResult<T> {
        let after = self.settings.chain_timeout;
        tokio::time::timeout(after, future)
            .await
            .map_err(|_| FaucetError::ChainTimeout {
                stage,
                after_secs: after.as_secs(),
            })
    }

    fn trace(&self, request: &ClaimRequest, stage: ClaimStage) {
        debug!(
            "Claim by {} on chain {}: {}",
            request.user, request.network_id, stage
        );
    }

    /// Read-only cooldown lookup for `/can-claim`
    pub async fn cooldown_status(&self, chain_id: ChainId, user: &Address) -> FaucetResult<Option<RemainingInfo>> {
        let network = self.network(chain_id)?;
        self.cooldowns
            .peek_remaining(network.chain_id, user, self.clock.now())
            .await
    }

    /// Window status of every served network, in chain id order
    pub async fn network_statuses(&self) -> FaucetResult<Vec<NetworkStatus>> {
        let now = self.clock.now();
        let mut statuses = Vec::with_capacity(self.registry.len());
        for network in self.registry.iter() {
            let window = self.limiter.status(network.chain_id, now).await?;
            statuses.push(NetworkStatus {
                chain_id: network.chain_id,
                name: network.name.clone(),
                faucet_address: network.faucet_address,
                window,
            });
        }
        Ok(statuses)
    }
}

fn describe(err: ChainError) -> String {
    match err {
        ChainError::Reverted(reason) => reason,
        other => other.to_string(),
    }
}
