//! Multi-network testnet faucet relayer.
//!
//! Users sign a claim in their wallet; the relayer checks it and pays the gas
//! to call the faucet contract on their behalf. Abuse is bounded by:
//! - a per-user cooldown on every network
//! - a shared sliding-window budget of claims per network
//! - signature checks before any chain call is made

pub mod api;
pub mod chain;
pub mod clock;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod limiter;
pub mod locks;
pub mod metrics;
pub mod service;

pub use api::router;
pub use config::{FaucetConfig, Network, NetworkConfig, NetworkRegistry};
pub use error::{FaucetError, FaucetResult};
pub use metrics::FaucetMetrics;
pub use service::{ClaimCoordinator, ClaimReceipt, ClaimSettings};
