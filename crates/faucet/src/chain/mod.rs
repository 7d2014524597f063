//! Chain access: the faucet contract's `drip` call and the client that
//! estimates and broadcasts it.

use async_trait::async_trait;
use drip_common::{Address, ChainId, Hash};
use drip_crypto::U256;
use ethabi::{ParamType, Token};
use thiserror::Error;

pub mod mock;
mod rpc;
mod transaction;

pub use rpc::JsonRpcChainClient;
pub use transaction::LegacyTransaction;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("execution reverted: {0}")]
    Reverted(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("invalid RPC response: {0}")]
    InvalidResponse(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

pub type ChainResult<T> = Result<T, ChainError>;

/// `drip(address user, uint256 nonce, uint256 deadline, bytes signature)`
/// on one network's faucet contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DripCall {
    pub chain_id: ChainId,
    pub faucet: Address,
    pub user: Address,
    pub nonce: U256,
    pub deadline: u64,
    pub signature: Vec<u8>,
}

impl DripCall {
    pub fn calldata(&self) -> Vec<u8> {
        let params = [
            ParamType::Address,
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Bytes,
        ];
        let tokens = [
            Token::Address(ethabi::Address::from_slice(self.user.as_bytes())),
            Token::Uint(self.nonce),
            Token::Uint(U256::from(self.deadline)),
            Token::Bytes(self.signature.clone()),
        ];

        let mut data = ethabi::short_signature("drip", &params).to_vec();
        data.extend(ethabi::encode(&tokens));
        data
    }
}

/// One network's view of the chain, used by the claim coordinator
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Gas the relayer would spend on `call`. A revert surfaces as
    /// `ChainError::Reverted`.
    async fn estimate_gas(&self, call: &DripCall) -> ChainResult<u64>;

    /// Sign `call` with the relayer key, submit it with `gas_limit` and
    /// return the transaction hash without waiting for inclusion
    async fn send_transaction(&self, call: &DripCall, gas_limit: u64) -> ChainResult<Hash>;
}
