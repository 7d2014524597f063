use async_trait::async_trait;
use drip_common::{Address, ChainId, Hash};
use drip_crypto::{KeyPair, U256};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ChainClient, ChainError, ChainResult, DripCall, LegacyTransaction};

/// Talks to one network's node over Ethereum JSON-RPC and signs with the
/// relayer key.
pub struct JsonRpcChainClient {
    rpc_url: String,
    chain_id: ChainId,
    relayer: Arc<KeyPair>,
    client: reqwest::Client,
    /// Held from nonce lookup through submission so concurrent drips on this
    /// network never reuse a nonce
    send_lock: Mutex<()>,
}

impl JsonRpcChainClient {
    pub fn new(rpc_url: String, chain_id: ChainId, relayer: Arc<KeyPair>) -> Self {
        Self {
            rpc_url,
            chain_id,
            relayer,
            client: reqwest::Client::new(),
            send_lock: Mutex::new(()),
        }
    }

    async fn call(&self, method: &str, params: Value) -> ChainResult<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChainError::Rpc(format!("Request failed: {}", e)))?;

        let json: Value = response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;

        if let Some(error) = json.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(if message.contains("revert") {
                ChainError::Reverted(message)
            } else {
                ChainError::Rpc(message)
            });
        }

        json.get("result")
            .cloned()
            .ok_or_else(|| ChainError::InvalidResponse(format!("{} returned no result", method)))
    }

    async fn quantity(&self, method: &str, params: Value) -> ChainResult<U256> {
        let result = self.call(method, params).await?;
        parse_quantity(&result)
    }

    pub async fn gas_price(&self) -> ChainResult<U256> {
        self.quantity("eth_gasPrice", json!([])).await
    }

    pub async fn pending_nonce(&self, address: &Address) -> ChainResult<U256> {
        self.quantity("eth_getTransactionCount", json!([address.to_lower_hex(), "pending"]))
            .await
    }
}

fn parse_quantity(value: &Value) -> ChainResult<U256> {
    let text = value
        .as_str()
        .ok_or_else(|| ChainError::InvalidResponse(format!("expected hex quantity, got {}", value)))?;
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::InvalidResponse(format!("missing 0x prefix: {}", text)))?;
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| ChainError::InvalidResponse(format!("bad quantity {}: {}", text, e)))
}

fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[async_trait]
impl ChainClient for JsonRpcChainClient {
    async fn estimate_gas(&self, call: &DripCall) -> ChainResult<u64> {
        let tx = json!({
            "from": self.relayer.address().to_lower_hex(),
            "to": call.faucet.to_lower_hex(),
            "data": encode_hex(&call.calldata()),
        });

        let gas = self.quantity("eth_estimateGas", json!([tx])).await?;
        if gas > U256::from(u64::MAX) {
            return Err(ChainError::InvalidResponse(format!("gas estimate out of range: {}", gas)));
        }
        Ok(gas.as_u64())
    }

    async fn send_transaction(&self, call: &DripCall, gas_limit: u64) -> ChainResult<Hash> {
        let _sending = self.send_lock.lock().await;

        let gas_price = self.gas_price().await?;
        let nonce = self.pending_nonce(&self.relayer.address()).await?;

        let tx = LegacyTransaction {
            nonce,
            gas_price,
            gas_limit,
            to: call.faucet,
            value: U256::zero(),
            data: call.calldata(),
            chain_id: self.chain_id,
        };
        let raw = tx.sign(&self.relayer)?;
        debug!(
            "Submitting drip on chain {} (nonce {}, gas {}, gas price {})",
            self.chain_id, nonce, gas_limit, gas_price
        );

        let result = self
            .call("eth_sendRawTransaction", json!([encode_hex(&raw)]))
            .await?;
        let hash = result
            .as_str()
            .ok_or_else(|| ChainError::InvalidResponse(format!("expected tx hash, got {}", result)))?;
        hash.parse()
            .map_err(|e| ChainError::InvalidResponse(format!("bad tx hash {}: {}", hash, e)))
    }
}
