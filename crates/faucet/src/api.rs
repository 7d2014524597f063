//! HTTP API for the faucet service

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use drip_common::types::decode_prefixed;
use drip_common::{Address, ChainId};
use drip_crypto::{ClaimRequest, U256};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::{iso8601, FaucetError, FaucetResult};
use crate::service::ClaimCoordinator;

/// JSON number or decimal/hex string; wallets and UIs send either
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(serde_json::Number),
    Text(String),
}

impl NumberOrString {
    pub fn as_text(&self) -> String {
        match self {
            NumberOrString::Number(n) => n.to_string(),
            NumberOrString::Text(s) => s.trim().to_string(),
        }
    }

    pub fn to_u256(&self) -> Option<U256> {
        match self {
            NumberOrString::Number(n) => n.as_u64().map(U256::from),
            NumberOrString::Text(s) => {
                let s = s.trim();
                match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                    Some(hex) if !hex.is_empty() => U256::from_str_radix(hex, 16).ok(),
                    Some(_) => None,
                    None if s.is_empty() => None,
                    None => U256::from_dec_str(s).ok(),
                }
            }
        }
    }

    pub fn to_u64(&self) -> Option<u64> {
        self.to_u256()
            .filter(|v| *v <= U256::from(u64::MAX))
            .map(|v| v.as_u64())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanClaimPayload {
    pub chain_id: Option<NumberOrString>,
    pub user: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaucetPayload {
    pub user: Option<String>,
    pub nonce: Option<NumberOrString>,
    pub deadline: Option<NumberOrString>,
    pub signature: Option<String>,
    pub chain_id: Option<NumberOrString>,
}

fn reject_body(rejection: JsonRejection) -> FaucetError {
    FaucetError::InvalidInput(rejection.body_text())
}

/// Resolve a requested chain id against the served networks
fn served_chain(coordinator: &ClaimCoordinator, chain_id: Option<&NumberOrString>) -> FaucetResult<ChainId> {
    let raw = chain_id.map(NumberOrString::as_text).unwrap_or_default();
    match chain_id.and_then(NumberOrString::to_u64) {
        Some(id) if coordinator.registry().get(id).is_some() => Ok(id),
        _ => Err(coordinator.unsupported_chain(raw)),
    }
}

fn parse_user(user: &str) -> FaucetResult<Address> {
    user.parse()
        .map_err(|_| FaucetError::InvalidInput("Invalid user address".to_string()))
}

/// Root handler with info
pub async fn root_handler(State(coordinator): State<Arc<ClaimCoordinator>>) -> impl IntoResponse {
    Json(json!({
        "name": "Drip Faucet",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Multi-network testnet faucet relayer",
        "endpoints": {
            "GET /health": "Server and network status",
            "GET /networks": "Faucet stats by network",
            "POST /can-claim": "Check if a user can claim",
            "POST /faucet": "Request a drip",
            "GET /metrics": "Prometheus metrics"
        },
        "relayerAddress": coordinator.relayer_address(),
    }))
}

/// Health check handler
pub async fn health_handler(State(coordinator): State<Arc<ClaimCoordinator>>) -> impl IntoResponse {
    let networks: Vec<Value> = coordinator
        .registry()
        .iter()
        .map(|n| json!({ "chainId": n.chain_id.to_string(), "name": n.name }))
        .collect();

    Json(json!({
        "status": "ok",
        "networks": networks,
        "relayerAddress": coordinator.relayer_address(),
        "timestamp": iso8601(&coordinator.now()),
    }))
}

/// Admission window of every network
pub async fn networks_handler(State(coordinator): State<Arc<ClaimCoordinator>>) -> FaucetResult<Json<Value>> {
    let mut networks = Map::new();
    for status in coordinator.network_statuses().await? {
        networks.insert(
            status.chain_id.to_string(),
            json!({
                "name": status.name,
                "faucetAddress": status.faucet_address,
                "remainingClaims": status.window.remaining,
                "resetTime": iso8601(&status.window.reset_time),
            }),
        );
    }
    Ok(Json(json!({ "networks": networks })))
}

/// Cooldown check without side effects
pub async fn can_claim_handler(
    State(coordinator): State<Arc<ClaimCoordinator>>,
    payload: Result<Json<CanClaimPayload>, JsonRejection>,
) -> FaucetResult<Json<Value>> {
    let Json(payload) = payload.map_err(reject_body)?;

    let chain_id = served_chain(&coordinator, payload.chain_id.as_ref())?;
    let user = parse_user(payload.user.as_deref().unwrap_or_default())?;

    let body = match coordinator.cooldown_status(chain_id, &user).await? {
        None => json!({ "canClaim": true }),
        Some(info) => json!({
            "canClaim": false,
            "remainingSeconds": info.remaining_seconds,
            "nextClaimTime": iso8601(&info.expires_at),
        }),
    };
    Ok(Json(body))
}

/// Relay a signed claim
pub async fn faucet_handler(
    State(coordinator): State<Arc<ClaimCoordinator>>,
    payload: Result<Json<FaucetPayload>, JsonRejection>,
) -> FaucetResult<Json<Value>> {
    let Json(payload) = payload.map_err(reject_body)?;

    let chain_id = served_chain(&coordinator, payload.chain_id.as_ref())?;

    let (user, nonce, deadline, signature) = match (
        payload.user.as_deref(),
        payload.nonce.as_ref(),
        payload.deadline.as_ref(),
        payload.signature.as_deref(),
    ) {
        (Some(user), Some(nonce), Some(deadline), Some(signature)) if !user.is_empty() => {
            (user, nonce, deadline, signature)
        }
        _ => {
            return Err(FaucetError::InvalidInput(
                "Missing parameters: user, nonce, deadline or signature".to_string(),
            ))
        }
    };

    let user = parse_user(user)?;
    let nonce = nonce
        .to_u256()
        .ok_or_else(|| FaucetError::InvalidInput("Invalid nonce".to_string()))?;
    let deadline = deadline
        .to_u64()
        .ok_or_else(|| FaucetError::InvalidInput("Invalid deadline".to_string()))?;
    let signature = decode_prefixed(signature)
        .map_err(|e| FaucetError::MalformedSignature(e.to_string()))?;

    info!("Claim request from {} on chain {}", user, chain_id);

    let request = ClaimRequest {
        user,
        nonce,
        deadline,
        signature,
        network_id: chain_id,
    };

    // A client disconnect drops this handler's future; the attempt itself
    // runs to completion on its own task so rollback is never cut short.
    let receipt = tokio::spawn(async move { coordinator.claim(request).await })
        .await
        .map_err(|e| {
            error!("Claim task aborted: {}", e);
            FaucetError::Internal(format!("Claim task aborted: {}", e))
        })??;

    Ok(Json(json!({
        "success": true,
        "txHash": receipt.tx_hash,
        "chainId": receipt.chain_id.to_string(),
        "network": receipt.network_name,
        "faucetAddress": receipt.faucet_address,
        "user": receipt.user,
        "nextClaimTime": iso8601(&receipt.next_claim_time),
        "networkRateLimitRemaining": receipt.network_rate_limit_remaining,
    })))
}

/// Handler for /metrics endpoint
pub async fn metrics_handler(State(coordinator): State<Arc<ClaimCoordinator>>) -> Result<String, StatusCode> {
    let Some(metrics) = coordinator.metrics() else {
        return Err(StatusCode::NOT_FOUND);
    };
    metrics.gather().map_err(|err| {
        error!("Failed to gather metrics: {}", err);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

pub fn router(coordinator: Arc<ClaimCoordinator>, cors_enabled: bool) -> Router {
    let app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/networks", get(networks_handler))
        .route("/can-claim", post(can_claim_handler))
        .route("/faucet", post(faucet_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(coordinator);

    if cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app.layer(cors)
    } else {
        app
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> NumberOrString {
        NumberOrString::Text(s.to_string())
    }

    #[test]
    fn test_number_or_string_parsing() {
        let parsed: NumberOrString = serde_json::from_value(json!(11155111)).unwrap();
        assert_eq!(parsed.to_u64(), Some(11155111));
        assert_eq!(parsed.as_text(), "11155111");

        assert_eq!(text("421614").to_u64(), Some(421614));
        assert_eq!(text("0x10").to_u64(), Some(16));
        assert_eq!(
            text("115792089237316195423570985008687907853269984665640564039457584007913129639935").to_u256(),
            Some(U256::MAX)
        );
        assert_eq!(text("18446744073709551616").to_u64(), None);
        assert_eq!(text("").to_u256(), None);
        assert_eq!(text("0x").to_u256(), None);
        assert_eq!(text("abc").to_u256(), None);
        assert_eq!(NumberOrString::Number(serde_json::Number::from_f64(1.5).unwrap()).to_u256(), None);
        assert_eq!(NumberOrString::Number((-1).into()).to_u256(), None);
    }
}
