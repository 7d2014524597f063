//! Error types for the faucet service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use drip_common::ChainId;
use drip_crypto::CryptoError;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Faucet service errors
#[derive(Error, Debug)]
pub enum FaucetError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Chain ID '{chain_id}' not supported")]
    UnsupportedChain {
        chain_id: String,
        available: Vec<ChainId>,
    },

    #[error("Sorry, the deadline has expired. Please try again.")]
    Expired { deadline: u64, now: i64 },

    #[error("Network rate limit reached")]
    RateLimited { reset_time: DateTime<Utc> },

    #[error("Cooldown active: next claim in {remaining_seconds} seconds")]
    CooldownActive {
        remaining_seconds: u64,
        next_claim_time: DateTime<Utc>,
    },

    #[error("Invalid signature format: {0}")]
    MalformedSignature(String),

    #[error("Invalid signature")]
    BadSignature,

    #[error("Transaction would fail: {0}")]
    WouldRevert(String),

    #[error("Transaction failed: {0}")]
    SendFailed(String),

    #[error("Chain call timed out during {stage} after {after_secs}s")]
    ChainTimeout { stage: &'static str, after_secs: u64 },

    #[error("State store error: {0}")]
    Store(String),

    #[error("Transaction {tx_hash} was sent but the cooldown could not be recorded: {reason}")]
    CommitFailed { tx_hash: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FaucetError {
    /// Stable machine-readable kind
    pub fn code(&self) -> &'static str {
        match self {
            FaucetError::InvalidInput(_) => "INVALID_INPUT",
            FaucetError::UnsupportedChain { .. } => "UNSUPPORTED_CHAIN",
            FaucetError::Expired { .. } => "EXPIRED",
            FaucetError::RateLimited { .. } => "RATE_LIMITED",
            FaucetError::CooldownActive { .. } => "COOLDOWN_ACTIVE",
            FaucetError::MalformedSignature(_) => "MALFORMED_SIGNATURE",
            FaucetError::BadSignature => "BAD_SIGNATURE",
            FaucetError::WouldRevert(_) => "WOULD_REVERT",
            FaucetError::SendFailed(_) => "SEND_FAILED",
            FaucetError::ChainTimeout { .. } => "CHAIN_TIMEOUT",
            FaucetError::Store(_) => "STORE_UNAVAILABLE",
            FaucetError::CommitFailed { .. } => "COMMIT_FAILED",
            FaucetError::Config(_) => "CONFIG_ERROR",
            FaucetError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            FaucetError::InvalidInput(_)
            | FaucetError::UnsupportedChain { .. }
            | FaucetError::Expired { .. }
            | FaucetError::MalformedSignature(_)
            | FaucetError::BadSignature
            | FaucetError::WouldRevert(_) => StatusCode::BAD_REQUEST,
            FaucetError::RateLimited { .. } | FaucetError::CooldownActive { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            FaucetError::SendFailed(_)
            | FaucetError::ChainTimeout { .. }
            | FaucetError::Store(_)
            | FaucetError::CommitFailed { .. }
            | FaucetError::Config(_)
            | FaucetError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Rejections are the caller's problem; everything else is ours
    pub fn is_rejection(&self) -> bool {
        self.status().is_client_error()
    }

    fn details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        match self {
            FaucetError::UnsupportedChain { available, .. } => {
                let ids: Vec<String> = available.iter().map(|id| id.to_string()).collect();
                details.insert("availableChainIds".into(), json!(ids));
            }
            FaucetError::RateLimited { reset_time } => {
                details.insert("resetTime".into(), json!(iso8601(reset_time)));
                details.insert("remaining".into(), json!(0));
            }
            FaucetError::CooldownActive {
                remaining_seconds,
                next_claim_time,
            } => {
                details.insert("remainingSeconds".into(), json!(remaining_seconds));
                details.insert("nextClaimTime".into(), json!(iso8601(next_claim_time)));
            }
            FaucetError::MalformedSignature(reason)
            | FaucetError::WouldRevert(reason)
            | FaucetError::SendFailed(reason) => {
                details.insert("details".into(), json!(reason));
            }
            FaucetError::CommitFailed { tx_hash, .. } => {
                details.insert("txHash".into(), json!(tx_hash));
            }
            _ => {}
        }
        details
    }
}

impl From<redis::RedisError> for FaucetError {
    fn from(err: redis::RedisError) -> Self {
        FaucetError::Store(err.to_string())
    }
}

impl From<CryptoError> for FaucetError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::MalformedSignature(reason) => FaucetError::MalformedSignature(reason),
            other => FaucetError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for FaucetError {
    fn into_response(self) -> Response {
        let status = self.status();

        let mut body = Map::new();
        body.insert("error".into(), json!(self.to_string()));
        body.insert("code".into(), json!(self.code()));
        body.insert("timestamp".into(), json!(iso8601(&Utc::now())));
        body.extend(self.details());

        (status, Json(Value::Object(body))).into_response()
    }
}

/// Millisecond RFC 3339 in UTC, the format browsers produce with `toISOString`
pub fn iso8601(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub type FaucetResult<T> = Result<T, FaucetError>;
