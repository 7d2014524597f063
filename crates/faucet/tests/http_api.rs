//! HTTP surface driven through the router without a socket

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{faucet_address, Harness, SEPOLIA};
use drip_crypto::{KeyPair, U256};
use drip_faucet::chain::ChainError;
use drip_faucet::limiter::AdmissionLimiter;
use drip_faucet::router;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(h: &Harness) -> Router {
    router(h.coordinator.clone(), true)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get(app: Router, path: &str) -> (StatusCode, Value) {
    send(app, Request::get(path).body(Body::empty()).unwrap()).await
}

async fn post(app: Router, path: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// Body the wallet UI sends: numbers as strings, hex signature
fn claim_body(h: &Harness, user: &KeyPair, nonce: u64) -> Value {
    let deadline = h.now().timestamp() as u64 + 300;
    let signature = user
        .sign_claim(U256::from(nonce), deadline, SEPOLIA, &faucet_address())
        .unwrap();
    json!({
        "user": user.address().to_lower_hex(),
        "nonce": nonce.to_string(),
        "deadline": deadline.to_string(),
        "signature": signature.to_string(),
        "chainId": SEPOLIA.to_string(),
    })
}

#[tokio::test]
async fn test_health() {
    let h = Harness::new();
    let (status, body) = get(app(&h), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["relayerAddress"], json!(h.relayer.address()));
    assert_eq!(body["timestamp"], "2024-01-01T00:00:00.000Z");
    assert_eq!(body["networks"].as_array().unwrap().len(), 2);
    assert_eq!(body["networks"][1], json!({"chainId": "11155111", "name": "Sepolia"}));
}

#[tokio::test]
async fn test_root_lists_endpoints() {
    let h = Harness::new();
    let (status, body) = get(app(&h), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["endpoints"]["POST /faucet"].is_string());
}

#[tokio::test]
async fn test_faucet_success_then_cooldown() {
    let h = Harness::new();
    let user = KeyPair::random();

    let (status, body) = post(app(&h), "/faucet", claim_body(&h, &user, 5)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["chainId"], "11155111");
    assert_eq!(body["network"], "Sepolia");
    assert_eq!(body["user"], json!(user.address()));
    assert_eq!(body["faucetAddress"], json!(faucet_address()));
    assert_eq!(body["nextClaimTime"], "2024-01-02T00:00:00.000Z");
    assert_eq!(body["networkRateLimitRemaining"], 19);
    assert!(body["txHash"].as_str().unwrap().starts_with("0x"));

    let (status, body) = post(app(&h), "/faucet", claim_body(&h, &user, 6)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "COOLDOWN_ACTIVE");
    assert_eq!(body["remainingSeconds"], 86400);
    assert_eq!(body["nextClaimTime"], "2024-01-02T00:00:00.000Z");

    let (_, body) = post(
        app(&h),
        "/can-claim",
        json!({"chainId": SEPOLIA, "user": user.address().to_checksum()}),
    )
    .await;
    assert_eq!(body["canClaim"], false);
    assert_eq!(body["remainingSeconds"], 86400);

    let (_, body) = get(app(&h), "/networks").await;
    assert_eq!(body["networks"]["11155111"]["remainingClaims"], 19);
    assert_eq!(body["networks"]["11155111"]["resetTime"], "2024-01-01T01:00:00.000Z");
    assert_eq!(body["networks"]["421614"]["remainingClaims"], 20);
}

#[tokio::test]
async fn test_can_claim_fresh_user() {
    let h = Harness::new();
    let (status, body) = post(
        app(&h),
        "/can-claim",
        json!({"chainId": "11155111", "user": KeyPair::random().address().to_lower_hex()}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"canClaim": true}));
}

#[tokio::test]
async fn test_can_claim_validation() {
    let h = Harness::new();

    let (status, body) = post(app(&h), "/can-claim", json!({"chainId": "5", "user": "0x00"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "UNSUPPORTED_CHAIN");
    assert_eq!(body["error"], "Chain ID '5' not supported");
    assert_eq!(body["availableChainIds"], json!(["421614", "11155111"]));

    let (status, body) = post(app(&h), "/can-claim", json!({"chainId": SEPOLIA, "user": "0x1234"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_faucet_rejects_missing_parameters() {
    let h = Harness::new();
    let mut body = claim_body(&h, &KeyPair::random(), 1);
    body.as_object_mut().unwrap().remove("deadline");

    let (status, body) = post(app(&h), "/faucet", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
    assert_eq!(h.window_remaining(SEPOLIA).await, 20);
}

#[tokio::test]
async fn test_faucet_checks_chain_before_parameters() {
    let h = Harness::new();
    let (status, body) = post(app(&h), "/faucet", json!({"chainId": 1})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "UNSUPPORTED_CHAIN");
}

#[tokio::test]
async fn test_faucet_rejects_malformed_json() {
    let h = Harness::new();
    let request = Request::post("/faucet")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_faucet_expired_deadline() {
    let h = Harness::new();
    let mut body = claim_body(&h, &KeyPair::random(), 1);
    body["deadline"] = json!(h.now().timestamp() - 1);

    let (status, body) = post(app(&h), "/faucet", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "EXPIRED");
    assert_eq!(body["error"], "Sorry, the deadline has expired. Please try again.");
    assert_eq!(h.window_remaining(SEPOLIA).await, 20);
}

#[tokio::test]
async fn test_faucet_rate_limited() {
    let h = Harness::new();
    for _ in 0..20 {
        h.limiter.reserve(SEPOLIA, h.now()).await.unwrap();
    }

    let (status, body) = post(app(&h), "/faucet", claim_body(&h, &KeyPair::random(), 1)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMITED");
    assert_eq!(body["resetTime"], "2024-01-01T01:00:00.000Z");
    assert_eq!(body["remaining"], 0);
}

#[tokio::test]
async fn test_faucet_would_revert() {
    let h = Harness::new();
    h.chain
        .fail_estimate(ChainError::Reverted("execution reverted: Signature expired".into()));

    let (status, body) = post(app(&h), "/faucet", claim_body(&h, &KeyPair::random(), 1)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "WOULD_REVERT");
    assert_eq!(body["details"], "execution reverted: Signature expired");
    assert_eq!(h.window_remaining(SEPOLIA).await, 20);
}

#[tokio::test]
async fn test_faucet_send_failure() {
    let h = Harness::new();
    h.chain.fail_send(ChainError::Rpc("nonce too low".into()));

    let (status, body) = post(app(&h), "/faucet", claim_body(&h, &KeyPair::random(), 1)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "SEND_FAILED");
    assert_eq!(h.window_remaining(SEPOLIA).await, 20);
}

#[tokio::test]
async fn test_faucet_bad_signature_hex() {
    let h = Harness::new();
    let mut body = claim_body(&h, &KeyPair::random(), 1);
    body["signature"] = json!("0xnothex");

    let (status, body) = post(app(&h), "/faucet", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MALFORMED_SIGNATURE");
}

#[tokio::test]
async fn test_faucet_signature_for_other_user() {
    let h = Harness::new();
    let mut body = claim_body(&h, &KeyPair::random(), 1);
    body["user"] = json!(KeyPair::random().address().to_lower_hex());

    let (status, body) = post(app(&h), "/faucet", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_SIGNATURE");
    assert_eq!(body["error"], "Invalid signature");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let h = Harness::new();
    post(app(&h), "/faucet", claim_body(&h, &KeyPair::random(), 1)).await;

    let response = app(&h)
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("faucet_claims_total{outcome=\"success\"} 1"));
}

#[tokio::test]
async fn test_faucet_commit_failure_reports_tx_hash() {
    let h = Harness::with_failing_commits();
    let (status, body) = post(app(&h), "/faucet", claim_body(&h, &KeyPair::random(), 1)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "COMMIT_FAILED");
    assert!(body["txHash"].as_str().unwrap().starts_with("0x"));
    assert_eq!(h.chain.sent_transactions().len(), 1);
    assert_eq!(h.window_remaining(SEPOLIA).await, 19);
}

#[tokio::test]
async fn test_user_address_needs_prefix() {
    let h = Harness::new();
    let user = KeyPair::random().address().to_lower_hex();

    let (status, body) = post(
        app(&h),
        "/can-claim",
        json!({"chainId": SEPOLIA, "user": user.trim_start_matches("0x")}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");

    let mut claim = claim_body(&h, &KeyPair::random(), 1);
    claim["user"] = json!(format!(" {} ", claim["user"].as_str().unwrap()));
    let (status, body) = post(app(&h), "/faucet", claim).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
    assert_eq!(h.window_remaining(SEPOLIA).await, 20);
}
