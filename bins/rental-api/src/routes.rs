//! Axum router and HTTP handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use rental_core::types::AssetId;
use rental_service::{BalanceOutcome, RentalError};

use crate::AppState;

// ── Errors ───────────────────────────────────────────────────────────────────

enum ApiError {
    Rental(RentalError),
    BadRequest(String),
}

impl From<RentalError> for ApiError {
    fn from(e: RentalError) -> Self {
        ApiError::Rental(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        let ApiError::Rental(e) = self else {
            return StatusCode::BAD_REQUEST;
        };
        match e.kind() {
            "not_found" => StatusCode::NOT_FOUND,
            "invalid_transition" => StatusCode::CONFLICT,
            "insufficient_funds" | "transaction_build" | "conservation_violation" => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            "protocol_parameters_unavailable" | "chain_tip_unavailable" | "chain_query_failure" => {
                if e.is_retryable() {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::BAD_GATEWAY
                }
            }
            "confirmation_timeout" => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Rental(e) => {
                if status.is_server_error() {
                    warn!(kind = e.kind(), error = %e, "request failed");
                }
                json!({ "error": e.kind(), "message": e.to_string(), "retryable": e.is_retryable() })
            }
            ApiError::BadRequest(msg) => json!({ "error": "bad_request", "message": msg, "retryable": false }),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_asset(raw: &str) -> Result<AssetId, ApiError> {
    raw.trim()
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid asset {raw:?}: {e}")))
}

// ── Router ───────────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/Rentals/CheckProviderBalance", get(check_provider_balance))
        .route("/Rentals/CheckUserBalance", get(check_user_balance))
        .route("/Rentals/ProviderAssets", get(provider_assets))
        .route("/Rentals/UserAssets", get(user_assets))
        .route("/Rentals/BuildSale", get(build_sale))
        .route("/Rentals/Lease", get(lease))
        .route("/Rentals/Leases", get(leases))
        .route("/Rentals/Lock", post(lock))
        .route("/Rentals/ConfirmLock", post(confirm_lock))
        .route("/Rentals/Release", post(release))
        .route("/Rentals/Relist", post(relist))
        .route("/Rentals/ExpireLeases", post(expire_leases))
        .with_state(state)
        .layer(cors)
}

#[derive(Deserialize)]
struct AssetQuery {
    asset: String,
}

#[derive(Deserialize)]
struct LockRequest {
    asset: String,
    expiry_epoch: u64,
}

// ── Balances and assets ──────────────────────────────────────────────────────

fn balance_json(outcome: &BalanceOutcome) -> Value {
    match outcome {
        BalanceOutcome::Funded { stake_address, lovelace } => json!({
            "status": "funded",
            "stake_address": stake_address,
            "lovelace": lovelace,
            "ada": outcome.ada(),
        }),
        BalanceOutcome::NoBalance { stake_address } => json!({
            "status": "no_balance",
            "stake_address": stake_address,
            "lovelace": 0,
            "ada": 0,
        }),
    }
}

async fn check_provider_balance(State(s): State<AppState>) -> ApiResult<Value> {
    let outcome = s.service.check_provider_balance().await?;
    Ok(Json(balance_json(&outcome)))
}

async fn check_user_balance(State(s): State<AppState>) -> ApiResult<Value> {
    let outcome = s.service.check_user_balance().await?;
    Ok(Json(balance_json(&outcome)))
}

async fn provider_assets(State(s): State<AppState>) -> ApiResult<Value> {
    let assets = s.service.provider_assets().await?;
    Ok(Json(json!({ "address": s.service.provider().base_address(), "assets": assets })))
}

async fn user_assets(State(s): State<AppState>) -> ApiResult<Value> {
    let assets = s.service.user_assets().await?;
    Ok(Json(json!({ "address": s.service.user().base_address(), "assets": assets })))
}

// ── Transactions ─────────────────────────────────────────────────────────────

/// `GET /Rentals/BuildSale?asset=<unit>`: unsigned NFT sale body.
async fn build_sale(State(s): State<AppState>, Query(q): Query<AssetQuery>) -> ApiResult<Value> {
    let asset = parse_asset(&q.asset)?;
    let unsigned = s.service.build_nft_sale(&asset).await?;
    let tx_hash = unsigned.tx.id().map_err(RentalError::from)?;
    let body_hex = unsigned.body_hex().map_err(RentalError::from)?;
    Ok(Json(json!({
        "asset": asset,
        "tx_hash": tx_hash,
        "body_cbor_hex": body_hex,
        "fee": unsigned.fee(),
        "ttl": unsigned.tx.body.ttl,
        "inputs": unsigned.tx.body.inputs.len(),
        "outputs": unsigned.tx.body.outputs.len(),
        "expected_witnesses": unsigned.witness_count,
    })))
}

/// `POST /Rentals/Lock`: build, sign and record a pending lock.
async fn lock(State(s): State<AppState>, Json(req): Json<LockRequest>) -> ApiResult<Value> {
    let asset = parse_asset(&req.asset)?;
    let receipt = s.service.lock(&asset, req.expiry_epoch).await?;
    Ok(Json(json!(receipt)))
}

async fn confirm_lock(State(s): State<AppState>, Json(req): Json<AssetQuery>) -> ApiResult<Value> {
    let asset = parse_asset(&req.asset)?;
    let lease = s.service.confirm_lock(&asset).await?;
    Ok(Json(json!(lease)))
}

// ── Leases ───────────────────────────────────────────────────────────────────

async fn lease(State(s): State<AppState>, Query(q): Query<AssetQuery>) -> ApiResult<Value> {
    let asset = parse_asset(&q.asset)?;
    Ok(Json(json!(s.service.lease(&asset)?)))
}

async fn leases(State(s): State<AppState>) -> ApiResult<Value> {
    Ok(Json(json!({ "leases": s.service.leases().snapshot() })))
}

async fn release(State(s): State<AppState>, Json(req): Json<AssetQuery>) -> ApiResult<Value> {
    let asset = parse_asset(&req.asset)?;
    Ok(Json(json!(s.service.release(&asset)?)))
}

async fn relist(State(s): State<AppState>, Json(req): Json<AssetQuery>) -> ApiResult<Value> {
    let asset = parse_asset(&req.asset)?;
    Ok(Json(json!(s.service.relist(&asset)?)))
}

async fn expire_leases(State(s): State<AppState>) -> ApiResult<Value> {
    let expired = s.service.expire_leases().await?;
    Ok(Json(json!({ "expired": expired })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use rental_core::error::GatewayError;
    use rental_core::types::Balance;
    use rental_tests::helpers::*;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(chain: &Arc<MemoryChain>) -> Router {
        let service = test_service(Arc::clone(chain));
        router(AppState { service: Arc::new(service) })
    }

    fn empty_app() -> (Arc<MemoryChain>, Router) {
        let chain = Arc::new(MemoryChain::new());
        let router = app(&chain);
        (chain, router)
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_req(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_user_has_no_balance() {
        let (_, app) = empty_app();
        let (status, body) = send(app, get_req("/Rentals/CheckUserBalance")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "no_balance");
        assert_eq!(body["ada"], 0);
    }

    #[tokio::test]
    async fn provider_balance_in_lovelace_and_ada() {
        let chain = Arc::new(MemoryChain::new());
        let router = app(&chain);
        let stake = fixture_account(PROVIDER_TAG, rental_core::address::Network::Preprod).stake_address().clone();
        chain.set_account_balance(&stake, 7_500_000);

        let (status, body) = send(router, get_req("/Rentals/CheckProviderBalance")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "funded");
        assert_eq!(body["lovelace"], 7_500_000);
        assert_eq!(body["ada"], 7);
        assert_eq!(body["stake_address"], stake.encode());
    }

    #[tokio::test]
    async fn malformed_asset_is_bad_request() {
        let (_, app) = empty_app();
        let (status, body) = send(app, get_req("/Rentals/BuildSale?asset=zz")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn unknown_lease_is_not_found() {
        let (_, app) = empty_app();
        let uri = format!("/Rentals/Lease?asset={}", nft("Nobody"));
        let (status, body) = send(app, get_req(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn insufficient_funds_is_unprocessable() {
        let (_, app) = empty_app();
        let uri = format!("/Rentals/BuildSale?asset={}", nft("Rental01"));
        let (status, body) = send(app, get_req(&uri)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "insufficient_funds");
    }

    #[tokio::test]
    async fn gateway_outage_is_service_unavailable() {
        let (chain, app) = empty_app();
        chain.fail_with(Some(GatewayError::Timeout));
        let (status, body) = send(app, get_req("/Rentals/CheckUserBalance")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "chain_query_failure");
        assert_eq!(body["retryable"], true);
    }

    #[tokio::test]
    async fn lock_twice_conflicts() {
        let (chain, app) = empty_app();
        let user = fixture_account(USER_TAG, rental_core::address::Network::Preprod).base_address().clone();
        chain.fund(&user, utxo(1, Balance::from_lovelace(1_500_000).with_asset(nft("Rental01"), 1)));
        chain.fund(&user, ada_utxo(2, 5_000_000));
        let req = json!({ "asset": nft("Rental01").to_string(), "expiry_epoch": 160 });

        let (status, body) = send(app.clone(), post_req("/Rentals/Lock", req.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["expiry_epoch"], 160);
        assert!(body["tx_cbor_hex"].as_str().is_some_and(|h| !h.is_empty()));

        let (status, body) = send(app, post_req("/Rentals/Lock", req)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "invalid_transition");
    }
}
