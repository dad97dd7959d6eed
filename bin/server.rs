// FuelEU Compliance Ledger - Web Server
// REST API over the accounting engines, mirroring the /routes, /compliance,
// /banking and /pools resources the frontend consumes.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use fueleu_ledger::{
    BankingEngine, BankingOutcome, BankingRequest, ComparisonEngine, ComparisonRequest,
    ComplianceError, EngineConfig, PoolEngine, PoolOutcome, PoolRequest, PoolStore,
    ProcessConfig, Route, RouteStore, SqliteStore,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<SqliteStore>,
    banking: Arc<BankingEngine>,
    pools: Arc<PoolEngine>,
    comparison: Arc<ComparisonEngine>,
}

// ============================================================================
// Wire DTOs (camelCase, as the frontend expects)
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteResponse {
    id: String,
    origin: String,
    destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    distance_km: Option<f64>,
}

impl From<Route> for RouteResponse {
    fn from(route: Route) -> Self {
        Self {
            id: route.id,
            origin: route.origin,
            destination: route.destination,
            distance_km: route.distance_km,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompareBody {
    route_id: String,
    actual_intensity: f64,
    baseline_intensity: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ComparisonResponse {
    actual_intensity: f64,
    baseline_intensity: f64,
    percent_difference: f64,
    compliant: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BankSurplusBody {
    route_id: String,
    fuel_consumption: f64,
    actual_intensity: f64,
    amount_to_bank: f64,
    target: Option<f64>,
    period: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BankingResponse {
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    energy_in_scope: f64,
    amount_banked: f64,
    compliance_balance: f64,
}

impl From<BankingOutcome> for BankingResponse {
    fn from(outcome: BankingOutcome) -> Self {
        match outcome {
            BankingOutcome::Accepted {
                compliance_balance,
                energy_in_scope,
                amount_banked,
            } => Self {
                accepted: true,
                reason: None,
                energy_in_scope,
                amount_banked,
                compliance_balance,
            },
            BankingOutcome::Rejected {
                reason,
                compliance_balance,
                energy_in_scope,
            } => Self {
                accepted: false,
                reason: Some(reason.to_string()),
                energy_in_scope,
                amount_banked: 0.0,
                compliance_balance,
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePoolBody {
    pool_id: String,
    pool_name: String,
    route_ids: Vec<String>,
    period: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PoolMemberResponse {
    route_id: String,
    before_cb: f64,
    after_cb: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PoolResponse {
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_cb: Option<f64>,
    members: Vec<PoolMemberResponse>,
}

impl From<PoolOutcome> for PoolResponse {
    fn from(outcome: PoolOutcome) -> Self {
        match outcome {
            PoolOutcome::Accepted { total_cb, members } => Self {
                accepted: true,
                reason: None,
                total_cb: Some(total_cb),
                members: members
                    .into_iter()
                    .map(|m| PoolMemberResponse {
                        route_id: m.route_id,
                        before_cb: m.before_cb,
                        after_cb: m.after_cb,
                    })
                    .collect(),
            },
            PoolOutcome::Rejected { reason } => Self {
                accepted: false,
                reason: Some(reason.to_string()),
                total_cb: None,
                members: Vec::new(),
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PoolDetailResponse {
    id: String,
    name: String,
    member_route_ids: Vec<String>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /health - Health check
async fn health_check() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// GET /routes - All routes in scope
async fn get_routes(State(state): State<AppState>) -> Response {
    match state.store.all_routes() {
        Ok(routes) => {
            let response: Vec<RouteResponse> = routes.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// GET /routes/:id - One route
async fn get_route(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.route_by_id(&id) {
        Ok(Some(route)) => (StatusCode::OK, Json(RouteResponse::from(route))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("Route not found: {id}")})),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /compliance/calculate - Baseline comparison for a route
async fn calculate_comparison(
    State(state): State<AppState>,
    Json(body): Json<CompareBody>,
) -> Response {
    let request = ComparisonRequest {
        route_id: body.route_id,
        actual_intensity: body.actual_intensity,
        baseline_intensity: body.baseline_intensity,
    };

    match state.comparison.compare(&request) {
        Ok(report) => (
            StatusCode::OK,
            Json(ComparisonResponse {
                actual_intensity: report.actual_intensity,
                baseline_intensity: report.baseline_intensity,
                percent_difference: report.percent_difference,
                compliant: report.compliant,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /banking/bank-surplus - Carry forward surplus for a route/period
async fn bank_surplus(
    State(state): State<AppState>,
    Json(body): Json<BankSurplusBody>,
) -> Response {
    let request = BankingRequest {
        route_id: body.route_id,
        fuel_consumption: body.fuel_consumption,
        actual_intensity: body.actual_intensity,
        amount_to_bank: body.amount_to_bank,
        target: body.target,
        period: body.period,
    };

    match state.banking.bank_surplus(&request) {
        Ok(outcome) => {
            if !outcome.accepted() {
                info!(route_id = %request.route_id, "Banking rejected");
            }
            let status = if outcome.accepted() {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            };
            (status, Json(BankingResponse::from(outcome))).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /pools - Form a compliance pool for a period
async fn create_pool(State(state): State<AppState>, Json(body): Json<CreatePoolBody>) -> Response {
    let request = PoolRequest {
        pool_id: body.pool_id,
        pool_name: body.pool_name,
        route_ids: body.route_ids,
        period: body.period,
    };

    match state.pools.create_pool(&request) {
        Ok(outcome) => {
            if !outcome.accepted() {
                info!(pool_id = %request.pool_id, "Pool rejected");
            }
            let status = if outcome.accepted() {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            };
            (status, Json(PoolResponse::from(outcome))).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// GET /pools/:poolId - One pool with its ordered membership
async fn get_pool(State(state): State<AppState>, Path(pool_id): Path<String>) -> Response {
    match state.store.pool_by_id(&pool_id) {
        Ok(Some(pool)) => (
            StatusCode::OK,
            Json(PoolDetailResponse {
                id: pool.id,
                name: pool.name,
                member_route_ids: pool.member_route_ids,
            }),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("Pool not found: {pool_id}")})),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(err: ComplianceError) -> Response {
    let status = match &err {
        ComplianceError::InvalidInput(_) | ComplianceError::DivisionByZero => {
            StatusCode::BAD_REQUEST
        }
        ComplianceError::NotFound(_) => StatusCode::NOT_FOUND,
        ComplianceError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!(error = %err, "Request failed");
    }
    (status, Json(json!({"error": err.to_string()}))).into_response()
}

// ============================================================================
// Router & Main
// ============================================================================

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/routes", get(get_routes))
        .route("/routes/:id", get(get_route))
        .route("/compliance/calculate", post(calculate_comparison))
        .route("/banking/bank-surplus", post(bank_surplus))
        .route("/pools", post(create_pool))
        .route("/pools/:poolId", get(get_pool))
        .with_state(state)
        .layer(cors)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ProcessConfig::from_env();
    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    let engine_config = EngineConfig::default();

    let state = AppState {
        store: store.clone(),
        banking: Arc::new(BankingEngine::new(engine_config, store.clone())),
        pools: Arc::new(PoolEngine::new(engine_config, store.clone(), store.clone())),
        comparison: Arc::new(ComparisonEngine::new(engine_config, store.clone())),
    };

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, db = %config.db_path.display(), "Compliance server listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
