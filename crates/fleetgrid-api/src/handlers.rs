//! REST API handlers.
//!
//! Each handler goes through the [`Registry`](fleetgrid_state::Registry)
//! and returns JSON wrapped in [`ApiResponse`].

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use fleet_core::{Clock, Order, WorkerStatus};
use fleetgrid_state::Registry;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn internal(e: impl std::fmt::Display) -> axum::response::Response {
    error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
}

// ── Health ─────────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok("ok")
}

// ── Workers ────────────────────────────────────────────────────

/// GET /api/v1/workers
pub async fn list_workers(State(state): State<ApiState>) -> impl IntoResponse {
    match state.registry.list_workers() {
        Ok(workers) => ApiResponse::ok(workers).into_response(),
        Err(e) => internal(e),
    }
}

/// Heartbeat body.
#[derive(Debug, Deserialize)]
pub struct PingRequest {
    pub status: WorkerStatus,
}

/// POST /api/v1/workers/{id}/ping
pub async fn ping_worker(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<PingRequest>,
) -> impl IntoResponse {
    let now = state.clock.now_millis();
    match state.registry.record_heartbeat(&id, req.status, now) {
        Ok(Some(worker)) => ApiResponse::ok(worker).into_response(),
        Ok(None) => error_response("worker not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal(e),
    }
}

/// GET /api/v1/workers/{id}/config
pub async fn get_worker_config(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.registry.get_worker_config(&id) {
        Ok(Some(config)) => ApiResponse::ok(config).into_response(),
        Ok(None) => error_response("worker not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal(e),
    }
}

// ── Orders ─────────────────────────────────────────────────────

/// GET /api/v1/orders
pub async fn list_orders(State(state): State<ApiState>) -> impl IntoResponse {
    match state.registry.list_orders() {
        Ok(orders) => ApiResponse::ok(orders).into_response(),
        Err(e) => internal(e),
    }
}

/// Order body.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub created_by: String,
    pub gpu_count: u32,
    /// How long the order stays active.
    pub duration_secs: u64,
}

/// POST /api/v1/orders
pub async fn create_order(
    State(state): State<ApiState>,
    Json(req): Json<CreateOrderRequest>,
) -> impl IntoResponse {
    if req.gpu_count == 0 || req.duration_secs == 0 {
        return error_response(
            "gpu_count and duration_secs must be positive",
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    }
    let now = state.clock.now_millis();
    let order = Order {
        id: uuid::Uuid::new_v4().to_string(),
        created_by: req.created_by,
        created_at: now,
        ends_at: now.saturating_add(req.duration_secs.saturating_mul(1000)),
        is_active: true,
        gpu_count: req.gpu_count,
    };
    match state.registry.put_order(&order) {
        Ok(()) => {
            info!(order_id = %order.id, gpu_count = order.gpu_count, "order placed");
            (StatusCode::CREATED, ApiResponse::ok(order)).into_response()
        }
        Err(e) => internal(e),
    }
}

// ── Pending work ───────────────────────────────────────────────

/// GET /api/v1/pending
pub async fn list_pending(State(state): State<ApiState>) -> impl IntoResponse {
    match state.registry.get_pending_work_scores() {
        Ok(scores) => ApiResponse::ok(scores).into_response(),
        Err(e) => internal(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct PendingScoreRequest {
    pub score: f64,
}

/// PUT /api/v1/pending/{model}
///
/// A score of zero or less clears the model's entry.
pub async fn put_pending(
    State(state): State<ApiState>,
    Path(model): Path<String>,
    Json(req): Json<PendingScoreRequest>,
) -> impl IntoResponse {
    if !state.models.iter().any(|m| *m == model) {
        return error_response(&format!("unknown model {model}"), StatusCode::BAD_REQUEST)
            .into_response();
    }
    if !req.score.is_finite() {
        return error_response("score must be finite", StatusCode::BAD_REQUEST).into_response();
    }
    match state.registry.put_pending_score(&model, req.score) {
        Ok(()) => ApiResponse::ok(serde_json::json!({ "model": model, "score": req.score }))
            .into_response(),
        Err(e) => internal(e),
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = fleetgrid_metrics::render_prometheus(&state.metrics.snapshot());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
