//! fleetgrid-api — REST API for FleetGrid.
//!
//! Workers report liveness and read their model assignments here;
//! operators place orders and feed pending-work scores.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthz` | Liveness |
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/api/v1/workers` | List workers |
//! | POST | `/api/v1/workers/{id}/ping` | Worker heartbeat |
//! | GET | `/api/v1/workers/{id}/config` | Worker GPU model assignments |
//! | GET | `/api/v1/orders` | List orders |
//! | POST | `/api/v1/orders` | Place an order for GPUs |
//! | GET | `/api/v1/pending` | Pending-work scores |
//! | PUT | `/api/v1/pending/{model}` | Set a model's pending-work score |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use fleet_core::Clock;
use fleetgrid_metrics::MetricsRecorder;
use fleetgrid_state::Registry;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<dyn Registry>,
    pub metrics: Arc<MetricsRecorder>,
    pub clock: Arc<dyn Clock>,
    /// Models accepted for pending-work scores.
    pub models: Arc<[String]>,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/workers", get(handlers::list_workers))
        .route("/workers/{id}/ping", post(handlers::ping_worker))
        .route("/workers/{id}/config", get(handlers::get_worker_config))
        .route("/orders", get(handlers::list_orders).post(handlers::create_order))
        .route("/pending", get(handlers::list_pending))
        .route("/pending/{model}", put(handlers::put_pending))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}
