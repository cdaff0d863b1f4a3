//! The registry collaborator consumed by the scaling and distribution loops.

use fleet_core::{
    DeploymentInfo, EngineType, Order, PendingWorkScore, Worker, WorkerConfig, WorkerStatus,
};

use crate::error::StateResult;

/// Durable fleet state. All timestamps are epoch milliseconds.
pub trait Registry: Send + Sync {
    // ── Workers ────────────────────────────────────────────────────

    fn list_workers(&self) -> StateResult<Vec<Worker>>;

    fn get_worker(&self, worker_id: &str) -> StateResult<Option<Worker>>;

    /// Register an inactive worker with no GPUs and an empty config.
    fn create_worker(&self, display_name: &str, now: u64) -> StateResult<Worker>;

    /// Remove a worker and its config. Returns true if it existed.
    fn delete_worker(&self, worker_id: &str) -> StateResult<bool>;

    /// Attach provider details and resize the worker's config to `num_gpus` slots.
    fn update_worker_deployment_info(
        &self,
        worker_id: &str,
        info: &DeploymentInfo,
    ) -> StateResult<Worker>;

    /// Issue a fresh one-time login code for the worker.
    fn generate_worker_login_code(&self, worker_id: &str) -> StateResult<String>;

    fn record_heartbeat(
        &self,
        worker_id: &str,
        status: WorkerStatus,
        now: u64,
    ) -> StateResult<Option<Worker>>;

    // ── Events and locks ───────────────────────────────────────────

    fn get_last_event_time(&self, key: &str) -> StateResult<Option<u64>>;

    fn set_last_event_time(&self, key: &str, at: u64) -> StateResult<()>;

    /// Take the named lease if it is free, expired, or already ours.
    fn try_lock(&self, key: &str, holder: &str, now: u64, ttl_ms: u64) -> StateResult<bool>;

    /// Release the named lease if `holder` owns it.
    fn unlock(&self, key: &str, holder: &str) -> StateResult<bool>;

    // ── Orders ─────────────────────────────────────────────────────

    fn list_orders(&self) -> StateResult<Vec<Order>>;

    fn list_active_orders(&self, now: u64) -> StateResult<Vec<Order>> {
        Ok(self
            .list_orders()?
            .into_iter()
            .filter(|order| order.is_active_at(now))
            .collect())
    }

    fn put_order(&self, order: &Order) -> StateResult<()>;

    // ── Blocklist ──────────────────────────────────────────────────

    fn block_worker(&self, unit_id: &str, engine: EngineType, until: u64) -> StateResult<()>;

    fn is_worker_blocked(&self, unit_id: &str, engine: EngineType, now: u64) -> StateResult<bool>;

    fn list_blocked_ids(&self, engine: EngineType, now: u64) -> StateResult<Vec<String>>;

    // ── Work distribution ──────────────────────────────────────────

    fn get_worker_config(&self, worker_id: &str) -> StateResult<Option<WorkerConfig>>;

    fn upsert_worker_config(&self, config: &WorkerConfig) -> StateResult<()>;

    fn get_pending_work_scores(&self) -> StateResult<Vec<PendingWorkScore>>;

    fn put_pending_score(&self, model: &str, score: f64) -> StateResult<()>;
}
