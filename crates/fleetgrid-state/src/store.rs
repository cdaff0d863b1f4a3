//! redb-backed implementation of the [`Registry`].
//!
//! Workers, worker configs, orders and leases are JSON-serialized into
//! redb's `&[u8]` value columns; timestamps and scores are stored as
//! native scalars. The store supports both on-disk and in-memory backends
//! (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use fleet_core::{
    DeploymentInfo, EngineType, Order, PendingWorkScore, Worker, WorkerConfig, WorkerStatus,
};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::lock::Lease;
use crate::registry::Registry;
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe registry backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    /// Model given to GPU slots added when a worker's GPU count grows.
    default_model: Option<Arc<str>>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            default_model: None,
        };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing and simulation).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            default_model: None,
        };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    pub fn with_default_model(mut self, model: &str) -> Self {
        self.default_model = Some(Arc::from(model));
        self
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(WORKERS).map_err(map_err!(Table))?;
        txn.open_table(WORKER_CONFIGS).map_err(map_err!(Table))?;
        txn.open_table(ORDERS).map_err(map_err!(Table))?;
        txn.open_table(EVENTS).map_err(map_err!(Table))?;
        txn.open_table(LOCKS).map_err(map_err!(Table))?;
        txn.open_table(BLOCKLIST).map_err(map_err!(Table))?;
        txn.open_table(PENDING).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── JSON record helpers ────────────────────────────────────────

    fn put_json<T: Serialize>(&self, table: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn list_json<T: DeserializeOwned>(&self, table: JsonTable) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(results)
    }

    /// Read-modify-write a record inside one write transaction.
    fn update_json<T, F>(&self, table: JsonTable, key: &str, f: F) -> StateResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated = {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            let current: Option<T> = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            match current {
                Some(mut value) => {
                    f(&mut value);
                    let bytes = serde_json::to_vec(&value).map_err(map_err!(Serialize))?;
                    table
                        .insert(key, bytes.as_slice())
                        .map_err(map_err!(Write))?;
                    Some(value)
                }
                None => None,
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(updated)
    }
}

fn block_key(engine: EngineType, unit_id: &str) -> String {
    format!("{engine}:{unit_id}")
}

impl Registry for StateStore {
    // ── Workers ────────────────────────────────────────────────────

    fn list_workers(&self) -> StateResult<Vec<Worker>> {
        self.list_json(WORKERS)
    }

    fn get_worker(&self, worker_id: &str) -> StateResult<Option<Worker>> {
        self.get_json(WORKERS, worker_id)
    }

    fn create_worker(&self, display_name: &str, now: u64) -> StateResult<Worker> {
        let worker = Worker {
            id: uuid::Uuid::new_v4().to_string(),
            display_name: display_name.to_string(),
            num_gpus: 0,
            created_at: now,
            last_ping: None,
            status: WorkerStatus::Inactive,
            engine: None,
            gpu_type: None,
            cloud_instance_id: None,
            capacity_unit_id: None,
            login_code: None,
        };
        let worker_bytes = serde_json::to_vec(&worker).map_err(map_err!(Serialize))?;
        let config_bytes = serde_json::to_vec(&WorkerConfig::empty(&worker.id))
            .map_err(map_err!(Serialize))?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut workers = txn.open_table(WORKERS).map_err(map_err!(Table))?;
            workers
                .insert(worker.id.as_str(), worker_bytes.as_slice())
                .map_err(map_err!(Write))?;
            let mut configs = txn.open_table(WORKER_CONFIGS).map_err(map_err!(Table))?;
            configs
                .insert(worker.id.as_str(), config_bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(worker_id = %worker.id, display_name, "worker created");
        Ok(worker)
    }

    fn delete_worker(&self, worker_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut workers = txn.open_table(WORKERS).map_err(map_err!(Table))?;
            existed = workers.remove(worker_id).map_err(map_err!(Write))?.is_some();
            let mut configs = txn.open_table(WORKER_CONFIGS).map_err(map_err!(Table))?;
            configs.remove(worker_id).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%worker_id, existed, "worker deleted");
        Ok(existed)
    }

    fn update_worker_deployment_info(
        &self,
        worker_id: &str,
        info: &DeploymentInfo,
    ) -> StateResult<Worker> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let worker = {
            let mut workers = txn.open_table(WORKERS).map_err(map_err!(Table))?;
            let mut worker: Worker = match workers.get(worker_id).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(format!("worker {worker_id}"))),
            };
            worker.engine = Some(info.engine);
            worker.num_gpus = info.num_gpus;
            worker.cloud_instance_id = Some(info.cloud_instance_id.clone());
            worker.gpu_type = info.gpu_type.clone();
            worker.capacity_unit_id = info.capacity_unit_id.clone();
            let bytes = serde_json::to_vec(&worker).map_err(map_err!(Serialize))?;
            workers
                .insert(worker_id, bytes.as_slice())
                .map_err(map_err!(Write))?;

            let mut configs = txn.open_table(WORKER_CONFIGS).map_err(map_err!(Table))?;
            let mut config: WorkerConfig = match configs.get(worker_id).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => WorkerConfig::empty(worker_id),
            };
            config.resize(info.num_gpus, self.default_model.as_deref());
            let bytes = serde_json::to_vec(&config).map_err(map_err!(Serialize))?;
            configs
                .insert(worker_id, bytes.as_slice())
                .map_err(map_err!(Write))?;
            worker
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%worker_id, engine = %info.engine, num_gpus = info.num_gpus, "deployment info updated");
        Ok(worker)
    }

    fn generate_worker_login_code(&self, worker_id: &str) -> StateResult<String> {
        let code = uuid::Uuid::new_v4().to_string();
        self.update_json(WORKERS, worker_id, |worker: &mut Worker| {
            worker.login_code = Some(code.clone());
        })?
        .ok_or_else(|| StateError::NotFound(format!("worker {worker_id}")))?;
        Ok(code)
    }

    fn record_heartbeat(
        &self,
        worker_id: &str,
        status: WorkerStatus,
        now: u64,
    ) -> StateResult<Option<Worker>> {
        self.update_json(WORKERS, worker_id, |worker: &mut Worker| {
            worker.last_ping = Some(now);
            worker.status = status;
        })
    }

    // ── Events and locks ───────────────────────────────────────────

    fn get_last_event_time(&self, key: &str) -> StateResult<Option<u64>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
        Ok(table.get(key).map_err(map_err!(Read))?.map(|g| g.value()))
    }

    fn set_last_event_time(&self, key: &str, at: u64) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
            table.insert(key, at).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn try_lock(&self, key: &str, holder: &str, now: u64, ttl_ms: u64) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(LOCKS).map_err(map_err!(Table))?;
            let current: Option<Lease> = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            if let Some(lease) = current
                && lease.holder != holder
                && lease.expires_at > now
            {
                debug!(%key, holder = %lease.holder, "lock held elsewhere");
                return Ok(false);
            }
            let lease = Lease {
                holder: holder.to_string(),
                expires_at: now.saturating_add(ttl_ms),
            };
            let bytes = serde_json::to_vec(&lease).map_err(map_err!(Serialize))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(true)
    }

    fn unlock(&self, key: &str, holder: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let released;
        {
            let mut table = txn.open_table(LOCKS).map_err(map_err!(Table))?;
            let owned = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    let lease: Lease =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    lease.holder == holder
                }
                None => false,
            };
            if owned {
                table.remove(key).map_err(map_err!(Write))?;
            }
            released = owned;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(released)
    }

    // ── Orders ─────────────────────────────────────────────────────

    fn list_orders(&self) -> StateResult<Vec<Order>> {
        self.list_json(ORDERS)
    }

    fn put_order(&self, order: &Order) -> StateResult<()> {
        self.put_json(ORDERS, &order.id, order)?;
        debug!(order_id = %order.id, gpu_count = order.gpu_count, "order stored");
        Ok(())
    }

    // ── Blocklist ──────────────────────────────────────────────────

    fn block_worker(&self, unit_id: &str, engine: EngineType, until: u64) -> StateResult<()> {
        let key = block_key(engine, unit_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(BLOCKLIST).map_err(map_err!(Table))?;
            table.insert(key.as_str(), until).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, until, "capacity unit blocked");
        Ok(())
    }

    fn is_worker_blocked(&self, unit_id: &str, engine: EngineType, now: u64) -> StateResult<bool> {
        let key = block_key(engine, unit_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(BLOCKLIST).map_err(map_err!(Table))?;
        let until = table.get(key.as_str()).map_err(map_err!(Read))?.map(|g| g.value());
        Ok(until.is_some_and(|until| until > now))
    }

    fn list_blocked_ids(&self, engine: EngineType, now: u64) -> StateResult<Vec<String>> {
        let prefix = block_key(engine, "");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(BLOCKLIST).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, until) = entry.map_err(map_err!(Read))?;
            if let Some(unit_id) = key.value().strip_prefix(&prefix)
                && until.value() > now
            {
                results.push(unit_id.to_string());
            }
        }
        Ok(results)
    }

    // ── Work distribution ──────────────────────────────────────────

    fn get_worker_config(&self, worker_id: &str) -> StateResult<Option<WorkerConfig>> {
        self.get_json(WORKER_CONFIGS, worker_id)
    }

    fn upsert_worker_config(&self, config: &WorkerConfig) -> StateResult<()> {
        self.put_json(WORKER_CONFIGS, &config.worker_id, config)
    }

    fn get_pending_work_scores(&self) -> StateResult<Vec<PendingWorkScore>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PENDING).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (model, score) = entry.map_err(map_err!(Read))?;
            results.push(PendingWorkScore {
                model: model.value().to_string(),
                score: score.value(),
            });
        }
        Ok(results)
    }

    fn put_pending_score(&self, model: &str, score: f64) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PENDING).map_err(map_err!(Table))?;
            if score > 0.0 {
                table.insert(model, score).map_err(map_err!(Write))?;
            } else {
                table.remove(model).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment(num_gpus: u32) -> DeploymentInfo {
        DeploymentInfo {
            engine: EngineType::Vast,
            num_gpus,
            cloud_instance_id: "inst-1".to_string(),
            gpu_type: Some("RTX 3090".to_string()),
            capacity_unit_id: Some("offer-7".to_string()),
        }
    }

    fn order(id: &str, ends_at: u64, is_active: bool, gpu_count: u32) -> Order {
        Order {
            id: id.to_string(),
            created_by: "user-1".to_string(),
            created_at: 0,
            ends_at,
            is_active,
            gpu_count,
        }
    }

    // ── Workers ────────────────────────────────────────────────────

    #[test]
    fn create_worker_registers_inactive_with_empty_config() {
        let store = StateStore::open_in_memory().unwrap();
        let worker = store.create_worker("Vast Worker", 1_000).unwrap();

        assert_eq!(worker.status, WorkerStatus::Inactive);
        assert_eq!(worker.num_gpus, 0);
        assert_eq!(worker.created_at, 1_000);
        assert_eq!(store.get_worker(&worker.id).unwrap(), Some(worker.clone()));

        let config = store.get_worker_config(&worker.id).unwrap().unwrap();
        assert!(config.gpu_configs.is_empty());
    }

    #[test]
    fn deployment_info_resizes_config() {
        let store = StateStore::open_in_memory()
            .unwrap()
            .with_default_model("text2im");
        let worker = store.create_worker("w", 0).unwrap();

        let updated = store
            .update_worker_deployment_info(&worker.id, &deployment(2))
            .unwrap();
        assert_eq!(updated.num_gpus, 2);
        assert_eq!(updated.engine, Some(EngineType::Vast));
        assert_eq!(updated.capacity_unit_id.as_deref(), Some("offer-7"));

        let config = store.get_worker_config(&worker.id).unwrap().unwrap();
        assert_eq!(config.gpu_configs.len(), 2);
        assert!(
            config
                .gpu_configs
                .iter()
                .all(|g| g.model.as_deref() == Some("text2im"))
        );
    }

    #[test]
    fn deployment_info_for_missing_worker_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store
            .update_worker_deployment_info("ghost", &deployment(1))
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[test]
    fn delete_worker_removes_config() {
        let store = StateStore::open_in_memory().unwrap();
        let worker = store.create_worker("w", 0).unwrap();

        assert!(store.delete_worker(&worker.id).unwrap());
        assert!(!store.delete_worker(&worker.id).unwrap());
        assert!(store.get_worker(&worker.id).unwrap().is_none());
        assert!(store.get_worker_config(&worker.id).unwrap().is_none());
    }

    #[test]
    fn login_code_and_heartbeat() {
        let store = StateStore::open_in_memory().unwrap();
        let worker = store.create_worker("w", 0).unwrap();

        let code = store.generate_worker_login_code(&worker.id).unwrap();
        let stored = store.get_worker(&worker.id).unwrap().unwrap();
        assert_eq!(stored.login_code, Some(code));

        let pinged = store
            .record_heartbeat(&worker.id, WorkerStatus::Active, 5_000)
            .unwrap()
            .unwrap();
        assert_eq!(pinged.last_ping, Some(5_000));
        assert_eq!(pinged.status, WorkerStatus::Active);

        assert!(store.generate_worker_login_code("ghost").is_err());
        assert!(
            store
                .record_heartbeat("ghost", WorkerStatus::Idle, 0)
                .unwrap()
                .is_none()
        );
    }

    // ── Events and locks ───────────────────────────────────────────

    #[test]
    fn last_event_time_roundtrip() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.get_last_event_time("scaling").unwrap(), None);
        store.set_last_event_time("scaling", 42).unwrap();
        assert_eq!(store.get_last_event_time("scaling").unwrap(), Some(42));
    }

    #[test]
    fn lock_excludes_other_holders_until_expiry() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.try_lock("scale", "a", 0, 1_000).unwrap());
        assert!(!store.try_lock("scale", "b", 500, 1_000).unwrap());
        // Re-entrant for the same holder.
        assert!(store.try_lock("scale", "a", 600, 1_000).unwrap());
        // Expired lease can be taken over.
        assert!(store.try_lock("scale", "b", 2_000, 1_000).unwrap());
        assert!(!store.unlock("scale", "a").unwrap());
        assert!(store.unlock("scale", "b").unwrap());
        assert!(store.try_lock("scale", "c", 2_100, 1_000).unwrap());
    }

    // ── Orders ─────────────────────────────────────────────────────

    #[test]
    fn active_orders_filter_by_flag_and_window() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_order(&order("o1", 10_000, true, 2)).unwrap();
        store.put_order(&order("o2", 10_000, false, 3)).unwrap();
        store.put_order(&order("o3", 500, true, 4)).unwrap();

        let active = store.list_active_orders(1_000).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "o1");
        assert_eq!(store.list_orders().unwrap().len(), 3);
    }

    // ── Blocklist ──────────────────────────────────────────────────

    #[test]
    fn blocklist_expires_and_is_per_engine() {
        let store = StateStore::open_in_memory().unwrap();
        store.block_worker("offer-1", EngineType::Vast, 1_000).unwrap();
        store.block_worker("offer-2", EngineType::Vast, 5_000).unwrap();
        store.block_worker("offer-3", EngineType::Runpod, 5_000).unwrap();

        assert!(store.is_worker_blocked("offer-1", EngineType::Vast, 999).unwrap());
        assert!(!store.is_worker_blocked("offer-1", EngineType::Vast, 1_000).unwrap());
        assert!(!store.is_worker_blocked("offer-1", EngineType::Runpod, 0).unwrap());

        assert_eq!(
            store.list_blocked_ids(EngineType::Vast, 2_000).unwrap(),
            vec!["offer-2".to_string()]
        );

        // Re-blocking extends the window.
        store.block_worker("offer-1", EngineType::Vast, 9_000).unwrap();
        assert!(store.is_worker_blocked("offer-1", EngineType::Vast, 2_000).unwrap());
    }

    // ── Work distribution ──────────────────────────────────────────

    #[test]
    fn pending_scores_upsert_and_clear() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_pending_score("a", 10.0).unwrap();
        store.put_pending_score("b", 2.5).unwrap();
        store.put_pending_score("a", 12.0).unwrap();

        let scores = store.get_pending_work_scores().unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].model, "a");
        assert_eq!(scores[0].score, 12.0);

        store.put_pending_score("b", 0.0).unwrap();
        assert_eq!(store.get_pending_work_scores().unwrap().len(), 1);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("fleet.redb");

        let worker_id = {
            let store = StateStore::open(&db_path).unwrap();
            store.set_last_event_time("scaling_service_event", 7).unwrap();
            store.create_worker("w", 0).unwrap().id
        };

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        assert!(store.get_worker(&worker_id).unwrap().is_some());
        assert_eq!(
            store.get_last_event_time("scaling_service_event").unwrap(),
            Some(7)
        );
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_workers().unwrap().is_empty());
        assert!(store.list_orders().unwrap().is_empty());
        assert!(store.get_pending_work_scores().unwrap().is_empty());
        assert!(store.list_blocked_ids(EngineType::Ec2, 0).unwrap().is_empty());
        assert!(!store.unlock("nothing", "nobody").unwrap());
    }
}
