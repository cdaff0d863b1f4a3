//! Work distributor tick.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::Clock;
use fleet_core::config::{DistributorSettings, ScalingSettings};
use fleetgrid_metrics::{MetricKind, MetricsSink};
use fleetgrid_scheduler::Tick;
use fleetgrid_state::{Registry, StateResult, with_lock};
use tracing::{debug, info};

use crate::distribution::{DistributionPolicy, calculate_work_distribution};

/// Registry lock serializing distribution runs across processes.
pub const WORK_DISTRIBUTION_LOCK: &str = "work_distribution";
/// Registry key of the last distribution run.
pub const WORK_DISTRIBUTION_EVENT: &str = "work_distribution_event";

/// Result of one distribution run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionOutcome {
    LockBusy,
    Cooldown,
    /// Number of worker configs rewritten.
    Distributed(usize),
}

pub struct WorkDistributor {
    registry: Arc<dyn Registry>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    policy: DistributionPolicy,
    cooldown: Duration,
    quick_cooldown: Duration,
    heartbeat_window: Duration,
    lock_ttl: Duration,
    holder: String,
}

impl WorkDistributor {
    pub fn new(
        registry: Arc<dyn Registry>,
        metrics: Arc<dyn MetricsSink>,
        clock: Arc<dyn Clock>,
        settings: &DistributorSettings,
        scaling: &ScalingSettings,
    ) -> Self {
        Self {
            registry,
            metrics,
            clock,
            policy: DistributionPolicy::from(settings),
            cooldown: settings.cooldown,
            quick_cooldown: settings.quick_cooldown,
            heartbeat_window: settings.heartbeat_window,
            lock_ttl: scaling.lock_ttl,
            holder: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn policy(&self) -> &DistributionPolicy {
        &self.policy
    }

    pub async fn distribute(&self) -> StateResult<DistributionOutcome> {
        let outcome = with_lock(
            self.registry.as_ref(),
            self.clock.as_ref(),
            WORK_DISTRIBUTION_LOCK,
            &self.holder,
            self.lock_ttl,
            || async { self.distribute_locked() },
        )
        .await?;
        outcome.unwrap_or(Ok(DistributionOutcome::LockBusy))
    }

    fn distribute_locked(&self) -> StateResult<DistributionOutcome> {
        let now = self.clock.now_millis();
        let window = self.heartbeat_window.as_millis() as u64;
        let workers: Vec<_> = self
            .registry
            .list_workers()?
            .into_iter()
            .filter(|w| w.last_ping.is_some_and(|ping| now.saturating_sub(ping) <= window))
            .collect();

        let total_gpus: u32 = workers.iter().map(|w| w.num_gpus).sum();
        let cooldown = if total_gpus as usize >= self.policy.models.len() {
            self.cooldown
        } else {
            self.quick_cooldown
        };
        if let Some(last) = self.registry.get_last_event_time(WORK_DISTRIBUTION_EVENT)?
            && now.saturating_sub(last) < cooldown.as_millis() as u64
        {
            debug!(last, now, "work distribution cooldown active");
            return Ok(DistributionOutcome::Cooldown);
        }
        self.registry.set_last_event_time(WORK_DISTRIBUTION_EVENT, now)?;

        let pending = self.registry.get_pending_work_scores()?;
        let mut configs = Vec::with_capacity(workers.len());
        for worker in &workers {
            if let Some(config) = self.registry.get_worker_config(&worker.id)? {
                configs.push(config);
            }
        }

        let updates = calculate_work_distribution(&pending, &workers, &configs, &self.policy);
        for config in &updates {
            self.registry.upsert_worker_config(config)?;
            self.metrics
                .add_metric("work_distributor.reassigned", 1.0, MetricKind::Count, &[]);
            info!(worker_id = %config.worker_id, gpus = config.gpu_configs.len(), "worker models reassigned");
        }
        debug!(
            workers = workers.len(),
            pending = pending.len(),
            updated = updates.len(),
            "work distributed"
        );
        Ok(DistributionOutcome::Distributed(updates.len()))
    }
}

#[async_trait]
impl Tick for WorkDistributor {
    fn name(&self) -> &str {
        "work_distributor"
    }

    async fn tick(&self) -> anyhow::Result<()> {
        self.distribute().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{DeploymentInfo, EngineType, FakeClock, Worker, WorkerStatus};
    use fleetgrid_metrics::MetricsRecorder;
    use fleetgrid_state::StateStore;

    const NOW: u64 = 1_000_000_000;

    struct Harness {
        store: StateStore,
        clock: Arc<FakeClock>,
        metrics: Arc<MetricsRecorder>,
        distributor: WorkDistributor,
    }

    fn harness(models: &[&str]) -> Harness {
        let store = StateStore::open_in_memory().unwrap().with_default_model(models[0]);
        let clock = Arc::new(FakeClock::new(NOW));
        let metrics = Arc::new(MetricsRecorder::new());
        let settings = DistributorSettings {
            models: models.iter().map(|m| m.to_string()).collect(),
            default_distribution: Default::default(),
            ..DistributorSettings::default()
        };
        let distributor = WorkDistributor::new(
            Arc::new(store.clone()),
            metrics.clone(),
            clock.clone(),
            &settings,
            &ScalingSettings::default(),
        );
        Harness {
            store,
            clock,
            metrics,
            distributor,
        }
    }

    fn live_worker(h: &Harness, num_gpus: u32, last_ping: u64) -> Worker {
        let w = h.store.create_worker("w", NOW - 60_000).unwrap();
        h.store
            .update_worker_deployment_info(
                &w.id,
                &DeploymentInfo {
                    engine: EngineType::Runpod,
                    num_gpus,
                    cloud_instance_id: "pod".to_string(),
                    gpu_type: None,
                    capacity_unit_id: None,
                },
            )
            .unwrap();
        h.store
            .record_heartbeat(&w.id, WorkerStatus::Idle, last_ping)
            .unwrap()
            .unwrap()
    }

    fn models_of(h: &Harness, worker_id: &str) -> Vec<Option<String>> {
        h.store
            .get_worker_config(worker_id)
            .unwrap()
            .unwrap()
            .gpu_configs
            .into_iter()
            .map(|g| g.model)
            .collect()
    }

    #[tokio::test]
    async fn pending_work_pulls_gpus_to_its_model() {
        let h = harness(&["A", "B"]);
        let w = live_worker(&h, 1, NOW);
        assert_eq!(models_of(&h, &w.id), vec![Some("A".to_string())]);
        h.store.put_pending_score("B", 10.0).unwrap();

        let outcome = h.distributor.distribute().await.unwrap();
        assert_eq!(outcome, DistributionOutcome::Distributed(1));
        assert_eq!(models_of(&h, &w.id), vec![Some("B".to_string())]);
        assert_eq!(h.metrics.total("work_distributor.reassigned"), 1.0);
    }

    #[tokio::test]
    async fn stale_workers_are_not_touched() {
        let h = harness(&["A", "B"]);
        let stale = live_worker(&h, 1, NOW - 10 * 60_000);
        h.store.put_pending_score("B", 10.0).unwrap();

        let outcome = h.distributor.distribute().await.unwrap();
        assert_eq!(outcome, DistributionOutcome::Distributed(0));
        assert_eq!(models_of(&h, &stale.id), vec![Some("A".to_string())]);
    }

    #[tokio::test]
    async fn cooldown_depends_on_fleet_size() {
        let h = harness(&["A", "B"]);
        live_worker(&h, 1, NOW);

        h.distributor.distribute().await.unwrap();
        h.clock.advance(Duration::from_secs(5));
        assert_eq!(
            h.distributor.distribute().await.unwrap(),
            DistributionOutcome::Cooldown
        );
        // One GPU for two models: quick cooldown.
        h.clock.advance(Duration::from_secs(5));
        assert!(matches!(
            h.distributor.distribute().await.unwrap(),
            DistributionOutcome::Distributed(_)
        ));

        live_worker(&h, 1, h.clock.now_millis());
        h.clock.advance(Duration::from_secs(30));
        assert_eq!(
            h.distributor.distribute().await.unwrap(),
            DistributionOutcome::Cooldown
        );
        h.clock.advance(Duration::from_secs(30));
        assert!(matches!(
            h.distributor.distribute().await.unwrap(),
            DistributionOutcome::Distributed(_)
        ));
    }

    #[tokio::test]
    async fn busy_lock_skips_run() {
        let h = harness(&["A"]);
        h.store
            .try_lock(WORK_DISTRIBUTION_LOCK, "other", NOW, 60_000)
            .unwrap();
        assert_eq!(
            h.distributor.distribute().await.unwrap(),
            DistributionOutcome::LockBusy
        );
    }
}
