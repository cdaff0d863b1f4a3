//! Scaling service: allocates active order demand across engines.
//!
//! Each run happens under the `scaling_service` registry lock and a global
//! cooldown. Engines are visited in priority order; each receives at most
//! `ceil(capacity × max_allocation_percentage)` GPUs of what is still
//! unallocated, and whatever it actually achieves is subtracted before the
//! next engine is asked.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::Clock;
use fleet_core::config::ScalingSettings;
use fleetgrid_metrics::{MetricKind, MetricsSink};
use fleetgrid_scheduler::Tick;
use fleetgrid_state::{Registry, with_lock};
use serde::Serialize;
use tracing::{debug, info};

use crate::engine::ScalingEngine;
use crate::error::ScalingResult;

/// Registry lock serializing scaling runs across processes.
pub const SCALING_LOCK: &str = "scaling_service";
/// Registry key of the last scaling run.
pub const SCALING_EVENT: &str = "scaling_service_event";

/// What one engine was asked for and achieved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineAllocation {
    pub engine: String,
    /// Reported capacity; not queried once demand is exhausted.
    pub capacity: Option<u32>,
    pub requested: u32,
    pub actual: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleReport {
    /// Sum of GPUs over active orders.
    pub demand: u32,
    pub allocations: Vec<EngineAllocation>,
}

impl ScaleReport {
    pub fn total_actual(&self) -> u32 {
        self.allocations.iter().map(|a| a.actual).sum()
    }
}

/// Result of one scaling run.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Another process holds the scaling lock.
    LockBusy,
    /// The previous run was too recent.
    Cooldown,
    Scaled(ScaleReport),
}

pub struct ScalingService {
    engines: Vec<Arc<dyn ScalingEngine>>,
    registry: Arc<dyn Registry>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
    lock_ttl: Duration,
    /// Lease holder id for this process.
    holder: String,
}

impl ScalingService {
    /// Create a service over `engines`, given in priority order.
    pub fn new(
        engines: Vec<Arc<dyn ScalingEngine>>,
        registry: Arc<dyn Registry>,
        metrics: Arc<dyn MetricsSink>,
        clock: Arc<dyn Clock>,
        settings: &ScalingSettings,
    ) -> Self {
        Self {
            engines,
            registry,
            metrics,
            clock,
            cooldown: settings.service_cooldown,
            lock_ttl: settings.lock_ttl,
            holder: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn engines(&self) -> &[Arc<dyn ScalingEngine>] {
        &self.engines
    }

    /// Run one allocation pass if the lock is free and the cooldown has passed.
    pub async fn scale(&self) -> ScalingResult<TickOutcome> {
        let outcome = with_lock(
            self.registry.as_ref(),
            self.clock.as_ref(),
            SCALING_LOCK,
            &self.holder,
            self.lock_ttl,
            || self.scale_locked(),
        )
        .await?;
        outcome.unwrap_or(Ok(TickOutcome::LockBusy))
    }

    async fn scale_locked(&self) -> ScalingResult<TickOutcome> {
        let now = self.clock.now_millis();
        if let Some(last) = self.registry.get_last_event_time(SCALING_EVENT)?
            && now.saturating_sub(last) < self.cooldown.as_millis() as u64
        {
            debug!(last, now, "scaling service cooldown active");
            return Ok(TickOutcome::Cooldown);
        }
        self.registry.set_last_event_time(SCALING_EVENT, now)?;

        let demand: u32 = self
            .registry
            .list_active_orders(now)?
            .iter()
            .map(|o| o.gpu_count)
            .sum();
        self.metrics.add_metric(
            "scaling_service.demand",
            f64::from(demand),
            MetricKind::Gauge,
            &[],
        );
        info!(demand, engines = self.engines.len(), "scaling fleet");

        let mut unallocated = i64::from(demand);
        let mut allocations = Vec::with_capacity(self.engines.len());
        for engine in &self.engines {
            if unallocated <= 0 {
                let actual = engine.scale(0).await?;
                allocations.push(EngineAllocation {
                    engine: engine.name(),
                    capacity: None,
                    requested: 0,
                    actual,
                });
                continue;
            }

            let capacity = engine.capacity().await?;
            let max_allocation =
                (f64::from(capacity) * engine.max_allocation_percentage()).ceil() as i64;
            let requested = unallocated.min(max_allocation).max(0) as u32;
            let actual = engine.scale(requested).await?;
            debug!(engine = %engine.name(), capacity, requested, actual, "engine scaled");

            unallocated -= i64::from(actual);
            allocations.push(EngineAllocation {
                engine: engine.name(),
                capacity: Some(capacity),
                requested,
                actual,
            });
        }

        Ok(TickOutcome::Scaled(ScaleReport {
            demand,
            allocations,
        }))
    }
}

#[async_trait]
impl Tick for ScalingService {
    fn name(&self) -> &str {
        "scaling_service"
    }

    async fn tick(&self) -> anyhow::Result<()> {
        match self.scale().await? {
            TickOutcome::LockBusy => debug!("scaling lock busy"),
            TickOutcome::Cooldown => debug!("scaling skipped, cooldown"),
            TickOutcome::Scaled(report) => info!(
                demand = report.demand,
                allocated = report.total_actual(),
                "scaling run complete"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use fleet_core::{FakeClock, Order};
    use fleetgrid_metrics::MetricsRecorder;
    use fleetgrid_state::StateStore;

    use crate::error::ScalingError;

    const NOW: u64 = 1_000_000_000;

    /// Engine that records scale requests and achieves at most `limit` GPUs.
    struct FakeScalingEngine {
        name: String,
        capacity: u32,
        pct: f64,
        limit: Option<u32>,
        fail: bool,
        calls: Mutex<Vec<u32>>,
    }

    impl FakeScalingEngine {
        fn new(name: &str, capacity: u32, pct: f64) -> Self {
            Self {
                name: name.to_string(),
                capacity,
                pct,
                limit: None,
                fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<u32> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ScalingEngine for FakeScalingEngine {
        fn name(&self) -> String {
            self.name.clone()
        }

        fn max_allocation_percentage(&self) -> f64 {
            self.pct
        }

        async fn capacity(&self) -> ScalingResult<u32> {
            Ok(self.capacity)
        }

        async fn scale(&self, target_gpus: u32) -> ScalingResult<u32> {
            self.calls.lock().unwrap().push(target_gpus);
            if self.fail {
                return Err(ScalingError::provider(
                    &self.name,
                    "terminate_instance",
                    anyhow::anyhow!("boom"),
                ));
            }
            Ok(self.limit.map_or(target_gpus, |l| target_gpus.min(l)))
        }
    }

    struct Harness {
        store: StateStore,
        clock: Arc<FakeClock>,
        metrics: Arc<MetricsRecorder>,
    }

    fn harness() -> Harness {
        Harness {
            store: StateStore::open_in_memory().unwrap(),
            clock: Arc::new(FakeClock::new(NOW)),
            metrics: Arc::new(MetricsRecorder::new()),
        }
    }

    impl Harness {
        fn order(&self, id: &str, gpu_count: u32) {
            self.store
                .put_order(&Order {
                    id: id.to_string(),
                    created_by: "u".to_string(),
                    created_at: NOW - 1_000,
                    ends_at: NOW + 3_600_000,
                    is_active: true,
                    gpu_count,
                })
                .unwrap();
        }

        fn service(&self, engines: Vec<Arc<dyn ScalingEngine>>) -> ScalingService {
            ScalingService::new(
                engines,
                Arc::new(self.store.clone()),
                self.metrics.clone(),
                self.clock.clone(),
                &ScalingSettings::default(),
            )
        }
    }

    fn report(outcome: TickOutcome) -> ScaleReport {
        match outcome {
            TickOutcome::Scaled(report) => report,
            other => panic!("expected a scaling run, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_engine_takes_demand_within_its_share() {
        let h = harness();
        h.order("o1", 4);
        let e1 = Arc::new(FakeScalingEngine::new("e1", 10, 0.5));
        let e2 = Arc::new(FakeScalingEngine::new("e2", 10, 1.0));
        let service = h.service(vec![e1.clone(), e2.clone()]);

        let report = report(service.scale().await.unwrap());
        assert_eq!(report.demand, 4);
        assert_eq!(e1.calls(), vec![4]);
        assert_eq!(e2.calls(), vec![0]);
        assert_eq!(report.allocations[1].capacity, None);
        assert_eq!(h.metrics.value("scaling_service.demand", &[]), Some(4.0));
    }

    #[tokio::test]
    async fn shortfall_spills_to_next_engine() {
        let h = harness();
        h.order("o1", 4);
        let mut first = FakeScalingEngine::new("e1", 10, 0.5);
        first.limit = Some(3);
        let e1 = Arc::new(first);
        let e2 = Arc::new(FakeScalingEngine::new("e2", 10, 1.0));
        let service = h.service(vec![e1.clone(), e2.clone()]);

        let report = report(service.scale().await.unwrap());
        assert_eq!(e1.calls(), vec![4]);
        assert_eq!(e2.calls(), vec![1]);
        assert_eq!(report.total_actual(), 4);
    }

    #[tokio::test]
    async fn allocation_share_is_capped() {
        let h = harness();
        h.order("o1", 8);
        h.order("o2", 4);
        let e1 = Arc::new(FakeScalingEngine::new("e1", 5, 0.5));
        let e2 = Arc::new(FakeScalingEngine::new("e2", 4, 1.0));
        let service = h.service(vec![e1.clone(), e2.clone()]);

        let report = report(service.scale().await.unwrap());
        // ceil(5 * 0.5) = 3, then the remaining 9 is capped by e2's capacity.
        assert_eq!(e1.calls(), vec![3]);
        assert_eq!(e2.calls(), vec![4]);
        assert!(report.total_actual() <= report.demand);
    }

    #[tokio::test]
    async fn inactive_and_expired_orders_are_ignored() {
        let h = harness();
        h.order("live", 2);
        h.store
            .put_order(&Order {
                id: "ended".to_string(),
                created_by: "u".to_string(),
                created_at: 0,
                ends_at: NOW - 1,
                is_active: true,
                gpu_count: 10,
            })
            .unwrap();
        let e1 = Arc::new(FakeScalingEngine::new("e1", 100, 1.0));
        let service = h.service(vec![e1.clone()]);

        let report = report(service.scale().await.unwrap());
        assert_eq!(report.demand, 2);
        assert_eq!(e1.calls(), vec![2]);
    }

    #[tokio::test]
    async fn no_demand_scales_everything_to_zero() {
        let h = harness();
        let e1 = Arc::new(FakeScalingEngine::new("e1", 10, 1.0));
        let e2 = Arc::new(FakeScalingEngine::new("e2", 10, 1.0));
        let service = h.service(vec![e1.clone(), e2.clone()]);

        service.scale().await.unwrap();
        assert_eq!(e1.calls(), vec![0]);
        assert_eq!(e2.calls(), vec![0]);
    }

    #[tokio::test]
    async fn cooldown_skips_runs() {
        let h = harness();
        h.order("o1", 1);
        let e1 = Arc::new(FakeScalingEngine::new("e1", 10, 1.0));
        let service = h.service(vec![e1.clone()]);

        assert!(matches!(service.scale().await.unwrap(), TickOutcome::Scaled(_)));
        h.clock.advance(Duration::from_secs(30));
        assert_eq!(service.scale().await.unwrap(), TickOutcome::Cooldown);
        assert_eq!(e1.calls().len(), 1);

        h.clock.advance(Duration::from_secs(30));
        assert!(matches!(service.scale().await.unwrap(), TickOutcome::Scaled(_)));
        assert_eq!(
            h.store.get_last_event_time(SCALING_EVENT).unwrap(),
            Some(NOW + 60_000)
        );
    }

    #[tokio::test]
    async fn busy_lock_skips_run() {
        let h = harness();
        h.store
            .try_lock(SCALING_LOCK, "another-process", NOW, 60_000)
            .unwrap();
        let e1 = Arc::new(FakeScalingEngine::new("e1", 10, 1.0));
        let service = h.service(vec![e1.clone()]);

        assert_eq!(service.scale().await.unwrap(), TickOutcome::LockBusy);
        assert!(e1.calls().is_empty());
        assert_eq!(h.store.get_last_event_time(SCALING_EVENT).unwrap(), None);
    }

    #[tokio::test]
    async fn engine_error_aborts_and_releases_lock() {
        let h = harness();
        h.order("o1", 2);
        let mut failing = FakeScalingEngine::new("e1", 10, 1.0);
        failing.fail = true;
        let e1 = Arc::new(failing);
        let e2 = Arc::new(FakeScalingEngine::new("e2", 10, 1.0));
        let service = h.service(vec![e1.clone(), e2.clone()]);

        assert!(service.scale().await.is_err());
        assert!(e2.calls().is_empty());
        assert!(h.store.try_lock(SCALING_LOCK, "next", NOW, 1).unwrap());
    }
}
