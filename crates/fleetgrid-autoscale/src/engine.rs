//! Scaling engines.
//!
//! A [`ScalingEngine`] is what the scaling service allocates demand to.
//! [`ProviderEngine`] is the one implementation: it runs the shared
//! calculator against live workers and inventory, then executes the
//! resulting operations through a [`Provider`] adapter.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::config::{EngineConfig, FleetConfig, WorkerLaunchConfig};
use fleet_core::{
    CapacityUnit, Clock, DeploymentInfo, EngineType, OperationType, ScalingOperation, Worker,
};
use fleetgrid_metrics::{MetricKind, MetricsSink};
use fleetgrid_state::{Registry, StateError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::calculator::{CalculatorSettings, calculate_scaling_operations};
use crate::error::{ScalingError, ScalingResult};

/// A pool of GPUs the scaling service can allocate demand to.
#[async_trait]
pub trait ScalingEngine: Send + Sync {
    fn name(&self) -> String;

    /// Share of this engine's capacity the service may allocate, in (0, 1].
    fn max_allocation_percentage(&self) -> f64;

    /// GPUs visible to this engine: live workers plus assumed purchasable inventory.
    async fn capacity(&self) -> ScalingResult<u32>;

    /// Converge toward `target_gpus` and return the GPUs actually backed by workers.
    async fn scale(&self, target_gpus: u32) -> ScalingResult<u32>;
}

/// Everything a provider needs to launch one worker instance.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRequest {
    pub capacity_unit_id: String,
    pub gpu_count: u32,
    /// One-time credential the worker uses to join the fleet.
    pub login_code: String,
    pub launch: WorkerLaunchConfig,
}

/// A successfully launched instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedInstance {
    pub instance_id: String,
    /// GPUs the provider actually attached.
    pub num_gpus: u32,
}

/// Provider-specific inventory and instance lifecycle calls.
#[async_trait]
pub trait Provider: Send + Sync {
    fn engine_type(&self) -> EngineType;

    fn gpu_type(&self) -> &str;

    /// Whether quarantined capacity units should be kept out of inventory.
    fn supports_blocking(&self) -> bool {
        false
    }

    async fn list_inventory(&self) -> anyhow::Result<Vec<CapacityUnit>>;

    async fn create_instance(&self, request: &InstanceRequest) -> anyhow::Result<ProvisionedInstance>;

    async fn terminate_instance(&self, instance_id: &str) -> anyhow::Result<()>;

    /// Instance ids the provider currently runs, used to spot instances no worker claims.
    async fn list_instances(&self) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl<P: Provider + ?Sized> Provider for Arc<P> {
    fn engine_type(&self) -> EngineType {
        (**self).engine_type()
    }

    fn gpu_type(&self) -> &str {
        (**self).gpu_type()
    }

    fn supports_blocking(&self) -> bool {
        (**self).supports_blocking()
    }

    async fn list_inventory(&self) -> anyhow::Result<Vec<CapacityUnit>> {
        (**self).list_inventory().await
    }

    async fn create_instance(&self, request: &InstanceRequest) -> anyhow::Result<ProvisionedInstance> {
        (**self).create_instance(request).await
    }

    async fn terminate_instance(&self, instance_id: &str) -> anyhow::Result<()> {
        (**self).terminate_instance(instance_id).await
    }

    async fn list_instances(&self) -> anyhow::Result<Vec<String>> {
        (**self).list_instances().await
    }
}

/// Why a create did not produce a worker.
#[derive(Debug, Error)]
enum CreateFailure {
    #[error("registry: {0}")]
    Registry(#[from] StateError),

    #[error("provider: {0}")]
    Provider(anyhow::Error),
}

impl CreateFailure {
    /// Metric attribute value.
    fn class(&self) -> &'static str {
        match self {
            CreateFailure::Registry(_) => "registry",
            CreateFailure::Provider(_) => "provider",
        }
    }
}

/// Per-engine tuning.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_allocation_percentage: f64,
    pub max_price_per_gpu: Option<f64>,
    pub calculator: CalculatorSettings,
    pub block_duration: Duration,
    pub launch: WorkerLaunchConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&FleetConfig::default(), None)
    }
}

impl EngineSettings {
    pub fn from_config(config: &FleetConfig, engine: Option<&EngineConfig>) -> Self {
        Self {
            max_allocation_percentage: engine.map_or(1.0, |e| e.max_allocation_percentage),
            max_price_per_gpu: engine.and_then(EngineConfig::price_limit),
            calculator: CalculatorSettings::from(&config.scaling),
            block_duration: config.scaling.block_duration,
            launch: config.worker.clone(),
        }
    }
}

/// Scaling engine driving one provider and GPU type.
pub struct ProviderEngine<P> {
    provider: P,
    registry: Arc<dyn Registry>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl<P: Provider> ProviderEngine<P> {
    pub fn new(
        provider: P,
        registry: Arc<dyn Registry>,
        metrics: Arc<dyn MetricsSink>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            provider,
            registry,
            metrics,
            clock,
            settings,
        }
    }

    /// Registry key holding this engine's last scaling timestamp.
    pub fn event_key(&self) -> String {
        format!(
            "{}_scaling_event:{}",
            self.provider.engine_type(),
            self.provider.gpu_type()
        )
    }

    fn metric(&self, suffix: &str) -> String {
        format!("{}_engine.{suffix}", self.provider.engine_type())
    }

    fn workers(&self) -> ScalingResult<Vec<Worker>> {
        let engine = self.provider.engine_type();
        let gpu_type = self.provider.gpu_type();
        Ok(self
            .registry
            .list_workers()?
            .into_iter()
            .filter(|w| w.belongs_to(engine, gpu_type))
            .collect())
    }

    /// Live inventory minus over-priced and blocked units.
    async fn inventory(&self) -> ScalingResult<Vec<CapacityUnit>> {
        let mut units = self
            .provider
            .list_inventory()
            .await
            .map_err(|e| ScalingError::provider(&self.name(), "list_inventory", e))?;

        if let Some(limit) = self.settings.max_price_per_gpu {
            units.retain(|u| u.price_per_gpu() <= limit);
        }
        if self.provider.supports_blocking() {
            let blocked: HashSet<String> = self
                .registry
                .list_blocked_ids(self.provider.engine_type(), self.clock.now_millis())?
                .into_iter()
                .collect();
            units.retain(|u| !blocked.contains(&u.id));
        }
        Ok(units)
    }

    /// Execute one create. Returns false if the worker could not be provisioned.
    ///
    /// The provisional worker record is removed on any failure after it was
    /// registered.
    async fn create(&self, op: &ScalingOperation, workers: &mut Vec<Worker>) -> ScalingResult<bool> {
        let worker = self.registry.create_worker(
            &format!("{} worker", self.provider.engine_type()),
            self.clock.now_millis(),
        )?;
        let metric = self.metric("create");
        match self.provision(&worker, op).await {
            Ok(updated) => {
                self.metrics
                    .add_metric(&metric, 1.0, MetricKind::Count, &[("operation_type", "create")]);
                info!(
                    engine = %self.name(),
                    worker_id = %updated.id,
                    instance_id = updated.cloud_instance_id.as_deref().unwrap_or_default(),
                    num_gpus = updated.num_gpus,
                    "instance created"
                );
                workers.push(updated);
                Ok(true)
            }
            Err(e) => {
                self.metrics.add_metric(
                    &metric,
                    1.0,
                    MetricKind::Count,
                    &[("operation_type", "create"), ("error", e.class())],
                );
                warn!(
                    engine = %self.name(),
                    unit = %op.target_id,
                    error = %e,
                    "create failed, deferring remaining creates"
                );
                self.registry.delete_worker(&worker.id)?;
                Ok(false)
            }
        }
    }

    /// Issue the login code, launch the instance and attach it to `worker`.
    ///
    /// An instance whose deployment info cannot be recorded is terminated again.
    async fn provision(&self, worker: &Worker, op: &ScalingOperation) -> Result<Worker, CreateFailure> {
        let login_code = self.registry.generate_worker_login_code(&worker.id)?;
        let request = InstanceRequest {
            capacity_unit_id: op.target_id.clone(),
            gpu_count: op.gpu_count.unwrap_or(1),
            login_code,
            launch: self.settings.launch.clone(),
        };
        let instance = self
            .provider
            .create_instance(&request)
            .await
            .map_err(CreateFailure::Provider)?;

        let info = DeploymentInfo {
            engine: self.provider.engine_type(),
            num_gpus: instance.num_gpus,
            cloud_instance_id: instance.instance_id.clone(),
            gpu_type: Some(self.provider.gpu_type().to_string()),
            capacity_unit_id: Some(op.target_id.clone()),
        };
        match self.registry.update_worker_deployment_info(&worker.id, &info) {
            Ok(updated) => Ok(updated),
            Err(e) => {
                if let Err(terminate) = self.provider.terminate_instance(&instance.instance_id).await {
                    error!(
                        engine = %self.name(),
                        instance_id = %instance.instance_id,
                        error = %terminate,
                        "failed to terminate unrecorded instance"
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Gauge provider instances that no worker record claims. Listing
    /// failures are logged and skipped.
    async fn report_unclaimed_instances(&self) -> ScalingResult<()> {
        let instances = match self.provider.list_instances().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(engine = %self.name(), error = %e, "instance listing failed");
                return Ok(());
            }
        };
        let claimed: HashSet<String> = self
            .registry
            .list_workers()?
            .into_iter()
            .filter_map(|w| w.cloud_instance_id)
            .collect();
        let unclaimed: Vec<&str> = instances
            .iter()
            .map(String::as_str)
            .filter(|id| !claimed.contains(*id))
            .collect();

        self.metrics.add_metric(
            &self.metric("unclaimed_instances"),
            unclaimed.len() as f64,
            MetricKind::Gauge,
            &[],
        );
        if !unclaimed.is_empty() {
            warn!(
                engine = %self.name(),
                count = unclaimed.len(),
                instances = ?unclaimed,
                "provider instances without a worker record"
            );
        }
        Ok(())
    }

    async fn destroy(&self, op: &ScalingOperation, workers: &mut Vec<Worker>) -> ScalingResult<()> {
        let engine = self.provider.engine_type();
        let idx = workers
            .iter()
            .position(|w| w.id == op.target_id)
            .ok_or_else(|| ScalingError::WorkerNotFound(op.target_id.clone()))?;
        let worker = workers[idx].clone();
        let metric = self.metric("destroy");

        if op.block {
            self.metrics
                .add_metric(&self.metric("worker_timeout"), 1.0, MetricKind::Count, &[]);
        }

        if let Some(instance_id) = worker.cloud_instance_id.as_deref()
            && let Err(e) = self.provider.terminate_instance(instance_id).await
        {
            self.metrics.add_metric(
                &metric,
                1.0,
                MetricKind::Count,
                &[("operation_type", "destroy"), ("error", "provider")],
            );
            error!(
                engine = %self.name(),
                worker_id = %worker.id,
                %instance_id,
                error = %e,
                "terminate failed, aborting tick"
            );
            return Err(ScalingError::provider(&self.name(), "terminate_instance", e));
        }

        self.registry.delete_worker(&worker.id)?;

        if op.block && self.provider.supports_blocking() {
            let unit = worker
                .capacity_unit_id
                .as_deref()
                .or(worker.cloud_instance_id.as_deref());
            if let Some(unit) = unit {
                let until = self.clock.now_millis() + self.settings.block_duration.as_millis() as u64;
                self.registry.block_worker(unit, engine, until)?;
                self.metrics.add_metric(
                    "backend.block_worker",
                    1.0,
                    MetricKind::Count,
                    &[("engine", engine.as_str())],
                );
                info!(engine = %self.name(), %unit, until, "capacity unit blocked");
            }
        }

        self.metrics
            .add_metric(&metric, 1.0, MetricKind::Count, &[("operation_type", "destroy")]);
        info!(engine = %self.name(), worker_id = %worker.id, quarantine = op.block, "worker destroyed");
        workers.remove(idx);
        Ok(())
    }
}

#[async_trait]
impl<P: Provider> ScalingEngine for ProviderEngine<P> {
    fn name(&self) -> String {
        format!("{}:{}", self.provider.engine_type(), self.provider.gpu_type())
    }

    fn max_allocation_percentage(&self) -> f64 {
        self.settings.max_allocation_percentage
    }

    async fn capacity(&self) -> ScalingResult<u32> {
        let workers = self.workers()?;
        let inventory = self.inventory().await?;

        let allocated: u32 = workers.iter().map(|w| w.num_gpus).sum();
        let availability = &self.settings.calculator.availability;
        let available: u32 = inventory
            .iter()
            .map(|u| u.max_gpu_count * availability.pool(u.stock_status))
            .sum();
        let total = allocated + available;

        self.metrics
            .add_metric(&self.metric("capacity"), f64::from(total), MetricKind::Gauge, &[]);
        self.metrics.add_metric(
            &self.metric("allocated_gpus"),
            f64::from(allocated),
            MetricKind::Gauge,
            &[],
        );
        debug!(engine = %self.name(), allocated, available, "capacity");
        Ok(total)
    }

    async fn scale(&self, target_gpus: u32) -> ScalingResult<u32> {
        self.metrics.add_metric(
            &self.metric("scale"),
            f64::from(target_gpus),
            MetricKind::Gauge,
            &[],
        );

        let mut workers = self.workers()?;
        let inventory = self.inventory().await?;
        let event_key = self.event_key();
        let last = self.registry.get_last_event_time(&event_key)?;

        let operations = calculate_scaling_operations(
            &workers,
            &inventory,
            target_gpus,
            last,
            self.clock.as_ref(),
            &self.settings.calculator,
        );
        if !operations.is_empty() {
            info!(
                engine = %self.name(),
                target_gpus,
                operations = operations.len(),
                "executing scaling operations"
            );
        }

        for op in &operations {
            match op.operation_type {
                OperationType::Create => {
                    if !self.create(op, &mut workers).await? {
                        break;
                    }
                }
                OperationType::Destroy => self.destroy(op, &mut workers).await?,
            }
        }

        if !operations.is_empty() {
            self.registry
                .set_last_event_time(&event_key, self.clock.now_millis())?;
        }
        self.report_unclaimed_instances().await?;
        Ok(workers.iter().map(|w| w.num_gpus).sum())
    }
}
