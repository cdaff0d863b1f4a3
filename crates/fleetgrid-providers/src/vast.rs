//! Vast adapter.
//!
//! Every Vast offer is a single machine that can be rented once, so each
//! offer becomes its own capacity unit with stock status `Low`. Offers
//! whose machine timed out are blocked through the registry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::{CapacityUnit, EngineType, StockStatus};
use fleetgrid_autoscale::{InstanceRequest, Provider, ProvisionedInstance};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Offers with less effective host RAM than this are skipped.
pub const MIN_EFFECTIVE_RAM_MB: f64 = 30_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: u64,
    pub num_gpus: u32,
    pub gpu_name: String,
    /// Hourly price of the whole machine.
    pub dph_total: f64,
    pub cpu_cores: f64,
    pub cpu_cores_effective: f64,
    pub cpu_ram: f64,
    #[serde(default)]
    pub reliability2: f64,
}

impl Offer {
    /// Host RAM scaled by the share of CPU cores the rental gets.
    pub fn effective_ram_mb(&self) -> f64 {
        if self.cpu_cores <= 0.0 {
            return 0.0;
        }
        self.cpu_ram * (self.cpu_cores_effective / self.cpu_cores)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: u64,
    pub num_gpus: u32,
    #[serde(default)]
    pub gpu_name: String,
    #[serde(default)]
    pub actual_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInstanceInput {
    pub image: String,
    pub onstart: String,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInstanceResult {
    pub success: bool,
    #[serde(default)]
    pub new_contract: Option<u64>,
}

/// The subset of the Vast API the adapter needs.
#[async_trait]
pub trait VastClient: Send + Sync {
    async fn search_offers(&self) -> anyhow::Result<Vec<Offer>>;

    async fn create_instance(
        &self,
        ask_id: &str,
        input: &CreateInstanceInput,
    ) -> anyhow::Result<CreateInstanceResult>;

    async fn list_instances(&self) -> anyhow::Result<Vec<Instance>>;

    async fn delete_instance(&self, instance_id: &str) -> anyhow::Result<()>;
}

pub struct VastProvider {
    client: Arc<dyn VastClient>,
    gpu_type: String,
    /// Pause between dependent API calls; Vast rate-limits bursts.
    request_spacing: Duration,
}

impl VastProvider {
    pub fn new(client: Arc<dyn VastClient>, gpu_type: &str) -> Self {
        Self {
            client,
            gpu_type: gpu_type.to_string(),
            request_spacing: Duration::from_secs(1),
        }
    }

    pub fn with_request_spacing(mut self, spacing: Duration) -> Self {
        self.request_spacing = spacing;
        self
    }

    async fn pause(&self) {
        if !self.request_spacing.is_zero() {
            tokio::time::sleep(self.request_spacing).await;
        }
    }
}

#[async_trait]
impl Provider for VastProvider {
    fn engine_type(&self) -> EngineType {
        EngineType::Vast
    }

    fn gpu_type(&self) -> &str {
        &self.gpu_type
    }

    fn supports_blocking(&self) -> bool {
        true
    }

    async fn list_inventory(&self) -> anyhow::Result<Vec<CapacityUnit>> {
        let offers = self.client.search_offers().await?;
        let units: Vec<CapacityUnit> = offers
            .into_iter()
            .filter(|o| o.gpu_name == self.gpu_type && o.effective_ram_mb() >= MIN_EFFECTIVE_RAM_MB)
            .map(|o| CapacityUnit {
                id: o.id.to_string(),
                max_gpu_count: o.num_gpus,
                price: o.dph_total,
                stock_status: Some(StockStatus::Low),
            })
            .collect();
        debug!(gpu_type = %self.gpu_type, offers = units.len(), "vast inventory");
        Ok(units)
    }

    async fn create_instance(&self, request: &InstanceRequest) -> anyhow::Result<ProvisionedInstance> {
        let input = CreateInstanceInput {
            image: request.launch.image.clone(),
            onstart: request.launch.command.clone(),
            env: BTreeMap::from([("WORKER_LOGIN_CODE".to_string(), request.login_code.clone())]),
        };
        let result = self
            .client
            .create_instance(&request.capacity_unit_id, &input)
            .await?;
        self.pause().await;

        let contract = match result.new_contract {
            Some(id) if result.success => id,
            _ => anyhow::bail!(
                "failed to create instance: {}",
                serde_json::to_string(&result)?
            ),
        };
        let instances = self.client.list_instances().await?;
        self.pause().await;
        let Some(instance) = instances.into_iter().find(|i| i.id == contract) else {
            anyhow::bail!("failed to find instance for contract {contract}");
        };
        Ok(ProvisionedInstance {
            instance_id: instance.id.to_string(),
            num_gpus: instance.num_gpus,
        })
    }

    async fn terminate_instance(&self, instance_id: &str) -> anyhow::Result<()> {
        self.client.delete_instance(instance_id).await
    }

    async fn list_instances(&self) -> anyhow::Result<Vec<String>> {
        Ok(self
            .client
            .list_instances()
            .await?
            .into_iter()
            .filter(|i| i.gpu_name == self.gpu_type)
            .map(|i| i.id.to_string())
            .collect())
    }
}
