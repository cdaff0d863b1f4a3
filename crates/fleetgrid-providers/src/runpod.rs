//! Runpod adapter.
//!
//! Runpod sells GPUs of one type in bundles of 1 to 8. Inventory is one
//! lowest-price query per bundle size; each answer carries a stock status.

use std::sync::Arc;

use async_trait::async_trait;
use fleet_core::{CapacityUnit, EngineType, StockStatus};
use fleetgrid_autoscale::{InstanceRequest, Provider, ProvisionedInstance};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Largest bundle Runpod offers.
pub const MAX_GPUS_PER_POD: u32 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuTypeFilter {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowestPriceInput {
    pub gpu_count: u32,
    pub min_download: u32,
    pub min_upload: u32,
    pub min_memory_in_gb: u32,
    pub min_vcpu_count: u32,
    pub secure_cloud: bool,
    pub support_public_ip: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuLowestPrice {
    pub minimum_bid_price: Option<f64>,
    pub uninterruptable_price: Option<f64>,
    pub stock_status: Option<StockStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuType {
    pub id: String,
    pub display_name: String,
    pub max_gpu_count: u32,
    pub lowest_price: GpuLowestPrice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CloudType {
    Secure,
    Community,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePodInput {
    pub cloud_type: CloudType,
    pub gpu_count: u32,
    pub volume_in_gb: u32,
    pub container_disk_in_gb: u32,
    pub min_vcpu_count: u32,
    pub min_memory_in_gb: u32,
    pub gpu_type_id: String,
    pub name: String,
    pub image_name: String,
    pub docker_args: String,
    pub ports: String,
    pub volume_mount_path: String,
    pub env: Vec<EnvVar>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePodResult {
    pub id: String,
    pub image_name: String,
    pub machine_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub id: String,
    pub name: String,
}

/// The subset of the Runpod API the adapter needs.
#[async_trait]
pub trait RunpodClient: Send + Sync {
    async fn gpu_types(
        &self,
        filter: &GpuTypeFilter,
        lowest_price: &LowestPriceInput,
    ) -> anyhow::Result<Vec<GpuType>>;

    async fn create_pod(&self, input: &CreatePodInput) -> anyhow::Result<CreatePodResult>;

    async fn terminate_pod(&self, pod_id: &str) -> anyhow::Result<()>;

    async fn list_pods(&self) -> anyhow::Result<Vec<Pod>>;
}

pub struct RunpodProvider {
    client: Arc<dyn RunpodClient>,
    gpu_type: String,
}

impl RunpodProvider {
    pub fn new(client: Arc<dyn RunpodClient>, gpu_type: &str) -> Self {
        Self {
            client,
            gpu_type: gpu_type.to_string(),
        }
    }

    fn lowest_price_input(gpu_count: u32) -> LowestPriceInput {
        LowestPriceInput {
            gpu_count,
            min_download: 100,
            min_upload: 10,
            min_memory_in_gb: 20,
            min_vcpu_count: 1,
            secure_cloud: false,
            support_public_ip: false,
        }
    }
}

#[async_trait]
impl Provider for RunpodProvider {
    fn engine_type(&self) -> EngineType {
        EngineType::Runpod
    }

    fn gpu_type(&self) -> &str {
        &self.gpu_type
    }

    async fn list_inventory(&self) -> anyhow::Result<Vec<CapacityUnit>> {
        let filter = GpuTypeFilter {
            id: self.gpu_type.clone(),
        };
        let mut units = Vec::new();
        for gpu_count in 1..=MAX_GPUS_PER_POD {
            let types = self
                .client
                .gpu_types(&filter, &Self::lowest_price_input(gpu_count))
                .await?;
            for t in types {
                // Runpod quotes the price per GPU.
                let per_gpu = t.lowest_price.uninterruptable_price.unwrap_or(0.0);
                units.push(CapacityUnit {
                    id: t.id,
                    max_gpu_count: gpu_count,
                    price: per_gpu * f64::from(gpu_count),
                    stock_status: t.lowest_price.stock_status,
                });
            }
        }
        debug!(gpu_type = %self.gpu_type, units = units.len(), "runpod inventory");
        Ok(units)
    }

    async fn create_instance(&self, request: &InstanceRequest) -> anyhow::Result<ProvisionedInstance> {
        let input = CreatePodInput {
            cloud_type: CloudType::Community,
            gpu_count: request.gpu_count,
            volume_in_gb: 0,
            container_disk_in_gb: request.launch.container_disk_gb,
            min_vcpu_count: 1,
            min_memory_in_gb: request.launch.min_memory_gb,
            gpu_type_id: request.capacity_unit_id.clone(),
            name: "fleetgrid-worker".to_string(),
            image_name: request.launch.image.clone(),
            docker_args: request.launch.command.clone(),
            ports: String::new(),
            volume_mount_path: String::new(),
            env: vec![EnvVar {
                key: "WORKER_LOGIN_CODE".to_string(),
                value: request.login_code.clone(),
            }],
        };
        let pod = self.client.create_pod(&input).await?;
        Ok(ProvisionedInstance {
            instance_id: pod.id,
            num_gpus: request.gpu_count,
        })
    }

    async fn terminate_instance(&self, instance_id: &str) -> anyhow::Result<()> {
        self.client.terminate_pod(instance_id).await
    }

    async fn list_instances(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.client.list_pods().await?.into_iter().map(|p| p.id).collect())
    }
}
