//! EC2-style adapter.
//!
//! Instances come from a launch template with a single GPU, so inventory is
//! one fixed capacity unit whose stock status is configured rather than
//! queried. The worker is started by a user-data script.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use fleet_core::config::WorkerLaunchConfig;
use fleet_core::{CapacityUnit, EngineType, StockStatus};
use fleetgrid_autoscale::{InstanceRequest, Provider, ProvisionedInstance};
use serde::{Deserialize, Serialize};

pub const DEFAULT_REGION: &str = "us-west-2";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunInstancesInput {
    pub region: String,
    pub launch_template_id: Option<String>,
    pub min_count: u32,
    pub max_count: u32,
    /// Base64-encoded startup script.
    pub user_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ec2Instance {
    pub instance_id: String,
    #[serde(default)]
    pub instance_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Reservation {
    pub reservation_id: String,
    pub instances: Vec<Ec2Instance>,
}

/// The subset of the EC2 API the adapter needs.
#[async_trait]
pub trait Ec2Client: Send + Sync {
    async fn run_instances(&self, input: &RunInstancesInput) -> anyhow::Result<Reservation>;

    async fn terminate_instances(&self, region: &str, instance_id: &str) -> anyhow::Result<()>;
}

pub struct Ec2Provider {
    client: Arc<dyn Ec2Client>,
    instance_type: String,
    region: String,
    launch_template_id: Option<String>,
    stock_status: Option<StockStatus>,
}

impl Ec2Provider {
    pub fn new(client: Arc<dyn Ec2Client>, instance_type: &str) -> Self {
        Self {
            client,
            instance_type: instance_type.to_string(),
            region: DEFAULT_REGION.to_string(),
            launch_template_id: None,
            stock_status: Some(StockStatus::Medium),
        }
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.region = region.to_string();
        self
    }

    pub fn with_launch_template(mut self, launch_template_id: Option<String>) -> Self {
        self.launch_template_id = launch_template_id;
        self
    }

    pub fn with_stock_status(mut self, stock_status: Option<StockStatus>) -> Self {
        self.stock_status = stock_status;
        self
    }
}

/// Startup script that pulls and runs the worker image.
pub fn user_data_script(launch: &WorkerLaunchConfig, login_code: &str) -> String {
    format!(
        "#!/bin/bash\ndocker pull {image}\ndocker run -e 'WORKER_LOGIN_CODE={login_code}' --gpus all {image} {command}\n",
        image = launch.image,
        command = launch.command,
    )
}

#[async_trait]
impl Provider for Ec2Provider {
    fn engine_type(&self) -> EngineType {
        EngineType::Ec2
    }

    fn gpu_type(&self) -> &str {
        &self.instance_type
    }

    async fn list_inventory(&self) -> anyhow::Result<Vec<CapacityUnit>> {
        Ok(vec![CapacityUnit {
            id: self.instance_type.clone(),
            max_gpu_count: 1,
            price: 0.0,
            stock_status: self.stock_status,
        }])
    }

    async fn create_instance(&self, request: &InstanceRequest) -> anyhow::Result<ProvisionedInstance> {
        let script = user_data_script(&request.launch, &request.login_code);
        let input = RunInstancesInput {
            region: self.region.clone(),
            launch_template_id: self.launch_template_id.clone(),
            min_count: 1,
            max_count: 1,
            user_data: STANDARD.encode(script.as_bytes()),
        };
        let reservation = self.client.run_instances(&input).await?;
        let Some(instance) = reservation.instances.into_iter().next() else {
            anyhow::bail!("reservation {} has no instances", reservation.reservation_id);
        };
        Ok(ProvisionedInstance {
            instance_id: instance.instance_id,
            num_gpus: 1,
        })
    }

    async fn terminate_instance(&self, instance_id: &str) -> anyhow::Result<()> {
        self.client.terminate_instances(&self.region, instance_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedCloud;

    #[test]
    fn user_data_embeds_login_code() {
        let script = user_data_script(&WorkerLaunchConfig::default(), "abc123");
        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("WORKER_LOGIN_CODE=abc123"));
        assert!(script.contains("--gpus all"));
    }

    #[tokio::test]
    async fn inventory_is_a_single_gpu_unit_with_configured_stock() {
        let provider = Ec2Provider::new(Arc::new(SimulatedCloud::new(&[])), "g4dn.xlarge")
            .with_stock_status(Some(StockStatus::High));
        let units = provider.list_inventory().await.unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].max_gpu_count, 1);
        assert_eq!(units[0].stock_status, Some(StockStatus::High));
    }

    #[tokio::test]
    async fn create_sends_encoded_user_data() {
        let cloud = Arc::new(SimulatedCloud::new(&[]));
        let provider = Ec2Provider::new(cloud.clone(), "g4dn.xlarge")
            .with_region("eu-west-1")
            .with_launch_template(Some("lt-123".to_string()));

        let instance = provider
            .create_instance(&InstanceRequest {
                capacity_unit_id: "g4dn.xlarge".to_string(),
                gpu_count: 1,
                login_code: "code".to_string(),
                launch: WorkerLaunchConfig::default(),
            })
            .await
            .unwrap();
        assert_eq!(instance.num_gpus, 1);

        let requests = cloud.ec2_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].region, "eu-west-1");
        assert_eq!(requests[0].launch_template_id.as_deref(), Some("lt-123"));
        let expected = user_data_script(&WorkerLaunchConfig::default(), "code");
        let decoded = STANDARD.decode(&requests[0].user_data).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), expected);

        provider.terminate_instance(&instance.instance_id).await.unwrap();
        assert_eq!(cloud.instance_count(), 0);
    }
}
