//! Builds the engine priority list from `[[engines]]`.

use std::sync::Arc;

use fleet_core::config::{EngineConfig, FleetConfig};
use fleet_core::{Clock, EngineType};
use fleetgrid_autoscale::{EngineSettings, Provider, ProviderEngine, ScalingEngine};
use fleetgrid_metrics::MetricsSink;
use fleetgrid_state::Registry;
use thiserror::Error;
use tracing::info;

use crate::ec2::{Ec2Client, Ec2Provider};
use crate::runpod::{RunpodClient, RunpodProvider};
use crate::simulated::SimulatedCloud;
use crate::vast::{VastClient, VastProvider};

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("no {0} client configured")]
    MissingClient(EngineType),
}

/// API clients available to the engines, one per provider.
#[derive(Clone, Default)]
pub struct ProviderClients {
    pub runpod: Option<Arc<dyn RunpodClient>>,
    pub vast: Option<Arc<dyn VastClient>>,
    pub ec2: Option<Arc<dyn Ec2Client>>,
}

impl ProviderClients {
    /// Route every provider to the same simulated cloud.
    pub fn simulated(cloud: Arc<SimulatedCloud>) -> Self {
        Self {
            runpod: Some(cloud.clone()),
            vast: Some(cloud.clone()),
            ec2: Some(cloud),
        }
    }

    pub fn provider_for(
        &self,
        engine: &EngineConfig,
    ) -> Result<Arc<dyn Provider>, ConfigurationError> {
        let missing = || ConfigurationError::MissingClient(engine.provider);
        let provider: Arc<dyn Provider> = match engine.provider {
            EngineType::Runpod => {
                let client = self.runpod.clone().ok_or_else(missing)?;
                Arc::new(RunpodProvider::new(client, &engine.gpu_type))
            }
            EngineType::Vast => {
                let client = self.vast.clone().ok_or_else(missing)?;
                Arc::new(VastProvider::new(client, &engine.gpu_type))
            }
            EngineType::Ec2 => {
                let client = self.ec2.clone().ok_or_else(missing)?;
                let mut provider = Ec2Provider::new(client, &engine.gpu_type)
                    .with_launch_template(engine.launch_template_id.clone());
                if let Some(region) = &engine.region {
                    provider = provider.with_region(region);
                }
                if engine.stock_status.is_some() {
                    provider = provider.with_stock_status(engine.stock_status);
                }
                Arc::new(provider)
            }
        };
        Ok(provider)
    }
}

/// One engine per `[[engines]]` entry, in configured priority order.
pub fn build_engines(
    config: &FleetConfig,
    clients: &ProviderClients,
    registry: Arc<dyn Registry>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
) -> Result<Vec<Arc<dyn ScalingEngine>>, ConfigurationError> {
    let mut engines: Vec<Arc<dyn ScalingEngine>> = Vec::with_capacity(config.engines.len());
    for engine in &config.engines {
        let provider = clients.provider_for(engine)?;
        let settings = EngineSettings::from_config(config, Some(engine));
        info!(
            provider = %engine.provider,
            gpu_type = %engine.gpu_type,
            max_allocation_percentage = settings.max_allocation_percentage,
            "engine configured"
        );
        engines.push(Arc::new(ProviderEngine::new(
            provider,
            registry.clone(),
            metrics.clone(),
            clock.clone(),
            settings,
        )));
    }
    Ok(engines)
}
