//! fleetd — assembles the FleetGrid subsystems.
//!
//! [`Fleet`] wires the registry, metrics recorder, clock, scaling engines,
//! scaling service, work distributor and API router from one
//! [`FleetConfig`]. The binary in `main.rs` runs it; integration tests
//! drive the same assembly with a fake clock and the simulated cloud.

use std::sync::Arc;

use fleet_core::{Clock, FleetConfig};
use fleetgrid_api::ApiState;
use fleetgrid_autoscale::ScalingService;
use fleetgrid_distributor::WorkDistributor;
use fleetgrid_metrics::MetricsRecorder;
use fleetgrid_providers::{ConfigurationError, ProviderClients, build_engines};
use fleetgrid_scheduler::IntervalScheduler;
use fleetgrid_state::{Registry, StateStore};
use tracing::info;

/// Every long-lived component of one daemon.
pub struct Fleet {
    pub config: FleetConfig,
    pub store: StateStore,
    pub metrics: Arc<MetricsRecorder>,
    pub clock: Arc<dyn Clock>,
    pub service: Arc<ScalingService>,
    pub distributor: Arc<WorkDistributor>,
}

/// The two control-loop timers.
pub struct Timers {
    pub scaling: IntervalScheduler,
    pub distribution: IntervalScheduler,
}

impl Timers {
    pub fn stop(&self) {
        self.scaling.stop();
        self.distribution.stop();
    }
}

impl Fleet {
    /// Build engines from `config.engines` and wire them to `store`.
    ///
    /// New worker GPU slots start on the first configured model.
    pub fn assemble(
        config: FleetConfig,
        store: StateStore,
        clients: &ProviderClients,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigurationError> {
        let store = match config.distributor.models.first() {
            Some(model) => store.with_default_model(model),
            None => store,
        };
        let registry: Arc<dyn Registry> = Arc::new(store.clone());
        let metrics = Arc::new(MetricsRecorder::new());

        let engines = build_engines(
            &config,
            clients,
            registry.clone(),
            metrics.clone(),
            clock.clone(),
        )?;
        let service = Arc::new(ScalingService::new(
            engines,
            registry.clone(),
            metrics.clone(),
            clock.clone(),
            &config.scaling,
        ));
        let distributor = Arc::new(WorkDistributor::new(
            registry,
            metrics.clone(),
            clock.clone(),
            &config.distributor,
            &config.scaling,
        ));
        info!(
            engines = service.engines().len(),
            models = config.distributor.models.len(),
            "fleet assembled"
        );

        Ok(Self {
            config,
            store,
            metrics,
            clock,
            service,
            distributor,
        })
    }

    pub fn api_state(&self) -> ApiState {
        ApiState {
            registry: Arc::new(self.store.clone()),
            metrics: self.metrics.clone(),
            clock: self.clock.clone(),
            models: self.config.distributor.models.clone().into(),
        }
    }

    pub fn router(&self) -> axum::Router {
        fleetgrid_api::build_router(self.api_state())
    }

    /// Start the scaling and distribution timers.
    pub fn start(&self) -> Timers {
        let scaling = IntervalScheduler::new(self.config.scaling.interval);
        scaling.start(self.service.clone());
        let distribution = IntervalScheduler::new(self.config.distributor.interval);
        distribution.start(self.distributor.clone());
        Timers {
            scaling,
            distribution,
        }
    }
}
