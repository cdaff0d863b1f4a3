//! In-memory cloud implementing every provider client.
//!
//! Seeded from `[simulation]` inventory. Vast offers are consumed when
//! rented; Runpod inventory is a standing quote. Failure switches make
//! create and terminate calls error, for exercising engine error paths.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use fleet_core::config::SimulatedInventory;
use fleet_core::{EngineType, StockStatus};

use crate::ec2::{Ec2Client, Ec2Instance, Reservation, RunInstancesInput};
use crate::runpod::{
    CreatePodInput, CreatePodResult, GpuLowestPrice, GpuType, GpuTypeFilter, LowestPriceInput,
    Pod, RunpodClient,
};
use crate::vast::{CreateInstanceInput, CreateInstanceResult, Instance, Offer, VastClient};

#[derive(Debug, Clone)]
struct SimOffer {
    id: u64,
    provider: EngineType,
    gpu_type: String,
    gpu_count: u32,
    /// Hourly price per GPU.
    price: f64,
    stock_status: Option<StockStatus>,
}

/// A running simulated instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SimInstance {
    pub id: String,
    pub provider: EngineType,
    pub gpu_type: String,
    pub num_gpus: u32,
}

#[derive(Default)]
struct SimState {
    offers: Vec<SimOffer>,
    instances: BTreeMap<String, SimInstance>,
    next_id: u64,
    fail_create: bool,
    fail_terminate: bool,
    runpod_requests: Vec<CreatePodInput>,
    ec2_requests: Vec<RunInstancesInput>,
}

impl SimState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn terminate(&mut self, provider: EngineType, id: &str) -> anyhow::Result<()> {
        if self.fail_terminate {
            anyhow::bail!("simulated {provider} terminate failure");
        }
        self.instances.remove(id);
        Ok(())
    }
}

#[derive(Default)]
pub struct SimulatedCloud {
    state: Mutex<SimState>,
}

impl SimulatedCloud {
    pub fn new(inventory: &[SimulatedInventory]) -> Self {
        let cloud = Self::default();
        for entry in inventory {
            cloud.add_inventory(entry);
        }
        cloud
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Add inventory. A Vast entry adds `count` separately rentable offers.
    pub fn add_inventory(&self, entry: &SimulatedInventory) {
        let mut state = self.state();
        let copies = match entry.provider {
            EngineType::Vast => entry.count.max(1),
            _ => 1,
        };
        for _ in 0..copies {
            let id = state.next_id();
            state.offers.push(SimOffer {
                id,
                provider: entry.provider,
                gpu_type: entry.gpu_type.clone(),
                gpu_count: entry.gpu_count,
                price: entry.price,
                stock_status: entry.stock_status,
            });
        }
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.state().fail_create = fail;
    }

    pub fn set_fail_terminate(&self, fail: bool) {
        self.state().fail_terminate = fail;
    }

    pub fn instances(&self) -> Vec<SimInstance> {
        self.state().instances.values().cloned().collect()
    }

    pub fn instance_count(&self) -> usize {
        self.state().instances.len()
    }

    pub fn runpod_requests(&self) -> Vec<CreatePodInput> {
        self.state().runpod_requests.clone()
    }

    pub fn ec2_requests(&self) -> Vec<RunInstancesInput> {
        self.state().ec2_requests.clone()
    }
}

#[async_trait]
impl RunpodClient for SimulatedCloud {
    async fn gpu_types(
        &self,
        filter: &GpuTypeFilter,
        lowest_price: &LowestPriceInput,
    ) -> anyhow::Result<Vec<GpuType>> {
        Ok(self
            .state()
            .offers
            .iter()
            .filter(|o| {
                o.provider == EngineType::Runpod
                    && o.gpu_type == filter.id
                    && o.gpu_count == lowest_price.gpu_count
            })
            .map(|o| GpuType {
                id: o.gpu_type.clone(),
                display_name: o.gpu_type.clone(),
                max_gpu_count: o.gpu_count,
                lowest_price: GpuLowestPrice {
                    minimum_bid_price: Some(o.price),
                    uninterruptable_price: Some(o.price),
                    stock_status: o.stock_status,
                },
            })
            .collect())
    }

    async fn create_pod(&self, input: &CreatePodInput) -> anyhow::Result<CreatePodResult> {
        let mut state = self.state();
        if state.fail_create {
            anyhow::bail!("simulated runpod create failure");
        }
        state.runpod_requests.push(input.clone());
        let available = state.offers.iter().any(|o| {
            o.provider == EngineType::Runpod
                && o.gpu_type == input.gpu_type_id
                && o.gpu_count == input.gpu_count
                && o.stock_status.is_some()
        });
        if !available {
            anyhow::bail!(
                "no {} x{} pods available",
                input.gpu_type_id,
                input.gpu_count
            );
        }
        let id = format!("pod-{}", state.next_id());
        state.instances.insert(
            id.clone(),
            SimInstance {
                id: id.clone(),
                provider: EngineType::Runpod,
                gpu_type: input.gpu_type_id.clone(),
                num_gpus: input.gpu_count,
            },
        );
        Ok(CreatePodResult {
            id,
            image_name: input.image_name.clone(),
            machine_id: "sim-machine".to_string(),
        })
    }

    async fn terminate_pod(&self, pod_id: &str) -> anyhow::Result<()> {
        self.state().terminate(EngineType::Runpod, pod_id)
    }

    async fn list_pods(&self) -> anyhow::Result<Vec<Pod>> {
        Ok(self
            .state()
            .instances
            .values()
            .filter(|i| i.provider == EngineType::Runpod)
            .map(|i| Pod {
                id: i.id.clone(),
                name: "fleetgrid-worker".to_string(),
            })
            .collect())
    }
}

#[async_trait]
impl VastClient for SimulatedCloud {
    async fn search_offers(&self) -> anyhow::Result<Vec<Offer>> {
        Ok(self
            .state()
            .offers
            .iter()
            .filter(|o| o.provider == EngineType::Vast)
            .map(|o| Offer {
                id: o.id,
                num_gpus: o.gpu_count,
                gpu_name: o.gpu_type.clone(),
                dph_total: o.price * f64::from(o.gpu_count),
                cpu_cores: 16.0,
                cpu_cores_effective: 16.0,
                cpu_ram: 64_000.0,
                reliability2: 0.99,
            })
            .collect())
    }

    async fn create_instance(
        &self,
        ask_id: &str,
        _input: &CreateInstanceInput,
    ) -> anyhow::Result<CreateInstanceResult> {
        let mut state = self.state();
        if state.fail_create {
            anyhow::bail!("simulated vast create failure");
        }
        let Ok(id) = ask_id.parse::<u64>() else {
            anyhow::bail!("invalid ask id {ask_id}");
        };
        let Some(idx) = state
            .offers
            .iter()
            .position(|o| o.provider == EngineType::Vast && o.id == id)
        else {
            return Ok(CreateInstanceResult {
                success: false,
                new_contract: None,
            });
        };
        let offer = state.offers.remove(idx);
        state.instances.insert(
            id.to_string(),
            SimInstance {
                id: id.to_string(),
                provider: EngineType::Vast,
                gpu_type: offer.gpu_type,
                num_gpus: offer.gpu_count,
            },
        );
        Ok(CreateInstanceResult {
            success: true,
            new_contract: Some(id),
        })
    }

    async fn list_instances(&self) -> anyhow::Result<Vec<Instance>> {
        let state = self.state();
        let mut instances = Vec::new();
        for i in state.instances.values().filter(|i| i.provider == EngineType::Vast) {
            instances.push(Instance {
                id: i.id.parse()?,
                num_gpus: i.num_gpus,
                gpu_name: i.gpu_type.clone(),
                actual_status: Some("running".to_string()),
            });
        }
        Ok(instances)
    }

    async fn delete_instance(&self, instance_id: &str) -> anyhow::Result<()> {
        self.state().terminate(EngineType::Vast, instance_id)
    }
}

#[async_trait]
impl Ec2Client for SimulatedCloud {
    async fn run_instances(&self, input: &RunInstancesInput) -> anyhow::Result<Reservation> {
        let mut state = self.state();
        if state.fail_create {
            anyhow::bail!("simulated ec2 create failure");
        }
        state.ec2_requests.push(input.clone());
        let n = state.next_id();
        let id = format!("i-{n:08x}");
        state.instances.insert(
            id.clone(),
            SimInstance {
                id: id.clone(),
                provider: EngineType::Ec2,
                gpu_type: input.launch_template_id.clone().unwrap_or_default(),
                num_gpus: 1,
            },
        );
        Ok(Reservation {
            reservation_id: format!("r-{n:08x}"),
            instances: vec![Ec2Instance {
                instance_id: id,
                instance_type: None,
            }],
        })
    }

    async fn terminate_instances(&self, _region: &str, instance_id: &str) -> anyhow::Result<()> {
        self.state().terminate(EngineType::Ec2, instance_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vast(count: u32) -> SimulatedInventory {
        SimulatedInventory {
            provider: EngineType::Vast,
            gpu_type: "RTX 3090".to_string(),
            gpu_count: 1,
            price: 0.3,
            stock_status: None,
            count,
        }
    }

    #[tokio::test]
    async fn vast_entries_expand_into_offers() {
        let cloud = SimulatedCloud::new(&[vast(3)]);
        let offers = cloud.search_offers().await.unwrap();
        assert_eq!(offers.len(), 3);
        assert!((offers[0].dph_total - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn failure_switches_affect_create_and_terminate() {
        let cloud = SimulatedCloud::new(&[vast(1)]);
        let offer_id = cloud.search_offers().await.unwrap()[0].id.to_string();
        let input = CreateInstanceInput {
            image: "img".to_string(),
            onstart: String::new(),
            env: BTreeMap::new(),
        };

        cloud.set_fail_create(true);
        assert!(VastClient::create_instance(&cloud, &offer_id, &input).await.is_err());
        cloud.set_fail_create(false);
        let result = VastClient::create_instance(&cloud, &offer_id, &input).await.unwrap();
        assert!(result.success);

        cloud.set_fail_terminate(true);
        assert!(cloud.delete_instance(&offer_id).await.is_err());
        assert_eq!(cloud.instance_count(), 1);
        cloud.set_fail_terminate(false);
        cloud.delete_instance(&offer_id).await.unwrap();
        assert_eq!(cloud.instance_count(), 0);
    }
}
