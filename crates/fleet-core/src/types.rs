//! Shared types used across FleetGrid crates.
//!
//! All timestamps are unix epoch milliseconds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unique identifier for a registered worker.
pub type WorkerId = String;

// ── Engines ───────────────────────────────────────────────────────

/// Cloud provider behind a scaling engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineType {
    Runpod,
    Vast,
    Ec2,
}

impl EngineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineType::Runpod => "runpod",
            EngineType::Vast => "vast",
            EngineType::Ec2 => "ec2",
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "runpod" => Ok(EngineType::Runpod),
            "vast" | "vastai" => Ok(EngineType::Vast),
            "ec2" => Ok(EngineType::Ec2),
            other => Err(format!("unknown engine type: {other}")),
        }
    }
}

// ── Worker ────────────────────────────────────────────────────────

/// Liveness status reported by the worker on heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Active,
    Inactive,
}

/// A GPU worker registered in the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub display_name: String,
    /// GPUs backing this worker. Zero until the provider confirms the instance.
    pub num_gpus: u32,
    pub created_at: u64,
    /// Last heartbeat, if the worker has ever pinged.
    pub last_ping: Option<u64>,
    pub status: WorkerStatus,
    pub engine: Option<EngineType>,
    pub gpu_type: Option<String>,
    pub cloud_instance_id: Option<String>,
    /// Capacity unit (offer, GPU type, launch template) the instance came from.
    pub capacity_unit_id: Option<String>,
    /// One-time credential the worker uses to log in. Empty once consumed.
    pub login_code: Option<String>,
}

impl Worker {
    /// Timestamp used for staleness checks: last ping, or creation time.
    pub fn last_seen(&self) -> u64 {
        self.last_ping.unwrap_or(self.created_at)
    }

    /// Whether this worker belongs to the engine with the given provider and GPU type.
    pub fn belongs_to(&self, engine: EngineType, gpu_type: &str) -> bool {
        self.engine == Some(engine) && self.gpu_type.as_deref() == Some(gpu_type)
    }
}

/// Provider deployment details attached to a worker after a successful create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub engine: EngineType,
    pub num_gpus: u32,
    pub cloud_instance_id: String,
    pub gpu_type: Option<String>,
    pub capacity_unit_id: Option<String>,
}

// ── Scaling ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Create,
    Destroy,
}

/// A single create or destroy step produced by the scaling calculator.
///
/// For creates `target_id` is the capacity unit id; for destroys it is
/// the worker id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingOperation {
    pub target_id: String,
    pub operation_type: OperationType,
    pub gpu_count: Option<u32>,
    /// Block the underlying capacity unit after destroying (timeout quarantine).
    pub block: bool,
}

impl ScalingOperation {
    pub fn create(unit_id: &str, gpu_count: u32) -> Self {
        Self {
            target_id: unit_id.to_string(),
            operation_type: OperationType::Create,
            gpu_count: Some(gpu_count),
            block: false,
        }
    }

    pub fn destroy(worker_id: &str) -> Self {
        Self {
            target_id: worker_id.to_string(),
            operation_type: OperationType::Destroy,
            gpu_count: None,
            block: false,
        }
    }

    /// Destroy a timed-out worker and block its capacity unit.
    pub fn quarantine(worker_id: &str) -> Self {
        Self {
            block: true,
            ..Self::destroy(worker_id)
        }
    }

    pub fn is_create(&self) -> bool {
        self.operation_type == OperationType::Create
    }
}

/// Qualitative availability reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    #[serde(alias = "Low")]
    Low,
    #[serde(alias = "Medium")]
    Medium,
    #[serde(alias = "High")]
    High,
}

/// A purchasable bundle of GPUs of one size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityUnit {
    pub id: String,
    pub max_gpu_count: u32,
    /// Hourly price of the whole bundle.
    pub price: f64,
    pub stock_status: Option<StockStatus>,
}

impl CapacityUnit {
    pub fn price_per_gpu(&self) -> f64 {
        if self.max_gpu_count == 0 {
            return f64::INFINITY;
        }
        self.price / f64::from(self.max_gpu_count)
    }
}

// ── Orders ────────────────────────────────────────────────────────

/// A paid request for GPU capacity over a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub created_by: String,
    pub created_at: u64,
    pub ends_at: u64,
    pub is_active: bool,
    pub gpu_count: u32,
}

impl Order {
    pub fn is_active_at(&self, now: u64) -> bool {
        self.is_active && self.ends_at > now
    }
}

// ── Work distribution ─────────────────────────────────────────────

/// Age-weighted demand for a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWorkScore {
    pub model: String,
    pub score: f64,
}

/// Model assignment for one physical GPU slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuConfig {
    pub gpu_num: u32,
    pub model: Option<String>,
}

/// Per-GPU model assignments for a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub worker_id: WorkerId,
    pub gpu_configs: Vec<GpuConfig>,
}

impl WorkerConfig {
    pub fn empty(worker_id: &str) -> Self {
        Self {
            worker_id: worker_id.to_string(),
            gpu_configs: Vec::new(),
        }
    }

    /// Grow or shrink to exactly `num_gpus` slots, labelling new slots with `model`.
    pub fn resize(&mut self, num_gpus: u32, model: Option<&str>) {
        self.gpu_configs.truncate(num_gpus as usize);
        for gpu_num in self.gpu_configs.len() as u32..num_gpus {
            self.gpu_configs.push(GpuConfig {
                gpu_num,
                model: model.map(str::to_string),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(created_at: u64, last_ping: Option<u64>) -> Worker {
        Worker {
            id: "w1".to_string(),
            display_name: "Worker".to_string(),
            num_gpus: 1,
            created_at,
            last_ping,
            status: WorkerStatus::Idle,
            engine: Some(EngineType::Vast),
            gpu_type: Some("RTX 3090".to_string()),
            cloud_instance_id: None,
            capacity_unit_id: None,
            login_code: None,
        }
    }

    #[test]
    fn last_seen_prefers_ping() {
        assert_eq!(worker(1000, None).last_seen(), 1000);
        assert_eq!(worker(1000, Some(5000)).last_seen(), 5000);
    }

    #[test]
    fn belongs_to_matches_engine_and_gpu_type() {
        let w = worker(0, None);
        assert!(w.belongs_to(EngineType::Vast, "RTX 3090"));
        assert!(!w.belongs_to(EngineType::Runpod, "RTX 3090"));
        assert!(!w.belongs_to(EngineType::Vast, "RTX A6000"));
    }

    #[test]
    fn engine_type_parses_aliases() {
        assert_eq!("vastai".parse::<EngineType>().unwrap(), EngineType::Vast);
        assert_eq!("ec2".parse::<EngineType>().unwrap(), EngineType::Ec2);
        assert!("gcp".parse::<EngineType>().is_err());
    }

    #[test]
    fn order_activity_window() {
        let order = Order {
            id: "o1".to_string(),
            created_by: "u1".to_string(),
            created_at: 0,
            ends_at: 100,
            is_active: true,
            gpu_count: 2,
        };
        assert!(order.is_active_at(99));
        assert!(!order.is_active_at(100));
        assert!(!Order { is_active: false, ..order }.is_active_at(0));
    }

    #[test]
    fn resize_keeps_existing_labels() {
        let mut config = WorkerConfig::empty("w1");
        config.resize(2, Some("a"));
        config.gpu_configs[1].model = Some("b".to_string());
        config.resize(3, Some("a"));

        let models: Vec<_> = config.gpu_configs.iter().map(|g| g.model.as_deref()).collect();
        assert_eq!(models, vec![Some("a"), Some("b"), Some("a")]);
        assert_eq!(config.gpu_configs[2].gpu_num, 2);

        config.resize(1, None);
        assert_eq!(config.gpu_configs.len(), 1);
    }

    #[test]
    fn price_per_gpu_handles_zero() {
        let unit = CapacityUnit {
            id: "u".to_string(),
            max_gpu_count: 4,
            price: 2.0,
            stock_status: None,
        };
        assert_eq!(unit.price_per_gpu(), 0.5);
        assert!(CapacityUnit { max_gpu_count: 0, ..unit }.price_per_gpu().is_infinite());
    }
}
