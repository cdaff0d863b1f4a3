//! fleet.toml configuration.
//!
//! Every section has defaults, so an empty file is a valid configuration
//! with no engines.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{EngineType, StockStatus};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub scaling: ScalingSettings,
    pub distributor: DistributorSettings,
    /// Scaling engines in priority order.
    pub engines: Vec<EngineConfig>,
    pub worker: WorkerLaunchConfig,
    pub simulation: SimulationConfig,
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FleetConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scaling.interval.is_zero() || self.distributor.interval.is_zero() {
            return Err(ConfigError::Invalid("tick intervals must be non-zero".into()));
        }

        let models = &self.distributor.models;
        if models.is_empty() {
            return Err(ConfigError::Invalid("distributor.models is empty".into()));
        }
        let mut seen = HashSet::new();
        for model in models {
            if !seen.insert(model.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate model {model}")));
            }
        }
        for model in self.distributor.default_distribution.keys() {
            if !seen.contains(model.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "default_distribution names unknown model {model}"
                )));
            }
        }

        let mut engines = HashSet::new();
        for engine in &self.engines {
            let pct = engine.max_allocation_percentage;
            if !(pct > 0.0 && pct <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "engine {} {}: max_allocation_percentage {pct} not in (0, 1]",
                    engine.provider, engine.gpu_type
                )));
            }
            if engine.gpu_type.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "engine {} has an empty gpu_type",
                    engine.provider
                )));
            }
            if !engines.insert((engine.provider, engine.gpu_type.as_str())) {
                return Err(ConfigError::Invalid(format!(
                    "engine {} {} configured twice",
                    engine.provider, engine.gpu_type
                )));
            }
        }
        Ok(())
    }
}

// ── Scaling ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingSettings {
    #[serde(with = "duration_str")]
    pub interval: Duration,
    /// Global cooldown between Scaling Service runs.
    #[serde(with = "duration_str")]
    pub service_cooldown: Duration,
    /// Per-engine cooldown before non-timeout destroys.
    #[serde(with = "duration_str")]
    pub scaledown_cooldown: Duration,
    /// Heartbeat staleness after which a worker is quarantined.
    #[serde(with = "duration_str")]
    pub worker_timeout: Duration,
    #[serde(with = "duration_str")]
    pub block_duration: Duration,
    #[serde(with = "duration_str")]
    pub lock_ttl: Duration,
    pub availability: AvailabilityMap,
}

impl Default for ScalingSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            service_cooldown: Duration::from_secs(60),
            scaledown_cooldown: Duration::from_secs(10 * 60),
            worker_timeout: Duration::from_secs(10 * 60),
            block_duration: Duration::from_secs(7 * 24 * 60 * 60),
            lock_ttl: Duration::from_secs(5 * 60),
            availability: AvailabilityMap::default(),
        }
    }
}

/// Conservative number of units assumed purchasable per stock status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvailabilityMap {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

impl Default for AvailabilityMap {
    fn default() -> Self {
        Self {
            low: 1,
            medium: 5,
            high: 15,
        }
    }
}

impl AvailabilityMap {
    /// Units of a size assumed available. Unknown stock means none.
    pub fn pool(&self, status: Option<StockStatus>) -> u32 {
        match status {
            Some(StockStatus::Low) => self.low,
            Some(StockStatus::Medium) => self.medium,
            Some(StockStatus::High) => self.high,
            None => 0,
        }
    }
}

// ── Work distribution ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributorSettings {
    #[serde(with = "duration_str")]
    pub interval: Duration,
    /// Cooldown while the fleet has at least one GPU per model.
    #[serde(with = "duration_str")]
    pub cooldown: Duration,
    /// Cooldown while the fleet is smaller than the model list.
    #[serde(with = "duration_str")]
    pub quick_cooldown: Duration,
    #[serde(with = "duration_str")]
    pub heartbeat_window: Duration,
    /// Known models, highest priority first.
    pub models: Vec<String>,
    /// Percentage split used when there is no pending work.
    pub default_distribution: BTreeMap<String, u32>,
}

impl Default for DistributorSettings {
    fn default() -> Self {
        let models = vec![
            "stable_diffusion_text2im".to_string(),
            "stable_diffusion_inpainting".to_string(),
            "swinir".to_string(),
        ];
        let default_distribution = models.iter().cloned().zip([65, 30, 5]).collect();
        Self {
            interval: Duration::from_secs(10),
            cooldown: Duration::from_secs(60),
            quick_cooldown: Duration::from_secs(10),
            heartbeat_window: Duration::from_secs(5 * 60),
            models,
            default_distribution,
        }
    }
}

// ── Engines ───────────────────────────────────────────────────────

/// One scaling engine: a provider paired with a GPU type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub provider: EngineType,
    pub gpu_type: String,
    #[serde(default = "default_allocation_percentage")]
    pub max_allocation_percentage: f64,
    /// Inventory with a higher hourly price per GPU is ignored.
    #[serde(default)]
    pub max_price_per_gpu: Option<f64>,
    /// Stock status reported for fixed instance types (EC2).
    #[serde(default)]
    pub stock_status: Option<StockStatus>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub launch_template_id: Option<String>,
}

fn default_allocation_percentage() -> f64 {
    1.0
}

impl EngineConfig {
    pub fn new(provider: EngineType, gpu_type: &str) -> Self {
        Self {
            provider,
            gpu_type: gpu_type.to_string(),
            max_allocation_percentage: default_allocation_percentage(),
            max_price_per_gpu: None,
            stock_status: None,
            region: None,
            launch_template_id: None,
        }
    }

    /// Effective price ceiling; Vast offers are capped at 0.5/GPU-hour unless configured.
    pub fn price_limit(&self) -> Option<f64> {
        match (self.max_price_per_gpu, self.provider) {
            (Some(limit), _) => Some(limit),
            (None, EngineType::Vast) => Some(0.5),
            (None, _) => None,
        }
    }
}

/// What a provisioned instance runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerLaunchConfig {
    pub image: String,
    pub command: String,
    pub min_memory_gb: u32,
    pub container_disk_gb: u32,
}

impl Default for WorkerLaunchConfig {
    fn default() -> Self {
        Self {
            image: "fleetgrid/worker:latest".to_string(),
            command: "/app/worker/images_worker.sh".to_string(),
            min_memory_gb: 20,
            container_disk_gb: 1,
        }
    }
}

// ── Simulation ────────────────────────────────────────────────────

/// Inventory served by the in-memory cloud in `--simulate` mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub inventory: Vec<SimulatedInventory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedInventory {
    pub provider: EngineType,
    pub gpu_type: String,
    pub gpu_count: u32,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub stock_status: Option<StockStatus>,
    /// Number of identical offers (Vast) to seed.
    #[serde(default = "default_offer_count")]
    pub count: u32,
}

fn default_offer_count() -> u32 {
    1
}

// ── Durations ─────────────────────────────────────────────────────

/// Parse a duration like "500ms", "30s", "10m", "2h" or "7d". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (digits, unit_ms) = if let Some(v) = s.strip_suffix("ms") {
        (v, 1)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, 1_000)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, 60_000)
    } else if let Some(v) = s.strip_suffix('h') {
        (v, 3_600_000)
    } else if let Some(v) = s.strip_suffix('d') {
        (v, 86_400_000)
    } else {
        (s, 1_000)
    };
    let value = digits.trim().parse::<u64>().ok()?;
    value.checked_mul(unit_ms).map(Duration::from_millis)
}

fn format_duration(d: &Duration) -> String {
    let ms = d.as_millis() as u64;
    match ms {
        0 => "0s".to_string(),
        ms if ms % 86_400_000 == 0 => format!("{}d", ms / 86_400_000),
        ms if ms % 3_600_000 == 0 => format!("{}h", ms / 3_600_000),
        ms if ms % 60_000 == 0 => format!("{}m", ms / 60_000),
        ms if ms % 1_000 == 0 => format!("{}s", ms / 1_000),
        ms => format!("{ms}ms"),
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration: {raw:?}")))
    }
}
