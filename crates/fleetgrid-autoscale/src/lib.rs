//! fleetgrid-autoscale — GPU fleet autoscaling.
//!
//! Active order demand is allocated across provider engines in priority
//! order. Each engine runs the shared calculator against its live workers
//! and purchasable inventory, then executes the operations it produces.
//!
//! # Scaling Algorithm
//!
//! ```text
//! for each worker:
//!     now - last_seen > worker_timeout  → destroy(block = true)
//!     otherwise                         → current += num_gpus
//!
//! current > target and cooldown passed:
//!     destroy the largest workers that keep current ≥ target
//!
//! current < target:
//!     pool(size) = Σ availability(stock_status)   // Low 1, Medium 5, High 15
//!     create the smallest size that closes the gap,
//!     else the largest size left, until target or pools run dry
//! ```
//!
//! The scaling service hands each engine at most
//! `ceil(capacity × max_allocation_percentage)` of the demand still
//! unallocated, then subtracts what the engine actually achieved.

pub mod calculator;
pub mod engine;
pub mod error;
pub mod service;

pub use calculator::{CalculatorSettings, calculate_scaling_operations};
pub use engine::{
    EngineSettings, InstanceRequest, Provider, ProviderEngine, ProvisionedInstance, ScalingEngine,
};
pub use error::{ScalingError, ScalingResult};
pub use service::{
    EngineAllocation, SCALING_EVENT, SCALING_LOCK, ScaleReport, ScalingService, TickOutcome,
};
