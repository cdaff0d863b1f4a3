//! fleetgrid-distributor — per-GPU model assignment.
//!
//! Live workers run one model per GPU slot. Each run computes how many
//! slots every model should hold and relabels the fewest slots needed to
//! get there; slots are never created or destroyed here.
//!
//! ```text
//! total ≥ models      → one slot per model, rest split by
//!                       pending score (or default percentages)
//! total < models      → split by pending score only;
//!   and no pending    → leave the fleet as it is
//! ```

pub mod distribution;
pub mod distributor;

pub use distribution::{
    DistributionPolicy, ModelCounts, actual_state, calculate_work_distribution, desired_state,
};
pub use distributor::{
    DistributionOutcome, WORK_DISTRIBUTION_EVENT, WORK_DISTRIBUTION_LOCK, WorkDistributor,
};
