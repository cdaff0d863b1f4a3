//! Scaling operation calculator.
//!
//! Pure function from (workers, inventory, target GPUs, last scaling event,
//! clock) to an ordered list of create/destroy operations. Every provider
//! engine runs the same calculator; only inventory and API calls differ.

use std::collections::BTreeMap;
use std::time::Duration;

use fleet_core::config::{AvailabilityMap, ScalingSettings};
use fleet_core::{CapacityUnit, Clock, ScalingOperation, Worker};
use tracing::{debug, info};

/// Timing windows and availability heuristics used by the calculator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalculatorSettings {
    /// Heartbeat staleness after which a worker is quarantined.
    pub worker_timeout: Duration,
    /// Minimum time since the last scaling event before scaling down.
    pub scaledown_cooldown: Duration,
    pub availability: AvailabilityMap,
}

impl Default for CalculatorSettings {
    fn default() -> Self {
        Self::from(&ScalingSettings::default())
    }
}

impl From<&ScalingSettings> for CalculatorSettings {
    fn from(s: &ScalingSettings) -> Self {
        Self {
            worker_timeout: s.worker_timeout,
            scaledown_cooldown: s.scaledown_cooldown,
            availability: s.availability,
        }
    }
}

/// Compute the operations that move `workers` toward `target_gpus`.
///
/// Timed-out workers are always quarantined first and do not count toward
/// the current total. Scale-down only happens once the scale-down cooldown
/// has elapsed since `last_scaling_operation` and never drops the total
/// below target. Scale-up consumes units from each size's availability
/// pool and stops short when the pools run dry.
pub fn calculate_scaling_operations(
    workers: &[Worker],
    units: &[CapacityUnit],
    target_gpus: u32,
    last_scaling_operation: Option<u64>,
    clock: &dyn Clock,
    settings: &CalculatorSettings,
) -> Vec<ScalingOperation> {
    let now = clock.now_millis();
    let timeout_ms = settings.worker_timeout.as_millis() as u64;

    let mut operations = Vec::new();
    let mut live = Vec::new();
    let mut current: u32 = 0;
    for worker in workers {
        if now.saturating_sub(worker.last_seen()) > timeout_ms {
            info!(worker_id = %worker.id, last_seen = worker.last_seen(), "worker timed out");
            operations.push(ScalingOperation::quarantine(&worker.id));
        } else {
            current += worker.num_gpus;
            live.push(worker);
        }
    }

    if current > target_gpus {
        let cooldown_ms = settings.scaledown_cooldown.as_millis() as u64;
        let cooled_down =
            last_scaling_operation.is_none_or(|last| now.saturating_sub(last) >= cooldown_ms);
        if cooled_down {
            scale_down(&live, current, target_gpus, &mut operations);
        } else {
            debug!(current, target_gpus, "scale-down cooldown active");
        }
    } else if current < target_gpus {
        scale_up(units, current, target_gpus, &settings.availability, &mut operations);
    }

    operations
}

/// Destroy the largest workers whose removal keeps the total at or above target.
fn scale_down(live: &[&Worker], mut current: u32, target: u32, operations: &mut Vec<ScalingOperation>) {
    // Workers without confirmed GPUs free nothing; leave them alone.
    let mut tiers: BTreeMap<u32, Vec<&Worker>> = BTreeMap::new();
    for worker in live.iter().copied().filter(|w| w.num_gpus > 0) {
        tiers.entry(worker.num_gpus).or_default().push(worker);
    }

    while current > target {
        let candidate = tiers
            .iter_mut()
            .rev()
            .find(|(size, workers)| !workers.is_empty() && current - **size >= target)
            .and_then(|(_, workers)| workers.pop());
        let Some(worker) = candidate else {
            break;
        };
        current -= worker.num_gpus;
        operations.push(ScalingOperation::destroy(&worker.id));
    }
}

/// One purchasable unit with its remaining assumed availability.
struct Slot<'a> {
    unit: &'a CapacityUnit,
    remaining: u32,
}

fn scale_up(
    units: &[CapacityUnit],
    mut current: u32,
    target: u32,
    availability: &AvailabilityMap,
    operations: &mut Vec<ScalingOperation>,
) {
    let mut sizes: BTreeMap<u32, Vec<Slot<'_>>> = BTreeMap::new();
    for unit in units {
        let remaining = availability.pool(unit.stock_status);
        if unit.max_gpu_count == 0 || remaining == 0 {
            continue;
        }
        sizes
            .entry(unit.max_gpu_count)
            .or_default()
            .push(Slot { unit, remaining });
    }
    for slots in sizes.values_mut() {
        slots.sort_by(|a, b| a.unit.price_per_gpu().total_cmp(&b.unit.price_per_gpu()));
    }

    while current < target {
        // Smallest size that closes the gap, else the largest size left.
        let mut largest = None;
        let mut completing = None;
        for (size, slots) in &sizes {
            if slots.iter().any(|s| s.remaining > 0) {
                largest = Some(*size);
                if current + size >= target {
                    completing = Some(*size);
                    break;
                }
            }
        }
        let Some(size) = completing.or(largest) else {
            debug!(current, target, "inventory exhausted");
            break;
        };
        let Some(slot) = sizes
            .get_mut(&size)
            .and_then(|slots| slots.iter_mut().find(|s| s.remaining > 0))
        else {
            break;
        };
        slot.remaining -= 1;
        current += size;
        operations.push(ScalingOperation::create(&slot.unit.id, size));
    }
}
