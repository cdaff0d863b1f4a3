//! Desired per-model GPU allocation and the slot reassignment that reaches it.
//!
//! Pure functions; the [`WorkDistributor`](crate::WorkDistributor) tick
//! feeds them registry state and writes back the configs they return.

use std::collections::{BTreeMap, BTreeSet};

use fleet_core::config::DistributorSettings;
use fleet_core::{PendingWorkScore, Worker, WorkerConfig, WorkerStatus};

/// GPU slots per model.
pub type ModelCounts = BTreeMap<String, u32>;

/// Which models exist and how to split GPUs between them without pending work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionPolicy {
    /// Known models, highest priority first.
    pub models: Vec<String>,
    /// Percentage per model.
    pub default_distribution: BTreeMap<String, u32>,
}

impl Default for DistributionPolicy {
    fn default() -> Self {
        Self::from(&DistributorSettings::default())
    }
}

impl From<&DistributorSettings> for DistributionPolicy {
    fn from(settings: &DistributorSettings) -> Self {
        Self {
            models: settings.models.clone(),
            default_distribution: settings.default_distribution.clone(),
        }
    }
}

impl DistributionPolicy {
    pub fn is_known(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    fn zeroed(&self) -> ModelCounts {
        self.models.iter().map(|m| (m.clone(), 0)).collect()
    }

    fn model_count(&self) -> u32 {
        self.models.len() as u32
    }
}

/// Count assigned slots per known model. Unknown or empty labels are not counted.
pub fn actual_state<'a>(
    configs: impl IntoIterator<Item = &'a WorkerConfig>,
    policy: &DistributionPolicy,
) -> ModelCounts {
    let mut counts = policy.zeroed();
    for config in configs {
        for slot in &config.gpu_configs {
            if let Some(model) = slot.model.as_deref()
                && let Some(count) = counts.get_mut(model)
            {
                *count += 1;
            }
        }
    }
    counts
}

/// `ceil(fraction × pool)`, tolerant of float noise such as `0.3 × 10`.
fn ceil_share(fraction: f64, pool: u32) -> u32 {
    let exact = fraction * f64::from(pool);
    (exact - 1e-9).ceil().max(0.0) as u32
}

/// Target GPU count per model for a fleet of `total_gpus` slots.
///
/// With at least one slot per model, every model keeps one. The remainder
/// is split by pending-work score (highest first) or, without pending
/// work, by the default percentages. Rounding leftovers go to the first
/// model in that order. A fleet smaller than the model list with no
/// pending work keeps `actual`.
pub fn desired_state(
    pending: &[PendingWorkScore],
    total_gpus: u32,
    actual: &ModelCounts,
    policy: &DistributionPolicy,
) -> ModelCounts {
    let mut pending: Vec<&PendingWorkScore> = pending
        .iter()
        .filter(|p| p.score > 0.0 && policy.is_known(&p.model))
        .collect();
    pending.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.model.cmp(&b.model)));

    if pending.is_empty() && total_gpus < policy.model_count() {
        return actual.clone();
    }

    let mut desired = policy.zeroed();
    let mut pool = total_gpus;
    if total_gpus >= policy.model_count() {
        for count in desired.values_mut() {
            *count = 1;
        }
        pool -= policy.model_count();
    }

    let shares: Vec<(&str, f64)> = if pending.is_empty() {
        policy
            .models
            .iter()
            .map(|m| {
                let pct = policy.default_distribution.get(m).copied().unwrap_or(0);
                (m.as_str(), f64::from(pct) / 100.0)
            })
            .collect()
    } else {
        let total: f64 = pending.iter().map(|p| p.score).sum();
        pending
            .iter()
            .map(|p| (p.model.as_str(), p.score / total))
            .collect()
    };

    let mut remaining = pool;
    for (model, fraction) in &shares {
        let gpus = ceil_share(*fraction, pool).min(remaining);
        if let Some(count) = desired.get_mut(*model) {
            *count += gpus;
        }
        remaining -= gpus;
    }
    if remaining > 0
        && let Some((model, _)) = shares.first()
        && let Some(count) = desired.get_mut(*model)
    {
        *count += remaining;
    }
    desired
}

/// Idle workers first, then by id.
fn assignment_order<'a>(workers: &'a [Worker]) -> Vec<&'a Worker> {
    let mut ordered: Vec<&Worker> = workers.iter().collect();
    ordered.sort_by(|a, b| {
        let a_busy = a.status != WorkerStatus::Idle;
        let b_busy = b.status != WorkerStatus::Idle;
        a_busy.cmp(&b_busy).then_with(|| a.id.cmp(&b.id))
    });
    ordered
}

/// Workers modified in this run first, each group in assignment order.
fn visit_order<'a>(ordered: &[&'a Worker], modified: &BTreeSet<&'a str>) -> Vec<&'a str> {
    let (touched, rest): (Vec<&'a str>, Vec<&'a str>) = ordered
        .iter()
        .map(|w| w.id.as_str())
        .partition(|id| modified.contains(id));
    touched.into_iter().chain(rest).collect()
}

/// Compute the configs that must change to move `workers` to the desired allocation.
///
/// Surplus slots are cleared first, then empty slots are filled with
/// models short of their target. Both passes visit workers already
/// modified in this run before the rest, in idle-first then id order.
/// Only configs that differ from their input are returned.
pub fn calculate_work_distribution(
    pending: &[PendingWorkScore],
    workers: &[Worker],
    configs: &[WorkerConfig],
    policy: &DistributionPolicy,
) -> Vec<WorkerConfig> {
    if workers.is_empty() {
        return Vec::new();
    }
    let ordered = assignment_order(workers);

    let original: BTreeMap<&str, WorkerConfig> = ordered
        .iter()
        .map(|w| {
            let config = configs
                .iter()
                .find(|c| c.worker_id == w.id)
                .cloned()
                .unwrap_or_else(|| WorkerConfig::empty(&w.id));
            (w.id.as_str(), config)
        })
        .collect();
    let mut working: BTreeMap<&str, WorkerConfig> = original.clone();
    for w in &ordered {
        if let Some(config) = working.get_mut(w.id.as_str())
            && config.gpu_configs.is_empty()
        {
            config.resize(w.num_gpus, None);
        }
    }

    let total_gpus: u32 = working.values().map(|c| c.gpu_configs.len() as u32).sum();
    let actual = actual_state(working.values(), policy);
    let desired = desired_state(pending, total_gpus, &actual, policy);

    let mut modified: BTreeSet<&str> = BTreeSet::new();

    for model in &policy.models {
        let have = actual.get(model).copied().unwrap_or(0);
        let want = desired.get(model).copied().unwrap_or(0);
        let mut surplus = have.saturating_sub(want);
        if surplus == 0 {
            continue;
        }
        for id in visit_order(&ordered, &modified) {
            let Some(config) = working.get_mut(id) else { continue };
            for slot in config.gpu_configs.iter_mut() {
                if surplus > 0 && slot.model.as_deref() == Some(model.as_str()) {
                    slot.model = None;
                    surplus -= 1;
                    modified.insert(id);
                }
            }
            if surplus == 0 {
                break;
            }
        }
    }

    for model in &policy.models {
        let have = actual.get(model).copied().unwrap_or(0);
        let want = desired.get(model).copied().unwrap_or(0);
        let mut deficit = want.saturating_sub(have);
        if deficit == 0 {
            continue;
        }
        for id in visit_order(&ordered, &modified) {
            let Some(config) = working.get_mut(id) else { continue };
            for slot in config.gpu_configs.iter_mut() {
                let unassigned = slot.model.as_deref().is_none_or(|m| !policy.is_known(m));
                if deficit > 0 && unassigned {
                    slot.model = Some(model.clone());
                    deficit -= 1;
                    modified.insert(id);
                }
            }
            if deficit == 0 {
                break;
            }
        }
    }

    ordered
        .iter()
        .filter_map(|w| {
            let id = w.id.as_str();
            let updated = working.remove(id)?;
            (original.get(id) != Some(&updated)).then_some(updated)
        })
        .collect()
}
