//! [`InstanceLoadCalculator`]: the pure, stateless function that turns an
//! [`InstanceInfo`] into a scalar load for a given action.
//!
//! Dispatch/scale share one formula (steady-state throughput); migrate uses
//! a second (fit-one-more-request). Both are monotone: adding a running
//! request or reducing free blocks never decreases the returned load.

use serde::{Deserialize, Serialize};

use crate::instance::InstanceInfo;

/// Which decision is consuming the load score. The calculator may weigh
/// counters differently per action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Dispatch,
    Migrate,
}

/// Recognized load metrics. `RemainingSteps` is the only one specified;
/// implementations may add others behind this enum without touching call
/// sites, since every variant is resolved once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMetric {
    RemainingSteps,
}

impl LoadMetric {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "remaining_steps" => Some(LoadMetric::RemainingSteps),
            _ => None,
        }
    }
}

/// Pure, stateless load scorer. Higher score = more loaded.
#[derive(Debug, Clone, Copy)]
pub struct InstanceLoadCalculator {
    load_metric: LoadMetric,
    enable_prefill_migrate: bool,
}

impl InstanceLoadCalculator {
    pub fn new(load_metric: LoadMetric, enable_prefill_migrate: bool) -> Self {
        InstanceLoadCalculator {
            load_metric,
            enable_prefill_migrate,
        }
    }

    pub fn load_metric(&self) -> LoadMetric {
        self.load_metric
    }

    pub fn enable_prefill_migrate(&self) -> bool {
        self.enable_prefill_migrate
    }

    /// Score `info` for `action`. A freshly admitted instance (sentinel
    /// `-inf` loads, detected via [`InstanceInfo::is_fresh`]) is never
    /// passed through this function by the registry update path — callers
    /// computing a *projected* load after a hypothetical migration
    /// (see [`crate::migrate::project`]) always pass a concrete info.
    pub fn compute_instance_load(&self, info: &InstanceInfo, action: Action) -> f64 {
        match self.load_metric {
            LoadMetric::RemainingSteps => match action {
                // Dispatch/scale care about steady-state throughput: weight
                // queueing pressure (waiting requests can't run without
                // more blocks) alongside current occupancy.
                Action::Dispatch => {
                    let occupancy = Self::occupancy_ratio(info);
                    let queue_pressure = info.num_waiting_request as f64
                        + 0.5 * info.num_running_request as f64;
                    occupancy * 100.0 + queue_pressure
                }
                // Migrate cares about whether one more request still fits:
                // the fewer decode steps the instance can sustain on its
                // free blocks, the higher (worse) its migrate load.
                Action::Migrate => {
                    let free = info.num_free_gpu_block as f64;
                    let per_request_cost =
                        (info.num_block_last_running_request.max(1)) as f64;
                    let remaining_steps = free / per_request_cost;
                    // Invert: fewer remaining steps -> higher load. Bounded
                    // below by 0 so a device with abundant free blocks
                    // approaches, but never goes below, zero load.
                    1.0 / (1.0 + remaining_steps)
                        + info.num_running_request as f64
                        + 10.0 * info.num_killed_request as f64
                }
            },
        }
    }

    fn occupancy_ratio(info: &InstanceInfo) -> f64 {
        if info.num_total_gpu_block == 0 {
            return 0.0;
        }
        info.num_used_gpu_block as f64 / info.num_total_gpu_block as f64
    }
}
