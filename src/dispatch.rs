//! [`DispatchScheduler`]: picks one instance per incoming request.

use crate::config::DispatchPolicy;
use crate::error::SchedulerError;
use crate::instance::{InstanceId, InstanceInfo};

/// Selects an instance under a configured [`DispatchPolicy`].
///
/// A pure function over a snapshot plus the mutable, advisory
/// `num_dispatched_request` tie-break counter it updates after each pick
/// (see DESIGN.md, "Sub-scheduler state duplication" — the snapshot itself
/// is owned by [`crate::GlobalScheduler`], not mirrored here).
#[derive(Debug, Clone, Copy)]
pub struct DispatchScheduler {
    policy: DispatchPolicy,
}

impl DispatchScheduler {
    pub fn new(policy: DispatchPolicy) -> Self {
        DispatchScheduler { policy }
    }

    /// Choose one instance from `snapshot` and bump its
    /// `num_dispatched_request` counter in place. `snapshot` must be
    /// non-empty or [`SchedulerError::EmptyFleet`] is returned.
    pub fn dispatch(&self, snapshot: &mut [InstanceInfo]) -> Result<InstanceId, SchedulerError> {
        if snapshot.is_empty() {
            return Err(SchedulerError::EmptyFleet);
        }

        let chosen_index = match self.policy {
            DispatchPolicy::Load => Self::select(snapshot, |i| i.instance_load_dispatch_scale, Ordering::Smallest),
            DispatchPolicy::Queue => Self::select(snapshot, |i| i.num_waiting_request as f64, Ordering::Smallest),
            DispatchPolicy::Flood => Self::select(snapshot, |i| i.num_dispatched_request as f64, Ordering::Largest),
        };

        let chosen = &mut snapshot[chosen_index];
        chosen.num_dispatched_request += 1;
        let id = chosen.instance_id.clone();
        log::debug!(
            "dispatch policy={:?} chose {} (dispatched_count now {})",
            self.policy,
            id,
            chosen.num_dispatched_request
        );
        Ok(id)
    }

    /// Select the index minimizing (or maximizing) `key`, with ties broken
    /// by smallest `num_dispatched_request` then lexicographic
    /// `instance_id`. `flood` uses the largest-wins ordering and inverts the
    /// tie-break direction to match (largest `instance_id` wins a full tie).
    fn select(snapshot: &[InstanceInfo], key: impl Fn(&InstanceInfo) -> f64, ordering: Ordering) -> usize {
        let mut best = 0usize;
        for idx in 1..snapshot.len() {
            if Self::is_better(&snapshot[idx], &snapshot[best], &key, ordering) {
                best = idx;
            }
        }
        best
    }

    fn is_better(
        candidate: &InstanceInfo,
        current_best: &InstanceInfo,
        key: &impl Fn(&InstanceInfo) -> f64,
        ordering: Ordering,
    ) -> bool {
        let (c, b) = (key(candidate), key(current_best));
        let primary = match ordering {
            Ordering::Smallest => c < b,
            Ordering::Largest => c > b,
        };
        if primary {
            return true;
        }
        if c != b {
            return false;
        }
        // Primary key tied: smallest num_dispatched_request wins next,
        // inverted to largest for `flood` (whose primary key already *is*
        // num_dispatched_request, so this branch only fires via float
        // equality on the primary key and keeps the same direction as it).
        if candidate.num_dispatched_request != current_best.num_dispatched_request {
            return match ordering {
                Ordering::Smallest => candidate.num_dispatched_request < current_best.num_dispatched_request,
                Ordering::Largest => candidate.num_dispatched_request > current_best.num_dispatched_request,
            };
        }
        // Fully tied: lexicographic instance_id wins, for determinism;
        // `flood` inverts this to largest-`instance_id`-wins per spec.
        match ordering {
            Ordering::Smallest => candidate.instance_id < current_best.instance_id,
            Ordering::Largest => candidate.instance_id > current_best.instance_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ordering {
    Smallest,
    Largest,
}
