//! [`InstanceInfo`]: the per-instance load snapshot the rest of the
//! scheduler is built around.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, fleet-unique identifier of one serving instance.
///
/// A newtype rather than a bare `String` so instance ids can't be silently
/// mixed up with other string-typed identifiers (request ids, model names)
/// at the call site.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        InstanceId(id.into())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        InstanceId(s.to_owned())
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        InstanceId(s)
    }
}

/// A point-in-time load snapshot for one instance.
///
/// Every field except the two `instance_load_*` scalars is reported as-is
/// by a heartbeat; the load scalars are derived by
/// [`crate::load::InstanceLoadCalculator`] at ingestion time and must never
/// be set directly by callers assembling a heartbeat (see
/// [`InstanceInfo::new`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub instance_id: InstanceId,

    pub num_running_request: u64,
    pub num_waiting_request: u64,
    pub num_killed_request: u64,

    pub num_total_gpu_block: u64,
    pub num_free_gpu_block: u64,
    pub num_used_gpu_block: u64,

    pub num_block_first_waiting_request: u64,
    pub num_block_last_running_request: u64,

    pub num_batched_tokens: u64,

    /// Advisory counter used only for dispatch tie-breaks and the `flood`
    /// policy. Never reset by heartbeats; only `DispatchScheduler::dispatch`
    /// increments it.
    pub num_dispatched_request: u64,

    /// Derived by [`crate::load::InstanceLoadCalculator`] for `Action::Dispatch`.
    pub instance_load_dispatch_scale: f64,
    /// Derived by [`crate::load::InstanceLoadCalculator`] for `Action::Migrate`.
    pub instance_load_migrate: f64,
}

impl InstanceInfo {
    /// Construct a heartbeat record with fresh counters and sentinel
    /// (unset) derived loads. Callers reporting a heartbeat should use this
    /// constructor and let [`crate::GlobalScheduler::update_instance_infos`]
    /// fill in the derived scalars; heartbeats never carry a caller-supplied
    /// load value.
    pub fn new(instance_id: InstanceId) -> Self {
        InstanceInfo {
            instance_id,
            num_running_request: 0,
            num_waiting_request: 0,
            num_killed_request: 0,
            num_total_gpu_block: 0,
            num_free_gpu_block: 0,
            num_used_gpu_block: 0,
            num_block_first_waiting_request: 0,
            num_block_last_running_request: 0,
            num_batched_tokens: 0,
            num_dispatched_request: 0,
            instance_load_dispatch_scale: f64::NEG_INFINITY,
            instance_load_migrate: f64::NEG_INFINITY,
        }
    }

    /// The canonical empty record for a freshly admitted instance: zero
    /// counters, full free blocks, and sentinel `-inf` derived loads so the
    /// instance is preferred as a migration destination and dispatch target
    /// until its first real heartbeat arrives.
    pub fn empty(instance_id: InstanceId, num_total_gpu_block: u64) -> Self {
        InstanceInfo {
            num_total_gpu_block,
            num_free_gpu_block: num_total_gpu_block,
            ..InstanceInfo::new(instance_id)
        }
    }

    /// `true` if this instance has never received a real heartbeat (still
    /// carrying the sentinel dispatch/migrate loads from admission).
    pub fn is_fresh(&self) -> bool {
        self.instance_load_migrate == f64::NEG_INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_instance_has_sentinel_loads_and_full_blocks() {
        let info = InstanceInfo::empty(InstanceId::new("a"), 100);
        assert_eq!(info.num_free_gpu_block, 100);
        assert_eq!(info.num_used_gpu_block, 0);
        assert!(info.is_fresh());
        assert_eq!(info.instance_load_dispatch_scale, f64::NEG_INFINITY);
        assert_eq!(info.instance_load_migrate, f64::NEG_INFINITY);
    }

    #[test]
    fn used_plus_free_invariant_holds_for_empty() {
        let info = InstanceInfo::empty(InstanceId::new("a"), 64);
        assert_eq!(info.num_used_gpu_block + info.num_free_gpu_block, info.num_total_gpu_block);
    }
}
