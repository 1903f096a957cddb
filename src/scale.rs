//! [`ScaleScheduler`]: decides when the fleet should grow or shrink.

use crate::config::ScalePolicy;
use crate::instance::{InstanceId, InstanceInfo};

/// Computes `(scale_up_num, scale_down_num)` from an aggregate load over
/// the registry, and supplies the canonical empty [`InstanceInfo`] for
/// newly admitted instances.
#[derive(Debug, Clone, Copy)]
pub struct ScaleScheduler {
    policy: ScalePolicy,
    scale_up_threshold: f64,
    scale_down_threshold: f64,
    num_total_gpu_block: u64,
}

impl ScaleScheduler {
    pub fn new(
        policy: ScalePolicy,
        scale_up_threshold: f64,
        scale_down_threshold: f64,
        num_total_gpu_block: u64,
    ) -> Self {
        debug_assert!(scale_down_threshold <= scale_up_threshold);
        ScaleScheduler {
            policy,
            scale_up_threshold,
            scale_down_threshold,
            num_total_gpu_block,
        }
    }

    /// `(1, 0)` to scale up, `(0, 1)` to scale down, `(0, 0)` to hold. Never
    /// both non-zero. An empty registry holds.
    pub fn check_scale(&self, snapshot: &[InstanceInfo]) -> (u32, u32) {
        if snapshot.is_empty() {
            return (0, 0);
        }

        let aggregate = match self.policy {
            ScalePolicy::MaxLoad => snapshot
                .iter()
                .map(|i| i.instance_load_dispatch_scale)
                .fold(f64::NEG_INFINITY, f64::max),
            ScalePolicy::AvgLoad => {
                let sum: f64 = snapshot.iter().map(|i| i.instance_load_dispatch_scale).sum();
                sum / snapshot.len() as f64
            }
        };

        if aggregate > self.scale_up_threshold {
            log::info!("{:?} aggregate load {aggregate:.3} > scale_up_threshold, scaling up", self.policy);
            (1, 0)
        } else if aggregate < self.scale_down_threshold {
            log::info!("{:?} aggregate load {aggregate:.3} < scale_down_threshold, scaling down", self.policy);
            (0, 1)
        } else {
            (0, 0)
        }
    }

    /// Canonical fresh record for an admitted instance: zero counters, full
    /// free blocks, and `-inf` derived loads.
    pub fn get_empty_instance_info(&self, instance_id: InstanceId) -> InstanceInfo {
        InstanceInfo::empty(instance_id, self.num_total_gpu_block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_with_load(id: &str, load: f64) -> InstanceInfo {
        let mut i = InstanceInfo::new(InstanceId::new(id));
        i.instance_load_dispatch_scale = load;
        i
    }

    #[test]
    fn s4_scale_up_trigger() {
        let sched = ScaleScheduler::new(ScalePolicy::AvgLoad, 0.8, 0.2, 0);
        let snapshot = vec![info_with_load("a", 0.9), info_with_load("b", 0.9)];
        assert_eq!(sched.check_scale(&snapshot), (1, 0));
    }

    #[test]
    fn s5_scale_down_trigger() {
        let sched = ScaleScheduler::new(ScalePolicy::AvgLoad, 0.8, 0.2, 0);
        let snapshot = vec![info_with_load("a", 0.1), info_with_load("b", 0.1)];
        assert_eq!(sched.check_scale(&snapshot), (0, 1));
    }

    #[test]
    fn in_band_load_holds_steady() {
        let sched = ScaleScheduler::new(ScalePolicy::AvgLoad, 0.8, 0.2, 0);
        let snapshot = vec![info_with_load("a", 0.5)];
        assert_eq!(sched.check_scale(&snapshot), (0, 0));
    }

    #[test]
    fn max_load_policy_uses_the_hottest_instance() {
        let sched = ScaleScheduler::new(ScalePolicy::MaxLoad, 0.8, 0.2, 0);
        let snapshot = vec![info_with_load("a", 0.1), info_with_load("b", 0.95)];
        assert_eq!(sched.check_scale(&snapshot), (1, 0));
    }

    #[test]
    fn empty_registry_holds() {
        let sched = ScaleScheduler::new(ScalePolicy::AvgLoad, 0.8, 0.2, 0);
        assert_eq!(sched.check_scale(&[]), (0, 0));
    }

    #[test]
    fn empty_instance_info_has_full_free_blocks_and_sentinel_loads() {
        let sched = ScaleScheduler::new(ScalePolicy::AvgLoad, 0.8, 0.2, 128);
        let info = sched.get_empty_instance_info(InstanceId::new("fresh"));
        assert_eq!(info.num_free_gpu_block, 128);
        assert_eq!(info.instance_load_dispatch_scale, f64::NEG_INFINITY);
        assert_eq!(info.instance_load_migrate, f64::NEG_INFINITY);
    }
}
