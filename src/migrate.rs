//! [`MigrationScheduler`]: emits (source, destination) migration pairs to
//! rebalance load or unblock killed requests.

use itertools::Itertools;

use crate::config::MigratePolicy;
use crate::instance::{InstanceId, InstanceInfo};
use crate::load::{Action, InstanceLoadCalculator};

/// Direction of a hypothetical migration, for [`project`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The instance is receiving one more running request.
    In,
    /// The instance is giving up one running request.
    Out,
}

/// Pure projection of an instance's migrate load as if one request were
/// added (`In`) or removed (`Out`), consuming or freeing
/// `num_block_last_running_request` blocks. Takes the relevant fields by
/// value rather than deep-cloning the whole record (see DESIGN.md, "Deep
/// copy in Balanced's projection").
pub fn project(info: &InstanceInfo, direction: Direction, calculator: &InstanceLoadCalculator) -> f64 {
    let mut projected = info.clone();
    match direction {
        Direction::In => {
            projected.num_running_request += 1;
            projected.num_free_gpu_block = projected
                .num_free_gpu_block
                .saturating_sub(info.num_block_last_running_request);
        }
        Direction::Out => {
            projected.num_running_request = projected.num_running_request.saturating_sub(1);
            projected.num_free_gpu_block += info.num_block_last_running_request;
        }
    }
    calculator.compute_instance_load(&projected, Action::Migrate)
}

/// Emits migration pairs under a configured [`MigratePolicy`].
///
/// If `enable_prefill_migrate` is false on the calculator, the configured
/// policy is overridden and `balanced` is used unconditionally, per §4.3.
#[derive(Debug, Clone, Copy)]
pub struct MigrationScheduler {
    policy: MigratePolicy,
    migrate_out_load_threshold: f64,
}

impl MigrationScheduler {
    pub fn new(policy: MigratePolicy, migrate_out_load_threshold: f64, enable_prefill_migrate: bool) -> Self {
        let effective_policy = if enable_prefill_migrate {
            policy
        } else {
            MigratePolicy::Balanced
        };
        MigrationScheduler {
            policy: effective_policy,
            migrate_out_load_threshold,
        }
    }

    pub fn policy(&self) -> MigratePolicy {
        self.policy
    }

    /// Compute migration pairs from a snapshot of the registry. The
    /// snapshot is sorted ascending by `instance_load_migrate` internally;
    /// callers do not need to pre-sort.
    pub fn check_migrate(
        &self,
        snapshot: &[InstanceInfo],
        calculator: &InstanceLoadCalculator,
    ) -> Vec<(InstanceId, InstanceId)> {
        let sorted: Vec<&InstanceInfo> = snapshot
            .iter()
            .sorted_by(|a, b| {
                a.instance_load_migrate
                    .partial_cmp(&b.instance_load_migrate)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .collect();

        match self.policy {
            MigratePolicy::Balanced => self.balanced(&sorted, calculator),
            MigratePolicy::PrefillConstrained => self.prefill_constrained(&sorted),
            MigratePolicy::PrefillRelaxed => self.prefill_relaxed(&sorted),
        }
    }

    fn destinations<'a>(&self, sorted_ascending: &[&'a InstanceInfo]) -> Vec<&'a InstanceInfo> {
        sorted_ascending
            .iter()
            .copied()
            .filter(|i| i.num_killed_request == 0 && i.instance_load_migrate < self.migrate_out_load_threshold)
            .collect()
    }

    fn sources<'a>(&self, sorted_ascending: &[&'a InstanceInfo]) -> Vec<&'a InstanceInfo> {
        sorted_ascending
            .iter()
            .rev()
            .copied()
            .filter(|i| i.num_killed_request > 0 || i.instance_load_migrate > self.migrate_out_load_threshold)
            .collect()
    }

    fn balanced(
        &self,
        sorted_ascending: &[&InstanceInfo],
        calculator: &InstanceLoadCalculator,
    ) -> Vec<(InstanceId, InstanceId)> {
        let destinations = self.destinations(sorted_ascending);
        let sources = self.sources(sorted_ascending);

        let mut pairs = Vec::new();
        for (dst, src) in destinations.iter().zip(sources.iter()) {
            let gap_before = src.instance_load_migrate - dst.instance_load_migrate;
            let dst_after = project(dst, Direction::In, calculator);
            let src_after = project(src, Direction::Out, calculator);

            if dst_after > self.migrate_out_load_threshold {
                continue;
            }
            let gap_after = src_after - dst_after;
            let makes_progress = gap_after > 0.0 && gap_after < gap_before;
            let destination_is_fresh = dst.instance_load_migrate == f64::NEG_INFINITY;
            if makes_progress || destination_is_fresh {
                pairs.push((src.instance_id.clone(), dst.instance_id.clone()));
            }
        }
        pairs
    }

    fn prefill_constrained(&self, sorted_ascending: &[&InstanceInfo]) -> Vec<(InstanceId, InstanceId)> {
        let destinations = self.destinations(sorted_ascending);
        let sources = self.sources(sorted_ascending);
        destinations
            .iter()
            .zip(sources.iter())
            .map(|(dst, src)| (src.instance_id.clone(), dst.instance_id.clone()))
            .collect()
    }

    fn prefill_relaxed(&self, sorted_ascending: &[&InstanceInfo]) -> Vec<(InstanceId, InstanceId)> {
        let destinations = self.destinations(sorted_ascending);
        let sources: Vec<&InstanceInfo> = sorted_ascending.iter().rev().copied().collect();
        destinations
            .iter()
            .zip(sources.iter())
            .filter(|(dst, src)| dst.instance_id != src.instance_id)
            .map(|(dst, src)| (src.instance_id.clone(), dst.instance_id.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::LoadMetric;

    fn calc() -> InstanceLoadCalculator {
        InstanceLoadCalculator::new(LoadMetric::RemainingSteps, true)
    }

    /// Build an instance with its derived migrate load computed the same
    /// way `GlobalScheduler::update_instance_infos` would, so projections
    /// in the code under test stay consistent with the stored load.
    fn info(
        id: &str,
        running: u64,
        free: u64,
        total: u64,
        killed: u64,
        last_running_blocks: u64,
        calculator: &InstanceLoadCalculator,
    ) -> InstanceInfo {
        let mut i = InstanceInfo::new(InstanceId::new(id));
        i.num_running_request = running;
        i.num_free_gpu_block = free;
        i.num_used_gpu_block = total - free;
        i.num_total_gpu_block = total;
        i.num_killed_request = killed;
        i.num_block_last_running_request = last_running_blocks;
        i.instance_load_migrate = calculator.compute_instance_load(&i, Action::Migrate);
        i
    }

    #[test]
    fn every_pair_has_distinct_endpoints_in_the_registry() {
        let calculator = calc();
        let sched = MigrationScheduler::new(MigratePolicy::Balanced, 3.0, true);
        let snapshot = vec![
            info("hot", 5, 0, 100, 0, 10, &calculator),
            info("cold", 0, 80, 100, 0, 10, &calculator),
        ];
        let pairs = sched.check_migrate(&snapshot, &calculator);
        let ids: Vec<&str> = snapshot.iter().map(|i| i.instance_id.0.as_str()).collect();
        for (s, d) in &pairs {
            assert_ne!(s, d);
            assert!(ids.contains(&s.0.as_str()));
            assert!(ids.contains(&d.0.as_str()));
        }
    }

    #[test]
    fn balanced_rejects_pair_when_destination_projection_exceeds_threshold() {
        // Mirrors the rejected half of scenario S2: destination's
        // projected post-migration load would exceed the threshold.
        let calculator = calc();
        let sched = MigrationScheduler::new(MigratePolicy::Balanced, 1.0, true);
        let hot = info("hot", 5, 0, 100, 0, 10, &calculator);
        let cold = info("cold", 0, 15, 100, 0, 10, &calculator);
        let pairs = sched.check_migrate(&[hot, cold], &calculator);
        assert!(pairs.is_empty());
    }

    #[test]
    fn balanced_accepts_pair_that_narrows_the_gap_without_overshoot() {
        // Mirrors the accepted half of scenario S2.
        let calculator = calc();
        let sched = MigrationScheduler::new(MigratePolicy::Balanced, 3.0, true);
        let hot = info("hot", 5, 0, 100, 0, 10, &calculator);
        let cold = info("cold", 0, 80, 100, 0, 10, &calculator);
        let pairs = sched.check_migrate(&[hot, cold], &calculator);
        assert_eq!(pairs, vec![(InstanceId::new("hot"), InstanceId::new("cold"))]);
    }

    #[test]
    fn s3_fresh_instance_attracts_migration_regardless_of_gap_rules() {
        let calculator = calc();
        let sched = MigrationScheduler::new(MigratePolicy::Balanced, 3.0, true);
        let hot = info("hot", 5, 0, 100, 0, 10, &calculator);
        let fresh = InstanceInfo::empty(InstanceId::new("new"), 100);
        let pairs = sched.check_migrate(&[hot, fresh], &calculator);
        assert_eq!(pairs, vec![(InstanceId::new("hot"), InstanceId::new("new"))]);
    }

    #[test]
    fn killed_request_instance_is_always_a_source() {
        let calculator = calc();
        let sched = MigrationScheduler::new(MigratePolicy::Balanced, 3.0, true);
        let killed = info("killed", 0, 100, 100, 1, 1, &calculator);
        let cold = info("cold", 0, 100, 100, 0, 1, &calculator);
        let pairs = sched.check_migrate(&[killed, cold], &calculator);
        assert_eq!(pairs, vec![(InstanceId::new("killed"), InstanceId::new("cold"))]);
    }

    #[test]
    fn disable_prefill_migrate_forces_balanced_regardless_of_configured_policy() {
        let sched = MigrationScheduler::new(MigratePolicy::PrefillRelaxed, 3.0, false);
        assert_eq!(sched.policy(), MigratePolicy::Balanced);
    }

    #[test]
    fn prefill_constrained_emits_unconditionally() {
        // Same fleet as the rejected Balanced case above, but
        // PrefillConstrained has no projected-load gate.
        let calculator = calc();
        let sched = MigrationScheduler::new(MigratePolicy::PrefillConstrained, 1.0, true);
        let hot = info("hot", 5, 0, 100, 0, 10, &calculator);
        let cold = info("cold", 0, 15, 100, 0, 10, &calculator);
        let pairs = sched.check_migrate(&[hot, cold], &calculator);
        assert_eq!(pairs, vec![(InstanceId::new("hot"), InstanceId::new("cold"))]);
    }

    #[test]
    fn randomized_fleets_never_violate_balanced_pair_invariants() {
        // Invariant 4 from the testable-properties list: every emitted pair
        // has distinct endpoints, both known to the registry, and under
        // `balanced` the destination is never a killed-request-bearing or
        // over-threshold instance. Exercised over many random fleets rather
        // than hand-picked ones, seeded for reproducibility.
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let calculator = calc();
        let threshold = 3.0;
        let sched = MigrationScheduler::new(MigratePolicy::Balanced, threshold, true);
        let mut rng = StdRng::seed_from_u64(0xFEED_5CA1);

        for _ in 0..200 {
            let size = rng.gen_range(0..12);
            let snapshot: Vec<InstanceInfo> = (0..size)
                .map(|i| {
                    let total = 128u64;
                    let used = rng.gen_range(0..=total);
                    info(
                        &format!("inst-{i}"),
                        rng.gen_range(0..8),
                        total - used,
                        total,
                        if rng.gen_bool(0.1) { 1 } else { 0 },
                        rng.gen_range(1..16),
                        &calculator,
                    )
                })
                .collect();
            let ids: Vec<&str> = snapshot.iter().map(|i| i.instance_id.0.as_str()).collect();

            let pairs = sched.check_migrate(&snapshot, &calculator);
            for (s, d) in &pairs {
                assert_ne!(s, d);
                assert!(ids.contains(&s.0.as_str()));
                assert!(ids.contains(&d.0.as_str()));
                let dst = snapshot.iter().find(|i| i.instance_id == *d).unwrap();
                assert_eq!(dst.num_killed_request, 0);
                assert!(dst.instance_load_migrate < threshold);
            }
        }
    }

    #[test]
    fn prefill_relaxed_drops_self_pairs() {
        let calculator = calc();
        let sched = MigrationScheduler::new(MigratePolicy::PrefillRelaxed, 100.0, true);
        // The only destination-eligible instance is also R's hottest (and
        // only) entry; relaxed's R is unfiltered so source == destination
        // and the pair must be dropped.
        let only = info("solo", 0, 90, 100, 0, 1, &calculator);
        let pairs = sched.check_migrate(&[only], &calculator);
        assert!(pairs.is_empty());
    }
}
