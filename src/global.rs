//! [`GlobalScheduler`]: the single entry point external collaborators
//! (the engine manager) talk to. Owns the instance registry and fans
//! heartbeats, dispatch, migrate and scale calls out to the three
//! sub-schedulers and the shared [`InstanceLoadCalculator`].

use std::collections::HashMap;
use std::collections::HashSet;

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::GlobalSchedulerConfig;
use crate::dispatch::DispatchScheduler;
use crate::error::SchedulerError;
use crate::instance::{InstanceId, InstanceInfo};
use crate::load::{Action, InstanceLoadCalculator};
use crate::migrate::MigrationScheduler;
use crate::scale::ScaleScheduler;

/// Read-only view of the registry for an external metrics exporter or
/// debug endpoint. Cheap to clone; does not hold the registry lock.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub num_instance: usize,
    pub loads: Vec<(InstanceId, f64, f64)>, // (id, dispatch load, migrate load)
}

impl Snapshot {
    /// Convenience encoding for a metrics exporter that polls this hook over
    /// HTTP; the crate itself ships no HTTP stack (see SPEC_FULL.md §2,
    /// "Metrics hook").
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

struct Registry {
    instance_info: HashMap<InstanceId, InstanceInfo>,
    instance_id_set: HashSet<InstanceId>,
}

impl Registry {
    fn new() -> Self {
        Registry {
            instance_info: HashMap::new(),
            instance_id_set: HashSet::new(),
        }
    }

    fn num_instance(&self) -> usize {
        debug_assert_eq!(self.instance_info.len(), self.instance_id_set.len());
        self.instance_id_set.len()
    }

    /// Shallow snapshot of current values, taken while holding the lock and
    /// handed to sub-scheduler policies, which then sort/iterate it lock-free.
    fn values_snapshot(&self) -> Vec<InstanceInfo> {
        self.instance_info.values().cloned().collect()
    }
}

/// Owns the instance registry and composes the three policy engines.
///
/// All operations are synchronous and serialize on a single
/// `parking_lot::Mutex` around the registry (see SPEC_FULL.md §5): readers
/// snapshot-and-release before doing any sorting or scoring work, so the
/// critical section stays O(N) regardless of policy complexity.
pub struct GlobalScheduler {
    config: GlobalSchedulerConfig,
    calculator: InstanceLoadCalculator,
    dispatch_scheduler: DispatchScheduler,
    migration_scheduler: MigrationScheduler,
    scale_scheduler: ScaleScheduler,
    registry: Mutex<Registry>,
}

impl GlobalScheduler {
    pub fn new(config: GlobalSchedulerConfig) -> Self {
        let calculator = InstanceLoadCalculator::new(config.load_metric, config.enable_prefill_migrate);
        let dispatch_scheduler = DispatchScheduler::new(config.dispatch_policy);
        let migration_scheduler = MigrationScheduler::new(
            config.check_migrate_policy,
            config.migrate_out_load_threshold,
            config.enable_prefill_migrate,
        );
        let scale_scheduler = ScaleScheduler::new(
            config.scale_policy,
            config.scale_up_threshold,
            config.scale_down_threshold,
            config.num_total_gpu_block,
        );
        GlobalScheduler {
            config,
            calculator,
            dispatch_scheduler,
            migration_scheduler,
            scale_scheduler,
            registry: Mutex::new(Registry::new()),
        }
    }

    /// Enable `env_logger` for embedders that don't already configure their
    /// own logging. A no-op if a logger is already installed.
    #[cfg(feature = "init_env_logger")]
    pub fn init_logging() {
        let _ = env_logger::try_init();
    }

    pub fn config(&self) -> &GlobalSchedulerConfig {
        &self.config
    }

    pub fn num_instance(&self) -> usize {
        self.registry.lock().num_instance()
    }

    /// Ingest a batch of heartbeats. For each info whose id is present in
    /// the registry, recompute its two derived load scalars and overwrite
    /// the entry. Infos for unknown ids are dropped silently — this races
    /// harmlessly against a concurrent `scale_down`.
    pub fn update_instance_infos(&self, instance_infos: Vec<InstanceInfo>) {
        let mut registry = self.registry.lock();
        for mut info in instance_infos {
            if registry.instance_info.contains_key(&info.instance_id) {
                info.instance_load_dispatch_scale =
                    self.calculator.compute_instance_load(&info, Action::Dispatch);
                info.instance_load_migrate = self.calculator.compute_instance_load(&info, Action::Migrate);
                registry.instance_info.insert(info.instance_id.clone(), info);
            } else {
                log::debug!("dropping heartbeat for unknown instance {}", info.instance_id);
            }
        }
    }

    /// Pick one instance for an incoming request, per the configured
    /// [`crate::config::DispatchPolicy`]. Fails only when the fleet is empty.
    pub fn dispatch(&self) -> Result<InstanceId, SchedulerError> {
        let mut registry = self.registry.lock();
        let mut snapshot = registry.values_snapshot();
        let chosen = self.dispatch_scheduler.dispatch(&mut snapshot)?;
        // Propagate the bumped num_dispatched_request back into the
        // registry so subsequent dispatch/flood tie-breaks see it.
        if let Some(updated) = snapshot.into_iter().find(|i| i.instance_id == chosen) {
            registry.instance_info.insert(chosen.clone(), updated);
        }
        Ok(chosen)
    }

    /// List of (source, destination) migration pairs under the configured
    /// [`crate::config::MigratePolicy`] (forced to `balanced` if
    /// `enable_prefill_migrate` is false).
    pub fn check_migrate(&self) -> Vec<(InstanceId, InstanceId)> {
        let snapshot = {
            let registry = self.registry.lock();
            registry.values_snapshot()
        };
        let pairs = self.migration_scheduler.check_migrate(&snapshot, &self.calculator);
        if !pairs.is_empty() {
            log::info!("check_migrate emitting {} pair(s): {:?}", pairs.len(), pairs);
        }
        pairs
    }

    /// `(scale_up_num, scale_down_num)` under the configured
    /// [`crate::config::ScalePolicy`].
    pub fn check_scale(&self) -> (u32, u32) {
        let snapshot = {
            let registry = self.registry.lock();
            registry.values_snapshot()
        };
        self.scale_scheduler.check_scale(&snapshot)
    }

    /// Admit one or more new instances. Ids already present are silently
    /// ignored (idempotent).
    pub fn scale_up<I, T>(&self, ids: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<InstanceId>,
    {
        let mut registry = self.registry.lock();
        for raw_id in ids {
            let id = raw_id.into();
            if registry.instance_info.contains_key(&id) {
                log::debug!("scale_up: instance {id} already present, ignoring");
                continue;
            }
            log::info!("scale up instance: {id}");
            let empty = self.scale_scheduler.get_empty_instance_info(id.clone());
            registry.instance_info.insert(id.clone(), empty);
            registry.instance_id_set.insert(id);
        }
        log::info!(
            "num_instance: {}, instances: {:?}",
            registry.num_instance(),
            registry.instance_id_set
        );
    }

    /// Remove one or more instances. Ids absent from the registry are
    /// silently ignored (idempotent).
    pub fn scale_down<I, T>(&self, ids: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<InstanceId>,
    {
        let mut registry = self.registry.lock();
        for raw_id in ids {
            let id = raw_id.into();
            if !registry.instance_info.contains_key(&id) {
                log::debug!("scale_down: instance {id} not present, ignoring");
                continue;
            }
            log::info!("scale down instance: {id}");
            registry.instance_info.remove(&id);
            registry.instance_id_set.remove(&id);
        }
        log::info!(
            "num_instance: {}, instances: {:?}",
            registry.num_instance(),
            registry.instance_id_set
        );
    }

    /// Read-only view for an external metrics exporter; does not hold the
    /// registry lock beyond the copy itself.
    pub fn snapshot(&self) -> Snapshot {
        let registry = self.registry.lock();
        let loads = registry
            .instance_info
            .values()
            .map(|i| (i.instance_id.clone(), i.instance_load_dispatch_scale, i.instance_load_migrate))
            .collect();
        Snapshot {
            num_instance: registry.num_instance(),
            loads,
        }
    }
}
