//! Scheduler configuration: policy selection and thresholds, resolved once
//! at construction into tagged enums rather than looked up by string at
//! every call (see DESIGN.md, "Policy selection").

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::load::LoadMetric;

/// Dispatch policy. See [`crate::dispatch::DispatchScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    Load,
    Queue,
    Flood,
}

impl DispatchPolicy {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "load" => Ok(DispatchPolicy::Load),
            "queue" => Ok(DispatchPolicy::Queue),
            "flood" => Ok(DispatchPolicy::Flood),
            other => Err(ConfigError::UnknownDispatchPolicy(other.to_owned())),
        }
    }
}

/// Migration policy. See [`crate::migrate::MigrationScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigratePolicy {
    Balanced,
    PrefillConstrained,
    PrefillRelaxed,
}

impl MigratePolicy {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "balanced" => Ok(MigratePolicy::Balanced),
            "prefill_constrained" => Ok(MigratePolicy::PrefillConstrained),
            "prefill_relaxed" => Ok(MigratePolicy::PrefillRelaxed),
            other => Err(ConfigError::UnknownMigratePolicy(other.to_owned())),
        }
    }
}

/// Scale policy. See [`crate::scale::ScaleScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalePolicy {
    MaxLoad,
    AvgLoad,
}

impl ScalePolicy {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "max_load" => Ok(ScalePolicy::MaxLoad),
            "avg_load" => Ok(ScalePolicy::AvgLoad),
            other => Err(ConfigError::UnknownScalePolicy(other.to_owned())),
        }
    }
}

/// Raw, string-keyed configuration as it would arrive from a TOML file or
/// environment variables (via `figment`, behind the `figment_config`
/// feature). Validated into [`GlobalSchedulerConfig`] by
/// [`GlobalSchedulerConfig::try_from_raw`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawGlobalSchedulerConfig {
    #[serde(default = "default_load_metric")]
    pub load_metric: String,
    #[serde(default = "default_dispatch_policy")]
    pub dispatch_policy: String,
    #[serde(default = "default_migrate_policy")]
    pub check_migrate_policy: String,
    #[serde(default = "default_scale_policy")]
    pub scale_policy: String,
    #[serde(default = "default_migrate_out_load_threshold")]
    pub migrate_out_load_threshold: f64,
    #[serde(default = "default_scale_up_threshold")]
    pub scale_up_threshold: f64,
    #[serde(default = "default_scale_down_threshold")]
    pub scale_down_threshold: f64,
    #[serde(default = "default_enable_prefill_migrate")]
    pub enable_prefill_migrate: bool,
    #[serde(default = "default_num_total_gpu_block")]
    pub num_total_gpu_block: u64,
}

fn default_load_metric() -> String {
    "remaining_steps".to_owned()
}
fn default_dispatch_policy() -> String {
    "load".to_owned()
}
fn default_migrate_policy() -> String {
    "balanced".to_owned()
}
fn default_scale_policy() -> String {
    "avg_load".to_owned()
}
fn default_migrate_out_load_threshold() -> f64 {
    3.0
}
fn default_scale_up_threshold() -> f64 {
    10.0
}
fn default_scale_down_threshold() -> f64 {
    2.0
}
fn default_enable_prefill_migrate() -> bool {
    false
}
fn default_num_total_gpu_block() -> u64 {
    0
}

impl Default for RawGlobalSchedulerConfig {
    fn default() -> Self {
        RawGlobalSchedulerConfig {
            load_metric: default_load_metric(),
            dispatch_policy: default_dispatch_policy(),
            check_migrate_policy: default_migrate_policy(),
            scale_policy: default_scale_policy(),
            migrate_out_load_threshold: default_migrate_out_load_threshold(),
            scale_up_threshold: default_scale_up_threshold(),
            scale_down_threshold: default_scale_down_threshold(),
            enable_prefill_migrate: default_enable_prefill_migrate(),
            num_total_gpu_block: default_num_total_gpu_block(),
        }
    }
}

/// Validated, ready-to-construct configuration for [`crate::GlobalScheduler`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalSchedulerConfig {
    pub load_metric: LoadMetric,
    pub dispatch_policy: DispatchPolicy,
    pub check_migrate_policy: MigratePolicy,
    pub scale_policy: ScalePolicy,
    pub migrate_out_load_threshold: f64,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    pub enable_prefill_migrate: bool,
    /// Total GPU blocks assigned to a freshly admitted instance before its
    /// first heartbeat. 0 if the fleet has no fixed-size devices (the
    /// empty info then simply has no free blocks to report until the
    /// instance's own heartbeat corrects it).
    pub num_total_gpu_block: u64,
}

impl GlobalSchedulerConfig {
    pub fn try_from_raw(raw: &RawGlobalSchedulerConfig) -> Result<Self, ConfigError> {
        let load_metric = LoadMetric::parse(&raw.load_metric)
            .ok_or_else(|| ConfigError::UnknownLoadMetric(raw.load_metric.clone()))?;
        let dispatch_policy = DispatchPolicy::parse(&raw.dispatch_policy)?;
        let check_migrate_policy = MigratePolicy::parse(&raw.check_migrate_policy)?;
        let scale_policy = ScalePolicy::parse(&raw.scale_policy)?;
        if raw.scale_down_threshold > raw.scale_up_threshold {
            return Err(ConfigError::InvertedScaleThresholds {
                scale_down: raw.scale_down_threshold,
                scale_up: raw.scale_up_threshold,
            });
        }
        Ok(GlobalSchedulerConfig {
            load_metric,
            dispatch_policy,
            check_migrate_policy,
            scale_policy,
            migrate_out_load_threshold: raw.migrate_out_load_threshold,
            scale_up_threshold: raw.scale_up_threshold,
            scale_down_threshold: raw.scale_down_threshold,
            enable_prefill_migrate: raw.enable_prefill_migrate,
            num_total_gpu_block: raw.num_total_gpu_block,
        })
    }

    /// Construct directly from already-typed fields, validating only the
    /// threshold ordering invariant (the enums can't be malformed once
    /// typed). The entry point for embedders who build the config in code
    /// rather than loading it from a file.
    pub fn new(
        load_metric: LoadMetric,
        dispatch_policy: DispatchPolicy,
        check_migrate_policy: MigratePolicy,
        scale_policy: ScalePolicy,
        migrate_out_load_threshold: f64,
        scale_up_threshold: f64,
        scale_down_threshold: f64,
        enable_prefill_migrate: bool,
        num_total_gpu_block: u64,
    ) -> Result<Self, ConfigError> {
        if scale_down_threshold > scale_up_threshold {
            return Err(ConfigError::InvertedScaleThresholds {
                scale_down: scale_down_threshold,
                scale_up: scale_up_threshold,
            });
        }
        Ok(GlobalSchedulerConfig {
            load_metric,
            dispatch_policy,
            check_migrate_policy,
            scale_policy,
            migrate_out_load_threshold,
            scale_up_threshold,
            scale_down_threshold,
            enable_prefill_migrate,
            num_total_gpu_block,
        })
    }
}

impl Default for GlobalSchedulerConfig {
    fn default() -> Self {
        GlobalSchedulerConfig::try_from_raw(&RawGlobalSchedulerConfig::default())
            .expect("built-in defaults are always valid")
    }
}

/// Load a [`GlobalSchedulerConfig`] from a TOML file merged with
/// `FLEET_SCHEDULER_`-prefixed environment variables, matching the
/// teacher's `figment_config` pattern (`Figment::new().merge(Toml::file(..))`).
#[cfg(feature = "figment_config")]
pub fn load_config(path: impl AsRef<std::path::Path>) -> Result<GlobalSchedulerConfig, ConfigError> {
    use figment::{
        providers::{Env, Format, Toml},
        Figment,
    };

    let raw: RawGlobalSchedulerConfig = Figment::new()
        .merge(Toml::file(path.as_ref()))
        .merge(Env::prefixed("FLEET_SCHEDULER_"))
        .extract()
        .unwrap_or_else(|err| {
            log::warn!("falling back to default scheduler config: {err}");
            RawGlobalSchedulerConfig::default()
        });
    GlobalSchedulerConfig::try_from_raw(&raw)
}
