//! Fleet-level scheduling for a pool of LLM inference instances.
//!
//! [`GlobalScheduler`] is the single entry point: it owns the instance
//! registry and composes three independent policy engines —
//! [`DispatchScheduler`] (pick one instance per request),
//! [`MigrationScheduler`] (rebalance load across instances) and
//! [`ScaleScheduler`] (grow or shrink the fleet) — over a shared
//! [`InstanceLoadCalculator`].

mod config;
mod dispatch;
mod error;
mod global;
mod instance;
mod load;
mod migrate;
mod scale;

pub use config::{
    DispatchPolicy, GlobalSchedulerConfig, MigratePolicy, RawGlobalSchedulerConfig, ScalePolicy,
};
#[cfg(feature = "figment_config")]
pub use config::load_config;
pub use dispatch::DispatchScheduler;
pub use error::{ConfigError, SchedulerError};
pub use global::{GlobalScheduler, Snapshot};
pub use instance::{InstanceId, InstanceInfo};
pub use load::{Action, InstanceLoadCalculator, LoadMetric};
pub use migrate::{project, Direction, MigrationScheduler};
pub use scale::ScaleScheduler;
