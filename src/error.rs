//! Error types raised by the fleet scheduler.
//!
//! Per the error handling design, only two conditions are ever surfaced to
//! callers as an `Err`: a malformed configuration (rejected at construction)
//! and dispatch against an empty fleet. Everything else recoverable by
//! construction (stale heartbeats, double scale calls) is absorbed and
//! logged rather than raised.

use thiserror::Error;

/// Top-level error type returned by [`crate::GlobalScheduler`] operations.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum SchedulerError {
    #[error("invalid scheduler configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("dispatch() called with an empty fleet")]
    EmptyFleet,
}

/// Errors raised while validating a [`crate::config::GlobalSchedulerConfig`].
#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("unknown load_metric: {0}")]
    UnknownLoadMetric(String),

    #[error("unknown dispatch_policy: {0}")]
    UnknownDispatchPolicy(String),

    #[error("unknown check_migrate_policy: {0}")]
    UnknownMigratePolicy(String),

    #[error("unknown scale_policy: {0}")]
    UnknownScalePolicy(String),

    #[error("scale_down_threshold ({scale_down}) must be <= scale_up_threshold ({scale_up})")]
    InvertedScaleThresholds { scale_down: f64, scale_up: f64 },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
