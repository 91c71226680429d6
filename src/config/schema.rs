//! Configuration schema definitions.
//!
//! This module defines the declarative part of a sentinel's configuration.
//! Resource handles, probes and external breakers are supplied in code through
//! the builder; everything here can also be loaded from a TOML file.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration::serde_duration;

/// Root configuration for a sentinel instance.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SentinelOptions {
    /// Primary name -> backup name.
    pub failover: BTreeMap<String, String>,

    /// Health check settings.
    pub health_check: HealthCheckOptions,

    /// Native circuit breaker settings. `None` disables circuit protection
    /// unless an external breaker is supplied to the builder.
    pub circuit_breaker: Option<CircuitBreakerOptions>,

    /// Notification channel settings.
    pub events: EventOptions,
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckOptions {
    /// Run the periodic health cycle after `connect()`.
    pub enabled: bool,

    /// Time between cycles.
    #[serde(with = "serde_duration")]
    pub interval: Duration,

    /// Per-attempt probe timeout.
    #[serde(with = "serde_duration")]
    pub timeout: Duration,

    /// Retry policy for failed attempts.
    pub retry: RetryOptions,
}

impl Default for HealthCheckOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            retry: RetryOptions::default(),
        }
    }
}

/// Retry configuration for health probes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Additional attempts after the first failure.
    pub retries: u32,

    /// Delay between attempts (the base delay for exponential backoff).
    #[serde(with = "serde_duration")]
    pub delay: Duration,

    /// How the delay grows between attempts.
    pub backoff: BackoffKind,

    /// Upper bound for exponential backoff.
    #[serde(with = "serde_duration")]
    pub max_delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            retries: 0,
            delay: Duration::from_secs(1),
            backoff: BackoffKind::Fixed,
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Delay growth between probe attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// Native circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerOptions {
    /// Consecutive failures while closed before the circuit opens.
    pub threshold: u32,

    /// Time spent open before a probing (half-open) call is allowed.
    #[serde(with = "serde_duration")]
    pub reset_timeout: Duration,

    /// Consecutive half-open successes needed to close again.
    pub half_open_successes: u32,
}

impl Default for CircuitBreakerOptions {
    fn default() -> Self {
        Self {
            threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_successes: 1,
        }
    }
}

/// Notification channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventOptions {
    /// Buffer size of the broadcast channel handed out by `subscribe()`.
    pub capacity: usize,
}

impl Default for EventOptions {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}
