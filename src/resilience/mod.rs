//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call against a resource:
//!     → Protection (per resource, chosen at construction)
//!         - circuit_breaker.rs (native closed/open/half-open machine)
//!         - adapter.rs (external breaker behind the same surface)
//!     → On probe failure: backoff.rs (delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Per-resource circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - The breaker flavour is fixed once; calls never re-inspect it

pub mod adapter;
pub mod backoff;
pub mod circuit_breaker;

use std::future::Future;

pub use adapter::{BreakerAdapter, CallMethod, ExternalBreaker, GuardedCall, GuardedFailure};
pub use circuit_breaker::{
    CircuitBreaker, CircuitError, CircuitObserver, CircuitSnapshot, CircuitState, CircuitTransition,
};

/// The circuit protection guarding one resource.
#[derive(Debug)]
pub enum Protection {
    Native(CircuitBreaker),
    Adapter(BreakerAdapter),
}

impl Protection {
    pub fn name(&self) -> &str {
        match self {
            Protection::Native(cb) => cb.name(),
            Protection::Adapter(a) => a.name(),
        }
    }

    pub fn state(&self) -> CircuitState {
        match self {
            Protection::Native(cb) => cb.state(),
            Protection::Adapter(a) => a.state(),
        }
    }

    pub fn can_execute(&self) -> bool {
        match self {
            Protection::Native(cb) => cb.can_execute(),
            Protection::Adapter(a) => a.can_execute(),
        }
    }

    pub fn failure_count(&self) -> u32 {
        match self {
            Protection::Native(cb) => cb.failure_count(),
            Protection::Adapter(a) => a.failure_count(),
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        match self {
            Protection::Native(cb) => cb.snapshot(),
            Protection::Adapter(a) => a.snapshot(),
        }
    }

    pub fn success(&self) -> bool {
        match self {
            Protection::Native(cb) => cb.success(),
            Protection::Adapter(a) => a.success(),
        }
    }

    pub fn failure(&self) -> bool {
        match self {
            Protection::Native(cb) => cb.failure(),
            Protection::Adapter(a) => a.failure(),
        }
    }

    pub fn force_open(&self, reason: Option<&str>) -> bool {
        match self {
            Protection::Native(cb) => cb.force_open(reason),
            Protection::Adapter(a) => a.force_open(reason),
        }
    }

    pub fn force_close(&self, reason: Option<&str>) -> bool {
        match self {
            Protection::Native(cb) => cb.force_close(reason),
            Protection::Adapter(a) => a.force_close(reason),
        }
    }

    pub async fn execute<Fut, R, E>(&self, operation: Fut) -> Result<R, CircuitError<E>>
    where
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
    {
        match self {
            Protection::Native(cb) => cb.execute(operation).await,
            Protection::Adapter(a) => a.execute(operation).await,
        }
    }
}
