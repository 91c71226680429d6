//! Probe contract.
//!
//! A probe receives the resource handle and answers with a [`ProbeVerdict`]
//! (`true`/`false` or a [`HealthStatus`] convert into one) or an error.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use thiserror::Error;

use crate::health::HealthStatus;

/// Boxed error type accepted from probes.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a single probe attempt reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Healthy,
    Degraded,
    Unhealthy,
}

impl From<bool> for ProbeVerdict {
    fn from(ok: bool) -> Self {
        if ok { ProbeVerdict::Healthy } else { ProbeVerdict::Unhealthy }
    }
}

impl From<HealthStatus> for ProbeVerdict {
    fn from(status: HealthStatus) -> Self {
        match status {
            HealthStatus::Healthy => ProbeVerdict::Healthy,
            HealthStatus::Degraded => ProbeVerdict::Degraded,
            HealthStatus::Unhealthy => ProbeVerdict::Unhealthy,
        }
    }
}

type ProbeFn<T> = dyn Fn(Arc<T>) -> BoxFuture<'static, Result<ProbeVerdict, BoxError>> + Send + Sync;

/// A user-supplied health probe for resources of type `T`.
pub struct Probe<T> {
    inner: Arc<ProbeFn<T>>,
}

impl<T: Send + Sync + 'static> Probe<T> {
    pub fn new<F, Fut, V, E>(f: F) -> Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        V: Into<ProbeVerdict>,
        E: Into<BoxError>,
    {
        Self {
            inner: Arc::new(move |handle: Arc<T>| {
                f(handle)
                    .map(|res| res.map(Into::into).map_err(Into::into))
                    .boxed()
            }),
        }
    }

    pub(crate) fn call(&self, handle: Arc<T>) -> BoxFuture<'static, Result<ProbeVerdict, BoxError>> {
        (self.inner)(handle)
    }
}

impl<T> Clone for Probe<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Probe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Probe")
    }
}

/// Why a probe attempt counted as failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HealthCheckError {
    #[error("probe timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("probe failed: {0}")]
    Failed(String),

    #[error("probe reported {0}")]
    Reported(HealthStatus),

    #[error("probe panicked")]
    Panicked,
}

/// Final outcome of [`HealthMonitor::check`](crate::health::HealthMonitor::check).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub status: HealthStatus,
    /// The last attempt's error when the final status is unhealthy.
    pub error: Option<HealthCheckError>,
    /// Attempts made; zero when no probe is registered.
    pub attempts: u32,
}

impl CheckResult {
    pub(crate) fn unprobed() -> Self {
        Self {
            status: HealthStatus::Healthy,
            error: None,
            attempts: 0,
        }
    }
}
