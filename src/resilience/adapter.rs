//! Adapter for externally supplied circuit breakers.
//!
//! Third-party breakers come in two shapes: ones that `fire` a guarded call
//! and ones that `execute` it. [`ExternalBreaker`] lets an implementation
//! offer either; [`BreakerAdapter::new`] picks one once, at construction.
//!
//! The operation's result never passes through the external breaker. It is
//! parked in a slot the adapter owns, so the caller always gets the original
//! error back, and a call the breaker refused to run is told apart from a call
//! that ran and failed.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use thiserror::Error;

use crate::config::ValidationError;
use crate::error::CircuitOpenError;
use crate::health::probe::BoxError;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{
    CircuitError, CircuitObserver, CircuitSnapshot, CircuitState, CircuitTransition,
};

/// Call style offered by an external breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMethod {
    Fire,
    Execute,
}

/// Marker error the guarded call resolves to when the operation failed.
#[derive(Debug, Clone, Copy, Error)]
#[error("guarded operation failed")]
pub struct GuardedFailure;

/// The erased operation handed to an external breaker.
pub type GuardedCall = BoxFuture<'static, Result<(), GuardedFailure>>;

fn unsupported(method: CallMethod) -> BoxFuture<'static, Result<(), BoxError>> {
    async move { Err::<(), BoxError>(format!("{:?} is not supported by this breaker", method).into()) }.boxed()
}

/// A third-party circuit breaker.
pub trait ExternalBreaker: Send + Sync + 'static {
    /// Entry points this breaker implements.
    fn call_methods(&self) -> Vec<CallMethod>;

    /// `fire`-style entry point: run (or refuse) `call` and report the outcome.
    fn fire<'a>(&'a self, call: GuardedCall) -> BoxFuture<'a, Result<(), BoxError>> {
        drop(call);
        unsupported(CallMethod::Fire)
    }

    /// `execute`-style entry point.
    fn execute<'a>(&'a self, call: GuardedCall) -> BoxFuture<'a, Result<(), BoxError>> {
        drop(call);
        unsupported(CallMethod::Execute)
    }

    /// Whether the breaker currently refuses calls.
    fn is_open(&self) -> bool {
        false
    }

    /// Free-form internal statistics for diagnostics.
    fn stats(&self) -> Option<String> {
        None
    }
}

/// Choose the call method for `breaker`, preferring `fire`.
pub fn select_method(breaker: &dyn ExternalBreaker) -> Result<CallMethod, ValidationError> {
    let methods = breaker.call_methods();
    if methods.contains(&CallMethod::Fire) {
        Ok(CallMethod::Fire)
    } else if methods.contains(&CallMethod::Execute) {
        Ok(CallMethod::Execute)
    } else {
        Err(ValidationError::UnsupportedBreaker)
    }
}

/// Per-resource wrapper presenting an external breaker like a native one.
pub struct BreakerAdapter {
    name: String,
    breaker: Arc<dyn ExternalBreaker>,
    method: CallMethod,
    forced_open: AtomicBool,
    failures: AtomicU32,
    successes: AtomicU64,
    observer: Option<CircuitObserver>,
}

impl BreakerAdapter {
    pub fn new(name: impl Into<String>, breaker: Arc<dyn ExternalBreaker>) -> Result<Self, ValidationError> {
        let method = select_method(breaker.as_ref())?;
        Ok(Self {
            name: name.into(),
            breaker,
            method,
            forced_open: AtomicBool::new(false),
            failures: AtomicU32::new(0),
            successes: AtomicU64::new(0),
            observer: None,
        })
    }

    pub fn with_observer(mut self, observer: CircuitObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> CallMethod {
        self.method
    }

    pub fn state(&self) -> CircuitState {
        if self.forced_open.load(Ordering::SeqCst) || self.breaker.is_open() {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    pub fn can_execute(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Consecutive failures observed through this adapter.
    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Successful operations observed through this adapter.
    pub fn success_count(&self) -> u64 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            state: self.state(),
            failures: self.failure_count(),
            half_open_successes: 0,
            retry_in_ms: None,
        }
    }

    /// Record a success locally. The external breaker keeps its own books.
    pub fn success(&self) -> bool {
        self.failures.store(0, Ordering::SeqCst);
        self.successes.fetch_add(1, Ordering::SeqCst);
        false
    }

    pub fn failure(&self) -> bool {
        self.failures.fetch_add(1, Ordering::SeqCst);
        false
    }

    pub fn force_open(&self, reason: Option<&str>) -> bool {
        if self.forced_open.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.notify(CircuitState::Closed, CircuitState::Open, reason);
        true
    }

    pub fn force_close(&self, reason: Option<&str>) -> bool {
        self.failures.store(0, Ordering::SeqCst);
        if !self.forced_open.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.notify(CircuitState::Open, CircuitState::Closed, reason);
        true
    }

    pub async fn execute<Fut, R, E>(&self, operation: Fut) -> Result<R, CircuitError<E>>
    where
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
    {
        if self.forced_open.load(Ordering::SeqCst) {
            metrics::record_circuit_rejection(&self.name);
            return Err(CircuitError::Open(CircuitOpenError::new(&self.name, &self.name)));
        }

        let slot: Arc<Mutex<Option<Result<R, E>>>> = Arc::new(Mutex::new(None));
        let parked = slot.clone();
        let call: GuardedCall = async move {
            let result = operation.await;
            let failed = result.is_err();
            *parked.lock() = Some(result);
            if failed { Err(GuardedFailure) } else { Ok(()) }
        }
        .boxed();

        let verdict = match self.method {
            CallMethod::Fire => self.breaker.fire(call).await,
            CallMethod::Execute => self.breaker.execute(call).await,
        };

        let outcome = slot.lock().take();
        match outcome {
            Some(Ok(value)) => {
                self.success();
                Ok(value)
            }
            Some(Err(e)) => {
                self.failure();
                tracing::debug!(
                    resource = %self.name,
                    failures = self.failure_count(),
                    stats = ?self.breaker.stats(),
                    "Operation failed through external breaker"
                );
                Err(CircuitError::Operation(e))
            }
            None => {
                // The breaker never ran the operation.
                metrics::record_circuit_rejection(&self.name);
                let mut err = CircuitOpenError::new(&self.name, &self.name);
                if let Err(refusal) = verdict {
                    err = err.with_detail(refusal.to_string());
                }
                Err(CircuitError::Open(err))
            }
        }
    }

    fn notify(&self, from: CircuitState, to: CircuitState, reason: Option<&str>) {
        tracing::info!(resource = %self.name, %from, %to, reason = ?reason, "External breaker latch changed");
        metrics::record_circuit_open(&self.name, to == CircuitState::Open);
        if let Some(observer) = &self.observer {
            observer(&CircuitTransition {
                name: self.name.clone(),
                from,
                to,
                reason: reason.map(str::to_string),
            });
        }
    }
}

impl fmt::Debug for BreakerAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerAdapter")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("forced_open", &self.forced_open.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Runs calls until told to refuse them.
    struct Firing {
        refusing: AtomicBool,
    }

    impl ExternalBreaker for Firing {
        fn call_methods(&self) -> Vec<CallMethod> {
            vec![CallMethod::Fire]
        }

        fn fire<'a>(&'a self, call: GuardedCall) -> BoxFuture<'a, Result<(), BoxError>> {
            async move {
                if self.refusing.load(Ordering::SeqCst) {
                    return Err::<(), BoxError>("Breaker is open".into());
                }
                call.await.map_err(|e| Box::new(e) as BoxError)
            }
            .boxed()
        }

        fn is_open(&self) -> bool {
            self.refusing.load(Ordering::SeqCst)
        }
    }

    struct Executing;

    impl ExternalBreaker for Executing {
        fn call_methods(&self) -> Vec<CallMethod> {
            vec![CallMethod::Execute]
        }

        fn execute<'a>(&'a self, call: GuardedCall) -> BoxFuture<'a, Result<(), BoxError>> {
            async move { call.await.map_err(|e| Box::new(e) as BoxError) }.boxed()
        }
    }

    struct Shapeless;

    impl ExternalBreaker for Shapeless {
        fn call_methods(&self) -> Vec<CallMethod> {
            Vec::new()
        }
    }

    #[derive(Debug, PartialEq)]
    struct QueryError {
        code: u16,
    }

    #[test]
    fn test_rejects_breaker_without_call_method() {
        let res = BreakerAdapter::new("db", Arc::new(Shapeless));
        assert!(matches!(res, Err(ValidationError::UnsupportedBreaker)));
    }

    #[test]
    fn test_method_selection() {
        let fire = BreakerAdapter::new("db", Arc::new(Firing { refusing: AtomicBool::new(false) })).unwrap();
        assert_eq!(fire.method(), CallMethod::Fire);
        let exec = BreakerAdapter::new("db", Arc::new(Executing)).unwrap();
        assert_eq!(exec.method(), CallMethod::Execute);
    }

    #[tokio::test]
    async fn test_original_error_is_returned() {
        let adapter = BreakerAdapter::new("db", Arc::new(Executing)).unwrap();

        let res = adapter.execute(async { Err::<u32, _>(QueryError { code: 42 }) }).await;
        match res {
            Err(CircuitError::Operation(e)) => assert_eq!(e, QueryError { code: 42 }),
            other => panic!("unexpected result: {:?}", other.map_err(|_| ())),
        }
        assert_eq!(adapter.failure_count(), 1);

        let ok = adapter.execute(async { Ok::<_, QueryError>(7u32) }).await;
        assert!(matches!(ok, Ok(7)));
        assert_eq!(adapter.failure_count(), 0);
        assert_eq!(adapter.success_count(), 1);
    }

    #[tokio::test]
    async fn test_refused_call_is_circuit_open() {
        let breaker = Arc::new(Firing { refusing: AtomicBool::new(true) });
        let adapter = BreakerAdapter::new("db", breaker.clone()).unwrap();
        assert!(!adapter.can_execute());

        let res = adapter.execute(async { Ok::<_, QueryError>(()) }).await;
        match res {
            Err(CircuitError::Open(e)) => assert_eq!(e.detail.as_deref(), Some("Breaker is open")),
            _ => panic!("expected a circuit-open rejection"),
        }

        breaker.refusing.store(false, Ordering::SeqCst);
        assert!(adapter.can_execute());
    }

    #[tokio::test]
    async fn test_forced_latch() {
        let adapter = BreakerAdapter::new("db", Arc::new(Executing)).unwrap();
        assert!(adapter.force_open(Some("health-check-failed")));
        assert!(!adapter.force_open(None));
        assert_eq!(adapter.state(), CircuitState::Open);

        let res = adapter.execute(async { Ok::<_, QueryError>(()) }).await;
        assert!(matches!(res, Err(CircuitError::Open(_))));

        assert!(adapter.force_close(Some("health-recovered")));
        assert_eq!(adapter.state(), CircuitState::Closed);
    }
}
