//! Circuit breaker for resource protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: resource assumed down, calls fail fast
//! - Half-Open: trial calls decide whether the resource recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open:      consecutive failures >= threshold
//! Open → Half-Open:   reset timeout elapsed (evaluated lazily on next query)
//! Half-Open → Closed: half_open_successes consecutive successes
//! Half-Open → Open:   any failure (fresh reset timeout)
//! ```
//!
//! # Design Decisions
//! - One breaker per resource name
//! - No timer task: the open → half-open move happens when someone asks
//! - Observers run after the internal lock is released

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::duration::MAX_DURATION;
use crate::config::validation::validate_circuit_breaker;
use crate::config::{CircuitBreakerOptions, ValidationError};
use crate::error::CircuitOpenError;
use crate::observability::metrics;

pub const REASON_FAILURE_THRESHOLD: &str = "failure-threshold";
pub const REASON_HALF_OPEN_FAILURE: &str = "half-open-failure";
pub const REASON_HALF_OPEN_SUCCESS: &str = "half-open-success";
pub const REASON_HEALTH_CHECK_FAILED: &str = "health-check-failed";
pub const REASON_HEALTH_RECOVERED: &str = "health-recovered";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        })
    }
}

/// A state change, handed to the breaker's observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitTransition {
    pub name: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub reason: Option<String>,
}

pub type CircuitObserver = Arc<dyn Fn(&CircuitTransition) + Send + Sync>;

/// Point-in-time view used for stats reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failures: u32,
    pub half_open_successes: u32,
    /// Time left until a trial call is allowed, while open.
    pub retry_in_ms: Option<u64>,
}

/// Error from [`CircuitBreaker::execute`].
#[derive(Debug)]
pub enum CircuitError<E> {
    /// Rejected without running the operation.
    Open(CircuitOpenError),
    /// The operation ran and failed; its error is untouched.
    Operation(E),
}

impl<E: fmt::Display> fmt::Display for CircuitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitError::Open(e) => e.fmt(f),
            CircuitError::Operation(e) => e.fmt(f),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for CircuitError<E> {}

struct Inner {
    state: CircuitState,
    failures: u32,
    half_open_successes: u32,
    next_attempt: Option<Instant>,
}

pub struct CircuitBreaker {
    name: String,
    threshold: u32,
    reset_timeout: Duration,
    required_successes: u32,
    inner: Mutex<Inner>,
    observer: Option<CircuitObserver>,
}

impl CircuitBreaker {
    /// Create a closed breaker. Invalid options are rejected here, not at first use.
    pub fn new(name: impl Into<String>, options: &CircuitBreakerOptions) -> Result<Self, ValidationError> {
        validate_circuit_breaker(options)?;
        Ok(Self {
            name: name.into(),
            threshold: options.threshold,
            reset_timeout: options.reset_timeout,
            required_successes: options.half_open_successes,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                half_open_successes: 0,
                next_attempt: None,
            }),
            observer: None,
        })
    }

    /// Attach a transition observer.
    pub fn with_observer(mut self, observer: CircuitObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, promoting open → half-open if the reset timeout elapsed.
    pub fn state(&self) -> CircuitState {
        self.with_inner(|_, inner| inner.state)
    }

    pub fn can_execute(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failures
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        self.with_inner(|now, inner| CircuitSnapshot {
            state: inner.state,
            failures: inner.failures,
            half_open_successes: inner.half_open_successes,
            retry_in_ms: match (inner.state, inner.next_attempt) {
                (CircuitState::Open, Some(at)) => Some(at.saturating_duration_since(now).as_millis() as u64),
                _ => None,
            },
        })
    }

    /// Record a success. Returns `true` if it closed the circuit.
    pub fn success(&self) -> bool {
        let transition = self.mutate(|_, inner| match inner.state {
            CircuitState::Closed => {
                inner.failures = 0;
                None
            }
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.required_successes {
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.half_open_successes = 0;
                    inner.next_attempt = None;
                    Some((CircuitState::HalfOpen, Some(REASON_HALF_OPEN_SUCCESS)))
                } else {
                    None
                }
            }
            // Late results from calls admitted before the circuit opened.
            CircuitState::Open => None,
        });
        transition.is_some()
    }

    /// Record a failure. Returns `true` if it opened the circuit.
    pub fn failure(&self) -> bool {
        let transition = self.mutate(|now, inner| match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.threshold {
                    self.trip(now, inner);
                    Some((CircuitState::Closed, Some(REASON_FAILURE_THRESHOLD)))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                inner.failures += 1;
                self.trip(now, inner);
                Some((CircuitState::HalfOpen, Some(REASON_HALF_OPEN_FAILURE)))
            }
            CircuitState::Open => None,
        });
        transition.is_some()
    }

    /// Force the circuit open (no-op if already open). Returns whether it changed.
    pub fn force_open(&self, reason: Option<&str>) -> bool {
        let transition = self.mutate(|now, inner| {
            let from = inner.state;
            if from == CircuitState::Open {
                return None;
            }
            self.trip(now, inner);
            Some((from, reason))
        });
        transition.is_some()
    }

    /// Force the circuit closed and clear counters. Returns whether the state changed.
    pub fn force_close(&self, reason: Option<&str>) -> bool {
        let transition = self.mutate(|_, inner| {
            let from = inner.state;
            inner.state = CircuitState::Closed;
            inner.failures = 0;
            inner.half_open_successes = 0;
            inner.next_attempt = None;
            (from != CircuitState::Closed).then_some((from, reason))
        });
        transition.is_some()
    }

    pub fn open(&self) {
        self.force_open(None);
    }

    pub fn reset(&self) {
        self.force_close(None);
    }

    /// Run `operation` if the circuit allows it, recording the outcome.
    pub async fn execute<F, R, E>(&self, operation: F) -> Result<R, CircuitError<E>>
    where
        F: Future<Output = Result<R, E>>,
    {
        if !self.can_execute() {
            metrics::record_circuit_rejection(&self.name);
            return Err(CircuitError::Open(CircuitOpenError::new(&self.name, &self.name)));
        }

        match operation.await {
            Ok(value) => {
                self.success();
                Ok(value)
            }
            Err(e) => {
                self.failure();
                Err(CircuitError::Operation(e))
            }
        }
    }

    fn trip(&self, now: Instant, inner: &mut Inner) {
        let next_attempt = now
            .checked_add(self.reset_timeout)
            .unwrap_or_else(|| now + MAX_DURATION);
        inner.state = CircuitState::Open;
        inner.half_open_successes = 0;
        inner.next_attempt = Some(next_attempt);
    }

    /// Promote open → half-open once the reset timeout has passed.
    fn refresh(&self, now: Instant, inner: &mut Inner) -> Option<CircuitTransition> {
        match (inner.state, inner.next_attempt) {
            (CircuitState::Open, Some(at)) if now >= at => {
                inner.state = CircuitState::HalfOpen;
                inner.half_open_successes = 0;
                Some(self.transition(CircuitState::Open, CircuitState::HalfOpen, None))
            }
            _ => None,
        }
    }

    fn with_inner<R>(&self, f: impl FnOnce(Instant, &Inner) -> R) -> R {
        let now = Instant::now();
        let (result, promoted) = {
            let mut inner = self.inner.lock();
            let promoted = self.refresh(now, &mut inner);
            (f(now, &inner), promoted)
        };
        if let Some(t) = promoted {
            self.notify(&t);
        }
        result
    }

    fn mutate<'r>(
        &self,
        f: impl FnOnce(Instant, &mut Inner) -> Option<(CircuitState, Option<&'r str>)>,
    ) -> Option<CircuitTransition> {
        let now = Instant::now();
        let (promoted, changed) = {
            let mut inner = self.inner.lock();
            let promoted = self.refresh(now, &mut inner);
            let changed = f(now, &mut inner)
                .map(|(from, reason)| self.transition(from, inner.state, reason));
            (promoted, changed)
        };
        if let Some(t) = &promoted {
            self.notify(t);
        }
        if let Some(t) = &changed {
            self.notify(t);
        }
        changed
    }

    fn transition(&self, from: CircuitState, to: CircuitState, reason: Option<&str>) -> CircuitTransition {
        CircuitTransition {
            name: self.name.clone(),
            from,
            to,
            reason: reason.map(str::to_string),
        }
    }

    fn notify(&self, transition: &CircuitTransition) {
        match transition.to {
            CircuitState::Open => tracing::warn!(
                resource = %self.name,
                from = %transition.from,
                reason = ?transition.reason,
                "Circuit opened"
            ),
            CircuitState::Closed => tracing::info!(
                resource = %self.name,
                reason = ?transition.reason,
                "Circuit closed"
            ),
            CircuitState::HalfOpen => tracing::debug!(resource = %self.name, "Circuit half-open"),
        }
        metrics::record_circuit_open(&self.name, transition.to == CircuitState::Open);

        if let Some(observer) = &self.observer {
            observer(transition);
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("threshold", &self.threshold)
            .field("reset_timeout", &self.reset_timeout)
            .field("half_open_successes", &self.required_successes)
            .finish()
    }
}
