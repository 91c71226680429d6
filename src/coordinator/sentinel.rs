//! The sentinel instance: routing, protected execution and the health cycle.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::coordinator::builder::SentinelBuilder;
use crate::coordinator::report::{ResourceHealth, ResourceStats};
use crate::error::{CircuitOpenError, ExecuteError, SentinelError};
use crate::failover::{FailoverRouter, Resolution, ResolutionCache};
use crate::health::{HealthMonitor, HealthStatus};
use crate::lifecycle::{Lifecycle, LifecycleState, ShutdownLatch};
use crate::observability::events::now_millis;
use crate::observability::{metrics, ErrorContext, Event, EventBus, EventKind, ListenerId};
use crate::registry::Registry;
use crate::resilience::circuit_breaker::{REASON_HEALTH_CHECK_FAILED, REASON_HEALTH_RECOVERED};
use crate::resilience::{CircuitError, CircuitObserver, CircuitState, CircuitTransition, Protection};

pub(super) struct Inner<T> {
    pub(super) registry: Registry<T>,
    pub(super) monitor: HealthMonitor<T>,
    pub(super) router: FailoverRouter,
    pub(super) cache: ResolutionCache,
    pub(super) protections: BTreeMap<String, Protection>,
    pub(super) events: Arc<EventBus>,
    pub(super) lifecycle: Lifecycle,
    pub(super) health_checks: bool,
    pub(super) cycle_in_flight: AtomicBool,
    pub(super) latch: ShutdownLatch,
    pub(super) shutdown_task: Mutex<Option<JoinHandle<()>>>,
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        if let Some(task) = self.shutdown_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Resilience coordinator over a set of named resources of type `T`.
///
/// Cheap to clone; clones share all state.
pub struct Sentinel<T> {
    pub(super) inner: Arc<Inner<T>>,
}

impl<T> Clone for Sentinel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Why a name could not be routed.
enum RouteError {
    Unknown(String),
    Open(CircuitOpenError),
}

impl From<RouteError> for SentinelError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::Unknown(name) => SentinelError::UnknownResource(name),
            RouteError::Open(e) => SentinelError::CircuitOpen(e),
        }
    }
}

impl<E> From<RouteError> for ExecuteError<E> {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::Unknown(name) => ExecuteError::UnknownResource(name),
            RouteError::Open(e) => ExecuteError::CircuitOpen(e),
        }
    }
}

/// The outcome of one resolution: who serves, and what guards it.
struct Route<'a, T> {
    resolved: String,
    handle: Arc<T>,
    protection: Option<&'a Protection>,
}

/// Clears the in-flight flag however the cycle ends, including cancellation.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Observer publishing circuit open/close transitions as events.
pub(super) fn circuit_observer(events: Arc<EventBus>) -> CircuitObserver {
    Arc::new(move |t: &CircuitTransition| {
        let timestamp = now_millis();
        match t.to {
            CircuitState::Open => events.emit(Event::CircuitOpen {
                name: t.name.clone(),
                reason: t.reason.clone(),
                timestamp,
            }),
            CircuitState::Closed => events.emit(Event::CircuitClose {
                name: t.name.clone(),
                reason: t.reason.clone(),
                timestamp,
            }),
            // Internal probing state; not published.
            CircuitState::HalfOpen => {}
        }
    })
}

impl<T: Send + Sync + 'static> Sentinel<T> {
    pub fn builder() -> SentinelBuilder<T> {
        SentinelBuilder::new()
    }

    /// Announce every resource and start the health cycle.
    ///
    /// Returns `false` if already connected. With health checks enabled this
    /// must be called from within a tokio runtime.
    pub fn connect(&self) -> bool {
        let inner = &self.inner;
        if !inner.lifecycle.begin_connect() {
            tracing::debug!("connect() ignored, already connected");
            return false;
        }

        for (name, _) in inner.registry.iter() {
            let status = inner.monitor.status(name).unwrap_or_default();
            metrics::record_resource_health(name, status);
            inner.events.emit(Event::Connected {
                name: name.to_string(),
                timestamp: now_millis(),
            });
        }

        if inner.health_checks {
            let weak = Arc::downgrade(inner);
            inner.monitor.start(move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.run_cycle().await;
                    }
                }
            });
        }

        tracing::info!(
            resources = inner.registry.len(),
            health_checks = inner.health_checks,
            "Sentinel connected"
        );
        true
    }

    /// Stop the health cycle and announce every resource as disconnected.
    ///
    /// Returns `false` if not connected or a disconnect is already underway.
    pub fn disconnect(&self) -> bool {
        self.inner.disconnect()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lifecycle.state() == LifecycleState::Connected
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.inner.lifecycle.state()
    }

    /// Handle serving `name`: its backup while failed over, itself otherwise.
    pub fn get(&self, name: &str) -> Result<Arc<T>, SentinelError> {
        let route = self.inner.resolve_and_route(name)?;
        Ok(route.handle)
    }

    /// Run `operation` against the handle serving `name`.
    ///
    /// The name is resolved once; the handle passed in and the circuit that
    /// records the outcome always belong to the same resource. An error from
    /// `operation` is returned unmodified as [`ExecuteError::Operation`].
    pub async fn execute<F, Fut, R, E>(&self, name: &str, operation: F) -> Result<R, ExecuteError<E>>
    where
        F: FnOnce(Arc<T>) -> Fut,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
    {
        let route = self.inner.resolve_and_route(name)?;
        let call = operation(route.handle);

        match route.protection {
            Some(protection) => protection.execute(call).await.map_err(|err| match err {
                CircuitError::Open(mut open) => {
                    open.requested = name.to_string();
                    ExecuteError::CircuitOpen(open)
                }
                CircuitError::Operation(e) => {
                    tracing::debug!(requested = %name, resource = %route.resolved, "Operation failed");
                    ExecuteError::Operation(e)
                }
            }),
            None => call.await.map_err(ExecuteError::Operation),
        }
    }

    /// Status and active failover target per resource.
    pub fn health(&self) -> BTreeMap<String, ResourceHealth> {
        let inner = &self.inner;
        inner
            .registry
            .names()
            .map(|name| {
                let health = ResourceHealth {
                    status: inner.monitor.status(name).unwrap_or_default(),
                    failover_to: inner.failover_target(name),
                };
                (name.to_string(), health)
            })
            .collect()
    }

    /// Status, circuit state and failure count per resource.
    pub fn stats(&self) -> BTreeMap<String, ResourceStats> {
        let inner = &self.inner;
        inner
            .registry
            .names()
            .map(|name| {
                let protection = inner.protections.get(name);
                let stats = ResourceStats {
                    status: inner.monitor.status(name).unwrap_or_default(),
                    circuit: protection.map(Protection::state),
                    failures: protection.map_or(0, Protection::failure_count),
                    failover_to: inner.failover_target(name),
                };
                (name.to_string(), stats)
            })
            .collect()
    }

    /// Record a success against `name`'s circuit, for work done outside `execute`.
    pub fn record_success(&self, name: &str) -> Result<(), SentinelError> {
        if let Some(protection) = self.inner.protection_for(name)? {
            protection.success();
        }
        Ok(())
    }

    /// Record a failure against `name`'s circuit. Returns whether it opened.
    pub fn record_failure(&self, name: &str) -> Result<bool, SentinelError> {
        Ok(self
            .inner
            .protection_for(name)?
            .map_or(false, Protection::failure))
    }

    /// Run one health cycle now.
    ///
    /// Returns `false` without checking anything if a cycle is already in
    /// flight, scheduled or manual.
    pub async fn check_health(&self) -> bool {
        self.inner.run_cycle().await
    }

    /// Override a resource's status, with the same side effects as a probed
    /// transition. Returns the previous status.
    pub fn set_status(&self, name: &str, status: HealthStatus) -> Result<HealthStatus, SentinelError> {
        self.inner
            .apply_status(name, status)
            .ok_or_else(|| SentinelError::UnknownResource(name.to_string()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    /// Register a synchronous listener for one kind of event.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.registry.names().map(str::to_string).collect()
    }

    /// Primaries currently served by their backup.
    pub fn active_failovers(&self) -> Vec<String> {
        self.inner.router.active_failovers()
    }
}

impl<T: Send + Sync + 'static> Inner<T> {
    pub(super) fn disconnect(&self) -> bool {
        if !self.lifecycle.begin_disconnect() {
            tracing::debug!("disconnect() ignored, not connected");
            return false;
        }

        self.monitor.stop();
        for name in self.registry.names() {
            self.events.emit(Event::Disconnected {
                name: name.to_string(),
                timestamp: now_millis(),
            });
        }
        self.lifecycle.finish_disconnect();

        tracing::info!("Sentinel disconnected");
        true
    }

    /// Resolve `name`, check the resolved resource's circuit, then record
    /// failover edges. Nothing in here suspends, and a rejected call leaves
    /// the failover bookkeeping untouched.
    fn resolve_and_route(&self, name: &str) -> Result<Route<'_, T>, RouteError> {
        if !self.registry.contains(name) {
            return Err(RouteError::Unknown(name.to_string()));
        }

        let resolution = self
            .cache
            .get_or_resolve(name, || self.router.resolve(name, |n| self.monitor.status(n)));

        let handle = self
            .registry
            .get(&resolution.name)
            .ok_or_else(|| RouteError::Unknown(resolution.name.clone()))?;

        let protection = self.protections.get(&resolution.name);
        if let Some(p) = protection {
            if !p.can_execute() {
                metrics::record_circuit_rejection(&resolution.name);
                return Err(RouteError::Open(CircuitOpenError::new(&resolution.name, name)));
            }
        }

        self.track_failover(name, &resolution);

        Ok(Route {
            resolved: resolution.name,
            handle,
            protection,
        })
    }

    /// Emit failover/recovery once per edge of the active-failover set.
    fn track_failover(&self, name: &str, resolution: &Resolution) {
        if resolution.is_failover {
            if self.router.activate_failover(name) {
                tracing::warn!(primary = %name, backup = %resolution.name, "Failing over to backup");
                self.events.emit(Event::Failover {
                    primary: name.to_string(),
                    backup: resolution.name.clone(),
                    timestamp: now_millis(),
                });
            }
        } else if let Some(backup) = self.router.backup(name) {
            if self.router.deactivate_failover(name) {
                tracing::info!(primary = %name, backup = %backup, "Primary recovered");
                self.events.emit(Event::Recovery {
                    primary: name.to_string(),
                    backup: backup.to_string(),
                    timestamp: now_millis(),
                });
            }
        }
    }

    fn failover_target(&self, name: &str) -> Option<String> {
        if self.router.is_in_failover(name) {
            self.router.backup(name).map(str::to_string)
        } else {
            None
        }
    }

    fn protection_for(&self, name: &str) -> Result<Option<&Protection>, SentinelError> {
        if !self.registry.contains(name) {
            return Err(SentinelError::UnknownResource(name.to_string()));
        }
        Ok(self.protections.get(name))
    }

    /// Check every resource concurrently and apply the outcomes.
    async fn run_cycle(&self) -> bool {
        if self.cycle_in_flight.swap(true, Ordering::SeqCst) {
            tracing::debug!("Health cycle already in flight, skipping");
            return false;
        }
        let _guard = CycleGuard(&self.cycle_in_flight);

        tracing::trace!(resources = self.registry.len(), "Health cycle started");

        let checks = self
            .registry
            .iter()
            .map(|(name, handle)| self.check_one(name, handle.clone()));
        join_all(checks).await;

        tracing::debug!("Health cycle finished");
        true
    }

    async fn check_one(&self, name: &str, handle: Arc<T>) {
        let result = self.monitor.check(name, handle).await;
        metrics::record_health_check(name, result.status);

        self.apply_status(name, result.status);

        if let Some(error) = result.error {
            let message = format!("health check for '{}' failed after {} attempt(s)", name, result.attempts);
            tracing::warn!(resource = %name, error = %error, "{}", message);
            self.events.emit(Event::Error {
                name: Some(name.to_string()),
                error: Arc::new(error),
                context: ErrorContext::HealthCheck,
                message,
                timestamp: now_millis(),
            });
        }
    }

    /// Write `status` and, if it changed, run the transition side effects:
    /// clear the resolution cache, emit `health-changed`, sync the circuit.
    ///
    /// Returns the previous status, or `None` for an unknown name.
    fn apply_status(&self, name: &str, status: HealthStatus) -> Option<HealthStatus> {
        let previous = self.monitor.set_status(name, status)?;
        if previous == status {
            return Some(previous);
        }

        // The status write above must land before the cache is cleared.
        self.cache.invalidate();
        metrics::record_resource_health(name, status);

        if status.is_unhealthy() {
            tracing::warn!(resource = %name, %previous, current = %status, "Health changed");
        } else {
            tracing::info!(resource = %name, %previous, current = %status, "Health changed");
        }
        self.events.emit(Event::HealthChanged {
            name: name.to_string(),
            previous,
            current: status,
            timestamp: now_millis(),
        });

        if let Some(protection) = self.protections.get(name) {
            match status {
                HealthStatus::Unhealthy => {
                    protection.force_open(Some(REASON_HEALTH_CHECK_FAILED));
                }
                HealthStatus::Healthy if protection.state() == CircuitState::Open => {
                    protection.force_close(Some(REASON_HEALTH_RECOVERED));
                }
                _ => {}
            }
        }

        Some(previous)
    }
}

impl<T> fmt::Debug for Sentinel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sentinel")
            .field("resources", &self.inner.registry.len())
            .field("lifecycle", &self.inner.lifecycle.state())
            .field("failover", self.inner.router.mappings())
            .finish()
    }
}
