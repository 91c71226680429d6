//! Sentinel construction.
//!
//! Everything that can be wrong with a sentinel's setup is reported by
//! [`SentinelBuilder::build`], all problems at once.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::validation::validate_against;
use crate::config::{CircuitBreakerOptions, ConfigError, HealthCheckOptions, SentinelOptions, ValidationError};
use crate::coordinator::sentinel::{circuit_observer, Inner, Sentinel};
use crate::failover::{FailoverRouter, ResolutionCache};
use crate::health::{BoxError, HealthMonitor, Probe, ProbeVerdict};
use crate::lifecycle::{Lifecycle, ShutdownLatch};
use crate::observability::EventBus;
use crate::registry::Registry;
use crate::resilience::adapter::select_method;
use crate::resilience::{BreakerAdapter, CircuitBreaker, ExternalBreaker, Protection};

pub struct SentinelBuilder<T> {
    connections: Registry<T>,
    probes: Vec<(String, Probe<T>)>,
    options: SentinelOptions,
    external_breaker: Option<Arc<dyn ExternalBreaker>>,
}

impl<T: Send + Sync + 'static> SentinelBuilder<T> {
    pub fn new() -> Self {
        Self {
            connections: Registry::new(),
            probes: Vec::new(),
            options: SentinelOptions::default(),
            external_breaker: None,
        }
    }

    /// Register a resource handle under `name`.
    pub fn connection(self, name: impl Into<String>, handle: T) -> Self {
        self.shared_connection(name, Arc::new(handle))
    }

    /// Register a handle the caller keeps a reference to.
    pub fn shared_connection(mut self, name: impl Into<String>, handle: Arc<T>) -> Self {
        self.connections.insert(name, handle);
        self
    }

    /// Health probe for `name`. Resources without one are always healthy.
    pub fn probe<F, Fut, V, E>(mut self, name: impl Into<String>, probe: F) -> Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        V: Into<ProbeVerdict>,
        E: Into<BoxError>,
    {
        self.probes.push((name.into(), Probe::new(probe)));
        self
    }

    /// Serve `primary`'s requests from `backup` while `primary` is not healthy.
    pub fn failover(mut self, primary: impl Into<String>, backup: impl Into<String>) -> Self {
        self.options.failover.insert(primary.into(), backup.into());
        self
    }

    /// Replace all declarative options. Failover pairs added earlier are kept
    /// unless `options` maps the same primary.
    pub fn options(mut self, options: SentinelOptions) -> Self {
        let earlier = std::mem::take(&mut self.options.failover);
        self.options = options;
        for (primary, backup) in earlier {
            self.options.failover.entry(primary).or_insert(backup);
        }
        self
    }

    pub fn health_check(mut self, options: HealthCheckOptions) -> Self {
        self.options.health_check = options;
        self
    }

    /// Native circuit breaker for every resource.
    pub fn circuit_breaker(mut self, options: CircuitBreakerOptions) -> Self {
        self.options.circuit_breaker = Some(options);
        self
    }

    /// Guard every resource with an external breaker instead of the native one.
    pub fn external_breaker(mut self, breaker: Arc<dyn ExternalBreaker>) -> Self {
        self.external_breaker = Some(breaker);
        self
    }

    pub fn build(self) -> Result<Sentinel<T>, ConfigError> {
        let SentinelBuilder {
            connections,
            probes,
            options,
            external_breaker,
        } = self;

        let mut errors = match validate_against(&options, connections.names()) {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };
        for (name, _) in &probes {
            if !connections.contains(name) {
                errors.push(ValidationError::UnknownProbeTarget { name: name.clone() });
            }
        }
        if let Some(breaker) = &external_breaker {
            if let Err(e) = select_method(breaker.as_ref()) {
                errors.push(e);
            }
        }
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }

        let events = Arc::new(EventBus::new(options.events.capacity));
        let observer = circuit_observer(events.clone());

        let mut protections = BTreeMap::new();
        for name in connections.names() {
            let protection = match (&external_breaker, &options.circuit_breaker) {
                (Some(breaker), _) => Protection::Adapter(
                    BreakerAdapter::new(name, breaker.clone())?.with_observer(observer.clone()),
                ),
                (None, Some(cb)) => {
                    Protection::Native(CircuitBreaker::new(name, cb)?.with_observer(observer.clone()))
                }
                (None, None) => continue,
            };
            protections.insert(name.to_string(), protection);
        }

        let monitor = HealthMonitor::new(&options.health_check);
        let mut probes: BTreeMap<String, Probe<T>> = probes.into_iter().collect();
        for name in connections.names() {
            monitor.register(name, probes.remove(name));
        }

        tracing::debug!(
            resources = connections.len(),
            failover = options.failover.len(),
            protected = protections.len(),
            "Sentinel built"
        );

        Ok(Sentinel {
            inner: Arc::new(Inner {
                registry: connections,
                monitor,
                router: FailoverRouter::new(options.failover),
                cache: ResolutionCache::new(),
                protections,
                events,
                lifecycle: Lifecycle::new(),
                health_checks: options.health_check.enabled,
                cycle_in_flight: AtomicBool::new(false),
                latch: ShutdownLatch::new(),
                shutdown_task: Mutex::new(None),
            }),
        })
    }
}

impl<T: Send + Sync + 'static> Default for SentinelBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_connections_rejected() {
        let err = SentinelBuilder::<()>::new().build().unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors, vec![ValidationError::NoConnections]),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_all_problems_reported() {
        let err = SentinelBuilder::new()
            .connection("primary", ())
            .failover("primary", "ghost")
            .probe("nobody", |_| async { Ok::<_, BoxError>(true) })
            .circuit_breaker(CircuitBreakerOptions {
                half_open_successes: 0,
                ..Default::default()
            })
            .build()
            .unwrap_err();

        let ConfigError::Validation(errors) = err else {
            panic!("expected validation errors");
        };
        assert!(errors.contains(&ValidationError::UnknownBackup {
            primary: "primary".into(),
            backup: "ghost".into(),
        }));
        assert!(errors.contains(&ValidationError::UnknownProbeTarget { name: "nobody".into() }));
        assert!(errors.contains(&ValidationError::InvalidHalfOpenSuccesses(0)));
    }

    #[test]
    fn test_options_keep_earlier_failover() {
        let mut opts = SentinelOptions::default();
        opts.failover.insert("cache".into(), "cache-b".into());

        let sentinel = SentinelBuilder::new()
            .connection("db", 1)
            .connection("db-replica", 2)
            .connection("cache", 3)
            .connection("cache-b", 4)
            .failover("db", "db-replica")
            .options(opts)
            .build()
            .unwrap();

        let mappings = sentinel.inner.router.mappings();
        assert_eq!(mappings.get("db").map(String::as_str), Some("db-replica"));
        assert_eq!(mappings.get("cache").map(String::as_str), Some("cache-b"));
    }
}
