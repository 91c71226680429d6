//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::{ready, Ready};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use connection_sentinel::{Event, EventKind, HealthCheckOptions, HealthStatus, Sentinel};

/// Stand-in for a database client or similar handle.
#[derive(Debug)]
pub struct FakeClient {
    pub name: &'static str,
    pub calls: AtomicUsize,
}

impl FakeClient {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call(&self) -> &'static str {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.name
    }
}

/// Probe outcome a test can flip at runtime.
#[derive(Clone, Debug)]
pub struct Switch(Arc<AtomicU8>);

impl Switch {
    pub fn new(status: HealthStatus) -> Self {
        let s = Self(Arc::new(AtomicU8::new(0)));
        s.set(status);
        s
    }

    pub fn set(&self, status: HealthStatus) {
        let v = match status {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
        };
        self.0.store(v, Ordering::SeqCst);
    }

    pub fn get(&self) -> HealthStatus {
        match self.0.load(Ordering::SeqCst) {
            0 => HealthStatus::Healthy,
            1 => HealthStatus::Degraded,
            _ => HealthStatus::Unhealthy,
        }
    }

    /// A probe reporting the switch's status; unhealthy is reported as an error.
    pub fn probe<T: 'static>(&self) -> impl Fn(Arc<T>) -> Ready<Result<HealthStatus, String>> + Send + Sync + 'static {
        let switch = self.clone();
        move |_: Arc<T>| {
            ready(match switch.get() {
                HealthStatus::Unhealthy => Err("connection refused".to_string()),
                status => Ok(status),
            })
        }
    }
}

/// Health options for tests that drive cycles by hand.
pub fn manual_checks() -> HealthCheckOptions {
    HealthCheckOptions {
        enabled: false,
        ..Default::default()
    }
}

/// Health options with a short schedule.
pub fn scheduled_checks(interval_ms: u64) -> HealthCheckOptions {
    HealthCheckOptions {
        enabled: true,
        interval: Duration::from_millis(interval_ms),
        timeout: Duration::from_millis(interval_ms / 2),
        ..Default::default()
    }
}

/// Events captured by synchronous listeners.
#[derive(Clone, Default)]
pub struct Recorded(Arc<Mutex<Vec<Event>>>);

impl Recorded {
    pub fn all(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.0.lock().unwrap().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn of(&self, kind: EventKind) -> Vec<Event> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }
}

/// Record every event of the given kinds.
pub fn record<T: Send + Sync + 'static>(sentinel: &Sentinel<T>, kinds: &[EventKind]) -> Recorded {
    let recorded = Recorded::default();
    for kind in kinds {
        let sink = recorded.0.clone();
        sentinel.on(*kind, move |event| sink.lock().unwrap().push(event.clone()));
    }
    recorded
}
