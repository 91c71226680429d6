//! Circuit protection through the sentinel.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use connection_sentinel::config::ValidationError;
use connection_sentinel::health::BoxError;
use connection_sentinel::resilience::{CallMethod, GuardedCall};
use connection_sentinel::{
    CircuitBreakerOptions, CircuitState, Event, EventKind, ExecuteError, ExternalBreaker, HealthStatus, Sentinel,
    SentinelError,
};

mod common;
use common::{manual_checks, record, FakeClient, Switch};

fn breaker(threshold: u32, reset_ms: u64) -> CircuitBreakerOptions {
    CircuitBreakerOptions {
        threshold,
        reset_timeout: Duration::from_millis(reset_ms),
        half_open_successes: 1,
    }
}

#[derive(Debug, PartialEq)]
struct QueryError(&'static str);

#[tokio::test(start_paused = true)]
async fn test_threshold_failures_open_and_fail_fast() {
    let sentinel = Sentinel::builder()
        .connection("db", FakeClient::new("db"))
        .health_check(manual_checks())
        .circuit_breaker(breaker(2, 10_000))
        .build()
        .unwrap();
    let events = record(&sentinel, &[EventKind::CircuitOpen]);
    let runs = Arc::new(AtomicU32::new(0));

    for _ in 0..2 {
        let r = runs.clone();
        let res = sentinel
            .execute("db", move |_| async move {
                r.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(QueryError("deadlock"))
            })
            .await;
        assert!(matches!(res, Err(ExecuteError::Operation(QueryError("deadlock")))));
    }

    let r = runs.clone();
    let res = sentinel
        .execute("db", move |_| async move {
            r.fetch_add(1, Ordering::SeqCst);
            Ok::<_, QueryError>(())
        })
        .await;
    assert!(res.as_ref().is_err_and(ExecuteError::is_circuit_open));
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    assert!(matches!(sentinel.get("db"), Err(SentinelError::CircuitOpen(_))));

    let opened = events.of(EventKind::CircuitOpen);
    assert_eq!(opened.len(), 1);
    match &opened[0] {
        Event::CircuitOpen { name, reason, .. } => {
            assert_eq!(name, "db");
            assert_eq!(reason.as_deref(), Some("failure-threshold"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_open_circuit_goes_half_open_after_reset_timeout() {
    let sentinel = Sentinel::builder()
        .connection("db", FakeClient::new("db"))
        .health_check(manual_checks())
        .circuit_breaker(breaker(1, 100))
        .build()
        .unwrap();

    assert!(sentinel.record_failure("db").unwrap());
    assert_eq!(sentinel.stats()["db"].circuit, Some(CircuitState::Open));
    assert!(sentinel.get("db").is_err());

    tokio::time::advance(Duration::from_millis(101)).await;
    assert_eq!(sentinel.stats()["db"].circuit, Some(CircuitState::HalfOpen));
    assert!(sentinel.get("db").is_ok());

    sentinel.record_success("db").unwrap();
    let stats = sentinel.stats();
    assert_eq!(stats["db"].circuit, Some(CircuitState::Closed));
    assert_eq!(stats["db"].failures, 0);
}

#[tokio::test]
async fn test_success_resets_failure_count() {
    let sentinel = Sentinel::builder()
        .connection("db", FakeClient::new("db"))
        .health_check(manual_checks())
        .circuit_breaker(breaker(3, 1000))
        .build()
        .unwrap();

    sentinel.record_failure("db").unwrap();
    sentinel.record_failure("db").unwrap();
    assert_eq!(sentinel.stats()["db"].failures, 2);

    let served = sentinel
        .execute("db", |client| async move { Ok::<_, QueryError>(client.call()) })
        .await
        .unwrap();
    assert_eq!(served, "db");
    assert_eq!(sentinel.stats()["db"].failures, 0);

    assert!(matches!(
        sentinel.record_failure("ghost"),
        Err(SentinelError::UnknownResource(name)) if name == "ghost"
    ));
}

#[tokio::test]
async fn test_unprotected_resource_passes_errors_through() {
    let sentinel = Sentinel::builder()
        .connection("cache", FakeClient::new("cache"))
        .health_check(manual_checks())
        .build()
        .unwrap();

    for _ in 0..10 {
        let res = sentinel
            .execute("cache", |_| async { Err::<(), _>(QueryError("miss")) })
            .await;
        assert!(matches!(res, Err(ExecuteError::Operation(QueryError("miss")))));
    }
    assert!(!sentinel.record_failure("cache").unwrap());
    assert_eq!(sentinel.stats()["cache"].circuit, None);
}

/// External breaker offering only an `execute` entry point.
#[derive(Default)]
struct ExternalExec {
    refusing: AtomicBool,
}

impl ExternalBreaker for ExternalExec {
    fn call_methods(&self) -> Vec<CallMethod> {
        vec![CallMethod::Execute]
    }

    fn execute<'a>(&'a self, call: GuardedCall) -> BoxFuture<'a, Result<(), BoxError>> {
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

struct NoMethods;

impl ExternalBreaker for NoMethods {
    fn call_methods(&self) -> Vec<CallMethod> {
        Vec::new()
    }
}

#[tokio::test]
async fn test_external_breaker_returns_original_error() {
    let external = Arc::new(ExternalExec::default());
    let sentinel = Sentinel::builder()
        .connection("db", FakeClient::new("db"))
        .health_check(manual_checks())
        .external_breaker(external.clone())
        .build()
        .unwrap();

    let res = sentinel
        .execute("db", |_| async { Err::<(), _>(QueryError("syntax error")) })
        .await;
    assert_eq!(res.unwrap_err().into_operation(), Some(QueryError("syntax error")));
    assert_eq!(sentinel.stats()["db"].failures, 1);

    external.refusing.store(true, Ordering::SeqCst);
    assert!(matches!(sentinel.get("db"), Err(SentinelError::CircuitOpen(_))));
}

#[tokio::test]
async fn test_external_breaker_synced_with_health() {
    let probe = Switch::new(HealthStatus::Unhealthy);
    let sentinel = Sentinel::builder()
        .connection("db", FakeClient::new("db"))
        .probe("db", probe.probe())
        .health_check(manual_checks())
        .external_breaker(Arc::new(ExternalExec::default()))
        .build()
        .unwrap();
    let events = record(&sentinel, &[EventKind::CircuitOpen, EventKind::CircuitClose]);

    sentinel.check_health().await;
    let res = sentinel.execute("db", |_| async { Ok::<_, QueryError>(()) }).await;
    assert!(res.as_ref().is_err_and(ExecuteError::is_circuit_open));

    probe.set(HealthStatus::Healthy);
    sentinel.check_health().await;
    assert!(sentinel.execute("db", |_| async { Ok::<_, QueryError>(()) }).await.is_ok());

    assert_eq!(events.count(EventKind::CircuitOpen), 1);
    assert_eq!(events.count(EventKind::CircuitClose), 1);
}

#[test]
fn test_external_breaker_without_call_method_rejected() {
    let res = Sentinel::builder()
        .connection("db", FakeClient::new("db"))
        .external_breaker(Arc::new(NoMethods))
        .build();

    match res {
        Err(connection_sentinel::config::ConfigError::Validation(errors)) => {
            assert_eq!(errors, vec![ValidationError::UnsupportedBreaker]);
        }
        other => panic!("expected a validation error, got {:?}", other.map(|_| ())),
    }
}
