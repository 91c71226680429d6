//! Active health checking.
//!
//! # Responsibilities
//! - Own the per-resource health status table
//! - Run a resource's probe with timeout and bounded retry
//! - Drive exactly one recurring check cycle

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::duration::MAX_DURATION;
use crate::config::{HealthCheckOptions, RetryOptions};
use crate::health::probe::{CheckResult, HealthCheckError, Probe, ProbeVerdict};
use crate::health::HealthStatus;
use crate::lifecycle::StopSignal;
use crate::resilience::backoff::retry_delay;

struct Scheduler {
    stop: StopSignal,
    // Detached on stop; the task exits at its next poll.
    _task: JoinHandle<()>,
}

/// Health status owner and probe runner for resources of type `T`.
pub struct HealthMonitor<T> {
    statuses: DashMap<String, HealthStatus>,
    probes: DashMap<String, Probe<T>>,
    interval: Duration,
    timeout: Duration,
    retry: RetryOptions,
    scheduler: Mutex<Option<Scheduler>>,
}

impl<T: Send + Sync + 'static> HealthMonitor<T> {
    pub fn new(options: &HealthCheckOptions) -> Self {
        Self {
            statuses: DashMap::new(),
            probes: DashMap::new(),
            interval: options.interval,
            timeout: options.timeout,
            retry: options.retry.clone(),
            scheduler: Mutex::new(None),
        }
    }

    /// Track a resource. Without a probe it is always considered healthy.
    pub fn register(&self, name: &str, probe: Option<Probe<T>>) {
        self.statuses.entry(name.to_string()).or_insert(HealthStatus::Healthy);
        match probe {
            Some(probe) => {
                self.probes.insert(name.to_string(), probe);
            }
            None => {
                self.probes.remove(name);
            }
        }
    }

    pub fn unregister(&self, name: &str) {
        self.statuses.remove(name);
        self.probes.remove(name);
    }

    pub fn status(&self, name: &str) -> Option<HealthStatus> {
        self.statuses.get(name).map(|s| *s)
    }

    pub fn all_status(&self) -> Vec<(String, HealthStatus)> {
        self.statuses
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Overwrite a registered resource's status, returning the previous one.
    ///
    /// Unregistered names are left untouched and yield `None`.
    pub fn set_status(&self, name: &str, status: HealthStatus) -> Option<HealthStatus> {
        self.statuses
            .get_mut(name)
            .map(|mut entry| std::mem::replace(entry.value_mut(), status))
    }

    /// Probe one resource, retrying failed attempts.
    ///
    /// Does not touch the status table; the caller decides what to do with
    /// the outcome.
    pub async fn check(&self, name: &str, handle: Arc<T>) -> CheckResult {
        let Some(probe) = self.probes.get(name).map(|p| p.value().clone()) else {
            return CheckResult::unprobed();
        };

        let max_attempts = self.retry.retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.attempt(&probe, handle.clone()).await {
                Ok(verdict) => {
                    let status = match verdict {
                        ProbeVerdict::Degraded => HealthStatus::Degraded,
                        _ => HealthStatus::Healthy,
                    };
                    return CheckResult {
                        status,
                        error: None,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    tracing::debug!(
                        resource = %name,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Health probe attempt failed"
                    );
                    last_error = Some(e);
                }
            }

            if attempt < max_attempts {
                time::sleep(retry_delay(&self.retry, attempt)).await;
            }
        }

        CheckResult {
            status: HealthStatus::Unhealthy,
            error: last_error,
            attempts: max_attempts,
        }
    }

    async fn attempt(&self, probe: &Probe<T>, handle: Arc<T>) -> Result<ProbeVerdict, HealthCheckError> {
        let probe = probe.clone();
        // The call itself sits inside the async block so a probe that panics
        // before returning its future is caught too.
        let guarded = AssertUnwindSafe(async move { probe.call(handle).await }).catch_unwind();

        match time::timeout(self.timeout, guarded).await {
            Err(_) => Err(HealthCheckError::Timeout { after: self.timeout }),
            Ok(Err(_)) => Err(HealthCheckError::Panicked),
            Ok(Ok(Err(e))) => Err(HealthCheckError::Failed(e.to_string())),
            Ok(Ok(Ok(ProbeVerdict::Unhealthy))) => Err(HealthCheckError::Reported(HealthStatus::Unhealthy)),
            Ok(Ok(Ok(verdict))) => Ok(verdict),
        }
    }

    /// Start the recurring cycle. Returns `false` if one is already running.
    ///
    /// The first cycle runs one interval after start. A cycle is awaited
    /// before the next tick is taken, so cycles never overlap; ticks missed
    /// while a slow cycle runs are skipped.
    pub fn start<F, Fut>(&self, cycle: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut scheduler = self.scheduler.lock();
        if scheduler.is_some() {
            return false;
        }

        let signal = StopSignal::new();
        let mut stop = signal.subscribe();
        // Unbounded intervals would overflow the first deadline.
        let interval = self.interval.min(MAX_DURATION);

        tracing::info!(interval = ?interval, timeout = ?self.timeout, "Health monitor starting");

        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = cycle() => {}
                            _ = stop.recv() => break,
                        }
                    }
                    _ = stop.recv() => break,
                }
            }

            tracing::info!("Health monitor received shutdown signal, exiting loop");
        });

        *scheduler = Some(Scheduler { stop: signal, _task: task });
        true
    }

    /// Stop the recurring cycle. An in-flight cycle is abandoned at its next
    /// suspension point.
    pub fn stop(&self) {
        if let Some(scheduler) = self.scheduler.lock().take() {
            if !scheduler.stop.trigger() {
                tracing::debug!("Health scheduler had already exited");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.lock().is_some()
    }
}

impl<T> Drop for HealthMonitor<T> {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.get_mut().take() {
            scheduler.stop.trigger();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::probe::BoxError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn options(retries: u32) -> HealthCheckOptions {
        HealthCheckOptions {
            enabled: true,
            interval: Duration::from_millis(100),
            timeout: Duration::from_millis(50),
            retry: RetryOptions {
                retries,
                delay: Duration::from_millis(10),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_unprobed_is_healthy() {
        let monitor: HealthMonitor<()> = HealthMonitor::new(&options(0));
        monitor.register("db", None);

        let result = monitor.check("db", Arc::new(())).await;
        assert_eq!(result, CheckResult::unprobed());
        assert_eq!(monitor.status("db"), Some(HealthStatus::Healthy));
    }

    #[tokio::test]
    async fn test_degraded_verdict() {
        let monitor: HealthMonitor<()> = HealthMonitor::new(&options(0));
        monitor.register(
            "db",
            Some(Probe::new(|_| async { Ok::<_, BoxError>(HealthStatus::Degraded) })),
        );

        let result = monitor.check("db", Arc::new(())).await;
        assert_eq!(result.status, HealthStatus::Degraded);
        assert!(result.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let monitor: HealthMonitor<()> = HealthMonitor::new(&options(0));
        monitor.register(
            "slow",
            Some(Probe::new(|_| async {
                time::sleep(Duration::from_secs(10)).await;
                Ok::<_, BoxError>(true)
            })),
        );

        let result = monitor.check("slow", Arc::new(())).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(
            result.error,
            Some(HealthCheckError::Timeout { after: Duration::from_millis(50) })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let monitor: HealthMonitor<()> = HealthMonitor::new(&options(2));
        monitor.register(
            "flaky",
            Some(Probe::new(move |_| {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err::<bool, BoxError>("refused".into())
                    } else {
                        Ok(true)
                    }
                }
            })),
        );

        let result = monitor.check("flaky", Arc::new(())).await;
        assert_eq!(result.status, HealthStatus::Healthy);
        assert_eq!(result.attempts, 3);
        assert!(result.error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_keeps_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let monitor: HealthMonitor<()> = HealthMonitor::new(&options(1));
        monitor.register(
            "down",
            Some(Probe::new(move |_| {
                let n = c.fetch_add(1, Ordering::SeqCst);
                async move { Err::<bool, BoxError>(format!("attempt {} refused", n + 1).into()) }
            })),
        );

        let result = monitor.check("down", Arc::new(())).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.error, Some(HealthCheckError::Failed("attempt 2 refused".into())));
    }

    #[tokio::test]
    async fn test_false_and_panic_are_failures() {
        let monitor: HealthMonitor<()> = HealthMonitor::new(&options(0));
        monitor.register("no", Some(Probe::new(|_| async { Ok::<_, BoxError>(false) })));
        monitor.register(
            "boom",
            Some(Probe::new(|_| async {
                if true {
                    panic!("probe exploded");
                }
                Ok::<_, BoxError>(true)
            })),
        );

        let no = monitor.check("no", Arc::new(())).await;
        assert_eq!(no.error, Some(HealthCheckError::Reported(HealthStatus::Unhealthy)));

        let boom = monitor.check("boom", Arc::new(())).await;
        assert_eq!(boom.status, HealthStatus::Unhealthy);
        assert_eq!(boom.error, Some(HealthCheckError::Panicked));
    }

    #[test]
    fn test_set_status_returns_previous() {
        let monitor: HealthMonitor<()> = HealthMonitor::new(&options(0));
        monitor.register("db", None);

        assert_eq!(monitor.set_status("db", HealthStatus::Degraded), Some(HealthStatus::Healthy));
        assert_eq!(monitor.status("db"), Some(HealthStatus::Degraded));
        assert_eq!(monitor.set_status("ghost", HealthStatus::Unhealthy), None);
        assert_eq!(monitor.status("ghost"), None);

        monitor.unregister("db");
        assert_eq!(monitor.status("db"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_and_stop_halts() {
        let monitor: HealthMonitor<()> = HealthMonitor::new(&options(0));
        let cycles = Arc::new(AtomicU32::new(0));

        let c = cycles.clone();
        assert!(monitor.start(move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        }));
        assert!(!monitor.start(|| async {}));
        assert!(monitor.is_running());

        time::sleep(Duration::from_millis(350)).await;
        assert_eq!(cycles.load(Ordering::SeqCst), 3);

        monitor.stop();
        assert!(!monitor.is_running());
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(cycles.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycles_do_not_overlap() {
        let monitor: HealthMonitor<()> = HealthMonitor::new(&options(0));
        let active = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let (a, m) = (active.clone(), max_seen.clone());
        monitor.start(move || {
            let (a, m) = (a.clone(), m.clone());
            async move {
                let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                m.fetch_max(now, Ordering::SeqCst);
                time::sleep(Duration::from_millis(250)).await;
                a.fetch_sub(1, Ordering::SeqCst);
            }
        });

        time::sleep(Duration::from_secs(2)).await;
        monitor.stop();
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
