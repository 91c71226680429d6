//! Signal-driven shutdown.
//!
//! # Data Flow
//! ```text
//! register_shutdown_handler(options)
//!     → abort the previously registered listener task, if any
//!     → install signal streams, spawn one listener task
//!
//! signal received
//!     → shutdown(signal): latch (first caller only)
//!         → emit `shutdown` → disconnect()
//!     → exit(exit_code) if exit_on_trigger
//! ```

use std::sync::Arc;

use tokio::task::AbortHandle;

use crate::coordinator::sentinel::Sentinel;
use crate::error::SentinelError;
use crate::lifecycle::{ShutdownOptions, Signal, SignalListener};
use crate::observability::events::now_millis;
use crate::observability::Event;

/// Handle to an installed shutdown handler.
#[derive(Debug)]
pub struct ShutdownRegistration {
    task: AbortHandle,
}

impl ShutdownRegistration {
    /// Remove the handler. Signals received afterwards are not acted on.
    ///
    /// The OS default disposition is not restored: tokio keeps its signal
    /// handlers installed for the life of the process, so a listened-for
    /// signal such as SIGTERM is consumed silently after cancellation instead
    /// of terminating the process. The same holds for signals dropped by
    /// re-registering with a different set.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl<T: Send + Sync + 'static> Sentinel<T> {
    /// Disconnect (and optionally exit) when one of `options.signals` arrives.
    ///
    /// Replaces any handler registered earlier. Must be called from within a
    /// tokio runtime.
    pub fn register_shutdown_handler(&self, options: ShutdownOptions) -> Result<ShutdownRegistration, SentinelError> {
        let mut slot = self.inner.shutdown_task.lock();
        if let Some(previous) = slot.take() {
            previous.abort();
            tracing::debug!("Replaced previously registered shutdown handler");
        }

        let mut listener = SignalListener::install(&options.signals)?;
        let weak = Arc::downgrade(&self.inner);

        let task = tokio::spawn(async move {
            while let Some(signal) = listener.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                let sentinel = Sentinel { inner };
                if !sentinel.shutdown(signal) {
                    continue;
                }
                // Exit even if there was nothing left to disconnect, otherwise
                // an idle sentinel would swallow the signal.
                if options.exit_on_trigger {
                    tracing::info!(exit_code = options.exit_code, "Exiting after shutdown");
                    std::process::exit(options.exit_code);
                }
                break;
            }
        });

        tracing::info!(
            signals = ?options.signals,
            exit_on_trigger = options.exit_on_trigger,
            "Shutdown handler registered"
        );

        let registration = ShutdownRegistration {
            task: task.abort_handle(),
        };
        *slot = Some(task);
        Ok(registration)
    }

    /// Run the shutdown sequence: emit `shutdown`, then disconnect.
    ///
    /// Only the first call over the sentinel's lifetime does anything; later
    /// calls, however close together, return `false`. The first call wins the
    /// latch even when the sentinel is not connected.
    pub fn shutdown(&self, signal: Signal) -> bool {
        let inner = &self.inner;
        if !inner.latch.try_begin() {
            tracing::debug!(%signal, "Shutdown already in progress");
            return false;
        }

        tracing::info!(%signal, "Shutdown triggered");
        inner.events.emit(Event::Shutdown {
            signal,
            timestamp: now_millis(),
        });
        inner.disconnect();
        true
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.latch.is_engaged()
    }
}
