//! Shutdown coordination.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::lifecycle::Signal;

/// Stop request for a single background task.
///
/// The channel holds one message, so subscribe before spawning the task that
/// listens; a receiver created after [`StopSignal::trigger`] never sees it.
pub struct StopSignal {
    tx: broadcast::Sender<()>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Ask listeners to stop. Returns `false` when none was left to hear it,
    /// meaning the task had already finished.
    pub fn trigger(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot latch guarding the disconnect-and-exit sequence.
///
/// However many signals arrive, only the first [`ShutdownLatch::try_begin`] wins.
#[derive(Debug, Default)]
pub struct ShutdownLatch {
    engaged: AtomicBool,
}

impl ShutdownLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engage the latch. Returns `true` only for the first caller.
    pub fn try_begin(&self) -> bool {
        !self.engaged.swap(true, Ordering::SeqCst)
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::SeqCst)
    }
}

/// How `register_shutdown_handler` reacts to process signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownOptions {
    /// Signals that trigger the shutdown sequence.
    pub signals: Vec<Signal>,

    /// Exit code passed to `std::process::exit`.
    pub exit_code: i32,

    /// Terminate the process after disconnecting.
    pub exit_on_trigger: bool,
}

impl Default for ShutdownOptions {
    fn default() -> Self {
        Self {
            signals: vec![Signal::Interrupt, Signal::Terminate],
            exit_code: 0,
            exit_on_trigger: true,
        }
    }
}
