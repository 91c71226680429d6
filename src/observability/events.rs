//! Typed notifications.
//!
//! Every state change the sentinel makes is published as an [`Event`]. Events
//! are delivered synchronously to listeners registered with [`EventBus::on`]
//! and, without blocking, to `tokio::sync::broadcast` subscribers.

use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::health::HealthStatus;
use crate::lifecycle::Signal;

/// Wall-clock milliseconds since the UNIX epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Shared, cloneable error carried by [`Event::Error`].
pub type SharedError = Arc<dyn StdError + Send + Sync>;

/// Where a non-fatal error was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorContext {
    HealthCheck,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorContext::HealthCheck => f.write_str("health-check"),
        }
    }
}

/// Discriminant of [`Event`], used to register per-kind listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    HealthChanged,
    Failover,
    Recovery,
    CircuitOpen,
    CircuitClose,
    Error,
    Shutdown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::Disconnected => "disconnected",
            EventKind::HealthChanged => "health-changed",
            EventKind::Failover => "failover",
            EventKind::Recovery => "recovery",
            EventKind::CircuitOpen => "circuit-open",
            EventKind::CircuitClose => "circuit-close",
            EventKind::Error => "error",
            EventKind::Shutdown => "shutdown",
        }
    }
}

/// A notification emitted by the sentinel.
#[derive(Debug, Clone)]
pub enum Event {
    Connected {
        name: String,
        timestamp: u64,
    },
    Disconnected {
        name: String,
        timestamp: u64,
    },
    HealthChanged {
        name: String,
        previous: HealthStatus,
        current: HealthStatus,
        timestamp: u64,
    },
    Failover {
        primary: String,
        backup: String,
        timestamp: u64,
    },
    Recovery {
        primary: String,
        backup: String,
        timestamp: u64,
    },
    CircuitOpen {
        name: String,
        reason: Option<String>,
        timestamp: u64,
    },
    CircuitClose {
        name: String,
        reason: Option<String>,
        timestamp: u64,
    },
    Error {
        name: Option<String>,
        error: SharedError,
        context: ErrorContext,
        message: String,
        timestamp: u64,
    },
    Shutdown {
        signal: Signal,
        timestamp: u64,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Connected { .. } => EventKind::Connected,
            Event::Disconnected { .. } => EventKind::Disconnected,
            Event::HealthChanged { .. } => EventKind::HealthChanged,
            Event::Failover { .. } => EventKind::Failover,
            Event::Recovery { .. } => EventKind::Recovery,
            Event::CircuitOpen { .. } => EventKind::CircuitOpen,
            Event::CircuitClose { .. } => EventKind::CircuitClose,
            Event::Error { .. } => EventKind::Error,
            Event::Shutdown { .. } => EventKind::Shutdown,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Event::Connected { timestamp, .. }
            | Event::Disconnected { timestamp, .. }
            | Event::HealthChanged { timestamp, .. }
            | Event::Failover { timestamp, .. }
            | Event::Recovery { timestamp, .. }
            | Event::CircuitOpen { timestamp, .. }
            | Event::CircuitClose { timestamp, .. }
            | Event::Error { timestamp, .. }
            | Event::Shutdown { timestamp, .. } => *timestamp,
        }
    }
}

/// Handle returned by [`EventBus::on`], used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Fan-out point for [`Event`]s.
pub struct EventBus {
    listeners: RwLock<Vec<(ListenerId, Option<EventKind>, Listener)>>,
    next_id: AtomicU64,
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            tx,
        }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Register a synchronous listener for one kind of event.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add(Some(kind), Arc::new(listener))
    }

    /// Register a synchronous listener for all events.
    pub fn on_any<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add(None, Arc::new(listener))
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _, _)| *lid != id);
        listeners.len() != before
    }

    fn add(&self, kind: Option<EventKind>, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, kind, listener));
        id
    }

    /// Deliver an event to listeners, then to broadcast subscribers.
    pub fn emit(&self, event: Event) {
        let kind = event.kind();
        // Snapshot so a listener may register or remove listeners.
        let matching: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .filter(|(_, k, _)| k.map_or(true, |k| k == kind))
            .map(|(_, _, l)| l.clone())
            .collect();

        for listener in matching {
            listener(&event);
        }

        // No receivers is fine.
        let _ = self.tx.send(event);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}
