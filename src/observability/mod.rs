//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → events.rs (typed notifications to listeners and subscribers)
//!     → tracing macros (structured log events, see logging.rs)
//!     → metrics.rs (gauges and counters via the metrics facade)
//! ```
//!
//! # Design Decisions
//! - Events are the public contract; logs and metrics are best-effort
//! - Event delivery is synchronous so listeners observe transitions in order
//! - Metrics are cheap (no exporter unless the host installs one)

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{ErrorContext, Event, EventBus, EventKind, ListenerId, SharedError};
