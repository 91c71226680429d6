//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! connect()/disconnect() (state.rs):
//!     Idle → Connected → Disconnecting → Disconnected
//!
//! Shutdown handler (shutdown.rs + signals.rs):
//!     Signal received → latch engaged (first signal only)
//!     → emit shutdown event → disconnect() → optional process exit
//! ```
//!
//! # Design Decisions
//! - Duplicate connect/disconnect calls are no-ops, not errors
//! - Re-registering the shutdown handler tears down the previous one first
//! - Nothing here exits the process unless the caller opted in

pub mod shutdown;
pub mod signals;
pub mod state;

pub use shutdown::{ShutdownLatch, ShutdownOptions, StopSignal};
pub use signals::{Signal, SignalListener};
pub use state::{Lifecycle, LifecycleState};
