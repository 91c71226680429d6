//! Coordinating layer.
//!
//! # Data Flow
//! ```text
//! get(name) / execute(name, op):
//!     → resolve_and_route (no suspension inside)
//!         → ResolutionCache → FailoverRouter::resolve(status lookup)
//!         → circuit of the RESOLVED name: open → CircuitOpenError
//!         → failover/recovery event on an edge of the active set
//!     → handle → op(handle) through the same circuit
//!
//! Health cycle (scheduled, or check_health()):
//!     → every resource checked concurrently (join_all)
//!     → per resource, on a changed status:
//!         set status → clear cache → health-changed
//!         → unhealthy: force circuit open
//!         → healthy while open: force circuit closed
//!     → final probe error → error event
//! ```
//!
//! # Design Decisions
//! - One resolution per call, so the served handle and the recorded outcome
//!   always refer to the same resource
//! - At most one health cycle in flight, guarded here as well as in the scheduler
//! - Background tasks hold weak references; dropping the last `Sentinel`
//!   stops them

mod builder;
mod report;
mod sentinel;
mod shutdown;

pub use builder::SentinelBuilder;
pub use report::{ResourceHealth, ResourceStats};
pub use sentinel::Sentinel;
pub use shutdown::ShutdownRegistration;
