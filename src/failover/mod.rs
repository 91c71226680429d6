//! Failover subsystem.
//!
//! # Data Flow
//! ```text
//! get/execute(name)
//!     → cache.rs (memoized resolution, cleared on every health transition)
//!     → router.rs resolve(name, status lookup) on a miss
//!     → caller toggles the active-failover set and emits failover/recovery
//! ```
//!
//! # Design Decisions
//! - Mapping is static and validated at construction
//! - Cache invalidation is wholesale; a precise scheme is not worth the risk
//!   of leaving one stale entry behind

pub mod cache;
pub mod router;

pub use cache::ResolutionCache;
pub use router::{FailoverRouter, Resolution};
