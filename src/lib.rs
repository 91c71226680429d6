//! Connection Sentinel
//!
//! Health tracking, circuit breaking and transparent failover for a set of
//! named, externally owned resources (database clients, caches, remote
//! services).
//!
//! # Architecture Overview
//!
//! ```text
//!     caller
//!       │ get(name) / execute(name, op)
//!       ▼
//!  ┌──────────────────────────── coordinator ─────────────────────────────┐
//!  │  resolve_and_route                                                     │
//!  │    ┌──────────┐   status    ┌──────────┐   resolved   ┌────────────┐   │
//!  │    │ failover │◀────────────│  health  │   name ────▶ │ resilience │   │
//!  │    │  router  │             │ monitor  │              │  circuit   │   │
//!  │    │ + cache  │             └────▲─────┘              └─────▲──────┘   │
//!  │    └──────────┘                  │ periodic cycle           │ force    │
//!  │                                  └──── transitions ─────────┘ open/close│
//!  └────────────────────────────────────────┬──────────────────────────────┘
//!                                           │ events (observability)
//!                                           ▼
//!                                      listeners / subscribers
//! ```
//!
//! ```no_run
//! use connection_sentinel::{HealthStatus, Sentinel};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let sentinel = Sentinel::builder()
//!     .connection("primary", "postgres://primary".to_string())
//!     .connection("replica", "postgres://replica".to_string())
//!     .failover("primary", "replica")
//!     .probe("primary", |_db| async { Ok::<_, std::io::Error>(HealthStatus::Healthy) })
//!     .build()?;
//!
//! sentinel.connect();
//! let db = sentinel.get("primary")?;
//! println!("serving from {}", db);
//! # Ok(())
//! # }
//! ```

// Core subsystems
pub mod config;
pub mod coordinator;
pub mod failover;
pub mod health;
pub mod registry;
pub mod resilience;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::{CircuitBreakerOptions, HealthCheckOptions, RetryOptions, SentinelOptions};
pub use coordinator::{ResourceHealth, ResourceStats, Sentinel, SentinelBuilder, ShutdownRegistration};
pub use error::{CircuitOpenError, ExecuteError, SentinelError};
pub use health::{HealthStatus, ProbeVerdict};
pub use lifecycle::{ShutdownOptions, Signal};
pub use observability::{Event, EventKind, ListenerId};
pub use resilience::{CircuitState, ExternalBreaker};
