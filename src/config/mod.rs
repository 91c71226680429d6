//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! options file (TOML) or SentinelOptions built in code
//!     → loader.rs (parse & deserialize, durations via duration.rs)
//!     → validation.rs (semantic checks)
//!     → Sentinel::builder().build() (checks against registered connections)
//!     → immutable for the lifetime of the sentinel
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Configuration errors surface at construction, never at first use

pub mod duration;
pub mod loader;
pub mod schema;
pub mod validation;

pub use duration::{parse_duration, DurationError};
pub use loader::{load_options, parse_options, ConfigError};
pub use schema::{
    BackoffKind, CircuitBreakerOptions, EventOptions, HealthCheckOptions, RetryOptions,
    SentinelOptions,
};
pub use validation::ValidationError;
