//! Error types shared across subsystems.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::resilience::CircuitError;

/// Fail-fast rejection from an open circuit. Carries both the name the caller
/// asked for and the resource whose circuit refused the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitOpenError {
    /// Resource whose circuit is open.
    pub name: String,
    /// Name originally requested by the caller.
    pub requested: String,
    /// Extra context from an external breaker, if it gave any.
    pub detail: Option<String>,
}

impl fmt::Display for CircuitOpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "circuit breaker open for '{}'", self.name)?;
        if self.requested != self.name {
            write!(f, " (requested '{}')", self.requested)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for CircuitOpenError {}

impl CircuitOpenError {
    pub fn new(name: &str, requested: &str) -> Self {
        Self {
            name: name.to_string(),
            requested: requested.to_string(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Errors from sentinel construction and routing.
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    #[error("unknown connection '{0}'")]
    UnknownResource(String),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[from] std::io::Error),
}

/// Error from [`Sentinel::execute`](crate::Sentinel::execute).
#[derive(Debug)]
pub enum ExecuteError<E> {
    /// The resolved resource's circuit refused the call; the operation never ran.
    CircuitOpen(CircuitOpenError),
    /// The requested name is not a registered connection.
    UnknownResource(String),
    /// The operation ran and returned this error, unmodified.
    Operation(E),
}

impl<E> ExecuteError<E> {
    /// The operation's own error, if that is what this is.
    pub fn into_operation(self) -> Option<E> {
        match self {
            ExecuteError::Operation(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ExecuteError::CircuitOpen(_))
    }
}

impl<E: fmt::Display> fmt::Display for ExecuteError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecuteError::CircuitOpen(e) => e.fmt(f),
            ExecuteError::UnknownResource(name) => write!(f, "unknown connection '{}'", name),
            ExecuteError::Operation(e) => e.fmt(f),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for ExecuteError<E> {}

impl<E> From<CircuitError<E>> for ExecuteError<E> {
    fn from(err: CircuitError<E>) -> Self {
        match err {
            CircuitError::Open(e) => ExecuteError::CircuitOpen(e),
            CircuitError::Operation(e) => ExecuteError::Operation(e),
        }
    }
}
