//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (failover backups reference existing resources)
//! - Validate value ranges (thresholds >= 1, durations in (0, 24h])
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function over the options and the resource names
//! - Runs before a sentinel is constructed; nothing is checked lazily at first use

use std::collections::BTreeSet;
use std::time::Duration;

use thiserror::Error;

use crate::config::duration::MAX_DURATION;
use crate::config::schema::{CircuitBreakerOptions, SentinelOptions};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("at least one connection must be registered")]
    NoConnections,

    #[error("failover for '{primary}' references unknown connection '{backup}'")]
    UnknownBackup { primary: String, backup: String },

    #[error("connection '{name}' cannot fail over to itself")]
    SelfFailover { name: String },

    #[error("probe registered for unknown connection '{name}'")]
    UnknownProbeTarget { name: String },

    #[error("circuit breaker threshold must be at least 1 (got {0})")]
    InvalidThreshold(u32),

    #[error("circuit breaker half_open_successes must be at least 1 (got {0})")]
    InvalidHalfOpenSuccesses(u32),

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("{field} must not exceed {max:?} (got {value:?})")]
    DurationTooLong {
        field: &'static str,
        value: Duration,
        max: Duration,
    },

    #[error("external circuit breaker must offer a `fire` or `execute` call")]
    UnsupportedBreaker,
}

/// Checks that only need the options themselves.
pub fn validate_options(options: &SentinelOptions) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (primary, backup) in &options.failover {
        if primary == backup {
            errors.push(ValidationError::SelfFailover { name: primary.clone() });
        }
    }

    let health = &options.health_check;
    let durations = [
        ("health_check.interval", health.interval, false),
        ("health_check.timeout", health.timeout, false),
        ("health_check.retry.delay", health.retry.delay, true),
        ("health_check.retry.max_delay", health.retry.max_delay, true),
    ];
    for (field, value, zero_ok) in durations {
        if let Err(e) = check_duration(field, value, zero_ok) {
            errors.push(e);
        }
    }

    if let Some(cb) = &options.circuit_breaker {
        if let Err(e) = validate_circuit_breaker(cb) {
            errors.push(e);
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Full validation against the set of registered connection names.
pub fn validate_against<'a, I>(options: &SentinelOptions, names: I) -> Result<(), Vec<ValidationError>>
where
    I: IntoIterator<Item = &'a str>,
{
    let names: BTreeSet<&str> = names.into_iter().collect();
    let mut errors = Vec::new();

    if names.is_empty() {
        errors.push(ValidationError::NoConnections);
    }

    for (primary, backup) in &options.failover {
        if !names.contains(backup.as_str()) {
            errors.push(ValidationError::UnknownBackup {
                primary: primary.clone(),
                backup: backup.clone(),
            });
        }
        if !names.contains(primary.as_str()) {
            tracing::warn!(primary = %primary, "Failover mapping declared for unregistered connection");
        }
    }

    if let Err(mut rest) = validate_options(options) {
        errors.append(&mut rest);
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Range checks for the native circuit breaker.
pub fn validate_circuit_breaker(options: &CircuitBreakerOptions) -> Result<(), ValidationError> {
    if options.threshold < 1 {
        return Err(ValidationError::InvalidThreshold(options.threshold));
    }
    if options.half_open_successes < 1 {
        return Err(ValidationError::InvalidHalfOpenSuccesses(options.half_open_successes));
    }
    check_duration("circuit_breaker.reset_timeout", options.reset_timeout, false)
}

/// Durations set in code bypass the string grammar, so the same bounds are
/// enforced here. Anything past 24h would also overflow `Instant` arithmetic.
fn check_duration(field: &'static str, value: Duration, zero_ok: bool) -> Result<(), ValidationError> {
    if value.is_zero() && !zero_ok {
        return Err(ValidationError::ZeroDuration { field });
    }
    if value > MAX_DURATION {
        return Err(ValidationError::DurationTooLong {
            field,
            value,
            max: MAX_DURATION,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::HealthCheckOptions;

    #[test]
    fn test_valid_options() {
        let mut opts = SentinelOptions::default();
        opts.failover.insert("primary".into(), "backup".into());
        assert!(validate_against(&opts, ["primary", "backup"]).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut opts = SentinelOptions::default();
        opts.failover.insert("primary".into(), "missing".into());
        opts.failover.insert("loop".into(), "loop".into());
        opts.health_check.interval = Duration::ZERO;
        opts.circuit_breaker = Some(CircuitBreakerOptions {
            threshold: 0,
            ..Default::default()
        });

        let errors = validate_against(&opts, ["primary"]).unwrap_err();
        assert!(errors.contains(&ValidationError::UnknownBackup {
            primary: "primary".into(),
            backup: "missing".into(),
        }));
        assert!(errors.contains(&ValidationError::SelfFailover { name: "loop".into() }));
        assert!(errors.contains(&ValidationError::ZeroDuration { field: "health_check.interval" }));
        assert!(errors.contains(&ValidationError::InvalidThreshold(0)));
    }

    #[test]
    fn test_empty_connections() {
        let opts = SentinelOptions::default();
        let errors = validate_against(&opts, std::iter::empty()).unwrap_err();
        assert_eq!(errors, vec![ValidationError::NoConnections]);
    }

    #[test]
    fn test_half_open_successes_range() {
        let cb = CircuitBreakerOptions {
            half_open_successes: 0,
            ..Default::default()
        };
        assert_eq!(
            validate_circuit_breaker(&cb),
            Err(ValidationError::InvalidHalfOpenSuccesses(0))
        );
    }

    #[test]
    fn test_durations_capped_at_a_day() {
        let mut opts = SentinelOptions::default();
        opts.health_check = HealthCheckOptions {
            interval: Duration::MAX,
            timeout: MAX_DURATION + Duration::from_millis(1),
            ..Default::default()
        };
        opts.health_check.retry.max_delay = Duration::from_secs(u64::MAX);

        let errors = validate_options(&opts).unwrap_err();
        let fields: Vec<&str> = errors
            .iter()
            .map(|e| match e {
                ValidationError::DurationTooLong { field, max, .. } => {
                    assert_eq!(*max, MAX_DURATION);
                    *field
                }
                other => panic!("unexpected error {:?}", other),
            })
            .collect();
        assert_eq!(
            fields,
            vec!["health_check.interval", "health_check.timeout", "health_check.retry.max_delay"]
        );

        opts.health_check = HealthCheckOptions {
            interval: MAX_DURATION,
            timeout: MAX_DURATION,
            ..Default::default()
        };
        assert!(validate_options(&opts).is_ok());
    }

    #[test]
    fn test_reset_timeout_range() {
        let too_long = CircuitBreakerOptions {
            reset_timeout: Duration::MAX,
            ..Default::default()
        };
        assert!(matches!(
            validate_circuit_breaker(&too_long),
            Err(ValidationError::DurationTooLong { field: "circuit_breaker.reset_timeout", .. })
        ));

        let zero = CircuitBreakerOptions {
            reset_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(
            validate_circuit_breaker(&zero),
            Err(ValidationError::ZeroDuration { field: "circuit_breaker.reset_timeout" })
        );
    }
}
