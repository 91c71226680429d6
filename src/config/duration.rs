//! Duration strings.
//!
//! # Grammar
//! ```text
//! <positive-integer><unit>    unit ∈ { ms, s, m, h }
//! ```
//!
//! # Design Decisions
//! - Zero and negative values are rejected, as is anything above 24 hours
//! - Config fields accept either a duration string or a plain integer of milliseconds

use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer, Visitor};
use serde::Serializer;
use thiserror::Error;

/// Longest duration the grammar accepts.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors produced while parsing a duration string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("duration is empty")]
    Empty,

    #[error("invalid duration '{0}': expected <positive integer><ms|s|m|h>")]
    Malformed(String),

    #[error("duration '{0}' must be positive")]
    NotPositive(String),

    #[error("duration '{0}' exceeds the 24h maximum")]
    TooLong(String),
}

/// Parse a duration string such as `30s` or `250ms`.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DurationError::Empty);
    }

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| DurationError::Malformed(input.to_string()))?;
    let (digits, unit) = trimmed.split_at(split);

    if digits.is_empty() {
        // "-5s" lands here as well as "s"
        return if trimmed.starts_with('-') {
            Err(DurationError::NotPositive(input.to_string()))
        } else {
            Err(DurationError::Malformed(input.to_string()))
        };
    }

    let multiplier_ms: u64 = match unit {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        _ => return Err(DurationError::Malformed(input.to_string())),
    };

    // Anything that overflows u64 is far beyond the maximum anyway.
    let value: u64 = digits
        .parse()
        .map_err(|_| DurationError::TooLong(input.to_string()))?;
    if value == 0 {
        return Err(DurationError::NotPositive(input.to_string()));
    }

    let millis = value
        .checked_mul(multiplier_ms)
        .ok_or_else(|| DurationError::TooLong(input.to_string()))?;
    let duration = Duration::from_millis(millis);
    if duration > MAX_DURATION {
        return Err(DurationError::TooLong(input.to_string()));
    }

    Ok(duration)
}

/// Render a duration in the largest unit that represents it exactly.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis == 0 {
        return "0ms".to_string();
    }
    for (unit, size) in [("h", 3_600_000u128), ("m", 60_000), ("s", 1_000)] {
        if millis % size == 0 {
            return format!("{}{}", millis / size, unit);
        }
    }
    format!("{}ms", millis)
}

/// Serde support for `Duration` fields written as strings or milliseconds.
pub mod serde_duration {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        deserializer.deserialize_any(DurationVisitor)
    }

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a duration string like \"30s\" or an integer number of milliseconds")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
            parse_duration(value).map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
            let duration = Duration::from_millis(value);
            if duration > MAX_DURATION {
                return Err(E::custom(DurationError::TooLong(format!("{}ms", value))));
            }
            Ok(duration)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
            if value < 0 {
                return Err(E::custom(DurationError::NotPositive(value.to_string())));
            }
            self.visit_u64(value as u64)
        }
    }
}
