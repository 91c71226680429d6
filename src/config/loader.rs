//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::SentinelOptions;
use crate::config::validation::{validate_options, ValidationError};

/// Error type for configuration loading and sentinel construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        ConfigError::Validation(vec![err])
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate options from a TOML file.
///
/// Only option-internal checks run here; references to connections are
/// checked when the sentinel is built.
pub fn load_options(path: &Path) -> Result<SentinelOptions, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_options(&content)
}

/// Parse and validate options from TOML text.
pub fn parse_options(content: &str) -> Result<SentinelOptions, ConfigError> {
    let options: SentinelOptions = toml::from_str(content)?;
    validate_options(&options).map_err(ConfigError::Validation)?;
    Ok(options)
}
