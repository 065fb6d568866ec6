//! Configuration validation.
//!
//! Validates configuration at startup (and on rehash) to catch common errors
//! early.

use super::Config;
use slsvc_core::source::validate_identifier;
use std::collections::HashSet;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("runtime.autoload entry {0:?} is not a valid module identifier")]
    InvalidAutoload(String),
    #[error("runtime.autoload lists {0} more than once")]
    DuplicateAutoload(String),
    #[error("log.format must be \"text\" or \"json\", got {0:?}")]
    UnknownLogFormat(String),
    #[error("log.level is not a valid filter: {0}")]
    InvalidLogLevel(String),
    #[error("modules.{0:?} must be a table")]
    ModuleNotATable(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for identifier in &config.runtime.autoload {
        if validate_identifier(identifier).is_err() {
            errors.push(ValidationError::InvalidAutoload(identifier.clone()));
        } else if !seen.insert(identifier.as_str()) {
            errors.push(ValidationError::DuplicateAutoload(identifier.clone()));
        }
    }

    if !matches!(config.log.format.as_str(), "text" | "json") {
        errors.push(ValidationError::UnknownLogFormat(config.log.format.clone()));
    }
    if let Err(e) = EnvFilter::try_new(&config.log.level) {
        errors.push(ValidationError::InvalidLogLevel(e.to_string()));
    }

    for (name, value) in &config.modules {
        if !value.is_table() {
            errors.push(ValidationError::ModuleNotATable(name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
