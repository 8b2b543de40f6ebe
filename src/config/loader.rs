//! Reading the TOML configuration file.
//!
//! Every field has a default, so an empty file is a valid configuration. A
//! file that parses is still rejected when [`validate_config`] finds problems.

use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Load and validate the configuration stored at `path`.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    parse_config(&text)
}

/// Parse and validate configuration text.
pub fn parse_config(text: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(text)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}
