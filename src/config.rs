//! Binding configuration.
//!
//! Loaded from YAML or JSON and optionally overridden from the environment:
//!
//! ```yaml
//! audit_enabled: true
//! audit_capacity: 1024
//! freeze_on_initialize: false
//! ```
//!
//! | Variable | Field |
//! |---|---|
//! | `RUNTIME_BINDING_AUDIT` | `audit_enabled` |
//! | `RUNTIME_BINDING_AUDIT_CAPACITY` | `audit_capacity` |
//! | `RUNTIME_BINDING_FREEZE` | `freeze_on_initialize` |

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::{RegistryAuditLog, DEFAULT_AUDIT_CAPACITY};

pub const ENV_AUDIT: &str = "RUNTIME_BINDING_AUDIT";
pub const ENV_AUDIT_CAPACITY: &str = "RUNTIME_BINDING_AUDIT_CAPACITY";
pub const ENV_FREEZE: &str = "RUNTIME_BINDING_FREEZE";

/// Errors raised while loading a [`BindingConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The file extension is not `.yaml`, `.yml` or `.json`.
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// An environment override could not be parsed.
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },
}

/// Settings for registries and lifecycle coordinators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Record registry mutations in the audit log.
    pub audit_enabled: bool,
    /// Audit events retained; `0` keeps everything.
    pub audit_capacity: usize,
    /// Freeze the registry after a successful `initialize()`.
    pub freeze_on_initialize: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            audit_enabled: true,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
            freeze_on_initialize: false,
        }
    }
}

impl BindingConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a `.yaml`, `.yml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let content = std::fs::read_to_string(path)?;
        let config = match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&content)?,
            "json" => Self::from_json_str(&content)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };
        log::debug!("loaded binding config from {}", path.display());
        Ok(config)
    }

    /// Apply overrides read through `lookup`. Unset variables are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_AUDIT) {
            self.audit_enabled = parse_bool(ENV_AUDIT, &value)?;
        }
        if let Some(value) = lookup(ENV_AUDIT_CAPACITY) {
            self.audit_capacity =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        name: ENV_AUDIT_CAPACITY.to_string(),
                        value: value.clone(),
                    })?;
        }
        if let Some(value) = lookup(ENV_FREEZE) {
            self.freeze_on_initialize = parse_bool(ENV_FREEZE, &value)?;
        }
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        self.apply_env(|name| std::env::var(name).ok())?;
        Ok(self)
    }

    /// Configure `audit` from these settings.
    pub fn apply_to(&self, audit: &RegistryAuditLog) {
        audit.set_enabled(self.audit_enabled);
        audit.set_capacity(self.audit_capacity);
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}
