//! Configuration loading for the HiveForge orchestration nucleus: a TOML
//! file, validated, with environment-variable overrides applied once at
//! startup (spec.md §6 "Environment variables").

use hf_error::HiveForgeError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct HiveForgeConfig {
    /// Root directory holding per-stream Vault directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_path: Option<String>,

    /// Bind address for the REST surface, e.g. `"127.0.0.1:8080"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Log level override (`"error"|"warn"|"info"|"debug"|"trace"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Shared API key for `X-API-Key` / `Authorization: Bearer` auth. When
    /// `None`, auth is disabled and all requests pass (spec.md §6).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Silence-watchdog interval in seconds (spec.md §4.9(f) default 60).
    #[serde(default)]
    pub silence_watchdog_secs: Option<u64>,

    /// Ollama base URL, if configured as a provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ollama_base_url: Option<String>,
}

impl Default for HiveForgeConfig {
    fn default() -> Self {
        Self {
            vault_path: None,
            bind: Some("127.0.0.1:8080".to_string()),
            log_level: Some("info".to_string()),
            api_key: None,
            silence_watchdog_secs: Some(60),
            ollama_base_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    MissingOptionalField { field: String, hint: String },
    DeprecatedField { field: String, suggestion: String },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::DeprecatedField { field, suggestion } => {
                write!(f, "field '{field}' is deprecated: {suggestion}")
            }
        }
    }
}

const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Load configuration from an optional TOML file, falling back to defaults,
/// then apply environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<HiveForgeConfig, HiveForgeError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| {
                HiveForgeError::not_found("config file", p.display().to_string())
            })?;
            parse_toml(&content)?
        }
        None => HiveForgeConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

pub fn parse_toml(content: &str) -> Result<HiveForgeConfig, HiveForgeError> {
    toml::from_str::<HiveForgeConfig>(content)
        .map_err(|e| HiveForgeError::validation(format!("invalid config TOML: {e}")))
}

/// Applies the environment variables named in spec.md §6. Each is read
/// exactly once, at the call site chosen by the caller (typically once at
/// process startup).
pub fn apply_env_overrides(config: &mut HiveForgeConfig) {
    if let Ok(val) = std::env::var("VAULT_PATH") {
        config.vault_path = Some(val);
    }
    if let Ok(val) = std::env::var("HIVEFORGE_API_KEY") {
        config.api_key = Some(val);
    }
    if let Ok(val) = std::env::var("HIVEFORGE_BIND") {
        config.bind = Some(val);
    }
    if let Ok(val) = std::env::var("OLLAMA_BASE_URL") {
        config.ollama_base_url = Some(val);
    }
}

/// Validates a loaded config, returning advisory warnings. Hard errors
/// (invalid log level) come back as an `Err`.
pub fn validate_config(config: &HiveForgeConfig) -> Result<Vec<ConfigWarning>, HiveForgeError> {
    if let Some(ref level) = config.log_level {
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(HiveForgeError::validation(format!(
                "invalid log_level '{level}'"
            )));
        }
    }

    let mut warnings = Vec::new();
    if config.vault_path.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "vault_path".to_string(),
            hint: "defaults to ./vault relative to the working directory".to_string(),
        });
    }
    if config.api_key.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "api_key".to_string(),
            hint: "REST surface auth is disabled".to_string(),
        });
    }
    Ok(warnings)
}
