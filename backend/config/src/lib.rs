//! `visionex-config` — runtime configuration management.
//!
//! Provides:
//! - Typed config schema (model, runtime, storage, output, logging)
//! - YAML read/write with atomic replace
//! - `${ENV_VAR}` substitution
//! - Default value application
//! - Schema validation

pub mod defaults;
pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

// Re-export most-used types at crate root.
pub use defaults::apply_all_defaults;
pub use env::{resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_dir, config_file_path, load_raw_config, write_config};
pub use schema::{LoggingConfig, ModelConfig, OutputConfig, RuntimeConfig, StorageConfig, VisionexConfig};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Load, apply env substitution, apply defaults, and validate a config file.
///
/// This is the main entry point for loading a config at runtime. Defaults
/// that depend on a location (the database) are anchored at `config_dir`.
pub async fn load_and_prepare(path: &Path, config_dir: &Path) -> Result<VisionexConfig> {
    let value = load_raw_config(path).await?;

    // Substitute ${VAR} env vars.
    let value = resolve_env_vars(&value).context("Failed to resolve env vars in config")?;

    let config: VisionexConfig =
        serde_json::from_value(value).context("Failed to deserialize config")?;

    let config = apply_all_defaults(config, config_dir);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    if !report.is_valid() {
        let details: Vec<String> = report
            .errors
            .iter()
            .map(|e| format!("  {}: {}", e.path, e.message))
            .collect();
        bail!(
            "Config at {} has {} error(s):\n{}",
            path.display(),
            report.errors.len(),
            details.join("\n")
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prepares_config_from_yaml() {
        let dir = std::env::temp_dir().join(format!("visionex-prepare-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = config_file_path(&dir);
        std::fs::write(
            &path,
            "model:\n  id: llava:7b\n  device: cpu\nruntime:\n  request_timeout_secs: 30\n",
        )
        .unwrap();

        let config = load_and_prepare(&path, &dir).await.unwrap();
        assert_eq!(config.model.id.as_deref(), Some("llava:7b"));
        assert_eq!(config.model.device.as_deref(), Some("cpu"));
        assert_eq!(config.model.max_new_tokens, Some(defaults::DEFAULT_MAX_NEW_TOKENS));
        assert_eq!(config.runtime.request_timeout_secs, Some(30));
        assert_eq!(config.runtime.base_url.as_deref(), Some(defaults::DEFAULT_RUNTIME_URL));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let dir = std::env::temp_dir().join(format!("visionex-invalid-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = config_file_path(&dir);
        std::fs::write(&path, "model:\n  max_new_tokens: 0\n").unwrap();

        let err = load_and_prepare(&path, &dir).await.unwrap_err().to_string();
        assert!(err.contains("1 error(s)"));
        assert!(err.contains("model.max_new_tokens: Must be greater than zero"));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
