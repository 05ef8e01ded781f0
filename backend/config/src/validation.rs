//! Config validation: schema checks with user-friendly error messages.

use crate::schema::VisionexConfig;
use thiserror::Error;

const KNOWN_DEVICES: &[&str] = &["gpu", "cpu"];
const KNOWN_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// A collection of validation errors found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &VisionexConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_model(config, &mut report);
    validate_runtime(config, &mut report);
    validate_logging(config, &mut report);
    report
}

fn validate_model(config: &VisionexConfig, report: &mut ValidationReport) {
    let model = &config.model;
    if model.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
        report.error("model.id", "Model id cannot be empty");
    }
    match model.max_new_tokens {
        Some(0) => report.error("model.max_new_tokens", "Must be greater than zero"),
        Some(n) if n > 4096 => {
            report.warn("model.max_new_tokens", format!("{n} tokens per field is unusually large"))
        }
        _ => {}
    }
    if let Some(device) = &model.device {
        if !KNOWN_DEVICES.contains(&device.to_ascii_lowercase().as_str()) {
            report.warn("model.device", format!("Unknown device '{device}'; expected gpu or cpu"));
        }
    }
}

fn validate_runtime(config: &VisionexConfig, report: &mut ValidationReport) {
    let runtime = &config.runtime;
    if let Some(base_url) = &runtime.base_url {
        match url::Url::parse(base_url) {
            _ if base_url.trim().is_empty() => report.warn(
                "runtime.base_url",
                "Empty; no runtime is configured and model loads will fail",
            ),
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => report.error(
                "runtime.base_url",
                format!("Unsupported scheme '{}'; use http or https", url.scheme()),
            ),
            Err(e) => report.error("runtime.base_url", format!("Invalid URL: {e}")),
        }
    }
    if runtime.request_timeout_secs == Some(0) {
        report.error("runtime.request_timeout_secs", "Must be greater than zero");
    }
}

fn validate_logging(config: &VisionexConfig, report: &mut ValidationReport) {
    if let Some(level) = &config.logging.level {
        if !KNOWN_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
            report.warn("logging.level", format!("Unknown level '{level}'"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let report = validate(&VisionexConfig::default());
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn reports_errors_and_warnings() {
        let mut config = VisionexConfig::default();
        config.model.id = Some("  ".into());
        config.model.max_new_tokens = Some(0);
        config.model.device = Some("tpu".into());
        config.runtime.base_url = Some("ftp://host".into());
        config.runtime.request_timeout_secs = Some(0);

        let report = validate(&config);
        let error_paths: Vec<_> = report.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            error_paths,
            vec!["model.id", "model.max_new_tokens", "runtime.base_url", "runtime.request_timeout_secs"]
        );
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].path, "model.device");
    }

    #[test]
    fn empty_runtime_url_only_warns() {
        let mut config = VisionexConfig::default();
        config.runtime.base_url = Some(String::new());
        let report = validate(&config);
        assert!(report.is_valid());
        assert_eq!(report.warnings[0].path, "runtime.base_url");
    }
}
