//! Config defaults: applies default values to parsed config.

use std::path::Path;

use crate::schema::VisionexConfig;

/// Default model tag served by the runtime.
pub const DEFAULT_MODEL_ID: &str = "qwen2.5vl:3b";

/// Maximum tokens generated per field answer.
pub const DEFAULT_MAX_NEW_TOKENS: u32 = 256;

pub const DEFAULT_DEVICE: &str = "gpu";

pub const DEFAULT_RUNTIME_URL: &str = "http://localhost:11434";

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

pub const DEFAULT_OUTPUT_DIR: &str = "extractions";

pub const DEFAULT_LOG_LEVEL: &str = "info";

const DB_FILE_NAME: &str = "visionex.db";

const DEFAULT_DTYPE: &[(&str, &str)] = &[
    ("embed_tokens", "fp16"),
    ("vision_encoder", "q4"),
    ("decoder_model_merged", "q4"),
];

/// Apply all defaults to a freshly loaded config. `config_dir` anchors the
/// default database location.
pub fn apply_all_defaults(config: VisionexConfig, config_dir: &Path) -> VisionexConfig {
    let config = apply_model_defaults(config);
    let config = apply_runtime_defaults(config);
    let config = apply_storage_defaults(config, config_dir);
    apply_output_and_logging_defaults(config)
}

fn apply_model_defaults(mut config: VisionexConfig) -> VisionexConfig {
    let model = &mut config.model;
    model.id.get_or_insert_with(|| DEFAULT_MODEL_ID.to_string());
    model.max_new_tokens.get_or_insert(DEFAULT_MAX_NEW_TOKENS);
    model.device.get_or_insert_with(|| DEFAULT_DEVICE.to_string());
    if model.dtype.is_empty() {
        model.dtype = DEFAULT_DTYPE
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
    }
    config
}

fn apply_runtime_defaults(mut config: VisionexConfig) -> VisionexConfig {
    let runtime = &mut config.runtime;
    runtime.base_url.get_or_insert_with(|| DEFAULT_RUNTIME_URL.to_string());
    runtime.request_timeout_secs.get_or_insert(DEFAULT_REQUEST_TIMEOUT_SECS);
    config
}

fn apply_storage_defaults(mut config: VisionexConfig, config_dir: &Path) -> VisionexConfig {
    config
        .storage
        .db_path
        .get_or_insert_with(|| config_dir.join(DB_FILE_NAME).display().to_string());
    config
}

fn apply_output_and_logging_defaults(mut config: VisionexConfig) -> VisionexConfig {
    config.output.dir.get_or_insert_with(|| DEFAULT_OUTPUT_DIR.to_string());
    config.logging.level.get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    config.logging.json.get_or_insert(false);
    config
}
