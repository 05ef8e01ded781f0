//! Typed configuration schema. Every field is optional on disk; see
//! `defaults` for the values filled in after loading.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VisionexConfig {
    pub model: ModelConfig,
    pub runtime: RuntimeConfig,
    pub storage: StorageConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Which vision-language model to load and how.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub id: Option<String>,
    pub max_new_tokens: Option<u32>,
    /// `gpu` or `cpu`.
    pub device: Option<String>,
    /// Per-component quantization, e.g. `vision_encoder: q4`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub dtype: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub dir: Option<String>,
    pub json: Option<bool>,
}
