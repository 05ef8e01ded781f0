//! Wiring from a prepared config to the long-lived services a command needs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;
use visionex_config::{defaults, VisionexConfig};
use visionex_core::{KeyValueStore, ModelLoadOptions};
use visionex_runtime::{OllamaClient, OllamaProbe, OllamaRuntime};
use visionex_session::{ModelSession, SessionOptions};
use visionex_storage::{ModelCacheRegistry, SqliteKvStore, TemplateStore};

pub struct AppContext {
    pub config: VisionexConfig,
    pub templates: TemplateStore,
    pub cache: ModelCacheRegistry,
}

impl AppContext {
    /// Load the config under `config_dir`, start logging, open the database.
    pub async fn bootstrap(config_dir: &Path) -> Result<Self> {
        let config_path = visionex_config::config_file_path(config_dir);
        let config = visionex_config::load_and_prepare(&config_path, config_dir).await?;

        let logging = &config.logging;
        logging::init_logger(
            logging.dir.as_deref().map(Path::new),
            logging.level.as_deref().unwrap_or(defaults::DEFAULT_LOG_LEVEL),
            logging.json.unwrap_or(false),
        );

        let db_path = config
            .storage
            .db_path
            .clone()
            .map(PathBuf::from)
            .unwrap_or_else(|| config_dir.join("visionex.db"));
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let kv: Arc<dyn KeyValueStore> = Arc::new(
            SqliteKvStore::open(&db_path)
                .with_context(|| format!("Failed to open database {}", db_path.display()))?,
        );
        debug!(db = %db_path.display(), "Opened store");

        Ok(Self {
            config,
            templates: TemplateStore::new(kv.clone()),
            cache: ModelCacheRegistry::new(kv),
        })
    }

    /// `requested`, else the configured model.
    pub fn model_id(&self, requested: Option<String>) -> String {
        requested
            .or_else(|| self.config.model.id.clone())
            .unwrap_or_else(|| defaults::DEFAULT_MODEL_ID.to_string())
    }

    pub fn output_dir(&self, requested: Option<PathBuf>) -> PathBuf {
        requested
            .or_else(|| self.config.output.dir.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(defaults::DEFAULT_OUTPUT_DIR))
    }

    /// `None` when `runtime.base_url` is configured as empty.
    pub fn runtime_client(&self) -> Result<Option<Arc<OllamaClient>>> {
        let runtime = &self.config.runtime;
        let base_url = runtime.base_url.as_deref().unwrap_or(defaults::DEFAULT_RUNTIME_URL);
        if base_url.trim().is_empty() {
            return Ok(None);
        }
        let timeout = Duration::from_secs(
            runtime
                .request_timeout_secs
                .unwrap_or(defaults::DEFAULT_REQUEST_TIMEOUT_SECS),
        );
        Ok(Some(Arc::new(OllamaClient::new(base_url, timeout)?)))
    }

    pub fn session(&self) -> Result<ModelSession> {
        let client = self.runtime_client()?;
        let model = &self.config.model;
        let fallback = SessionOptions::default();
        let options = SessionOptions {
            load: ModelLoadOptions {
                dtype: if model.dtype.is_empty() { fallback.load.dtype } else { model.dtype.clone() },
                device: model.device.clone().unwrap_or(fallback.load.device),
            },
            max_new_tokens: model.max_new_tokens.unwrap_or(fallback.max_new_tokens),
        };

        Ok(ModelSession::new(
            Arc::new(OllamaRuntime::new(client.clone())),
            Arc::new(OllamaProbe::new(client)),
            self.cache.clone(),
            options,
        ))
    }
}
