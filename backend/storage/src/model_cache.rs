//! Persisted "this model has been fetched before" flags.

use std::sync::Arc;

use tracing::{debug, warn};
use visionex_core::{KeyValueStore, StorageError};

const CACHED_SENTINEL: &str = "true";

/// Storage key for a model's cache flag.
pub fn cache_key(model_id: &str) -> String {
    format!("model_cached_{model_id}")
}

#[derive(Clone)]
pub struct ModelCacheRegistry {
    kv: Arc<dyn KeyValueStore>,
}

impl ModelCacheRegistry {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Never fails: a storage error reads as "not cached".
    pub fn is_cached(&self, model_id: &str) -> bool {
        match self.kv.get(&cache_key(model_id)) {
            Ok(value) => {
                let cached = value.as_deref() == Some(CACHED_SENTINEL);
                debug!(model_id, cached, "Model cache lookup");
                cached
            }
            Err(e) => {
                warn!(model_id, error = %e, "Error checking model cache");
                false
            }
        }
    }

    pub fn mark_cached(&self, model_id: &str) -> Result<(), StorageError> {
        self.kv.set(&cache_key(model_id), CACHED_SENTINEL)
    }

    pub fn forget(&self, model_id: &str) -> Result<(), StorageError> {
        self.kv.remove(&cache_key(model_id))
    }
}
