use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use visionex_core::{AccelerationProbe, AdapterInfo};

use crate::client::OllamaClient;

/// Support means a runtime endpoint is configured; the adapter is the
/// server answering its version endpoint.
pub struct OllamaProbe {
    client: Option<Arc<OllamaClient>>,
}

impl OllamaProbe {
    pub fn new(client: Option<Arc<OllamaClient>>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AccelerationProbe for OllamaProbe {
    fn has_acceleration_support(&self) -> bool {
        self.client.is_some()
    }

    async fn request_adapter(&self) -> Option<AdapterInfo> {
        let client = self.client.as_ref()?;
        match client.version().await {
            Ok(version) => Some(AdapterInfo {
                name: format!("ollama {version}"),
                description: client.base_url().to_string(),
            }),
            Err(e) => {
                warn!(url = %client.base_url(), error = %e, "Runtime did not answer");
                None
            }
        }
    }
}
