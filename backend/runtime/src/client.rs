use std::time::Duration;

use anyhow::{Context, Result, bail};
use futures::StreamExt;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use visionex_core::RuntimeProgress;

use crate::pull::PullLineDecoder;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub images: Vec<String>,
    pub raw: bool,
    pub stream: bool,
    pub options: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Thin typed wrapper over the server's REST API.
pub struct OllamaClient {
    http: reqwest::Client,
    // Connect timeout only; pulls stream for as long as the download takes.
    pull_http: reqwest::Client,
    base_url: Url,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .with_context(|| format!("Invalid runtime base URL: {base_url}"))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let pull_http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, pull_http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Cannot build endpoint URL for {path}"))
    }

    pub async fn version(&self) -> Result<String> {
        let resp = self.http.get(self.endpoint("api/version")?).send().await?;
        if !resp.status().is_success() {
            bail!("Runtime version check failed: HTTP {}", resp.status());
        }
        let body: VersionResponse = resp.json().await?;
        Ok(body.version)
    }

    /// Whether the server already has `model` locally.
    pub async fn has_model(&self, model: &str) -> Result<bool> {
        let resp = self
            .http
            .post(self.endpoint("api/show")?)
            .json(&json!({ "model": model }))
            .send()
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => bail!("Model lookup failed ({s}): {}", resp.text().await.unwrap_or_default()),
        }
    }

    /// Pull `model`, forwarding streamed progress.
    pub async fn pull(&self, model: &str, mut on_progress: impl FnMut(RuntimeProgress)) -> Result<()> {
        info!(model, "Pulling model weights");
        let resp = self
            .pull_http
            .post(self.endpoint("api/pull")?)
            .json(&json!({ "model": model, "stream": true }))
            .send()
            .await?;
        if !resp.status().is_success() {
            bail!("Pull failed ({}): {}", resp.status(), resp.text().await.unwrap_or_default());
        }

        let mut decoder = PullLineDecoder::default();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            for event in decoder.feed(&chunk?)? {
                on_progress(event);
            }
        }
        for event in decoder.finish()? {
            on_progress(event);
        }
        if !decoder.succeeded() {
            bail!("Pull stream ended before the model was ready");
        }
        debug!(model, "Pull complete");
        Ok(())
    }

    pub(crate) async fn generate(&self, request: &GenerateRequest<'_>) -> Result<String> {
        let resp = self
            .http
            .post(self.endpoint("api/generate")?)
            .json(request)
            .send()
            .await?;
        if !resp.status().is_success() {
            bail!("Generate failed ({}): {}", resp.status(), resp.text().await.unwrap_or_default());
        }
        let body: GenerateResponse = resp.json().await?;
        Ok(body.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_base_url() {
        assert!(OllamaClient::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn joins_endpoints_onto_base() {
        let client = OllamaClient::new("http://gpu-box:11434", Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint("api/pull").unwrap().as_str(), "http://gpu-box:11434/api/pull");

        let proxied = OllamaClient::new("https://proxy.local/ollama", Duration::from_secs(1)).unwrap();
        assert_eq!(
            proxied.endpoint("api/generate").unwrap().as_str(),
            "https://proxy.local/ollama/api/generate"
        );
    }

    #[test]
    fn generate_request_shape() {
        let request = GenerateRequest {
            model: "smol",
            prompt: "<|user|>\nhi<|assistant|>\n",
            images: vec!["AAAA".into()],
            raw: true,
            stream: false,
            options: json!({ "num_predict": 256 }),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["raw"], true);
        assert_eq!(value["images"][0], "AAAA");
        assert_eq!(value["options"]["num_predict"], 256);
    }
}
