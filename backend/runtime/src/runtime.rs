use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};
use visionex_core::prompt::IMAGE_PLACEHOLDER;
use visionex_core::{
    ImageData, ModelInputs, ModelLoadOptions, Processor, ProgressSink, RuntimeProgress,
    TokenSequence, VisionModel, VisionRuntime,
};

use crate::client::{GenerateRequest, OllamaClient};

/// Tokens the server may echo that carry no content.
const SPECIAL_TOKENS: &[&str] = &["<end_of_utterance>", "<|end|>", "</s>", "<|endoftext|>"];

/// `None` means no runtime endpoint is configured; every load then fails.
pub struct OllamaRuntime {
    client: Option<Arc<OllamaClient>>,
}

impl OllamaRuntime {
    pub fn new(client: Option<Arc<OllamaClient>>) -> Self {
        Self { client }
    }

    fn client(&self) -> Result<&Arc<OllamaClient>> {
        self.client.as_ref().context("No runtime endpoint is configured")
    }
}

/// Client-side prompt preparation and decoding. Images travel beside the
/// prompt, so the inline placeholder is dropped.
pub struct OllamaProcessor;

#[async_trait]
impl Processor for OllamaProcessor {
    async fn prepare(&self, image: &ImageData, prompt: &str) -> Result<ModelInputs> {
        let prompt = prompt
            .replace(&format!("{IMAGE_PLACEHOLDER}\n"), "")
            .replace(IMAGE_PLACEHOLDER, "");
        Ok(ModelInputs { prompt, images: vec![image.clone()] })
    }

    fn decode(&self, tokens: &TokenSequence) -> Result<String> {
        let mut text = tokens.0.concat();
        for special in SPECIAL_TOKENS {
            text = text.replace(special, "");
        }
        Ok(text)
    }
}

pub struct OllamaModel {
    client: Arc<OllamaClient>,
    model_id: String,
    cpu_only: bool,
}

#[async_trait]
impl VisionModel for OllamaModel {
    async fn generate(&self, inputs: ModelInputs, max_new_tokens: u32) -> Result<TokenSequence> {
        let mut options = json!({ "num_predict": max_new_tokens, "temperature": 0 });
        if self.cpu_only {
            options["num_gpu"] = json!(0);
        }
        let request = GenerateRequest {
            model: &self.model_id,
            prompt: &inputs.prompt,
            images: inputs.images.iter().map(ImageData::to_base64).collect(),
            raw: true,
            stream: false,
            options,
        };
        let reply = self.client.generate(&request).await?;
        debug!(model = %self.model_id, chars = reply.len(), "Generated reply");
        // Decoder-style output: the input sequence followed by new tokens.
        Ok(TokenSequence(vec![inputs.prompt, reply]))
    }
}

#[async_trait]
impl VisionRuntime for OllamaRuntime {
    async fn load_processor(&self, model_id: &str, progress: ProgressSink) -> Result<Arc<dyn Processor>> {
        progress(RuntimeProgress::Initiate { file: format!("{model_id}/processor") });
        let present = self.client()?.has_model(model_id).await?;
        debug!(model_id, present, "Checked model on runtime");
        progress(RuntimeProgress::Done { file: format!("{model_id}/processor") });
        Ok(Arc::new(OllamaProcessor))
    }

    async fn load_model(
        &self,
        model_id: &str,
        options: &ModelLoadOptions,
        progress: ProgressSink,
    ) -> Result<Arc<dyn VisionModel>> {
        // Quantization is baked into the server-side model tag.
        info!(model_id, device = %options.device, dtype = ?options.dtype, "Fetching model");
        let client = self.client()?;
        client.pull(model_id, |event| progress(event)).await?;
        Ok(Arc::new(OllamaModel {
            client: Arc::clone(client),
            model_id: model_id.to_string(),
            cpu_only: options.device.eq_ignore_ascii_case("cpu"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use visionex_core::{extract_answer, format_chat_prompt};

    #[tokio::test]
    async fn prepare_moves_image_out_of_prompt() {
        let image = ImageData::new("image/png", vec![1, 2]);
        let inputs = OllamaProcessor
            .prepare(&image, &format_chat_prompt("What is the total?"))
            .await
            .unwrap();
        assert_eq!(inputs.prompt, "<|user|>\nWhat is the total?<|assistant|>\n");
        assert_eq!(inputs.images, vec![image]);
    }

    #[test]
    fn decode_strips_special_tokens_and_keeps_markers() {
        let tokens = TokenSequence(vec![
            "<|user|>\nTotal?<|assistant|>\n".into(),
            " $12.50<end_of_utterance>".into(),
        ]);
        let text = OllamaProcessor.decode(&tokens).unwrap();
        assert_eq!(extract_answer(&text), Some("$12.50"));
    }

    #[tokio::test]
    async fn unconfigured_runtime_refuses_to_load() {
        let runtime = OllamaRuntime::new(None);
        let sink: ProgressSink = Arc::new(|_| {});
        let err = runtime.load_processor("smol", sink).await.err().unwrap();
        assert!(err.to_string().contains("No runtime endpoint"));
    }
}
