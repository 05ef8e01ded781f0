use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::StorageError;
use crate::image::ImageData;

/// Durable string key-value storage (the only persistent state).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Replace the value at `key` with `f(current)` as one atomic step.
    /// Returning an error from `f` leaves the stored value untouched.
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<String>) -> Result<String, StorageError>,
    ) -> Result<(), StorageError>;
}

/// Description of the acceleration adapter a probe found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub description: String,
}

/// Checks whether the host can run accelerated inference.
#[async_trait]
pub trait AccelerationProbe: Send + Sync {
    /// Whether the host exposes the acceleration API at all.
    fn has_acceleration_support(&self) -> bool;

    /// Acquire an adapter, or `None` when the API exists but nothing usable is attached.
    async fn request_adapter(&self) -> Option<AdapterInfo>;
}

/// Raw progress notifications emitted by a runtime while fetching weights.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeProgress {
    Initiate { file: String },
    Download { file: String },
    Progress { file: String, progress: f64 },
    Done { file: String },
    Ready,
}

/// Callback a runtime invokes with raw progress. May be called from any task.
pub type ProgressSink = Arc<dyn Fn(RuntimeProgress) + Send + Sync>;

/// Options forwarded to the runtime when loading model weights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLoadOptions {
    /// Per-component quantization, e.g. `vision_encoder -> q4`.
    pub dtype: BTreeMap<String, String>,
    pub device: String,
}

/// Processor output, ready to be fed to `VisionModel::generate`.
#[derive(Debug, Clone)]
pub struct ModelInputs {
    pub prompt: String,
    pub images: Vec<ImageData>,
}

/// Token pieces produced by generation: the prompt followed by new tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSequence(pub Vec<String>);

/// Turns (image, prompt) into model inputs and generated tokens into text.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn prepare(&self, image: &ImageData, prompt: &str) -> Result<ModelInputs>;

    /// Decode with special tokens skipped.
    fn decode(&self, tokens: &TokenSequence) -> Result<String>;
}

#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn generate(&self, inputs: ModelInputs, max_new_tokens: u32) -> Result<TokenSequence>;
}

/// Loads processors and models by identifier.
#[async_trait]
pub trait VisionRuntime: Send + Sync {
    async fn load_processor(
        &self,
        model_id: &str,
        progress: ProgressSink,
    ) -> Result<Arc<dyn Processor>>;

    async fn load_model(
        &self,
        model_id: &str,
        options: &ModelLoadOptions,
        progress: ProgressSink,
    ) -> Result<Arc<dyn VisionModel>>;
}

/// A live camera that can hand out still frames.
#[async_trait]
pub trait CameraSource: Send + Sync {
    /// Start streaming into `container`. Resolves once frames are available.
    async fn start(&self, container: &str) -> Result<bool>;

    fn stop(&self);

    /// Capture the current frame as a data URL.
    async fn capture(&self) -> Result<String>;
}

/// Reads a user-selected file. `None` when nothing was selected.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn read_as_data_url(&self, input: &str) -> Option<String>;
}

/// Hands finished text to the user as a file.
#[async_trait]
pub trait FileExporter: Send + Sync {
    async fn download_as_file(&self, filename: &str, content: &str) -> Result<PathBuf>;
}
