use thiserror::Error;

/// Why a model load did not reach the ready state.
///
/// `Clone` because every caller coalesced onto one in-flight load receives
/// the same outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    /// The host cannot run accelerated inference at all. Retrying will not help.
    #[error("{0}")]
    UnsupportedEnvironment(String),

    /// Acquisition failed part way. Calling `load` again may succeed.
    #[error("Failed to load model: {message}")]
    Failure { message: String },
}

impl LoadError {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure { message: message.into() }
    }

    /// Whether re-invoking `load` can change the outcome.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

/// Why a single extraction query produced no answer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("The model and processor are not loaded. Please load a model first.")]
    NotReady,

    #[error("Failed to extract data: {message}")]
    Failure { message: String },
}

impl ExtractError {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure { message: message.into() }
    }
}

/// Durable storage failures. Callers on read paths degrade to empty/absent.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("stored data is malformed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Problems turning bytes, paths, or data URLs into an image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("not a data URL")]
    NotDataUrl,

    #[error("unsupported data URL encoding: expected base64")]
    UnsupportedEncoding,

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("not an image: {0}")]
    NotAnImage(String),

    #[error("camera not active")]
    CameraInactive,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Top-level error type for the extractor.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
