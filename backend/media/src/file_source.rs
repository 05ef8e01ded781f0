//! File-backed image source.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};
use visionex_core::{FileSource, ImageData, ImageError};

use crate::mime_detect::{detect_mime_type, is_image, sniff_image_mime};

/// Read an image file, trusting its magic bytes over its extension.
pub async fn load_image(path: &Path) -> Result<ImageData, ImageError> {
    let bytes = fs::read(path).await?;
    let mime = match sniff_image_mime(&bytes) {
        Some(sniffed) => sniffed,
        None => detect_mime_type(path),
    };
    if !is_image(mime) {
        return Err(ImageError::NotAnImage(path.display().to_string()));
    }
    debug!(path = %path.display(), mime, bytes = bytes.len(), "Loaded image");
    Ok(ImageData::new(mime, bytes))
}

/// Resolves user-selected paths, optionally relative to a base directory.
#[derive(Debug, Clone, Default)]
pub struct FileImageSource {
    base_dir: Option<PathBuf>,
}

impl FileImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: Some(base_dir.into()) }
    }

    fn resolve(&self, input: &str) -> PathBuf {
        match &self.base_dir {
            Some(base) => base.join(input),
            None => PathBuf::from(input),
        }
    }
}

#[async_trait]
impl FileSource for FileImageSource {
    async fn read_as_data_url(&self, input: &str) -> Option<String> {
        if input.trim().is_empty() {
            return None;
        }
        let path = self.resolve(input);
        if !path.is_file() {
            debug!(path = %path.display(), "No file selected");
            return None;
        }
        match load_image(&path).await {
            Ok(image) => Some(image.to_data_url()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Error reading file");
                None
            }
        }
    }
}
