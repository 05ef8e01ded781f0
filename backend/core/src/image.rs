//! Encoded image payloads as they travel between image sources and the model.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::ImageError;

/// An encoded image (JPEG, PNG, ...) plus its MIME type.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageData {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { mime_type: mime_type.into(), bytes }
    }

    /// Parse a `data:<mime>;base64,<payload>` URL.
    pub fn from_data_url(url: &str) -> Result<Self, ImageError> {
        let rest = url.strip_prefix("data:").ok_or(ImageError::NotDataUrl)?;
        let (header, payload) = rest.split_once(',').ok_or(ImageError::NotDataUrl)?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or(ImageError::UnsupportedEncoding)?;
        if !mime_type.starts_with("image/") {
            return Err(ImageError::NotAnImage(mime_type.to_string()));
        }
        let bytes = STANDARD.decode(payload.trim())?;
        Ok(Self::new(mime_type, bytes))
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

// Payloads can be megabytes; keep them out of debug output and logs.
impl std::fmt::Debug for ImageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageData")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_roundtrip() {
        let image = ImageData::new("image/png", vec![0x89, b'P', b'N', b'G']);
        let url = image.to_data_url();
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(ImageData::from_data_url(&url).unwrap(), image);
    }

    #[test]
    fn rejects_non_image_and_non_base64() {
        assert!(matches!(
            ImageData::from_data_url("data:text/plain;base64,aGk="),
            Err(ImageError::NotAnImage(_))
        ));
        assert!(matches!(
            ImageData::from_data_url("data:image/png,raw"),
            Err(ImageError::UnsupportedEncoding)
        ));
        assert!(matches!(
            ImageData::from_data_url("https://example.com/a.png"),
            Err(ImageError::NotDataUrl)
        ));
    }

    #[test]
    fn debug_hides_payload() {
        let image = ImageData::new("image/jpeg", vec![7; 1024]);
        let debug = format!("{image:?}");
        assert!(debug.contains("1024"));
        assert!(!debug.contains("7, 7"));
    }
}
