//! Image sources and file export: the collaborators that feed images into
//! an extraction and carry its JSON back out.

pub mod camera;
pub mod exporter;
pub mod file_source;
pub mod mime_detect;

pub use camera::FrameDirectoryCamera;
pub use exporter::DirectoryExporter;
pub use file_source::{FileImageSource, load_image};
pub use mime_detect::{detect_mime_type, is_image, sniff_image_mime};
