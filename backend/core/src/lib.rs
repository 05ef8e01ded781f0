pub mod error;
pub mod image;
pub mod prompt;
pub mod traits;
pub mod types;

pub use error::{ExtractError, ImageError, LoadError, StorageError, VisionError};
pub use image::ImageData;
pub use prompt::{extract_answer, format_chat_prompt, ASSISTANT_MARKER, NO_ANSWER_FALLBACK};
pub use traits::{
    AccelerationProbe, AdapterInfo, CameraSource, FileExporter, FileSource, KeyValueStore,
    ModelInputs, ModelLoadOptions, Processor, ProgressSink, RuntimeProgress, TokenSequence,
    VisionModel, VisionRuntime,
};
pub use types::{DataField, ExtractionResult, Template};
