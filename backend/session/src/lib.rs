pub mod orchestrator;
pub mod progress;
pub mod session;

#[cfg(test)]
mod test_support;

pub use orchestrator::{ExtractionOrchestrator, NamedImage, export_result, result_file_name};
pub use progress::LoadProgress;
pub use session::{ModelSession, SessionOptions, SessionSnapshot, SessionStatus};
