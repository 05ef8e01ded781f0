//! Structured logging for Visionex.
//!
//! Handles subscriber setup (console + rolling NDJSON file), image payload
//! redaction, and extraction lifecycle events.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{EventLogEntry, EventLogger, ExtractionEvent};
pub use logger::init_logger;
pub use redact::redact_data_urls;
