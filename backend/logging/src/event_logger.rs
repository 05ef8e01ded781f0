//! Extraction Event Logger
//!
//! Structured lifecycle events (model loads, per-field outcomes, exports)
//! written through `tracing` at target `extraction_events`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::redact::redact_data_urls;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ExtractionEvent {
    ModelLoadStarted {
        model_id: String,
    },
    ModelLoaded {
        model_id: String,
        elapsed_ms: u64,
    },
    ModelLoadFailed {
        model_id: String,
        error_msg: String,
    },
    FieldExtracted {
        image_name: String,
        field_name: String,
        answer_chars: usize,
    },
    FieldFailed {
        image_name: String,
        field_name: String,
        error_msg: String,
    },
    ResultExported {
        image_name: String,
        location: String,
    },
}

impl ExtractionEvent {
    fn is_failure(&self) -> bool {
        matches!(self, Self::ModelLoadFailed { .. } | Self::FieldFailed { .. })
    }
}

#[derive(Debug, Serialize)]
pub struct EventLogEntry {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: ExtractionEvent,
}

pub struct EventLogger;

impl EventLogger {
    /// Redact and emit one event.
    pub fn log_event(run_id: &str, mut event: ExtractionEvent) {
        match &mut event {
            ExtractionEvent::ModelLoadFailed { error_msg, .. }
            | ExtractionEvent::FieldFailed { error_msg, .. } => {
                *error_msg = redact_data_urls(error_msg);
            }
            _ => {}
        }

        let failed = event.is_failure();
        let entry = EventLogEntry {
            run_id: run_id.into(),
            timestamp: Utc::now(),
            event,
        };
        let json = serde_json::to_string(&entry).unwrap_or_else(|_| format!("{entry:?}"));

        if failed {
            warn!(target: "extraction_events", event = %json, "Extraction event");
        } else {
            info!(target: "extraction_events", event = %json, "Extraction event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = ExtractionEvent::FieldFailed {
            image_name: "a.jpg".into(),
            field_name: "Total".into(),
            error_msg: "boom".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "FieldFailed");
        assert_eq!(value["field_name"], "Total");
        assert!(event.is_failure());
    }
}
