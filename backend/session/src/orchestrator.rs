//! Extraction Orchestrator: one image + ordered fields -> one `ExtractionResult`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use logging::{EventLogger, ExtractionEvent};
use tracing::{info, warn};
use uuid::Uuid;
use visionex_core::{DataField, ExtractionResult, FileExporter, ImageData};

use crate::session::ModelSession;

/// An image paired with the name it is reported under.
#[derive(Debug, Clone)]
pub struct NamedImage {
    pub name: String,
    pub image: ImageData,
}

pub struct ExtractionOrchestrator {
    session: ModelSession,
}

impl ExtractionOrchestrator {
    pub fn new(session: ModelSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &ModelSession {
        &self.session
    }

    /// Ask every field's prompt about `image`, in order, one at a time.
    ///
    /// A failing field records its error message as the value; the rest of
    /// the batch still runs. Duplicate field names keep the last answer.
    pub async fn run_extraction(
        &self,
        image_name: &str,
        image: &ImageData,
        fields: &[DataField],
    ) -> ExtractionResult {
        let run_id = Uuid::new_v4().to_string();
        info!(run_id = %run_id, image = image_name, fields = fields.len(), "Starting extraction");

        let mut extracted = BTreeMap::new();
        for field in fields {
            let value = match self.session.extract(image, &field.prompt).await {
                Ok(answer) => {
                    EventLogger::log_event(&run_id, ExtractionEvent::FieldExtracted {
                        image_name: image_name.to_string(),
                        field_name: field.name.clone(),
                        answer_chars: answer.chars().count(),
                    });
                    answer
                }
                Err(e) => {
                    let message = e.to_string();
                    EventLogger::log_event(&run_id, ExtractionEvent::FieldFailed {
                        image_name: image_name.to_string(),
                        field_name: field.name.clone(),
                        error_msg: message.clone(),
                    });
                    message
                }
            };
            extracted.insert(field.name.clone(), value);
        }

        ExtractionResult {
            image_name: image_name.to_string(),
            extracted_data: extracted,
            timestamp: Utc::now(),
            data_fields: fields.to_vec(),
        }
    }

    /// Run [`run_extraction`](Self::run_extraction) over several images, sequentially.
    pub async fn run_batch(&self, images: &[NamedImage], fields: &[DataField]) -> Vec<ExtractionResult> {
        let mut results = Vec::with_capacity(images.len());
        for named in images {
            results.push(self.run_extraction(&named.name, &named.image, fields).await);
        }
        results
    }
}

/// Serialize `result` and hand it to `exporter` under its conventional file name.
pub async fn export_result(exporter: &dyn FileExporter, result: &ExtractionResult) -> Result<PathBuf> {
    let json = result.to_json().context("Failed to serialize extraction result")?;
    let filename = result_file_name(result);
    let location = exporter
        .download_as_file(&filename, &json)
        .await
        .with_context(|| format!("Failed to export {filename}"))?;
    EventLogger::log_event(&result.image_name, ExtractionEvent::ResultExported {
        image_name: result.image_name.clone(),
        location: location.display().to_string(),
    });
    Ok(location)
}

/// `<image-stem>_<yyyymmddHHMMSS>.json`, limited to filesystem-safe characters.
pub fn result_file_name(result: &ExtractionResult) -> String {
    let stem = match result.image_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => result.image_name.as_str(),
    };
    let mut safe: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if safe.is_empty() {
        warn!("Image name has no usable characters; using 'image'");
        safe = "image".to_string();
    }
    format!("{safe}_{}.json", result.timestamp.format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Answer, FakeProbe, ScriptedRuntime, session_with};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use visionex_core::NO_ANSWER_FALLBACK;

    fn image() -> ImageData {
        ImageData::new("image/jpeg", vec![0xFF, 0xD8, 0xFF])
    }

    fn fields() -> Vec<DataField> {
        vec![
            DataField::new("Vendor", "Who issued the invoice?"),
            DataField::new("Total", "What is the total amount?"),
            DataField::new("Date", "What is the invoice date?"),
        ]
    }

    #[tokio::test]
    async fn partial_failure_keeps_other_fields() {
        let runtime = ScriptedRuntime::new()
            .answer("Who issued the invoice?", Answer::Text("ACME Corp"))
            .answer("What is the total amount?", Answer::Fail("out of memory"))
            .answer("What is the invoice date?", Answer::Text("2026-03-01"));
        let (session, _) = session_with(runtime, FakeProbe::supported());
        session.load("smol").await.unwrap();
        let orchestrator = ExtractionOrchestrator::new(session);

        let fields = fields();
        let result = orchestrator.run_extraction("invoice.jpg", &image(), &fields).await;

        assert_eq!(result.extracted_data.len(), 3);
        assert_eq!(result.extracted_data["Vendor"], "ACME Corp");
        assert_eq!(result.extracted_data["Total"], "Failed to extract data: out of memory");
        assert_eq!(result.extracted_data["Date"], "2026-03-01");
        assert_eq!(result.data_fields, fields);
        assert_eq!(result.image_name, "invoice.jpg");
    }

    #[tokio::test]
    async fn unloaded_session_fills_every_field_with_error() {
        let (session, _) = session_with(ScriptedRuntime::new(), FakeProbe::supported());
        let orchestrator = ExtractionOrchestrator::new(session);

        let result = orchestrator.run_extraction("a.png", &image(), &fields()).await;
        assert_eq!(result.extracted_data.len(), 3);
        assert!(result.extracted_data.values().all(|v| v.contains("not loaded")));
    }

    #[tokio::test]
    async fn batch_runs_every_image() {
        let runtime = ScriptedRuntime::new().answer("Who issued the invoice?", Answer::Raw("???"));
        let (session, _) = session_with(runtime, FakeProbe::supported());
        session.load("smol").await.unwrap();
        let orchestrator = ExtractionOrchestrator::new(session);

        let images = vec![
            NamedImage { name: "one.jpg".into(), image: image() },
            NamedImage { name: "two.jpg".into(), image: image() },
        ];
        let results = orchestrator.run_batch(&images, &fields()[..1]).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].image_name, "two.jpg");
        assert_eq!(results[0].extracted_data["Vendor"], NO_ANSWER_FALLBACK);
    }

    #[test]
    fn file_name_is_sanitized() {
        let result = ExtractionResult {
            image_name: "scans/march invoice.v2.jpeg".into(),
            extracted_data: BTreeMap::new(),
            timestamp: "2026-03-01T12:34:56Z".parse().unwrap(),
            data_fields: vec![],
        };
        assert_eq!(result_file_name(&result), "scans_march_invoice_v2_20260301123456.json");
    }

    #[derive(Default)]
    struct RecordingExporter {
        files: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl FileExporter for RecordingExporter {
        async fn download_as_file(&self, filename: &str, content: &str) -> Result<PathBuf> {
            self.files
                .lock()
                .unwrap()
                .push((filename.to_string(), content.to_string()));
            Ok(PathBuf::from(filename))
        }
    }

    #[tokio::test]
    async fn export_writes_pretty_json() {
        let result = ExtractionResult {
            image_name: "receipt.png".into(),
            extracted_data: BTreeMap::from([("Total".to_string(), "$3".to_string())]),
            timestamp: "2026-03-01T00:00:00Z".parse().unwrap(),
            data_fields: vec![DataField::new("Total", "Total?")],
        };
        let exporter = RecordingExporter::default();
        let path = export_result(&exporter, &result).await.unwrap();

        assert_eq!(path, PathBuf::from("receipt_20260301000000.json"));
        let files = exporter.files.lock().unwrap();
        let value: serde_json::Value = serde_json::from_str(&files[0].1).unwrap();
        assert_eq!(value["ExtractedData"]["Total"], "$3");
    }
}
