//! Decoding of the NDJSON progress stream returned by `/api/pull`.

use anyhow::{Result, bail};
use serde::Deserialize;
use visionex_core::RuntimeProgress;

#[derive(Debug, Deserialize)]
struct PullStatus {
    #[serde(default)]
    status: String,
    digest: Option<String>,
    total: Option<u64>,
    completed: Option<u64>,
    error: Option<String>,
}

/// Incremental line decoder; chunks may split lines anywhere.
#[derive(Debug, Default)]
pub(crate) struct PullLineDecoder {
    buffer: Vec<u8>,
    succeeded: bool,
}

impl PullLineDecoder {
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Result<Vec<RuntimeProgress>> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = self.decode_line(&line)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Flush a trailing line without a newline.
    pub(crate) fn finish(&mut self) -> Result<Vec<RuntimeProgress>> {
        let rest = std::mem::take(&mut self.buffer);
        Ok(self.decode_line(&rest)?.into_iter().collect())
    }

    pub(crate) fn succeeded(&self) -> bool {
        self.succeeded
    }

    fn decode_line(&mut self, line: &[u8]) -> Result<Option<RuntimeProgress>> {
        let text = std::str::from_utf8(line)?.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let status: PullStatus = serde_json::from_str(text)?;
        if let Some(error) = status.error {
            bail!("{error}");
        }
        let file = status.digest.unwrap_or_else(|| status.status.clone());
        let event = match (status.total, status.completed) {
            (Some(total), Some(completed)) if total > 0 => RuntimeProgress::Progress {
                file,
                progress: completed as f64 * 100.0 / total as f64,
            },
            (Some(_), None) => RuntimeProgress::Download { file },
            _ if status.status == "success" => {
                self.succeeded = true;
                RuntimeProgress::Ready
            }
            _ => RuntimeProgress::Initiate { file },
        };
        Ok(Some(event))
    }
}
