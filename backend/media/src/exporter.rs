//! Writes exported results into a local directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::fs;
use tracing::info;
use visionex_core::FileExporter;

pub struct DirectoryExporter {
    output_dir: PathBuf,
}

impl DirectoryExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into() }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[async_trait]
impl FileExporter for DirectoryExporter {
    /// Write atomically: temp file, then rename.
    async fn download_as_file(&self, filename: &str, content: &str) -> Result<PathBuf> {
        if filename.is_empty() || filename.contains(['/', '\\']) || filename.starts_with('.') {
            bail!("Refusing to export to unsafe file name: {filename:?}");
        }
        fs::create_dir_all(&self.output_dir).await.with_context(|| {
            format!("Failed to create output directory: {}", self.output_dir.display())
        })?;

        let path = self.output_dir.join(filename);
        let tmp_path = self.output_dir.join(format!(".{filename}.tmp"));
        fs::write(&tmp_path, content.as_bytes())
            .await
            .with_context(|| format!("Failed to write temp file: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("Failed to move export into place: {}", path.display()))?;

        info!(path = %path.display(), bytes = content.len(), "Exported file");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_file_into_directory() {
        let dir = std::env::temp_dir().join(format!("visionex-export-{}", uuid::Uuid::new_v4()));
        let exporter = DirectoryExporter::new(dir.join("nested"));

        let path = exporter.download_as_file("result.json", "{\n  \"a\": 1\n}").await.unwrap();
        assert_eq!(path, dir.join("nested").join("result.json"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\n  \"a\": 1\n}");

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let exporter = DirectoryExporter::new(std::env::temp_dir());
        assert!(exporter.download_as_file("../evil.json", "{}").await.is_err());
        assert!(exporter.download_as_file("", "{}").await.is_err());
    }
}
