//! Camera backed by a directory of still frames.
//!
//! A capture daemon (fswebcam, a phone sync folder, ...) drops frames into a
//! directory; `capture` hands out the newest one. `start` waits briefly for
//! the directory to appear since the daemon may still be creating it.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};
use visionex_core::{CameraSource, ImageError};

use crate::file_source::load_image;
use crate::mime_detect::{detect_mime_type, is_image};

const START_ATTEMPTS: u32 = 50;
const START_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Default)]
pub struct FrameDirectoryCamera {
    active: Mutex<Option<PathBuf>>,
}

impl FrameDirectoryCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active_dir().is_some()
    }

    fn active_dir(&self) -> Option<PathBuf> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

async fn newest_frame(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to list frames in {}", dir.display()))?;
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_image(detect_mime_type(&path)) {
            continue;
        }
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

#[async_trait]
impl CameraSource for FrameDirectoryCamera {
    async fn start(&self, container: &str) -> Result<bool> {
        let dir = PathBuf::from(container);
        let mut found = false;
        for _ in 0..START_ATTEMPTS {
            if fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false) {
                found = true;
                break;
            }
            tokio::time::sleep(START_POLL_INTERVAL).await;
        }
        if !found {
            bail!("Frame directory \"{}\" not found", dir.display());
        }
        info!(dir = %dir.display(), "Camera started");
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(dir);
        Ok(true)
    }

    fn stop(&self) {
        if self.active.lock().unwrap_or_else(PoisonError::into_inner).take().is_some() {
            debug!("Camera stopped");
        }
    }

    async fn capture(&self) -> Result<String> {
        let dir = self.active_dir().ok_or(ImageError::CameraInactive)?;
        let frame = newest_frame(&dir)
            .await?
            .ok_or_else(|| anyhow!("No frames captured yet in {}", dir.display()))?;
        let image = load_image(&frame).await?;
        debug!(frame = %frame.display(), "Captured frame");
        Ok(image.to_data_url())
    }
}
