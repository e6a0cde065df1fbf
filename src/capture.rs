use crate::error::{CaptureError, Result};
use chrono::{DateTime, Local};
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};

/// Persists received frames under a timestamped name in the capture
/// directory. Created once at startup; the directory is never torn down
/// mid-run.
pub struct FrameStore {
    dir: PathBuf,
}

impl FrameStore {
    /// Create the store, ensuring the capture directory exists.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| CaptureError::DirectoryCreation {
                    path: dir.display().to_string(),
                    source: e,
                })?;
            info!("Created capture directory: {}", dir.display());
        }
        Ok(Self { dir })
    }

    /// Write one payload to `image_<YYYYMMDDHHMMSS>.jpg`. Two frames inside
    /// the same wall-clock second get distinct names via a numeric suffix
    /// instead of overwriting.
    pub async fn persist(&self, payload: &[u8], timestamp: DateTime<Local>) -> Result<PathBuf> {
        let stem = format!("image_{}", timestamp.format("%Y%m%d%H%M%S"));
        let mut path = self.dir.join(format!("{stem}.jpg"));
        let mut counter = 1u32;
        while path.exists() {
            path = self.dir.join(format!("{stem}_{counter}.jpg"));
            counter += 1;
        }

        fs::write(&path, payload)
            .await
            .map_err(|e| CaptureError::Write {
                path: path.display().to_string(),
                source: e,
            })?;
        debug!(bytes = payload.len(), path = %path.display(), "frame persisted");
        Ok(path)
    }
}
