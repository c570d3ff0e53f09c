//! Upload archive
//!
//! Optionally keeps a copy of every accepted upload. Archiving is best-effort:
//! it runs on a detached task and its failures never reach the client.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::preprocess::UploadFormat;

/// Directory of archived uploads
#[derive(Debug, Clone)]
pub struct UploadArchive {
    dir: PathBuf,
}

impl UploadArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<UTC timestamp>-<uuid>.<ext>`, unique per upload
    pub fn file_name(timestamp: DateTime<Utc>, id: Uuid, format: UploadFormat) -> String {
        format!(
            "{}-{}.{}",
            timestamp.format("%Y%m%dT%H%M%S%.3fZ"),
            id,
            format.extension()
        )
    }

    /// Write the upload to a new file. Never overwrites an existing file.
    pub async fn store(&self, bytes: &[u8], format: UploadFormat) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self
            .dir
            .join(Self::file_name(Utc::now(), Uuid::new_v4(), format));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;

        Ok(path)
    }

    /// Archive on a detached task, logging instead of returning failures
    pub fn store_detached(
        &self,
        bytes: Bytes,
        format: UploadFormat,
    ) -> tokio::task::JoinHandle<()> {
        let archive = self.clone();
        tokio::spawn(async move {
            match archive.store(&bytes, format).await {
                Ok(path) => tracing::debug!("Archived upload to {:?}", path),
                Err(e) => tracing::warn!("Failed to archive upload in {:?}: {}", archive.dir, e),
            }
        })
    }
}
