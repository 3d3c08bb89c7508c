//! Dry-run transport that writes each message to a directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use missive_common::outbound;
use missive_delivery::{ExternalServiceError, Transport};
use ulid::Ulid;

/// Writes every message to `<outbox>/<ulid>.eml`, using the ULID as the
/// provider message id.
#[derive(Debug, Clone)]
pub struct FileTransport {
    outbox: PathBuf,
}

impl FileTransport {
    #[must_use]
    pub fn new(outbox: impl Into<PathBuf>) -> Self {
        Self {
            outbox: outbox.into(),
        }
    }

    /// Create the outbox directory if needed.
    ///
    /// # Errors
    ///
    /// If the directory cannot be created.
    pub async fn init(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.outbox).await
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.outbox
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn send(&self, to: &str, from: &str, raw: &[u8]) -> Result<String, ExternalServiceError> {
        let id = Ulid::new().to_string();
        let path = self.outbox.join(format!("{id}.eml"));

        tokio::fs::write(&path, raw)
            .await
            .map_err(|e| ExternalServiceError::Transport(format!("{}: {e}", path.display())))?;

        outbound!(to, from, path = %path.display(), "Message written to outbox");
        Ok(id)
    }
}
