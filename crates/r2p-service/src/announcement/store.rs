//! Persistence of the last posted announcement id.
//!
//! The id survives restarts so the first announcement after a restart replaces
//! the one left behind by the previous process.

use crate::catalogue::write_atomically;
use crate::errors::R2pError;
use crate::types::MessageId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Storage of the last announcement id.
#[async_trait]
pub trait AnnouncementStore: Send + Sync {
    /// Id of the last posted announcement, if any.
    async fn load(&self) -> Result<Option<MessageId>, R2pError>;

    /// Record the id of a newly posted announcement.
    async fn save(&self, message_id: &MessageId) -> Result<(), R2pError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AnnouncementRecord {
    last_message_id: Option<MessageId>,
}

/// JSON file store: `{ "last_message_id": "..." }`.
#[derive(Debug)]
pub struct FileAnnouncementStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAnnouncementStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AnnouncementStore for FileAnnouncementStore {
    async fn load(&self) -> Result<Option<MessageId>, R2pError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(R2pError::Store(format!("read failed: {e}"))),
        };

        let record: AnnouncementRecord = serde_json::from_slice(&bytes)
            .map_err(|e| R2pError::Store(format!("corrupt announcement record: {e}")))?;
        Ok(record.last_message_id)
    }

    async fn save(&self, message_id: &MessageId) -> Result<(), R2pError> {
        let _guard = self.write_lock.lock().await;

        let record = AnnouncementRecord {
            last_message_id: Some(message_id.clone()),
        };
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| R2pError::Store(format!("serialize failed: {e}")))?;

        write_atomically(&self.path, &bytes).await.map_err(|e| {
            error!(target: "r2p.announcement", path = %self.path.display(), error = %e, "Failed to save announcement record");
            R2pError::Store(format!("write failed: {e}"))
        })?;

        debug!(target: "r2p.announcement", message_id = %message_id, "Announcement record saved");
        Ok(())
    }
}
