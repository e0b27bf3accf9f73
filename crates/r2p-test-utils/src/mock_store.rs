//! In-memory announcement record.

use async_trait::async_trait;
use r2p_service::announcement::AnnouncementStore;
use r2p_service::errors::R2pError;
use r2p_service::types::MessageId;
use std::sync::{Arc, Mutex};

/// Mock announcement store for testing.
#[derive(Debug, Clone, Default)]
pub struct MockAnnouncementStore {
    inner: Arc<Mutex<MockStoreInner>>,
}

#[derive(Debug, Default)]
struct MockStoreInner {
    current: Option<MessageId>,
    saves: Vec<MessageId>,
    fail_load: bool,
    fail_save: bool,
}

impl MockAnnouncementStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a recorded id, as left by a previous process.
    #[must_use]
    pub fn with_message_id(self, id: &str) -> Self {
        self.inner.lock().unwrap().current = Some(MessageId::from(id));
        self
    }

    #[must_use]
    pub fn with_failing_load(self) -> Self {
        self.inner.lock().unwrap().fail_load = true;
        self
    }

    #[must_use]
    pub fn with_failing_save(self) -> Self {
        self.inner.lock().unwrap().fail_save = true;
        self
    }

    /// Currently recorded id.
    pub fn current(&self) -> Option<MessageId> {
        self.inner.lock().unwrap().current.clone()
    }

    /// Every successfully saved id in order.
    pub fn saves(&self) -> Vec<MessageId> {
        self.inner.lock().unwrap().saves.clone()
    }
}

#[async_trait]
impl AnnouncementStore for MockAnnouncementStore {
    async fn load(&self) -> Result<Option<MessageId>, R2pError> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_load {
            return Err(R2pError::Store("mock load failure".to_string()));
        }
        Ok(inner.current.clone())
    }

    async fn save(&self, message_id: &MessageId) -> Result<(), R2pError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_save {
            return Err(R2pError::Store("mock save failure".to_string()));
        }
        inner.current = Some(message_id.clone());
        inner.saves.push(message_id.clone());
        Ok(())
    }
}
