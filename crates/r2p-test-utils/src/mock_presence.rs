//! Settable presence mock.

use async_trait::async_trait;
use r2p_service::services::Presence;
use r2p_service::types::MemberId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock presence source. Unknown members are offline.
#[derive(Debug, Clone, Default)]
pub struct MockPresence {
    online: Arc<Mutex<HashMap<MemberId, bool>>>,
}

impl MockPresence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_online(self, member: u64) -> Self {
        self.set_online(MemberId(member), true);
        self
    }

    pub fn set_online(&self, member: MemberId, online: bool) {
        self.online.lock().unwrap().insert(member, online);
    }
}

#[async_trait]
impl Presence for MockPresence {
    async fn is_online(&self, member: MemberId) -> bool {
        self.online
            .lock()
            .unwrap()
            .get(&member)
            .copied()
            .unwrap_or(false)
    }
}
