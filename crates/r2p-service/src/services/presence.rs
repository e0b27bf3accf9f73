//! Last-known presence per member.
//!
//! The gateway bridge reports presence changes to `POST /v1/events/presence`;
//! the handler records them here before forwarding the event to the roster,
//! so an elapsed arrival timer can check whether the member came online.

use super::Presence;
use crate::types::MemberId;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory presence table.
#[derive(Debug, Default)]
pub struct PresenceCache {
    online: RwLock<HashMap<MemberId, bool>>,
}

impl PresenceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a presence change.
    pub async fn record(&self, member: MemberId, online: bool) {
        self.online.write().await.insert(member, online);
    }

    /// Number of members with a known presence.
    pub async fn len(&self) -> usize {
        self.online.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.online.read().await.is_empty()
    }
}

#[async_trait]
impl Presence for PresenceCache {
    async fn is_online(&self, member: MemberId) -> bool {
        self.online
            .read()
            .await
            .get(&member)
            .copied()
            .unwrap_or(false)
    }
}
