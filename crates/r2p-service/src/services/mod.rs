//! Chat-platform collaborators.
//!
//! The roster core talks to the platform only through these traits so the
//! state machine can run against recording mocks in tests:
//!
//! - [`Transport`] - post/delete messages, grant/revoke the ready role
//! - [`Presence`] - last known online status of a member
//! - [`SummaryRenderer`] - optional image rendering of the announcement
//!
//! Production implementations: [`discord_client::DiscordClient`] and
//! [`presence::PresenceCache`]. No renderer ships with the service.

pub mod discord_client;
pub mod presence;

use crate::announcement::Summary;
use crate::errors::R2pError;
use crate::types::{ChannelId, MemberId, MessageId};
use async_trait::async_trait;

pub use discord_client::DiscordClient;
pub use presence::PresenceCache;

/// An announcement ready to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    /// Message text (markdown, mentions).
    pub text: String,
    /// Optional PNG attachment.
    pub image: Option<Vec<u8>>,
}

impl MessageContent {
    /// Text-only content.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }
}

/// Message and role operations on the chat platform.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Post a message, returning its id.
    async fn post_message(
        &self,
        channel: ChannelId,
        content: &MessageContent,
    ) -> Result<MessageId, R2pError>;

    /// Delete a message. `R2pError::MessageNotFound` when already gone.
    async fn delete_message(&self, channel: ChannelId, message: &MessageId)
        -> Result<(), R2pError>;

    /// Give the member the ready role.
    async fn grant_ready_role(&self, member: MemberId) -> Result<(), R2pError>;

    /// Take the ready role away from the member.
    async fn revoke_ready_role(&self, member: MemberId) -> Result<(), R2pError>;
}

/// Presence lookups.
#[async_trait]
pub trait Presence: Send + Sync {
    /// Whether the member is currently online. Unknown members are offline.
    async fn is_online(&self, member: MemberId) -> bool;
}

/// Renders an announcement into an image.
#[async_trait]
pub trait SummaryRenderer: Send + Sync {
    async fn render(&self, summary: &Summary) -> Result<Vec<u8>, R2pError>;
}
