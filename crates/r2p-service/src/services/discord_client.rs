//! Discord REST client implementing [`Transport`].
//!
//! Covers the four calls the roster needs:
//!
//! - `POST /channels/{channel}/messages` - post the announcement (JSON, or
//!   multipart with `payload_json` when an image is attached)
//! - `DELETE /channels/{channel}/messages/{message}` - remove the previous one
//! - `PUT /guilds/{guild}/members/{member}/roles/{role}` - grant the ready role
//! - `DELETE /guilds/{guild}/members/{member}/roles/{role}` - revoke it
//!
//! Status mapping: 404 → `MessageNotFound` (delete only), 403 → `Forbidden`,
//! anything else non-2xx → `Transport`. The bot token never appears in logs.

use super::{MessageContent, Transport};
use crate::errors::R2pError;
use crate::types::{ChannelId, MemberId, MessageId};
use async_trait::async_trait;
use reqwest::{multipart, Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Default timeout for Discord requests in seconds.
const DISCORD_REQUEST_TIMEOUT_SECS: u64 = 10;

/// File name used for the rendered announcement image.
const ANNOUNCEMENT_IMAGE_NAME: &str = "roster.png";

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

/// HTTP client for the Discord REST API, bound to one guild and ready role.
#[derive(Clone)]
pub struct DiscordClient {
    /// HTTP client with configured timeouts.
    client: Client,
    /// API base URL (e.g. `https://discord.com/api/v10`).
    base_url: String,
    /// Bot token.
    token: SecretString,
    /// Guild holding the ready role.
    guild_id: u64,
    /// Role granted to active members.
    ready_role_id: u64,
}

impl std::fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .field("guild_id", &self.guild_id)
            .field("ready_role_id", &self.ready_role_id)
            .finish()
    }
}

impl DiscordClient {
    /// Create a new Discord client.
    ///
    /// # Errors
    ///
    /// Returns `R2pError::Internal` if the HTTP client cannot be built.
    pub fn new(
        base_url: String,
        token: SecretString,
        guild_id: u64,
        ready_role_id: u64,
    ) -> Result<Self, R2pError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DISCORD_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "r2p.services.discord", error = %e, "Failed to build HTTP client");
                R2pError::Internal(format!("http client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            guild_id,
            ready_role_id,
        })
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.token.expose_secret())
    }

    fn role_url(&self, member: MemberId) -> String {
        format!(
            "{}/guilds/{}/members/{}/roles/{}",
            self.base_url, self.guild_id, member, self.ready_role_id
        )
    }

    /// Map a non-success status to an error.
    async fn check_status(response: Response, operation: &str) -> Result<Response, R2pError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => {
                debug!(target: "r2p.services.discord", operation, "Discord resource not found");
                Err(R2pError::MessageNotFound)
            }
            StatusCode::FORBIDDEN => {
                warn!(target: "r2p.services.discord", operation, body = %body, "Discord refused the call");
                Err(R2pError::Forbidden(format!("{operation} forbidden")))
            }
            _ => {
                warn!(target: "r2p.services.discord", operation, status = %status, body = %body, "Unexpected Discord response");
                Err(R2pError::Transport(format!("{operation} returned {status}")))
            }
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<Response, R2pError> {
        let response = request
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| {
                warn!(target: "r2p.services.discord", operation, error = %e, "Discord request failed");
                R2pError::Transport(format!("{operation} failed: {e}"))
            })?;

        Self::check_status(response, operation).await
    }

    async fn update_role(&self, member: MemberId, grant: bool) -> Result<(), R2pError> {
        let url = self.role_url(member);
        let (request, operation) = if grant {
            (self.client.put(&url), "grant_role")
        } else {
            (self.client.delete(&url), "revoke_role")
        };

        match self.send(request, operation).await {
            Ok(_) => Ok(()),
            // A 404 on roles means unknown member or role, not a missing message.
            Err(R2pError::MessageNotFound) => Err(R2pError::Transport(format!(
                "{operation}: unknown member or role"
            ))),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Transport for DiscordClient {
    #[instrument(skip_all, fields(channel = %channel, with_image = content.image.is_some()))]
    async fn post_message(
        &self,
        channel: ChannelId,
        content: &MessageContent,
    ) -> Result<MessageId, R2pError> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel);

        let request = match &content.image {
            None => self.client.post(&url).json(&json!({
                "content": content.text,
                "allowed_mentions": { "parse": ["users"] },
            })),
            Some(image) => {
                let payload = json!({
                    "content": content.text,
                    "allowed_mentions": { "parse": ["users"] },
                    "attachments": [{ "id": 0, "filename": ANNOUNCEMENT_IMAGE_NAME }],
                });
                let file = multipart::Part::bytes(image.clone())
                    .file_name(ANNOUNCEMENT_IMAGE_NAME)
                    .mime_str("image/png")
                    .map_err(|e| R2pError::Internal(format!("multipart mime: {e}")))?;
                let form = multipart::Form::new()
                    .text("payload_json", payload.to_string())
                    .part("files[0]", file);
                self.client.post(&url).multipart(form)
            }
        };

        let response = self.send(request, "post_message").await?;
        let created: CreatedMessage = response.json().await.map_err(|e| {
            error!(target: "r2p.services.discord", error = %e, "Failed to parse created message");
            R2pError::Transport(format!("post_message response: {e}"))
        })?;

        debug!(target: "r2p.services.discord", message_id = %created.id, "Message posted");
        Ok(MessageId(created.id))
    }

    #[instrument(skip_all, fields(channel = %channel, message_id = %message))]
    async fn delete_message(
        &self,
        channel: ChannelId,
        message: &MessageId,
    ) -> Result<(), R2pError> {
        let url = format!(
            "{}/channels/{}/messages/{}",
            self.base_url, channel, message
        );
        self.send(self.client.delete(&url), "delete_message")
            .await
            .map(|_| ())
    }

    #[instrument(skip_all, fields(member_id = %member))]
    async fn grant_ready_role(&self, member: MemberId) -> Result<(), R2pError> {
        self.update_role(member, true).await
    }

    #[instrument(skip_all, fields(member_id = %member))]
    async fn revoke_ready_role(&self, member: MemberId) -> Result<(), R2pError> {
        self.update_role(member, false).await
    }
}
