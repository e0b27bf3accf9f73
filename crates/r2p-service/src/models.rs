//! Request and response bodies of the HTTP ingestion API.

use crate::types::MemberId;
use serde::{Deserialize, Serialize};

/// `POST /v1/ready`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyRequest {
    pub member_id: MemberId,
    /// Free-form delay such as `"1h30"`; absent or blank means now.
    #[serde(default)]
    pub delay: Option<String>,
}

/// `POST /v1/unready`.
#[derive(Debug, Clone, Deserialize)]
pub struct UnreadyRequest {
    pub member_id: MemberId,
}

/// `POST /v1/events/presence`.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceEvent {
    pub member_id: MemberId,
    pub online: bool,
}

/// `POST /v1/events/voice`.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceEvent {
    pub member_id: MemberId,
    pub in_voice: bool,
}

/// `POST` / `DELETE /v1/library/{member_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct LibraryRequest {
    /// Comma-separated titles.
    pub items: String,
}

/// Acknowledgement for the invoking member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

/// `GET /v1/library/{member_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LibraryResponse {
    pub member_id: MemberId,
    /// Display names sorted case-insensitively.
    pub items: Vec<String>,
    pub message: String,
}
