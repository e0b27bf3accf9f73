//! R2P error types.
//!
//! Errors split into three families:
//! - validation and lookup failures reported back to the invoking member
//!   (`InvalidDelay`, `NotInRoster`, `Library`),
//! - collaborator failures (transport, catalogue, store, renderer) that are
//!   logged and skipped, never rolling back roster state,
//! - internal failures (actor mailbox closed).
//!
//! Internal details are logged server-side but not exposed to callers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::duration::humanize;

/// R2P service error type.
#[derive(Debug, Error)]
pub enum R2pError {
    /// Delay text could not be used for a delayed `ready`.
    #[error("Invalid delay: {0}")]
    InvalidDelay(DelayError),

    /// `unready` for a member who is neither active nor pending.
    #[error("Member not in roster")]
    NotInRoster,

    /// Library command rejected (empty input, empty library).
    #[error("Library error: {0}")]
    Library(LibraryError),

    /// Chat platform call failed (network, unexpected status).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Message to delete no longer exists.
    #[error("Message not found")]
    MessageNotFound,

    /// Chat platform refused the call (missing permission).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Catalogue read or write failed.
    #[error("Catalogue error: {0}")]
    Catalogue(String),

    /// Announcement record store failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Summary renderer failed.
    #[error("Render error: {0}")]
    Render(String),

    /// Internal error (actor channel closed, response dropped).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Validation failures for the `ready` delay argument.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DelayError {
    /// No duration could be read from the text.
    #[error("unparseable delay {0:?}")]
    Unparseable(String),

    /// Parsed delay is above the configured maximum.
    #[error("delay of {requested:?} exceeds maximum of {max:?}")]
    TooLong { requested: Duration, max: Duration },
}

/// Library command failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LibraryError {
    /// No usable title in the comma-separated input.
    #[error("no item title given")]
    EmptyInput,

    /// Removal requested on an empty library.
    #[error("library is empty")]
    LibraryEmpty,
}

impl From<DelayError> for R2pError {
    fn from(err: DelayError) -> Self {
        R2pError::InvalidDelay(err)
    }
}

impl From<LibraryError> for R2pError {
    fn from(err: LibraryError) -> Self {
        R2pError::Library(err)
    }
}

impl R2pError {
    /// HTTP status code for the ingestion API.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            R2pError::InvalidDelay(_) | R2pError::Library(_) => StatusCode::BAD_REQUEST,
            R2pError::NotInRoster | R2pError::MessageNotFound => StatusCode::NOT_FOUND,
            R2pError::Forbidden(_) => StatusCode::FORBIDDEN,
            R2pError::Transport(_) => StatusCode::BAD_GATEWAY,
            R2pError::Catalogue(_)
            | R2pError::Store(_)
            | R2pError::Render(_)
            | R2pError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code for the JSON error body.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            R2pError::InvalidDelay(DelayError::Unparseable(_)) => "UNPARSEABLE_DELAY",
            R2pError::InvalidDelay(DelayError::TooLong { .. }) => "DELAY_TOO_LONG",
            R2pError::NotInRoster => "NOT_IN_ROSTER",
            R2pError::Library(LibraryError::EmptyInput) => "EMPTY_INPUT",
            R2pError::Library(LibraryError::LibraryEmpty) => "LIBRARY_EMPTY",
            R2pError::MessageNotFound => "NOT_FOUND",
            R2pError::Forbidden(_) => "FORBIDDEN",
            R2pError::Transport(_) => "TRANSPORT_ERROR",
            R2pError::Catalogue(_)
            | R2pError::Store(_)
            | R2pError::Render(_)
            | R2pError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Member-facing message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            R2pError::InvalidDelay(DelayError::Unparseable(text)) => format!(
                "❌ Je n'ai pas compris le délai « {} ». Exemples : 30m, 1h30, 2 heures.",
                text.trim()
            ),
            R2pError::InvalidDelay(DelayError::TooLong { max, .. }) => {
                format!("❌ Le délai maximum est de {}.", humanize(max.as_secs()))
            }
            R2pError::NotInRoster => {
                "🤷 Tu n'es pas dans la liste des joueurs prêts.".to_string()
            }
            R2pError::Library(LibraryError::EmptyInput) => {
                "❌ Aucun titre de jeu valide reçu.".to_string()
            }
            R2pError::Library(LibraryError::LibraryEmpty) => {
                "⚠️ Ta bibliothèque est déjà vide !".to_string()
            }
            R2pError::MessageNotFound
            | R2pError::Forbidden(_)
            | R2pError::Transport(_)
            | R2pError::Catalogue(_)
            | R2pError::Store(_)
            | R2pError::Render(_)
            | R2pError::Internal(_) => "Une erreur interne est survenue.".to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for R2pError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            // Log actual error server-side, return generic message to caller
            tracing::error!(target: "r2p.handlers", error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.client_message(),
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            R2pError::InvalidDelay(DelayError::Unparseable("abc".to_string())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(R2pError::NotInRoster.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            R2pError::Library(LibraryError::EmptyInput).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            R2pError::Transport("connection reset".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            R2pError::Internal("channel closed".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = R2pError::Store("permission denied: /var/lib/r2p/announcement.json".to_string());
        assert!(!err.client_message().contains("/var/lib"));

        let err = R2pError::Transport("401 from https://discord.com".to_string());
        assert!(!err.client_message().contains("discord.com"));
    }

    #[test]
    fn test_delay_too_long_message_restates_maximum() {
        let err = R2pError::from(DelayError::TooLong {
            requested: Duration::from_secs(36_000),
            max: Duration::from_secs(21_600),
        });
        assert_eq!(err.error_code(), "DELAY_TOO_LONG");
        assert!(err.client_message().contains("6 h"));
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(format!("{}", R2pError::NotInRoster), "Member not in roster");
        assert_eq!(
            format!(
                "{}",
                R2pError::from(DelayError::Unparseable("soon".to_string()))
            ),
            "Invalid delay: unparseable delay \"soon\""
        );
    }
}
