//! Roster handlers.
//!
//! - `POST /v1/ready` - Join now or after a delay
//! - `POST /v1/unready` - Leave the roster
//! - `POST /v1/events/presence` - Presence change from the gateway bridge
//! - `POST /v1/events/voice` - Voice-state change from the gateway bridge
//! - `GET /v1/roster` - Current roster (debug)

use crate::errors::R2pError;
use crate::models::{MessageResponse, PresenceEvent, ReadyRequest, UnreadyRequest, VoiceEvent};
use crate::roster::{RosterState, UNREADY_ACKNOWLEDGEMENT};
use crate::routes::AppState;
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Handler for POST /v1/ready
///
/// # Response
///
/// - 200 OK: acknowledgement (added now or scheduled)
/// - 400 Bad Request: unparseable or too long delay, roster unchanged
#[instrument(skip_all, fields(member_id = %request.member_id))]
pub async fn ready(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReadyRequest>,
) -> Result<Json<MessageResponse>, R2pError> {
    let outcome = state.roster.ready(request.member_id, request.delay).await?;
    Ok(Json(MessageResponse {
        message: outcome.acknowledgement(),
    }))
}

/// Handler for POST /v1/unready
///
/// # Response
///
/// - 200 OK: removed
/// - 404 Not Found: member was not in the roster
#[instrument(skip_all, fields(member_id = %request.member_id))]
pub async fn unready(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UnreadyRequest>,
) -> Result<Json<MessageResponse>, R2pError> {
    state.roster.unready(request.member_id).await?;
    Ok(Json(MessageResponse {
        message: UNREADY_ACKNOWLEDGEMENT.to_string(),
    }))
}

/// Handler for POST /v1/events/presence
///
/// Records the presence before forwarding it, so an arrival timer that
/// elapses next sees the new value.
#[instrument(skip_all, fields(member_id = %event.member_id, online = event.online))]
pub async fn presence_changed(
    State(state): State<Arc<AppState>>,
    Json(event): Json<PresenceEvent>,
) -> Result<StatusCode, R2pError> {
    state.presence.record(event.member_id, event.online).await;
    state
        .roster
        .presence_changed(event.member_id, event.online)
        .await?;
    debug!(target: "r2p.handlers", member_id = %event.member_id, online = event.online, "Presence event accepted");
    Ok(StatusCode::ACCEPTED)
}

/// Handler for POST /v1/events/voice
#[instrument(skip_all, fields(member_id = %event.member_id, in_voice = event.in_voice))]
pub async fn voice_changed(
    State(state): State<Arc<AppState>>,
    Json(event): Json<VoiceEvent>,
) -> Result<StatusCode, R2pError> {
    state
        .roster
        .voice_changed(event.member_id, event.in_voice)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

/// Handler for GET /v1/roster
pub async fn get_roster(State(state): State<Arc<AppState>>) -> Result<Json<RosterState>, R2pError> {
    Ok(Json(state.roster.get_state().await?))
}
