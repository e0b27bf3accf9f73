//! Game library handlers.
//!
//! - `POST /v1/library/{member_id}` - Add comma-separated titles
//! - `DELETE /v1/library/{member_id}` - Remove comma-separated titles
//! - `GET /v1/library/{member_id}` - List the member's titles

use crate::catalogue::acknowledge_all;
use crate::errors::R2pError;
use crate::models::{LibraryRequest, LibraryResponse, MessageResponse};
use crate::routes::AppState;
use crate::types::MemberId;
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

/// Handler for POST /v1/library/{member_id}
///
/// # Response
///
/// - 200 OK: one acknowledgement line per title
/// - 400 Bad Request: no usable title
#[instrument(skip_all, fields(member_id = %member_id))]
pub async fn add_items(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<MemberId>,
    Json(request): Json<LibraryRequest>,
) -> Result<Json<MessageResponse>, R2pError> {
    let outcomes = state.catalogue.add_items(member_id, &request.items).await?;
    info!(target: "r2p.handlers", member_id = %member_id, titles = outcomes.len(), "Library items added");
    Ok(Json(MessageResponse {
        message: acknowledge_all(&outcomes),
    }))
}

/// Handler for DELETE /v1/library/{member_id}
///
/// # Response
///
/// - 200 OK: one acknowledgement line per title
/// - 400 Bad Request: library already empty, or no usable title
#[instrument(skip_all, fields(member_id = %member_id))]
pub async fn remove_items(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<MemberId>,
    Json(request): Json<LibraryRequest>,
) -> Result<Json<MessageResponse>, R2pError> {
    let outcomes = state
        .catalogue
        .remove_items(member_id, &request.items)
        .await?;
    info!(target: "r2p.handlers", member_id = %member_id, titles = outcomes.len(), "Library items removed");
    Ok(Json(MessageResponse {
        message: acknowledge_all(&outcomes),
    }))
}

/// Handler for GET /v1/library/{member_id}
#[instrument(skip_all, fields(member_id = %member_id))]
pub async fn list_items(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<MemberId>,
) -> Json<LibraryResponse> {
    let items = state.catalogue.list_items(member_id).await;
    let message = if items.is_empty() {
        "📭 Ta bibliothèque est vide. Ajoute des jeux avec /addgame !".to_string()
    } else {
        format!("🎮 Ta bibliothèque : {}", items.join(", "))
    };

    Json(LibraryResponse {
        member_id,
        items,
        message,
    })
}
