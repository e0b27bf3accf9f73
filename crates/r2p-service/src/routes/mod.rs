//! HTTP routes for the R2P service.
//!
//! Defines the Axum router and application state.

use crate::catalogue::JsonCatalogue;
use crate::handlers;
use crate::roster::RosterActorHandle;
use crate::services::PresenceCache;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the roster actor.
    pub roster: RosterActorHandle,

    /// Presence table fed by presence events.
    pub presence: Arc<PresenceCache>,

    /// Member game libraries.
    pub catalogue: Arc<JsonCatalogue>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/v1/ready`, `/v1/unready` - Roster commands
/// - `/v1/events/presence`, `/v1/events/voice` - Gateway bridge events
/// - `/v1/library/:member_id` - Library add/remove/list
/// - `/v1/roster` - Roster debug view
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/v1/ready", post(handlers::ready))
        .route("/v1/unready", post(handlers::unready))
        .route("/v1/events/presence", post(handlers::presence_changed))
        .route("/v1/events/voice", post(handlers::voice_changed))
        .route(
            "/v1/library/:member_id",
            get(handlers::list_items)
                .post(handlers::add_items)
                .delete(handlers::remove_items),
        )
        .route("/v1/roster", get(handlers::get_roster))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    api_routes
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
