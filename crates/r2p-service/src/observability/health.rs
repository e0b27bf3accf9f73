//! Liveness and readiness routes.
//!
//! `GET /health` answers `200` while the process serves requests.
//! `GET /ready` answers `200` between the end of startup and the start of
//! shutdown, and only while the roster actor is running.

use crate::roster::RosterActorHandle;
use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Whether the service accepts roster traffic.
pub struct Readiness {
    serving: AtomicBool,
    roster: RosterActorHandle,
}

impl Readiness {
    #[must_use]
    pub fn new(roster: RosterActorHandle) -> Self {
        Self {
            serving: AtomicBool::new(false),
            roster,
        }
    }

    /// The roster is reset and the listener is bound.
    pub fn mark_serving(&self) {
        self.serving.store(true, Ordering::SeqCst);
    }

    /// Shutdown has begun.
    pub fn mark_draining(&self) {
        self.serving.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.serving.load(Ordering::SeqCst) && !self.roster.is_cancelled()
    }
}

pub fn health_router(readiness: Arc<Readiness>) -> Router {
    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route("/ready", get(ready))
        .with_state(readiness)
}

async fn ready(State(readiness): State<Arc<Readiness>>) -> StatusCode {
    if readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::roster::{RosterActor, RosterSettings};
    use crate::services::PresenceCache;
    use axum::body::Body;
    use axum::http::Request;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use tower::util::ServiceExt;

    fn readiness() -> Arc<Readiness> {
        let (snapshot_tx, _) = mpsc::unbounded_channel();
        let (role_tx, _) = mpsc::unbounded_channel();
        let (roster, _task) = RosterActor::spawn(
            RosterSettings::default(),
            Arc::new(PresenceCache::new()),
            snapshot_tx,
            role_tx,
            CancellationToken::new(),
        );
        Arc::new(Readiness::new(roster))
    }

    async fn status(readiness: &Arc<Readiness>, uri: &str) -> StatusCode {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        health_router(Arc::clone(readiness))
            .oneshot(request)
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_liveness_does_not_wait_for_startup() {
        let readiness = readiness();
        assert_eq!(status(&readiness, "/health").await, StatusCode::OK);
        assert_eq!(
            status(&readiness, "/ready").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_ready_between_startup_and_shutdown() {
        let readiness = readiness();

        readiness.mark_serving();
        assert_eq!(status(&readiness, "/ready").await, StatusCode::OK);

        readiness.mark_draining();
        assert_eq!(
            status(&readiness, "/ready").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_not_ready_once_roster_stops() {
        let readiness = readiness();
        readiness.mark_serving();

        readiness.roster.cancel();
        assert!(!readiness.is_ready());
        assert_eq!(status(&readiness, "/health").await, StatusCode::OK);
    }
}
