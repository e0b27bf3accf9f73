//! Ready-role worker.
//!
//! Applies the grants and revokes produced by the roster actor, one at a time
//! and in order. Failures are logged and counted; the roster is never rolled
//! back.

use super::messages::RoleChange;
use crate::observability::metrics;
use crate::services::Transport;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Run the role worker until the queue closes or `cancel_token` fires.
pub async fn run_role_worker(
    transport: Arc<dyn Transport>,
    mut changes: mpsc::UnboundedReceiver<RoleChange>,
    cancel_token: CancellationToken,
) {
    info!(target: "r2p.roster.roles", "Role worker started");

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            change = changes.recv() => {
                match change {
                    Some(change) => apply(transport.as_ref(), change).await,
                    None => break,
                }
            }
        }
    }

    info!(target: "r2p.roster.roles", "Role worker stopped");
}

async fn apply(transport: &dyn Transport, change: RoleChange) {
    let member = change.member();
    let result = match change {
        RoleChange::Grant(member) => transport.grant_ready_role(member).await,
        RoleChange::Revoke(member) => transport.revoke_ready_role(member).await,
    };

    match result {
        Ok(()) => {
            debug!(target: "r2p.roster.roles", member_id = %member, change = change.as_str(), "Ready role updated");
        }
        Err(e) => {
            warn!(
                target: "r2p.roster.roles",
                member_id = %member,
                change = change.as_str(),
                error = %e,
                "Ready role update failed"
            );
            metrics::record_collaborator_failure(match change {
                RoleChange::Grant(_) => "grant_ready_role",
                RoleChange::Revoke(_) => "revoke_ready_role",
            });
        }
    }
}
