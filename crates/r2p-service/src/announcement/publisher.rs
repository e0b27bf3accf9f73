//! Announcement publisher worker.
//!
//! Receives roster snapshots from the roster actor and keeps exactly one
//! announcement posted in the ready channel.
//!
//! # Publish protocol
//!
//! 1. Resolve the common interest of the active members
//! 2. Render an image when a renderer is configured and the roster is non-empty
//! 3. Take the previous announcement id: the last one this publisher posted,
//!    else the stored record (absent or stale is fine)
//! 4. Post the new announcement
//! 5. Only after a successful post, delete the previous one (best-effort)
//! 6. Save the new id
//!
//! A failed post leaves the previous message and record untouched. A failed
//! save does not lose the new id, which is still deleted by the next publish.
//! When
//! several snapshots are queued the worker skips to the newest one.

use super::store::AnnouncementStore;
use super::summary::Summary;
use crate::errors::R2pError;
use crate::interest::CommonInterestResolver;
use crate::observability::metrics;
use crate::roster::RosterSnapshot;
use crate::services::{MessageContent, SummaryRenderer, Transport};
use crate::types::{ChannelId, MessageId};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Posts announcements and replaces the previous one.
#[derive(Clone)]
pub struct AnnouncementPublisher {
    transport: Arc<dyn Transport>,
    store: Arc<dyn AnnouncementStore>,
    resolver: CommonInterestResolver,
    renderer: Option<Arc<dyn SummaryRenderer>>,
    channel: ChannelId,
    /// Id of the last successful post, shared by clones.
    last_posted: Arc<Mutex<Option<MessageId>>>,
}

impl AnnouncementPublisher {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn AnnouncementStore>,
        resolver: CommonInterestResolver,
        channel: ChannelId,
    ) -> Self {
        Self {
            transport,
            store,
            resolver,
            renderer: None,
            channel,
            last_posted: Arc::new(Mutex::new(None)),
        }
    }

    /// Attach an image renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn SummaryRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Build the summary for `snapshot`.
    pub async fn build_summary(&self, snapshot: &RosterSnapshot) -> Summary {
        let interest = self.resolver.resolve(&snapshot.active).await;
        Summary::new(snapshot, interest)
    }

    /// Publish one snapshot.
    ///
    /// # Errors
    ///
    /// Returns the transport error when the post fails. Failures of the
    /// renderer, the deletion or the store are logged and do not fail the
    /// publish.
    #[instrument(skip_all, fields(generation = snapshot.generation))]
    pub async fn publish(&self, snapshot: &RosterSnapshot) -> Result<MessageId, R2pError> {
        let start = Instant::now();
        let summary = self.build_summary(snapshot).await;

        let content = MessageContent {
            text: summary.text(),
            image: self.render(&summary).await,
        };

        let mut last_posted = self.last_posted.lock().await;
        let previous = match last_posted.clone() {
            Some(previous) => Some(previous),
            None => self.load_previous().await,
        };

        let posted = match self.transport.post_message(self.channel, &content).await {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    target: "r2p.announcement",
                    generation = snapshot.generation,
                    error = %e,
                    "Failed to post announcement"
                );
                metrics::record_collaborator_failure("post_message");
                metrics::record_announcement("failed", start.elapsed());
                return Err(e);
            }
        };

        *last_posted = Some(posted.clone());
        drop(last_posted);

        if let Some(previous) = previous.filter(|id| *id != posted) {
            self.delete_previous(&previous).await;
        }

        if let Err(e) = self.store.save(&posted).await {
            warn!(target: "r2p.announcement", message_id = %posted, error = %e, "Failed to save announcement record");
            metrics::record_collaborator_failure("store_save");
        }

        metrics::record_announcement("posted", start.elapsed());
        info!(
            target: "r2p.announcement",
            message_id = %posted,
            generation = snapshot.generation,
            active = summary.active.len(),
            pending = summary.pending.len(),
            "Announcement posted"
        );
        Ok(posted)
    }

    async fn load_previous(&self) -> Option<MessageId> {
        match self.store.load().await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(target: "r2p.announcement", error = %e, "Failed to load announcement record");
                metrics::record_collaborator_failure("store_load");
                None
            }
        }
    }

    async fn render(&self, summary: &Summary) -> Option<Vec<u8>> {
        let renderer = self.renderer.as_ref()?;
        if summary.is_empty() {
            return None;
        }

        match renderer.render(summary).await {
            Ok(image) => Some(image),
            Err(e) => {
                warn!(target: "r2p.announcement", error = %e, "Rendering failed, posting text only");
                metrics::record_collaborator_failure("render");
                None
            }
        }
    }

    async fn delete_previous(&self, previous: &MessageId) {
        match self.transport.delete_message(self.channel, previous).await {
            Ok(()) => {
                debug!(target: "r2p.announcement", message_id = %previous, "Previous announcement deleted");
            }
            Err(R2pError::MessageNotFound) => {
                debug!(target: "r2p.announcement", message_id = %previous, "Previous announcement already gone");
            }
            Err(e) => {
                warn!(
                    target: "r2p.announcement",
                    message_id = %previous,
                    error = %e,
                    "Failed to delete previous announcement"
                );
                metrics::record_collaborator_failure("delete_message");
            }
        }
    }

    /// Run the publisher worker until the queue closes or `cancel_token` fires.
    pub async fn run(
        self,
        mut snapshots: mpsc::UnboundedReceiver<RosterSnapshot>,
        cancel_token: CancellationToken,
    ) {
        info!(target: "r2p.announcement", channel_id = %self.channel, "Announcement worker started");

        loop {
            let next = tokio::select! {
                () = cancel_token.cancelled() => break,
                next = snapshots.recv() => next,
            };
            let Some(mut latest) = next else {
                break;
            };

            let mut skipped = 0u64;
            while let Ok(newer) = snapshots.try_recv() {
                latest = newer;
                skipped += 1;
            }
            if skipped > 0 {
                debug!(
                    target: "r2p.announcement",
                    skipped,
                    generation = latest.generation,
                    "Coalesced queued snapshots"
                );
                metrics::record_announcements_skipped(skipped);
            }

            // Errors are logged inside publish; the next mutation retries
            let _ = self.publish(&latest).await;
        }

        info!(target: "r2p.announcement", "Announcement worker stopped");
    }
}
