//! Test fixtures: a fully wired roster over mocks, and snapshot builders.

use crate::{MockAnnouncementStore, MockCatalogue, MockPresence, MockRenderer, MockTransport};
use chrono::{DateTime, TimeZone, Utc};
use r2p_service::announcement::AnnouncementPublisher;
use r2p_service::interest::CommonInterestResolver;
use r2p_service::roster::{
    run_role_worker, PendingArrival, RosterActor, RosterActorHandle, RosterSettings,
    RosterSnapshot,
};
use r2p_service::types::{ChannelId, MemberId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Ready channel used by every fixture.
pub const TEST_CHANNEL: ChannelId = ChannelId(900);

/// Shorthand for `MemberId(id)`.
#[must_use]
pub const fn member(id: u64) -> MemberId {
    MemberId(id)
}

/// Fixed timestamp for snapshot builders.
#[must_use]
pub fn at(unix_seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(unix_seconds, 0).single().unwrap()
}

/// Build a roster snapshot.
#[must_use]
pub fn snapshot(active: &[u64], pending: &[(u64, i64)], generation: u64) -> RosterSnapshot {
    RosterSnapshot {
        active: active.iter().copied().map(MemberId).collect(),
        pending: pending
            .iter()
            .map(|&(id, ts)| PendingArrival {
                member_id: MemberId(id),
                target_time: at(ts),
            })
            .collect(),
        generation,
    }
}

/// Roster actor, role worker and announcement worker wired to mocks.
pub struct TestService {
    pub roster: RosterActorHandle,
    pub transport: MockTransport,
    pub catalogue: MockCatalogue,
    pub presence: MockPresence,
    pub store: MockAnnouncementStore,
    pub cancel_token: CancellationToken,
}

impl TestService {
    #[must_use]
    pub fn builder() -> TestServiceBuilder {
        TestServiceBuilder::default()
    }

    /// Stop the actor and both workers.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

impl Drop for TestService {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Builder for [`TestService`].
#[derive(Default)]
pub struct TestServiceBuilder {
    settings: RosterSettings,
    transport: MockTransport,
    catalogue: MockCatalogue,
    presence: MockPresence,
    store: MockAnnouncementStore,
    renderer: Option<MockRenderer>,
}

impl TestServiceBuilder {
    #[must_use]
    pub fn with_settings(mut self, settings: RosterSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: MockTransport) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn with_catalogue(mut self, catalogue: MockCatalogue) -> Self {
        self.catalogue = catalogue;
        self
    }

    #[must_use]
    pub fn with_presence(mut self, presence: MockPresence) -> Self {
        self.presence = presence;
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: MockAnnouncementStore) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: MockRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Spawn everything. Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(self) -> TestService {
        let cancel_token = CancellationToken::new();
        let (role_tx, role_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_role_worker(
            Arc::new(self.transport.clone()),
            role_rx,
            cancel_token.child_token(),
        ));

        let mut publisher = AnnouncementPublisher::new(
            Arc::new(self.transport.clone()),
            Arc::new(self.store.clone()),
            CommonInterestResolver::new(Arc::new(self.catalogue.clone())),
            TEST_CHANNEL,
        );
        if let Some(renderer) = self.renderer {
            publisher = publisher.with_renderer(Arc::new(renderer));
        }
        tokio::spawn(publisher.run(snapshot_rx, cancel_token.child_token()));

        let (roster, _task) = RosterActor::spawn(
            self.settings,
            Arc::new(self.presence.clone()),
            snapshot_tx,
            role_tx,
            cancel_token.child_token(),
        );

        TestService {
            roster,
            transport: self.transport,
            catalogue: self.catalogue,
            presence: self.presence,
            store: self.store,
            cancel_token,
        }
    }
}
