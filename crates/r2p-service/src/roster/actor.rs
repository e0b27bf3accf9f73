//! `RosterActor` - single owner of the readiness roster.
//!
//! The actor holds every member's lifecycle state and all of their timers.
//! Commands, platform events and timer expiries arrive through one mailbox and
//! are applied one at a time, so a transition and the snapshot taken after it
//! are never interleaved with another transition.
//!
//! # Member lifecycle
//!
//! ```text
//!               ready(delay)                 timer, online
//!  Inactive ─────────────────▶ PendingDelayed ─────────────▶ Active
//!     ▲  ▲                         │  timer, offline            ▲
//!     │  │  grace elapsed          ▼                            │
//!     │  └──────────────────── GracePeriod ──── online ─────────┘
//!     │
//!     └── unready / offline grace / voice grace / absolute timeout ── Active
//! ```
//!
//! The actor never awaits I/O. Presence for an elapsed arrival is read by the
//! timer task, announcements are published by the announcement worker and
//! ready-role changes are applied by the role worker. Both workers receive
//! owned values over unbounded channels in the order the actor produced them.

use super::messages::{
    MemberStatus, MemberView, PendingArrival, ReadyOutcome, RoleChange, RosterMessage,
    RosterSnapshot, RosterState,
};
use super::timers::{TimerClass, TimerId, TimerRegistry};
use crate::duration::parse_seconds;
use crate::errors::{DelayError, R2pError};
use crate::observability::metrics;
use crate::services::Presence;
use crate::types::MemberId;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Mailbox capacity.
const ROSTER_CHANNEL_BUFFER: usize = 256;

/// Durations governing the roster lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterSettings {
    /// Longest accepted `ready` delay.
    pub max_delay: Duration,
    /// Longest time a member stays in the roster.
    pub absolute_timeout: Duration,
    /// Window for a member who was offline when their delay elapsed.
    pub arrival_grace: Duration,
    /// Window for an active member who went offline.
    pub offline_grace: Duration,
    /// Window for an active member who left voice.
    pub voice_grace: Duration,
}

impl Default for RosterSettings {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_secs(6 * 3600),
            absolute_timeout: Duration::from_secs(6 * 3600),
            arrival_grace: Duration::from_secs(15 * 60),
            offline_grace: Duration::from_secs(5 * 60),
            voice_grace: Duration::from_secs(30 * 60),
        }
    }
}

/// Handle to the `RosterActor`.
#[derive(Clone)]
pub struct RosterActorHandle {
    sender: mpsc::Sender<RosterMessage>,
    cancel_token: CancellationToken,
}

impl RosterActorHandle {
    /// Add the member now, or after `delay` when it is present and non-blank.
    ///
    /// # Errors
    ///
    /// `R2pError::InvalidDelay` for an unparseable or too long delay (the
    /// roster is unchanged); `R2pError::Internal` if the actor is gone.
    pub async fn ready(
        &self,
        member: MemberId,
        delay: Option<String>,
    ) -> Result<ReadyOutcome, R2pError> {
        let (tx, rx) = oneshot::channel();
        self.send(RosterMessage::Ready {
            member,
            delay,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| R2pError::Internal(format!("response receive failed: {e}")))?
    }

    /// Remove the member from the roster or cancel their pending arrival.
    ///
    /// # Errors
    ///
    /// `R2pError::NotInRoster` when the member is inactive.
    pub async fn unready(&self, member: MemberId) -> Result<(), R2pError> {
        let (tx, rx) = oneshot::channel();
        self.send(RosterMessage::Unready {
            member,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| R2pError::Internal(format!("response receive failed: {e}")))?
    }

    /// Forward a presence change (fire-and-forget).
    pub async fn presence_changed(&self, member: MemberId, online: bool) -> Result<(), R2pError> {
        self.send(RosterMessage::PresenceChanged { member, online })
            .await
    }

    /// Forward a voice-state change (fire-and-forget).
    pub async fn voice_changed(&self, member: MemberId, in_voice: bool) -> Result<(), R2pError> {
        self.send(RosterMessage::VoiceChanged { member, in_voice })
            .await
    }

    /// Reset the roster and publish the empty announcement.
    pub async fn process_started(&self) -> Result<(), R2pError> {
        let (tx, rx) = oneshot::channel();
        self.send(RosterMessage::ProcessStarted { respond_to: tx })
            .await?;

        rx.await
            .map_err(|e| R2pError::Internal(format!("response receive failed: {e}")))
    }

    /// Get the current roster state.
    pub async fn get_state(&self) -> Result<RosterState, R2pError> {
        let (tx, rx) = oneshot::channel();
        self.send(RosterMessage::GetState { respond_to: tx })
            .await?;

        rx.await
            .map_err(|e| R2pError::Internal(format!("response receive failed: {e}")))
    }

    /// Stop the actor. Every timer is cancelled.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn send(&self, message: RosterMessage) -> Result<(), R2pError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| R2pError::Internal(format!("channel send failed: {e}")))
    }
}

/// Per-member lifecycle state. Inactive members have no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberState {
    PendingDelayed {
        target_time: DateTime<Utc>,
        /// Last presence event received while waiting. Covers an event that
        /// lands between the arrival lookup and its message.
        seen_online: bool,
    },
    GracePeriod { target_time: DateTime<Utc> },
    Active,
}

impl MemberState {
    fn status(&self) -> MemberStatus {
        match self {
            MemberState::PendingDelayed { .. } => MemberStatus::PendingDelayed,
            MemberState::GracePeriod { .. } => MemberStatus::GracePeriod,
            MemberState::Active => MemberStatus::Active,
        }
    }

    fn target_time(&self) -> Option<DateTime<Utc>> {
        match self {
            MemberState::PendingDelayed { target_time, .. }
            | MemberState::GracePeriod { target_time } => Some(*target_time),
            MemberState::Active => None,
        }
    }
}

/// The `RosterActor` implementation.
pub struct RosterActor {
    /// Message receiver.
    receiver: mpsc::Receiver<RosterMessage>,
    /// Sender given to timer tasks. Weak so the mailbox closes with the last handle.
    timer_sender: mpsc::WeakSender<RosterMessage>,
    /// Cancellation token.
    cancel_token: CancellationToken,
    settings: RosterSettings,
    /// Presence lookups for elapsed arrivals (read by timer tasks).
    presence: Arc<dyn Presence>,
    /// Lifecycle state of every non-inactive member.
    members: HashMap<MemberId, MemberState>,
    /// Active members in join order.
    join_order: Vec<MemberId>,
    timers: TimerRegistry,
    /// Announcements requested so far.
    generation: u64,
    /// Announcement worker queue.
    snapshots: mpsc::UnboundedSender<RosterSnapshot>,
    /// Role worker queue.
    roles: mpsc::UnboundedSender<RoleChange>,
}

impl RosterActor {
    /// Spawn the roster actor.
    ///
    /// Returns a handle and the task join handle.
    ///
    /// # Arguments
    ///
    /// * `settings` - Lifecycle durations
    /// * `presence` - Presence source queried when a delayed arrival elapses
    /// * `snapshots` - Queue of the announcement worker
    /// * `roles` - Queue of the role worker
    /// * `cancel_token` - Stops the actor when cancelled
    pub fn spawn(
        settings: RosterSettings,
        presence: Arc<dyn Presence>,
        snapshots: mpsc::UnboundedSender<RosterSnapshot>,
        roles: mpsc::UnboundedSender<RoleChange>,
        cancel_token: CancellationToken,
    ) -> (RosterActorHandle, JoinHandle<()>) {
        let (actor, handle) = Self::new(settings, presence, snapshots, roles, cancel_token);
        let task_handle = tokio::spawn(actor.run());
        (handle, task_handle)
    }

    fn new(
        settings: RosterSettings,
        presence: Arc<dyn Presence>,
        snapshots: mpsc::UnboundedSender<RosterSnapshot>,
        roles: mpsc::UnboundedSender<RoleChange>,
        cancel_token: CancellationToken,
    ) -> (Self, RosterActorHandle) {
        let (sender, receiver) = mpsc::channel(ROSTER_CHANNEL_BUFFER);

        let actor = Self {
            receiver,
            timer_sender: sender.downgrade(),
            cancel_token: cancel_token.clone(),
            settings,
            presence,
            members: HashMap::new(),
            join_order: Vec::new(),
            timers: TimerRegistry::new(),
            generation: 0,
            snapshots,
            roles,
        };

        let handle = RosterActorHandle {
            sender,
            cancel_token,
        };

        (actor, handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "r2p.roster.actor")]
    async fn run(mut self) {
        info!(target: "r2p.roster.actor", "RosterActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "r2p.roster.actor", "RosterActor received cancellation signal");
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message),
                        None => {
                            info!(target: "r2p.roster.actor", "RosterActor channel closed, exiting");
                            break;
                        }
                    }
                }
            }
        }

        let timers_cancelled = self.timers.clear();
        info!(
            target: "r2p.roster.actor",
            active = self.join_order.len(),
            timers_cancelled,
            generation = self.generation,
            "RosterActor stopped"
        );
    }

    /// Handle a single message.
    fn handle_message(&mut self, message: RosterMessage) {
        match message {
            RosterMessage::Ready {
                member,
                delay,
                respond_to,
            } => {
                let result = self.handle_ready(member, delay.as_deref());
                let outcome = match &result {
                    Ok(ReadyOutcome::Added) => "added",
                    Ok(ReadyOutcome::Scheduled { .. }) => "scheduled",
                    Err(e) => e.error_code(),
                };
                metrics::record_command("ready", outcome);
                let _ = respond_to.send(result);
            }

            RosterMessage::Unready { member, respond_to } => {
                let result = self.handle_unready(member);
                let outcome = match &result {
                    Ok(()) => "removed",
                    Err(e) => e.error_code(),
                };
                metrics::record_command("unready", outcome);
                let _ = respond_to.send(result);
            }

            RosterMessage::PresenceChanged { member, online } => {
                self.handle_presence(member, online);
            }

            RosterMessage::VoiceChanged { member, in_voice } => {
                self.handle_voice(member, in_voice);
            }

            RosterMessage::ProcessStarted { respond_to } => {
                self.handle_process_started();
                let _ = respond_to.send(());
            }

            RosterMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.state());
            }

            RosterMessage::TimerElapsed {
                member,
                class,
                timer,
            } => {
                self.handle_timer(member, class, timer);
            }

            RosterMessage::ArrivalDue {
                member,
                timer,
                online,
            } => {
                self.handle_arrival(member, timer, online);
            }
        }
    }

    /// Validate delay text. `None` means join now.
    fn validate_delay(&self, text: Option<&str>) -> Result<Option<Duration>, DelayError> {
        let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        let seconds = parse_seconds(text);
        if seconds == 0 {
            return Err(DelayError::Unparseable(text.to_string()));
        }

        let requested = Duration::from_secs(seconds);
        if requested > self.settings.max_delay {
            return Err(DelayError::TooLong {
                requested,
                max: self.settings.max_delay,
            });
        }

        Ok(Some(requested))
    }

    #[instrument(skip_all, fields(member_id = %member))]
    fn handle_ready(
        &mut self,
        member: MemberId,
        delay: Option<&str>,
    ) -> Result<ReadyOutcome, R2pError> {
        let delay = self.validate_delay(delay).map_err(|e| {
            debug!(target: "r2p.roster.actor", member_id = %member, error = %e, "Rejected ready delay");
            e
        })?;

        self.timers.cancel_all(member);

        match delay {
            None => {
                let already_active = self.is_active(member);
                self.activate(member);
                info!(
                    target: "r2p.roster.actor",
                    member_id = %member,
                    already_active,
                    "Member ready"
                );
                self.regenerate("ready");
                Ok(ReadyOutcome::Added)
            }
            Some(delay) => {
                if self.is_active(member) {
                    self.deactivate(member);
                }

                let now = Utc::now();
                let target_time = chrono::Duration::from_std(delay)
                    .map(|d| now + d)
                    .unwrap_or(now);
                self.members.insert(
                    member,
                    MemberState::PendingDelayed {
                        target_time,
                        seen_online: false,
                    },
                );
                self.schedule_arrival(member, delay);

                info!(
                    target: "r2p.roster.actor",
                    member_id = %member,
                    delay_secs = delay.as_secs(),
                    "Member scheduled"
                );
                self.regenerate("ready_delayed");
                Ok(ReadyOutcome::Scheduled { delay, target_time })
            }
        }
    }

    #[instrument(skip_all, fields(member_id = %member))]
    fn handle_unready(&mut self, member: MemberId) -> Result<(), R2pError> {
        let Some(state) = self.members.get(&member).copied() else {
            return Err(R2pError::NotInRoster);
        };

        if state == MemberState::Active {
            self.deactivate(member);
        } else {
            self.timers.cancel_all(member);
            self.members.remove(&member);
        }

        info!(
            target: "r2p.roster.actor",
            member_id = %member,
            previous = ?state.status(),
            "Member unready"
        );
        self.regenerate("unready");
        Ok(())
    }

    fn handle_presence(&mut self, member: MemberId, online: bool) {
        match (self.members.get(&member).copied(), online) {
            (Some(MemberState::GracePeriod { .. }), true) => {
                self.timers.cancel_all(member);
                self.activate(member);
                info!(target: "r2p.roster.actor", member_id = %member, "Member arrived during grace");
                self.regenerate("arrival");
            }
            (Some(MemberState::Active), false) => {
                if !self.timers.is_active(member, TimerClass::OfflineGrace) {
                    self.schedule_timer(member, TimerClass::OfflineGrace, self.settings.offline_grace);
                    debug!(target: "r2p.roster.actor", member_id = %member, "Active member went offline");
                }
            }
            (Some(MemberState::Active), true) => {
                if self.timers.cancel(member, TimerClass::OfflineGrace) {
                    debug!(target: "r2p.roster.actor", member_id = %member, "Active member back online");
                }
            }
            (Some(MemberState::PendingDelayed { target_time, .. }), _) => {
                self.members.insert(
                    member,
                    MemberState::PendingDelayed {
                        target_time,
                        seen_online: online,
                    },
                );
            }
            _ => {}
        }
    }

    fn handle_voice(&mut self, member: MemberId, in_voice: bool) {
        if !self.is_active(member) {
            return;
        }

        if in_voice {
            if self.timers.cancel(member, TimerClass::VoiceGrace) {
                debug!(target: "r2p.roster.actor", member_id = %member, "Active member rejoined voice");
            }
        } else if !self.timers.is_active(member, TimerClass::VoiceGrace) {
            self.schedule_timer(member, TimerClass::VoiceGrace, self.settings.voice_grace);
            debug!(target: "r2p.roster.actor", member_id = %member, "Active member left voice");
        }
    }

    fn handle_process_started(&mut self) {
        let cleared = self.timers.clear();
        for member in std::mem::take(&mut self.join_order) {
            self.queue_role(RoleChange::Revoke(member));
        }
        self.members.clear();

        info!(target: "r2p.roster.actor", timers_cleared = cleared, "Roster reset");
        self.regenerate("process_started");
    }

    fn handle_arrival(&mut self, member: MemberId, timer: TimerId, online: bool) {
        if !self.timers.complete(member, TimerClass::Pending, timer) {
            self.stale_timer(member, TimerClass::Pending);
            return;
        }
        metrics::record_timer_fired(TimerClass::Pending.as_str());

        let Some(MemberState::PendingDelayed {
            target_time,
            seen_online,
        }) = self.members.get(&member).copied()
        else {
            self.stale_timer(member, TimerClass::Pending);
            return;
        };

        // The lookup ran in the timer task; a later event may be newer
        if online || seen_online {
            self.activate(member);
            info!(target: "r2p.roster.actor", member_id = %member, "Delayed member arrived");
            self.regenerate("arrival");
        } else {
            self.members
                .insert(member, MemberState::GracePeriod { target_time });
            self.schedule_timer(member, TimerClass::Grace, self.settings.arrival_grace);
            info!(
                target: "r2p.roster.actor",
                member_id = %member,
                "Delayed member offline, waiting"
            );
        }
    }

    fn handle_timer(&mut self, member: MemberId, class: TimerClass, timer: TimerId) {
        if !self.timers.complete(member, class, timer) {
            self.stale_timer(member, class);
            return;
        }

        let state = self.members.get(&member).copied();
        let applies = match class {
            TimerClass::Grace => matches!(state, Some(MemberState::GracePeriod { .. })),
            TimerClass::OfflineGrace | TimerClass::VoiceGrace | TimerClass::AbsoluteTimeout => {
                state == Some(MemberState::Active)
            }
            TimerClass::Pending => false,
        };
        if !applies {
            self.stale_timer(member, class);
            return;
        }
        metrics::record_timer_fired(class.as_str());

        if class == TimerClass::Grace {
            self.timers.cancel_all(member);
            self.members.remove(&member);
            info!(target: "r2p.roster.actor", member_id = %member, "Delayed member never arrived");
            return;
        }

        self.deactivate(member);
        info!(
            target: "r2p.roster.actor",
            member_id = %member,
            class = class.as_str(),
            "Member removed"
        );
        self.regenerate(class.as_str());
    }

    fn stale_timer(&self, member: MemberId, class: TimerClass) {
        metrics::record_timer_stale(class.as_str());
        debug!(
            target: "r2p.roster.actor",
            member_id = %member,
            class = class.as_str(),
            "Ignoring stale timer"
        );
    }

    fn is_active(&self, member: MemberId) -> bool {
        self.members.get(&member) == Some(&MemberState::Active)
    }

    /// Make the member active with a fresh absolute timeout.
    ///
    /// The caller has already cancelled the member's other timers.
    fn activate(&mut self, member: MemberId) {
        if !self.is_active(member) {
            self.join_order.push(member);
            self.queue_role(RoleChange::Grant(member));
        }
        self.members.insert(member, MemberState::Active);
        self.schedule_timer(member, TimerClass::AbsoluteTimeout, self.settings.absolute_timeout);
    }

    /// Drop an active member to inactive.
    fn deactivate(&mut self, member: MemberId) {
        self.timers.cancel_all(member);
        self.members.remove(&member);
        self.join_order.retain(|&m| m != member);
        self.queue_role(RoleChange::Revoke(member));
    }

    fn schedule_timer(&mut self, member: MemberId, class: TimerClass, after: Duration) {
        let sender = self.timer_sender.clone();
        self.timers.schedule(member, class, after, move |timer| async move {
            if let Some(sender) = sender.upgrade() {
                let _ = sender
                    .send(RosterMessage::TimerElapsed {
                        member,
                        class,
                        timer,
                    })
                    .await;
            }
        });
    }

    fn schedule_arrival(&mut self, member: MemberId, after: Duration) {
        let sender = self.timer_sender.clone();
        let presence = Arc::clone(&self.presence);
        self.timers
            .schedule(member, TimerClass::Pending, after, move |timer| async move {
                let online = presence.is_online(member).await;
                if let Some(sender) = sender.upgrade() {
                    let _ = sender
                        .send(RosterMessage::ArrivalDue {
                            member,
                            timer,
                            online,
                        })
                        .await;
                }
            });
    }

    fn queue_role(&self, change: RoleChange) {
        if self.roles.send(change).is_err() {
            warn!(
                target: "r2p.roster.actor",
                member_id = %change.member(),
                change = change.as_str(),
                "Role worker gone, dropping role change"
            );
        }
    }

    fn pending_arrivals(&self) -> Vec<PendingArrival> {
        let mut pending: Vec<PendingArrival> = self
            .members
            .iter()
            .filter_map(|(&member_id, state)| {
                state.target_time().map(|target_time| PendingArrival {
                    member_id,
                    target_time,
                })
            })
            .collect();
        pending.sort_by_key(|p| (p.target_time, p.member_id));
        pending
    }

    /// Hand a snapshot of the roster to the announcement worker.
    fn regenerate(&mut self, reason: &str) {
        self.generation += 1;
        let snapshot = RosterSnapshot {
            active: self.join_order.clone(),
            pending: self.pending_arrivals(),
            generation: self.generation,
        };

        metrics::set_roster_size(snapshot.active.len(), snapshot.pending.len());
        debug!(
            target: "r2p.roster.actor",
            reason,
            generation = snapshot.generation,
            active = snapshot.active.len(),
            pending = snapshot.pending.len(),
            "Announcement requested"
        );

        if self.snapshots.send(snapshot).is_err() {
            warn!(target: "r2p.roster.actor", reason, "Announcement worker gone, dropping snapshot");
        }
    }

    fn state(&self) -> RosterState {
        let mut members: Vec<MemberView> = self
            .join_order
            .iter()
            .map(|&member_id| MemberView {
                member_id,
                status: MemberStatus::Active,
                target_time: None,
                timers: self.timers.classes(member_id),
            })
            .collect();

        members.extend(self.pending_arrivals().into_iter().map(|p| {
            let status = self
                .members
                .get(&p.member_id)
                .map_or(MemberStatus::PendingDelayed, MemberState::status);
            MemberView {
                member_id: p.member_id,
                status,
                target_time: Some(p.target_time),
                timers: self.timers.classes(p.member_id),
            }
        }));

        RosterState {
            members,
            generation: self.generation,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::services::PresenceCache;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    const ALICE: MemberId = MemberId(11);
    const BOB: MemberId = MemberId(22);

    struct Harness {
        handle: RosterActorHandle,
        presence: Arc<PresenceCache>,
        snapshots: mpsc::UnboundedReceiver<RosterSnapshot>,
        roles: mpsc::UnboundedReceiver<RoleChange>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_settings(RosterSettings::default())
        }

        fn with_settings(settings: RosterSettings) -> Self {
            let presence = Arc::new(PresenceCache::new());
            Self::build(settings, Arc::clone(&presence), presence)
        }

        /// Arrival lookups go to `source` instead of the cache.
        fn with_presence(source: Arc<dyn Presence>) -> Self {
            Self::build(
                RosterSettings::default(),
                Arc::new(PresenceCache::new()),
                source,
            )
        }

        fn build(
            settings: RosterSettings,
            presence: Arc<PresenceCache>,
            source: Arc<dyn Presence>,
        ) -> Self {
            let (snapshot_tx, snapshots) = mpsc::unbounded_channel();
            let (role_tx, roles) = mpsc::unbounded_channel();
            let (handle, _task) = RosterActor::spawn(
                settings,
                source,
                snapshot_tx,
                role_tx,
                CancellationToken::new(),
            );
            Self {
                handle,
                presence,
                snapshots,
                roles,
            }
        }

        fn take_snapshots(&mut self) -> Vec<RosterSnapshot> {
            let mut taken = Vec::new();
            while let Ok(snapshot) = self.snapshots.try_recv() {
                taken.push(snapshot);
            }
            taken
        }

        fn take_roles(&mut self) -> Vec<RoleChange> {
            let mut taken = Vec::new();
            while let Ok(change) = self.roles.try_recv() {
                taken.push(change);
            }
            taken
        }

        /// Advance the clock and let fired timers reach the mailbox.
        async fn advance(&self, secs: u64) -> RosterState {
            // Mailbox barrier: let queued fire-and-forget events be handled first
            self.handle.get_state().await.unwrap();
            tokio::time::advance(Duration::from_secs(secs)).await;
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }
            self.handle.get_state().await.unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_adds_member_and_grants_role() {
        let mut h = Harness::new();

        let outcome = h.handle.ready(ALICE, None).await.unwrap();
        assert_eq!(outcome, ReadyOutcome::Added);

        let state = h.handle.get_state().await.unwrap();
        assert_eq!(state.active(), vec![ALICE]);
        assert_eq!(state.timers_of(ALICE), vec![TimerClass::AbsoluteTimeout]);
        assert_eq!(h.take_roles(), vec![RoleChange::Grant(ALICE)]);

        let snapshots = h.take_snapshots();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots.first().unwrap().active, vec![ALICE]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_delay_means_immediately() {
        let h = Harness::new();
        let outcome = h.handle.ready(ALICE, Some("   ".to_string())).await.unwrap();
        assert_eq!(outcome, ReadyOutcome::Added);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_then_unready_leaves_nothing_behind() {
        let mut h = Harness::new();
        h.handle.ready(BOB, None).await.unwrap();
        h.handle.ready(ALICE, None).await.unwrap();
        h.handle.unready(ALICE).await.unwrap();

        let state = h.handle.get_state().await.unwrap();
        assert_eq!(state.active(), vec![BOB]);
        assert!(state.timers_of(ALICE).is_empty());
        assert_eq!(
            h.take_roles(),
            vec![
                RoleChange::Grant(BOB),
                RoleChange::Grant(ALICE),
                RoleChange::Revoke(ALICE)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_unready_is_not_in_roster() {
        let mut h = Harness::new();
        h.handle.ready(ALICE, None).await.unwrap();
        h.handle.unready(ALICE).await.unwrap();
        h.take_snapshots();

        let result = h.handle.unready(ALICE).await;
        assert!(matches!(result, Err(R2pError::NotInRoster)));
        assert!(h.take_snapshots().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_too_long_delay_rejected_without_change() {
        let mut h = Harness::new();
        h.handle.ready(ALICE, None).await.unwrap();
        h.take_snapshots();

        let result = h.handle.ready(ALICE, Some("10h".to_string())).await;
        assert!(matches!(
            result,
            Err(R2pError::InvalidDelay(DelayError::TooLong { .. }))
        ));

        let state = h.handle.get_state().await.unwrap();
        assert_eq!(state.active(), vec![ALICE]);
        assert_eq!(state.timers_of(ALICE), vec![TimerClass::AbsoluteTimeout]);
        assert!(h.take_snapshots().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_delay_rejected() {
        let h = Harness::new();
        let result = h.handle.ready(ALICE, Some("bientôt".to_string())).await;
        assert!(matches!(
            result,
            Err(R2pError::InvalidDelay(DelayError::Unparseable(_)))
        ));
        assert_eq!(h.handle.get_state().await.unwrap().status_of(ALICE), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_absolute_timeout_removes_member_once() {
        let mut h = Harness::new();
        h.handle.ready(ALICE, None).await.unwrap();
        h.take_snapshots();
        h.take_roles();

        let state = h.advance(6 * 3600 - 1).await;
        assert_eq!(state.active(), vec![ALICE]);

        let state = h.advance(2).await;
        assert!(state.active().is_empty());
        assert!(state.timers_of(ALICE).is_empty());
        assert_eq!(h.take_snapshots().len(), 1);
        assert_eq!(h.take_roles(), vec![RoleChange::Revoke(ALICE)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_re_ready_keeps_position_and_refreshes_timeout() {
        let h = Harness::new();
        h.handle.ready(ALICE, None).await.unwrap();
        h.handle.ready(BOB, None).await.unwrap();

        h.advance(3 * 3600).await;
        h.handle.ready(ALICE, None).await.unwrap();
        let state = h.handle.get_state().await.unwrap();
        assert_eq!(state.active(), vec![ALICE, BOB]);

        // Bob's original timeout fires, Alice's refreshed one does not
        let state = h.advance(3 * 3600 + 1).await;
        assert_eq!(state.active(), vec![ALICE]);

        h.handle.ready(BOB, None).await.unwrap();
        let state = h.handle.get_state().await.unwrap();
        assert_eq!(state.active(), vec![ALICE, BOB]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_ready_online_at_target_becomes_active() {
        let mut h = Harness::new();
        let outcome = h.handle.ready(ALICE, Some("15m".to_string())).await.unwrap();
        assert!(matches!(
            outcome,
            ReadyOutcome::Scheduled { delay, .. } if delay == Duration::from_secs(900)
        ));

        let state = h.handle.get_state().await.unwrap();
        assert_eq!(state.status_of(ALICE), Some(MemberStatus::PendingDelayed));
        assert_eq!(state.timers_of(ALICE), vec![TimerClass::Pending]);
        let snapshots = h.take_snapshots();
        assert_eq!(snapshots.first().unwrap().pending.len(), 1);

        h.presence.record(ALICE, true).await;
        let state = h.advance(901).await;
        assert_eq!(state.active(), vec![ALICE]);
        assert_eq!(state.timers_of(ALICE), vec![TimerClass::AbsoluteTimeout]);
        assert_eq!(h.take_roles(), vec![RoleChange::Grant(ALICE)]);

        let snapshot = h.take_snapshots().pop().unwrap();
        assert_eq!(snapshot.active, vec![ALICE]);
        assert!(snapshot.pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_at_target_enters_grace_without_announcement() {
        let mut h = Harness::new();
        h.handle.ready(ALICE, Some("10".to_string())).await.unwrap();
        h.take_snapshots();

        let state = h.advance(601).await;
        assert_eq!(state.status_of(ALICE), Some(MemberStatus::GracePeriod));
        assert_eq!(state.timers_of(ALICE), vec![TimerClass::Grace]);
        assert!(h.take_snapshots().is_empty());

        // Comes online during grace
        h.presence.record(ALICE, true).await;
        h.handle.presence_changed(ALICE, true).await.unwrap();
        let state = h.handle.get_state().await.unwrap();
        assert_eq!(state.active(), vec![ALICE]);
        assert_eq!(h.take_snapshots().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_expiry_is_silent() {
        let mut h = Harness::new();
        h.handle.ready(ALICE, Some("10m".to_string())).await.unwrap();
        h.advance(601).await;
        h.take_snapshots();

        let state = h.advance(15 * 60 + 1).await;
        assert_eq!(state.status_of(ALICE), None);
        assert!(state.timers_of(ALICE).is_empty());
        assert!(h.take_snapshots().is_empty());
        assert!(h.take_roles().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_then_online_before_grace_stays_active() {
        let h = Harness::new();
        h.handle.ready(ALICE, None).await.unwrap();

        h.handle.presence_changed(ALICE, false).await.unwrap();
        let state = h.advance(60).await;
        assert!(state.timers_of(ALICE).contains(&TimerClass::OfflineGrace));

        h.handle.presence_changed(ALICE, true).await.unwrap();
        let state = h.advance(10 * 60).await;
        assert_eq!(state.active(), vec![ALICE]);
        assert_eq!(state.timers_of(ALICE), vec![TimerClass::AbsoluteTimeout]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_grace_elapses() {
        let mut h = Harness::new();
        h.handle.ready(ALICE, None).await.unwrap();
        h.handle.presence_changed(ALICE, false).await.unwrap();
        h.take_snapshots();

        // A repeated offline event does not restart the window
        h.advance(4 * 60).await;
        h.handle.presence_changed(ALICE, false).await.unwrap();

        let state = h.advance(61).await;
        assert!(state.active().is_empty());
        assert!(state.timers_of(ALICE).is_empty());
        assert_eq!(h.take_snapshots().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_grace() {
        let h = Harness::new();
        h.handle.ready(ALICE, None).await.unwrap();
        h.handle.ready(BOB, None).await.unwrap();

        h.handle.voice_changed(ALICE, false).await.unwrap();
        h.handle.voice_changed(BOB, false).await.unwrap();
        h.advance(10 * 60).await;
        h.handle.voice_changed(BOB, true).await.unwrap();

        let state = h.advance(20 * 60 + 1).await;
        assert_eq!(state.active(), vec![BOB]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_and_voice_grace_coexist() {
        let h = Harness::new();
        h.handle.ready(ALICE, None).await.unwrap();
        h.handle.presence_changed(ALICE, false).await.unwrap();
        h.handle.voice_changed(ALICE, false).await.unwrap();

        let state = h.handle.get_state().await.unwrap();
        assert_eq!(
            state.timers_of(ALICE),
            vec![
                TimerClass::OfflineGrace,
                TimerClass::VoiceGrace,
                TimerClass::AbsoluteTimeout
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_for_inactive_members_are_ignored() {
        let mut h = Harness::new();
        h.handle.presence_changed(ALICE, false).await.unwrap();
        h.handle.voice_changed(ALICE, false).await.unwrap();

        let state = h.handle.get_state().await.unwrap();
        assert!(state.members.is_empty());
        assert!(h.take_snapshots().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_ready_while_active_drops_to_pending() {
        let mut h = Harness::new();
        h.handle.ready(ALICE, None).await.unwrap();
        h.handle.ready(ALICE, Some("30m".to_string())).await.unwrap();

        let state = h.handle.get_state().await.unwrap();
        assert!(state.active().is_empty());
        assert_eq!(state.status_of(ALICE), Some(MemberStatus::PendingDelayed));
        assert_eq!(state.timers_of(ALICE), vec![TimerClass::Pending]);
        assert_eq!(
            h.take_roles(),
            vec![RoleChange::Grant(ALICE), RoleChange::Revoke(ALICE)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unready_cancels_pending_arrival() {
        let h = Harness::new();
        h.presence.record(ALICE, true).await;
        h.handle.ready(ALICE, Some("5m".to_string())).await.unwrap();
        h.handle.unready(ALICE).await.unwrap();

        let state = h.advance(301).await;
        assert!(state.members.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_started_clears_everything() {
        let mut h = Harness::new();
        h.handle.ready(ALICE, None).await.unwrap();
        h.handle.ready(BOB, Some("1h".to_string())).await.unwrap();
        h.take_snapshots();
        h.take_roles();

        h.handle.process_started().await.unwrap();
        let state = h.handle.get_state().await.unwrap();
        assert!(state.members.is_empty());
        assert_eq!(h.take_roles(), vec![RoleChange::Revoke(ALICE)]);

        let snapshots = h.take_snapshots();
        assert_eq!(snapshots.len(), 1);
        let snapshot = snapshots.first().unwrap();
        assert!(snapshot.active.is_empty());
        assert!(snapshot.pending.is_empty());

        // Cleared timers never fire
        let state = h.advance(2 * 3600).await;
        assert!(state.members.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_listed_by_target_time() {
        let h = Harness::new();
        h.handle.ready(ALICE, Some("2h".to_string())).await.unwrap();
        h.handle.ready(BOB, Some("30m".to_string())).await.unwrap();

        let state = h.handle.get_state().await.unwrap();
        let ids: Vec<MemberId> = state.members.iter().map(|m| m.member_id).collect();
        assert_eq!(ids, vec![BOB, ALICE]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_increments_per_announcement() {
        let mut h = Harness::new();
        h.handle.ready(ALICE, None).await.unwrap();
        h.handle.ready(BOB, None).await.unwrap();

        let generations: Vec<u64> = h.take_snapshots().iter().map(|s| s.generation).collect();
        assert_eq!(generations, vec![1, 2]);
        assert_eq!(h.handle.get_state().await.unwrap().generation, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_actor() {
        let h = Harness::new();
        h.handle.ready(ALICE, None).await.unwrap();

        h.handle.cancel();
        assert!(h.handle.is_cancelled());
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        assert!(h.handle.get_state().await.is_err());
    }

    /// Answers offline, but only once released.
    #[derive(Default)]
    struct HeldLookup {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Presence for HeldLookup {
        async fn is_online(&self, _member: MemberId) -> bool {
            self.entered.notify_one();
            self.release.notified().await;
            false
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_online_event_during_arrival_lookup_activates() {
        let lookup = Arc::new(HeldLookup::default());
        let mut h = Harness::with_presence(Arc::clone(&lookup) as Arc<dyn Presence>);
        h.handle.ready(ALICE, Some("1m".to_string())).await.unwrap();
        h.take_snapshots();

        tokio::time::advance(Duration::from_secs(60)).await;
        lookup.entered.notified().await;

        // Arrives while the lookup is still answering "offline"
        h.handle.presence_changed(ALICE, true).await.unwrap();
        let state = h.handle.get_state().await.unwrap();
        assert_eq!(state.status_of(ALICE), Some(MemberStatus::PendingDelayed));

        lookup.release.notify_one();
        let state = h.advance(0).await;
        assert_eq!(state.active(), vec![ALICE]);
        assert_eq!(h.take_roles(), vec![RoleChange::Grant(ALICE)]);
        assert_eq!(h.take_snapshots().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_presence_event_wins_during_arrival_lookup() {
        let lookup = Arc::new(HeldLookup::default());
        let mut h = Harness::with_presence(Arc::clone(&lookup) as Arc<dyn Presence>);
        h.handle.ready(ALICE, Some("1m".to_string())).await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        lookup.entered.notified().await;
        h.handle.presence_changed(ALICE, true).await.unwrap();
        h.handle.presence_changed(ALICE, false).await.unwrap();

        lookup.release.notify_one();
        let state = h.advance(0).await;
        assert_eq!(state.status_of(ALICE), Some(MemberStatus::GracePeriod));
        assert!(h.take_roles().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_simultaneous_removal_timers_remove_once() {
        let settings = RosterSettings {
            offline_grace: Duration::from_secs(100),
            absolute_timeout: Duration::from_secs(100),
            ..RosterSettings::default()
        };
        let mut h = Harness::with_settings(settings);
        h.handle.ready(ALICE, None).await.unwrap();
        h.handle.presence_changed(ALICE, false).await.unwrap();
        h.take_snapshots();
        h.take_roles();

        let state = h.advance(101).await;
        assert!(state.members.is_empty());
        assert_eq!(h.take_snapshots().len(), 1);
        assert_eq!(h.take_roles(), vec![RoleChange::Revoke(ALICE)]);
    }

    /// An actor driven by hand, so a fired timer can be delivered after any
    /// command.
    struct Direct {
        actor: RosterActor,
        _handle: RosterActorHandle,
        snapshots: mpsc::UnboundedReceiver<RosterSnapshot>,
        roles: mpsc::UnboundedReceiver<RoleChange>,
    }

    impl Direct {
        fn new() -> Self {
            let (snapshot_tx, snapshots) = mpsc::unbounded_channel();
            let (role_tx, roles) = mpsc::unbounded_channel();
            let (actor, handle) = RosterActor::new(
                RosterSettings::default(),
                Arc::new(PresenceCache::new()),
                snapshot_tx,
                role_tx,
                CancellationToken::new(),
            );
            Self {
                actor,
                _handle: handle,
                snapshots,
                roles,
            }
        }

        fn timer(&self, class: TimerClass) -> TimerId {
            self.actor.timers.current(ALICE, class).unwrap()
        }

        /// Number of snapshots and role changes queued since the last drain.
        fn drain(&mut self) -> (usize, usize) {
            let mut queued = (0, 0);
            while self.snapshots.try_recv().is_ok() {
                queued.0 += 1;
            }
            while self.roles.try_recv().is_ok() {
                queued.1 += 1;
            }
            queued
        }
    }

    #[tokio::test]
    async fn test_timer_delivered_after_unready_is_ignored() {
        let mut d = Direct::new();
        d.actor.handle_ready(ALICE, None).unwrap();
        let fired = d.timer(TimerClass::AbsoluteTimeout);

        d.actor.handle_unready(ALICE).unwrap();
        assert_eq!(d.drain(), (2, 2));

        d.actor.handle_timer(ALICE, TimerClass::AbsoluteTimeout, fired);
        assert_eq!(d.drain(), (0, 0));
        assert!(d.actor.state().members.is_empty());
        assert_eq!(d.actor.generation, 2);
    }

    #[tokio::test]
    async fn test_replaced_timer_delivered_late_is_ignored() {
        let mut d = Direct::new();
        d.actor.handle_ready(ALICE, None).unwrap();
        let fired = d.timer(TimerClass::AbsoluteTimeout);

        // Re-ready refreshes the timeout with a new timer
        d.actor.handle_ready(ALICE, None).unwrap();
        assert_ne!(d.timer(TimerClass::AbsoluteTimeout), fired);
        d.drain();

        d.actor.handle_timer(ALICE, TimerClass::AbsoluteTimeout, fired);
        assert_eq!(d.drain(), (0, 0));
        assert_eq!(d.actor.state().active(), vec![ALICE]);
    }

    #[tokio::test]
    async fn test_second_removal_timer_in_same_instant_is_stale() {
        let mut d = Direct::new();
        d.actor.handle_ready(ALICE, None).unwrap();
        d.actor.handle_presence(ALICE, false);
        let absolute = d.timer(TimerClass::AbsoluteTimeout);
        let offline = d.timer(TimerClass::OfflineGrace);
        d.drain();

        d.actor.handle_timer(ALICE, TimerClass::AbsoluteTimeout, absolute);
        d.actor.handle_timer(ALICE, TimerClass::OfflineGrace, offline);

        assert_eq!(d.drain(), (1, 1));
        assert!(d.actor.state().members.is_empty());
    }

    #[tokio::test]
    async fn test_arrival_delivered_after_unready_is_ignored() {
        let mut d = Direct::new();
        d.actor.handle_ready(ALICE, Some("5m")).unwrap();
        let fired = d.timer(TimerClass::Pending);

        d.actor.handle_unready(ALICE).unwrap();
        d.drain();

        d.actor.handle_arrival(ALICE, fired, true);
        assert_eq!(d.drain(), (0, 0));
        assert!(d.actor.state().members.is_empty());
    }
}
