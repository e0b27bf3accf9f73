//! Message and view types for the roster actor.

use super::timers::{TimerClass, TimerId};
use crate::duration::humanize;
use crate::errors::R2pError;
use crate::types::MemberId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::oneshot;

/// Acknowledgement sent after a successful `unready`.
pub const UNREADY_ACKNOWLEDGEMENT: &str = "👋 Tu as bien été retiré de la liste des joueurs prêts.";

/// Messages handled by the `RosterActor`.
#[derive(Debug)]
pub enum RosterMessage {
    /// `ready` command, optionally delayed.
    Ready {
        member: MemberId,
        delay: Option<String>,
        respond_to: oneshot::Sender<Result<ReadyOutcome, R2pError>>,
    },

    /// `unready` command.
    Unready {
        member: MemberId,
        respond_to: oneshot::Sender<Result<(), R2pError>>,
    },

    /// Platform presence event.
    PresenceChanged { member: MemberId, online: bool },

    /// Platform voice-state event.
    VoiceChanged { member: MemberId, in_voice: bool },

    /// Reset sent once at process start.
    ProcessStarted { respond_to: oneshot::Sender<()> },

    /// Debug snapshot of the roster.
    GetState {
        respond_to: oneshot::Sender<RosterState>,
    },

    /// A timer other than `Pending` elapsed.
    TimerElapsed {
        member: MemberId,
        class: TimerClass,
        timer: TimerId,
    },

    /// A `Pending` timer elapsed; `online` was looked up by the timer task.
    ArrivalDue {
        member: MemberId,
        timer: TimerId,
        online: bool,
    },
}

/// Successful result of a `ready` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// Member is in the roster now.
    Added,
    /// Member will join once the delay elapses and they are online.
    Scheduled {
        delay: Duration,
        target_time: DateTime<Utc>,
    },
}

impl ReadyOutcome {
    /// French acknowledgement for the invoking member.
    #[must_use]
    pub fn acknowledgement(&self) -> String {
        match self {
            ReadyOutcome::Added => {
                "✅ Tu as bien été ajouté à la liste des joueurs prêts.".to_string()
            }
            ReadyOutcome::Scheduled { delay, target_time } => format!(
                "⏳ C'est noté ! Tu seras ajouté à la liste des joueurs prêts dans {} (vers <t:{}:t>).",
                humanize(delay.as_secs()),
                target_time.timestamp()
            ),
        }
    }
}

/// Lifecycle state of a member present in the roster tables.
///
/// Members absent from the tables are inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    PendingDelayed,
    GracePeriod,
    Active,
}

/// One member in a [`RosterState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberView {
    pub member_id: MemberId,
    pub status: MemberStatus,
    /// Target time of a pending arrival.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_time: Option<DateTime<Utc>>,
    /// Live timer classes.
    pub timers: Vec<TimerClass>,
}

/// Debug view of the whole roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterState {
    /// Active members in join order, then pending arrivals by target time.
    pub members: Vec<MemberView>,
    /// Number of announcements requested so far.
    pub generation: u64,
}

impl RosterState {
    /// Active member ids in join order.
    #[must_use]
    pub fn active(&self) -> Vec<MemberId> {
        self.members
            .iter()
            .filter(|m| m.status == MemberStatus::Active)
            .map(|m| m.member_id)
            .collect()
    }

    /// Status of `member`, `None` when inactive.
    #[must_use]
    pub fn status_of(&self, member: MemberId) -> Option<MemberStatus> {
        self.members
            .iter()
            .find(|m| m.member_id == member)
            .map(|m| m.status)
    }

    /// Live timers of `member`.
    #[must_use]
    pub fn timers_of(&self, member: MemberId) -> Vec<TimerClass> {
        self.members
            .iter()
            .find(|m| m.member_id == member)
            .map(|m| m.timers.clone())
            .unwrap_or_default()
    }
}

/// A member expected to join later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingArrival {
    pub member_id: MemberId,
    pub target_time: DateTime<Utc>,
}

/// Owned copy of the roster handed to the announcement worker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RosterSnapshot {
    /// Active members in join order.
    pub active: Vec<MemberId>,
    /// Pending arrivals, unordered.
    pub pending: Vec<PendingArrival>,
    /// Monotonic counter, one per regeneration.
    pub generation: u64,
}

/// Ready-role mutation queued for the role worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleChange {
    Grant(MemberId),
    Revoke(MemberId),
}

impl RoleChange {
    #[must_use]
    pub const fn member(&self) -> MemberId {
        match self {
            RoleChange::Grant(member) | RoleChange::Revoke(member) => *member,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RoleChange::Grant(_) => "grant",
            RoleChange::Revoke(_) => "revoke",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_scheduled_acknowledgement_restates_delay() {
        let target_time = Utc.timestamp_opt(1_700_000_000, 0).single();
        let outcome = ReadyOutcome::Scheduled {
            delay: Duration::from_secs(5400),
            target_time: target_time.unwrap_or_default(),
        };

        let text = outcome.acknowledgement();
        assert!(text.contains("1 h 30 min"));
        assert!(text.contains("<t:1700000000:t>"));
    }

    #[test]
    fn test_state_helpers() {
        let state = RosterState {
            members: vec![
                MemberView {
                    member_id: MemberId(1),
                    status: MemberStatus::Active,
                    target_time: None,
                    timers: vec![TimerClass::AbsoluteTimeout],
                },
                MemberView {
                    member_id: MemberId(2),
                    status: MemberStatus::GracePeriod,
                    target_time: None,
                    timers: vec![TimerClass::Grace],
                },
            ],
            generation: 3,
        };

        assert_eq!(state.active(), vec![MemberId(1)]);
        assert_eq!(state.status_of(MemberId(2)), Some(MemberStatus::GracePeriod));
        assert_eq!(state.status_of(MemberId(3)), None);
        assert_eq!(state.timers_of(MemberId(1)), vec![TimerClass::AbsoluteTimeout]);
        assert!(state.timers_of(MemberId(3)).is_empty());
    }

    #[test]
    fn test_role_change_accessors() {
        assert_eq!(RoleChange::Grant(MemberId(4)).member(), MemberId(4));
        assert_eq!(RoleChange::Revoke(MemberId(4)).as_str(), "revoke");
    }
}
