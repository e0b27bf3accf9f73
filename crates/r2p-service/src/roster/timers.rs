//! Class-keyed background timers per member.
//!
//! One tokio task per active timer. The task races its `CancellationToken`
//! against the sleep; when the sleep wins it runs the callback supplied by the
//! roster (which posts a message back to the roster mailbox). Once the
//! callback has started, cancelling the token has no effect on it.
//!
//! # Class rules
//!
//! - At most one timer per `(member, class)`: scheduling replaces.
//! - `Pending` and `Grace` exclude every other class for the member (a member
//!   is either becoming active or active, never both).
//! - `OfflineGrace`, `VoiceGrace` and `AbsoluteTimeout` may coexist.
//!
//! # Stale timers
//!
//! A timer can fire and post its message just before the roster cancels or
//! replaces it. Every timer carries a [`TimerId`]; the roster calls
//! [`TimerRegistry::complete`] first when handling a timer message, which
//! removes the entry only if the id still matches.

use crate::types::MemberId;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Timer classes driving roster transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerClass {
    /// Delayed `ready` target time.
    Pending,
    /// Window for a member who was offline when their delay elapsed.
    Grace,
    /// Window for an active member who went offline.
    OfflineGrace,
    /// Window for an active member who left voice.
    VoiceGrace,
    /// Hard cap on time spent in the roster.
    AbsoluteTimeout,
}

impl TimerClass {
    pub const ALL: [TimerClass; 5] = [
        TimerClass::Pending,
        TimerClass::Grace,
        TimerClass::OfflineGrace,
        TimerClass::VoiceGrace,
        TimerClass::AbsoluteTimeout,
    ];

    /// Returns the class as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TimerClass::Pending => "pending",
            TimerClass::Grace => "grace",
            TimerClass::OfflineGrace => "offline_grace",
            TimerClass::VoiceGrace => "voice_grace",
            TimerClass::AbsoluteTimeout => "absolute_timeout",
        }
    }

    /// Classes that run while the member is becoming active.
    #[must_use]
    pub const fn is_arrival(&self) -> bool {
        matches!(self, TimerClass::Pending | TimerClass::Grace)
    }

    /// Whether a timer of `self` and one of `other` may exist together for
    /// the same member.
    #[must_use]
    pub fn coexists_with(&self, other: TimerClass) -> bool {
        *self != other && !self.is_arrival() && !other.is_arrival()
    }
}

/// Identity of one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct TimerEntry {
    id: TimerId,
    cancel_token: CancellationToken,
    #[allow(dead_code)] // Detached on cancel; kept so the task is owned by the entry
    task: JoinHandle<()>,
}

/// Owns every roster timer.
#[derive(Default)]
pub struct TimerRegistry {
    timers: HashMap<(MemberId, TimerClass), TimerEntry>,
    next_id: u64,
}

impl TimerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `callback` to run after `after`.
    ///
    /// Replaces any timer of the same class for `member` and cancels the
    /// classes that cannot coexist with `class`. Must be called from within a
    /// tokio runtime.
    pub fn schedule<F, Fut>(
        &mut self,
        member: MemberId,
        class: TimerClass,
        after: Duration,
        callback: F,
    ) -> TimerId
    where
        F: FnOnce(TimerId) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        for other in TimerClass::ALL {
            if !class.coexists_with(other) && self.cancel(member, other) {
                debug!(
                    target: "r2p.roster.timers",
                    member_id = %member,
                    class = class.as_str(),
                    replaced = other.as_str(),
                    "Cancelled conflicting timer"
                );
            }
        }

        self.next_id += 1;
        let id = TimerId(self.next_id);
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        // Deadline is fixed now, not when the task is first polled
        let sleep = tokio::time::sleep(after);

        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    trace!(target: "r2p.roster.timers", member_id = %member, class = class.as_str(), "Timer cancelled before firing");
                }
                () = sleep => {
                    callback(id).await;
                }
            }
        });

        self.timers.insert(
            (member, class),
            TimerEntry {
                id,
                cancel_token,
                task,
            },
        );

        debug!(
            target: "r2p.roster.timers",
            member_id = %member,
            class = class.as_str(),
            after_secs = after.as_secs(),
            "Timer scheduled"
        );
        id
    }

    /// Cancel the member's timer of `class`. Returns whether one existed.
    pub fn cancel(&mut self, member: MemberId, class: TimerClass) -> bool {
        match self.timers.remove(&(member, class)) {
            Some(entry) => {
                entry.cancel_token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every timer of the member. Returns how many were cancelled.
    pub fn cancel_all(&mut self, member: MemberId) -> usize {
        TimerClass::ALL
            .into_iter()
            .filter(|&class| self.cancel(member, class))
            .count()
    }

    /// Claim a fired timer.
    ///
    /// Removes the entry and returns `true` if `id` is still the member's
    /// current timer of `class`; returns `false` for a timer that was
    /// cancelled or replaced after it fired.
    pub fn complete(&mut self, member: MemberId, class: TimerClass, id: TimerId) -> bool {
        match self.timers.get(&(member, class)) {
            Some(entry) if entry.id == id => {
                self.timers.remove(&(member, class));
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn current(&self, member: MemberId, class: TimerClass) -> Option<TimerId> {
        self.timers.get(&(member, class)).map(|entry| entry.id)
    }

    /// Whether the member has a live timer of `class`.
    #[must_use]
    pub fn is_active(&self, member: MemberId, class: TimerClass) -> bool {
        self.timers.contains_key(&(member, class))
    }

    /// Live timer classes of the member, in declaration order.
    #[must_use]
    pub fn classes(&self, member: MemberId) -> Vec<TimerClass> {
        TimerClass::ALL
            .into_iter()
            .filter(|&class| self.is_active(member, class))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Cancel every timer of every member.
    pub fn clear(&mut self) -> usize {
        let count = self.timers.len();
        for (_, entry) in self.timers.drain() {
            entry.cancel_token.cancel();
        }
        count
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}
