//! Readiness roster.
//!
//! - [`actor`] - `RosterActor`, the only owner of member state and timers
//! - [`timers`] - class-keyed cancellable timers
//! - [`roles`] - ordered ready-role worker
//! - [`messages`] - mailbox messages and views

pub mod actor;
pub mod messages;
pub mod roles;
pub mod timers;

pub use actor::{RosterActor, RosterActorHandle, RosterSettings};
pub use messages::{
    MemberStatus, MemberView, PendingArrival, ReadyOutcome, RoleChange, RosterSnapshot,
    RosterState, UNREADY_ACKNOWLEDGEMENT,
};
pub use roles::run_role_worker;
pub use timers::{TimerClass, TimerId, TimerRegistry};
