//! R2P Service Library
//!
//! Readiness roster for a gaming community on Discord:
//!
//! - Members declare themselves ready now or after a delay (`1h30`, `15m`)
//! - Presence and voice signals drop members who went away, after a grace
//! - An absolute timeout caps time spent in the roster
//! - Active members hold a "ready" role
//! - One announcement in the ready channel lists active members, pending
//!   arrivals and the games every member with a library owns
//!
//! # Architecture
//!
//! ```text
//! HTTP ingestion API (axum)
//! ├── RosterActor (single owner of roster + timers)
//! │   ├── TimerRegistry (one tokio task per timer)
//! │   ├── role worker ──────────▶ Transport (Discord REST)
//! │   └── announcement worker ──▶ CommonInterestResolver ─▶ Catalogue
//! │                              └▶ Transport + AnnouncementStore
//! └── JsonCatalogue (library commands)
//! ```
//!
//! # Modules
//!
//! - [`roster`] - Roster actor, timers and role worker
//! - [`announcement`] - Summary building and publishing
//! - [`interest`] - Common-interest computation
//! - [`catalogue`] - Member game libraries
//! - [`duration`] - Human delay parsing
//! - [`services`] - Discord transport and presence
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with HTTP mapping

pub mod announcement;
pub mod catalogue;
pub mod config;
pub mod duration;
pub mod errors;
pub mod handlers;
pub mod interest;
pub mod models;
pub mod observability;
pub mod roster;
pub mod routes;
pub mod services;
pub mod types;
