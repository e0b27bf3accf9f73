//! HTTP request handlers for the ingestion API.

pub mod library;
pub mod roster;

pub use library::{add_items, list_items, remove_items};
pub use roster::{get_roster, presence_changed, ready, unready, voice_changed};
