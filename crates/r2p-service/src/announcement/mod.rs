//! The roster announcement: content, publishing and the persisted message id.

pub mod publisher;
pub mod store;
pub mod summary;

pub use publisher::AnnouncementPublisher;
pub use store::{AnnouncementStore, FileAnnouncementStore};
pub use summary::{Summary, SummaryKind};
