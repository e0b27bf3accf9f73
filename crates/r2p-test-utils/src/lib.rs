//! # R2P Test Utilities
//!
//! Shared test utilities for the R2P service.
//!
//! This crate provides recording mocks of every roster collaborator and a
//! fixture that wires the roster actor to them, so roster and announcement
//! behavior can be tested without Discord or the filesystem.
//!
//! ## Modules
//!
//! - `mock_transport` - Records posts, deletions and role changes
//! - `mock_catalogue` - In-memory libraries with per-member failures
//! - `mock_presence` - Settable presence table
//! - `mock_store` - In-memory announcement record
//! - `mock_renderer` - Counts renders, optionally fails
//! - `fixtures` - `TestService` wiring and snapshot builders
//!
//! ## Usage
//!
//! ```rust,ignore
//! use r2p_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let service = TestService::builder()
//!         .with_catalogue(MockCatalogue::new().with_library(1, &["celeste"]))
//!         .start();
//!
//!     service.roster.ready(member(1), None).await.unwrap();
//!     let posts = service.transport.wait_for_posts(1).await;
//!     assert!(posts[0].content.text.contains("<@1>"));
//! }
//! ```

pub mod fixtures;
pub mod mock_catalogue;
pub mod mock_presence;
pub mod mock_renderer;
pub mod mock_store;
pub mod mock_transport;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_catalogue::*;
pub use mock_presence::*;
pub use mock_renderer::*;
pub use mock_store::*;
pub use mock_transport::*;

/// Let spawned tasks run until the predicate holds.
///
/// Panics after a bounded number of scheduler yields.
pub async fn settle_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if predicate() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached after 1000 yields");
}

/// Let spawned tasks run for a fixed number of scheduler yields.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
