//! In-memory mock of the member library catalogue.

use async_trait::async_trait;
use r2p_service::catalogue::Catalogue;
use r2p_service::errors::R2pError;
use r2p_service::types::MemberId;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Mock catalogue for testing.
#[derive(Debug, Clone, Default)]
pub struct MockCatalogue {
    inner: Arc<Mutex<MockCatalogueInner>>,
}

#[derive(Debug, Default)]
struct MockCatalogueInner {
    libraries: HashMap<MemberId, BTreeSet<String>>,
    display_names: HashMap<String, String>,
    failing: HashSet<MemberId>,
    lookups: usize,
}

impl MockCatalogue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `member` a library of normalized ids.
    #[must_use]
    pub fn with_library(self, member: u64, items: &[&str]) -> Self {
        self.set_library(member, items);
        self
    }

    #[must_use]
    pub fn with_display_name(self, normalized_id: &str, name: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .display_names
            .insert(normalized_id.to_string(), name.to_string());
        self
    }

    /// Lookups for `member` fail with a catalogue error.
    #[must_use]
    pub fn with_failure(self, member: u64) -> Self {
        self.inner.lock().unwrap().failing.insert(MemberId(member));
        self
    }

    pub fn set_library(&self, member: u64, items: &[&str]) {
        self.inner.lock().unwrap().libraries.insert(
            MemberId(member),
            items.iter().map(|item| (*item).to_string()).collect(),
        );
    }

    /// Number of `items` calls so far.
    pub fn lookups(&self) -> usize {
        self.inner.lock().unwrap().lookups
    }
}

#[async_trait]
impl Catalogue for MockCatalogue {
    async fn items(&self, member: MemberId) -> Result<Option<BTreeSet<String>>, R2pError> {
        let mut inner = self.inner.lock().unwrap();
        inner.lookups += 1;
        if inner.failing.contains(&member) {
            return Err(R2pError::Catalogue("mock catalogue failure".to_string()));
        }
        Ok(inner.libraries.get(&member).cloned())
    }

    async fn display_name(&self, normalized_id: &str) -> String {
        self.inner
            .lock()
            .unwrap()
            .display_names
            .get(normalized_id)
            .cloned()
            .unwrap_or_else(|| normalized_id.to_string())
    }
}
