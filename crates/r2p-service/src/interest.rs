//! Common-interest computation over active roster members.
//!
//! Members with a non-empty library qualify; the others are reported as
//! excluded so the announcement can nudge them to register their games. A
//! single qualifying member does not define a common interest.

use crate::catalogue::Catalogue;
use crate::types::MemberId;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// Result of a common-interest resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonInterest {
    /// Display names present in every qualifying library, sorted
    /// case-insensitively.
    pub common: Vec<String>,
    /// Members without library data, in roster order.
    pub excluded: Vec<MemberId>,
}

/// Computes what active members have in common.
#[derive(Clone)]
pub struct CommonInterestResolver {
    catalogue: Arc<dyn Catalogue>,
}

impl CommonInterestResolver {
    #[must_use]
    pub fn new(catalogue: Arc<dyn Catalogue>) -> Self {
        Self { catalogue }
    }

    /// Resolve the common items of `members`.
    ///
    /// A catalogue failure for one member is logged and that member is treated
    /// as having no data.
    pub async fn resolve(&self, members: &[MemberId]) -> CommonInterest {
        let mut qualifying: Vec<BTreeSet<String>> = Vec::with_capacity(members.len());
        let mut excluded = Vec::new();

        for &member in members {
            let items = match self.catalogue.items(member).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(target: "r2p.interest", member_id = %member, error = %e, "Catalogue lookup failed");
                    crate::observability::metrics::record_collaborator_failure("catalogue_items");
                    None
                }
            };

            match items {
                Some(set) if !set.is_empty() => qualifying.push(set),
                _ => excluded.push(member),
            }
        }

        if qualifying.len() < 2 {
            return CommonInterest {
                common: Vec::new(),
                excluded,
            };
        }

        let mut sets = qualifying.into_iter();
        let first = sets.next().unwrap_or_default();
        let shared = sets.fold(first, |acc, set| acc.intersection(&set).cloned().collect());

        let mut common = Vec::with_capacity(shared.len());
        for id in &shared {
            common.push(self.catalogue.display_name(id).await);
        }
        common.sort_by_key(|name| name.to_lowercase());

        CommonInterest { common, excluded }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::errors::R2pError;
    use async_trait::async_trait;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FixedCatalogue {
        libraries: HashMap<MemberId, BTreeSet<String>>,
        names: HashMap<String, String>,
        failing: Vec<MemberId>,
    }

    impl FixedCatalogue {
        fn with(mut self, member: u64, items: &[&str]) -> Self {
            self.libraries.insert(
                MemberId(member),
                items.iter().map(|s| (*s).to_string()).collect(),
            );
            self
        }

        fn named(mut self, id: &str, name: &str) -> Self {
            self.names.insert(id.to_string(), name.to_string());
            self
        }
    }

    #[async_trait]
    impl Catalogue for FixedCatalogue {
        async fn items(&self, member: MemberId) -> Result<Option<BTreeSet<String>>, R2pError> {
            if self.failing.contains(&member) {
                return Err(R2pError::Catalogue("unavailable".to_string()));
            }
            Ok(self.libraries.get(&member).cloned())
        }

        async fn display_name(&self, normalized_id: &str) -> String {
            self.names
                .get(normalized_id)
                .cloned()
                .unwrap_or_else(|| normalized_id.to_string())
        }
    }

    fn resolver(catalogue: FixedCatalogue) -> CommonInterestResolver {
        CommonInterestResolver::new(Arc::new(catalogue))
    }

    #[tokio::test]
    async fn test_intersection_of_two_members() {
        let resolver = resolver(
            FixedCatalogue::default()
                .with(1, &["x", "y"])
                .with(2, &["y", "z"]),
        );

        let result = resolver.resolve(&[MemberId(1), MemberId(2)]).await;
        assert_eq!(result.common, vec!["y"]);
        assert!(result.excluded.is_empty());
    }

    #[tokio::test]
    async fn test_single_qualifying_member_has_no_common_set() {
        let resolver = resolver(FixedCatalogue::default().with(1, &["x", "y"]).with(2, &[]));

        let result = resolver
            .resolve(&[MemberId(1), MemberId(2), MemberId(3)])
            .await;
        assert!(result.common.is_empty());
        assert_eq!(result.excluded, vec![MemberId(2), MemberId(3)]);
    }

    #[tokio::test]
    async fn test_no_members() {
        let resolver = resolver(FixedCatalogue::default());
        assert_eq!(resolver.resolve(&[]).await, CommonInterest::default());
    }

    #[tokio::test]
    async fn test_display_names_sorted_case_insensitively() {
        let resolver = resolver(
            FixedCatalogue::default()
                .with(1, &["zelda", "amongus", "celeste"])
                .with(2, &["celeste", "zelda", "amongus"])
                .with(3, &["zelda", "celeste", "amongus", "hades"])
                .named("zelda", "Zelda")
                .named("amongus", "among us")
                .named("celeste", "Celeste"),
        );

        let result = resolver
            .resolve(&[MemberId(1), MemberId(2), MemberId(3)])
            .await;
        assert_eq!(result.common, vec!["among us", "Celeste", "Zelda"]);
    }

    #[tokio::test]
    async fn test_catalogue_failure_excludes_member() {
        let mut catalogue = FixedCatalogue::default()
            .with(1, &["x"])
            .with(2, &["x"])
            .with(3, &["x"]);
        catalogue.failing.push(MemberId(3));

        let result = resolver(catalogue)
            .resolve(&[MemberId(1), MemberId(2), MemberId(3)])
            .await;
        assert_eq!(result.common, vec!["x"]);
        assert_eq!(result.excluded, vec![MemberId(3)]);
    }

    #[tokio::test]
    async fn test_disjoint_libraries() {
        let resolver = resolver(FixedCatalogue::default().with(1, &["x"]).with(2, &["y"]));

        let result = resolver.resolve(&[MemberId(1), MemberId(2)]).await;
        assert!(result.common.is_empty());
        assert!(result.excluded.is_empty());
    }
}
