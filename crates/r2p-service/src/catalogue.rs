//! Member game libraries.
//!
//! Each member owns a set of normalized item ids (`"Aé. 3"` → `"ae3"`), and a
//! shared table maps every normalized id to the first spelling anyone used for
//! it. The roster only reads libraries through the [`Catalogue`] trait; the
//! library endpoints mutate them through [`JsonCatalogue`].
//!
//! # File format
//!
//! ```json
//! {
//!   "player_libraries": { "123456789": ["ae3", "portal2"] },
//!   "pretty_print_library": { "ae3": "Aé. 3", "portal2": "Portal 2" }
//! }
//! ```
//!
//! Writes go to a temporary file that is then renamed over the original, under
//! the store's write lock.

use crate::errors::{LibraryError, R2pError};
use crate::types::MemberId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument};
use unicode_normalization::UnicodeNormalization;

/// Read access to member libraries.
#[async_trait]
pub trait Catalogue: Send + Sync {
    /// Normalized item ids owned by the member, `None` if the member never
    /// registered a library.
    async fn items(&self, member: MemberId) -> Result<Option<BTreeSet<String>>, R2pError>;

    /// Display name for a normalized id, falling back to the id itself.
    async fn display_name(&self, normalized_id: &str) -> String;
}

/// Normalize an item title for comparisons.
///
/// Lowercases, strips accents and drops everything outside `[a-z0-9]`.
#[must_use]
pub fn normalize_item_name(name: &str) -> String {
    name.to_lowercase()
        .nfd()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// What happened to one title of a library command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Added,
    AlreadyPresent,
    Removed,
    NotPresent,
}

/// Per-title result of `add_items` / `remove_items`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    /// Display name of the item.
    pub title: String,
    pub status: ItemStatus,
}

impl ItemOutcome {
    /// Acknowledgement line shown to the member.
    #[must_use]
    pub fn acknowledgement(&self) -> String {
        match self.status {
            ItemStatus::Added => format!("✅ **{}** a été ajouté !", self.title),
            ItemStatus::AlreadyPresent => {
                format!("**{}** est déjà dans ta bibliothèque.", self.title)
            }
            ItemStatus::Removed => format!("❌ **{}** a été retiré.", self.title),
            ItemStatus::NotPresent => {
                format!("🤷 **{}** n'était pas dans ta bibliothèque.", self.title)
            }
        }
    }
}

/// Join per-title acknowledgements into one reply.
#[must_use]
pub fn acknowledge_all(outcomes: &[ItemOutcome]) -> String {
    outcomes
        .iter()
        .map(ItemOutcome::acknowledgement)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogueData {
    #[serde(default)]
    player_libraries: HashMap<String, BTreeSet<String>>,
    #[serde(default)]
    pretty_print_library: HashMap<String, String>,
}

/// Split comma-separated titles, keeping those that normalize to something.
fn split_titles(input: &str) -> Vec<(String, String)> {
    input
        .split(',')
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .filter_map(|title| {
            let normalized = normalize_item_name(title);
            (!normalized.is_empty()).then(|| (title.to_string(), normalized))
        })
        .collect()
}

/// File-backed catalogue.
#[derive(Debug)]
pub struct JsonCatalogue {
    path: PathBuf,
    data: RwLock<CatalogueData>,
}

impl JsonCatalogue {
    /// Load the catalogue from `path`. A missing file starts an empty one.
    ///
    /// # Errors
    ///
    /// Returns `R2pError::Catalogue` if the file exists but cannot be read or
    /// parsed.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, R2pError> {
        let path = path.into();

        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<CatalogueData>(&bytes).map_err(|e| {
                error!(target: "r2p.catalogue", path = %path.display(), error = %e, "Catalogue file is corrupt");
                R2pError::Catalogue(format!("corrupt catalogue file: {e}"))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(target: "r2p.catalogue", path = %path.display(), "No catalogue file, starting empty");
                CatalogueData::default()
            }
            Err(e) => {
                error!(target: "r2p.catalogue", path = %path.display(), error = %e, "Failed to read catalogue");
                return Err(R2pError::Catalogue(format!("read failed: {e}")));
            }
        };

        info!(
            target: "r2p.catalogue",
            libraries = data.player_libraries.len(),
            items = data.pretty_print_library.len(),
            "Catalogue loaded"
        );

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add comma-separated titles to a member's library.
    ///
    /// # Errors
    ///
    /// `LibraryError::EmptyInput` when no usable title is given;
    /// `R2pError::Catalogue` when the file cannot be written.
    #[instrument(skip_all, fields(member_id = %member))]
    pub async fn add_items(
        &self,
        member: MemberId,
        titles: &str,
    ) -> Result<Vec<ItemOutcome>, R2pError> {
        let titles = split_titles(titles);
        if titles.is_empty() {
            return Err(LibraryError::EmptyInput.into());
        }

        // Edits go to a copy that replaces the live data once it is on disk
        let mut guard = self.data.write().await;
        let mut data = guard.clone();
        let mut outcomes = Vec::with_capacity(titles.len());

        for (title, normalized) in titles {
            let display = data
                .pretty_print_library
                .entry(normalized.clone())
                .or_insert(title)
                .clone();

            let library = data
                .player_libraries
                .entry(member.to_string())
                .or_default();
            let status = if library.insert(normalized) {
                ItemStatus::Added
            } else {
                ItemStatus::AlreadyPresent
            };
            outcomes.push(ItemOutcome {
                title: display,
                status,
            });
        }

        self.persist(&data).await?;
        *guard = data;
        Ok(outcomes)
    }

    /// Remove comma-separated titles from a member's library.
    ///
    /// # Errors
    ///
    /// `LibraryError::LibraryEmpty` when the member has nothing to remove,
    /// `LibraryError::EmptyInput` when no usable title is given,
    /// `R2pError::Catalogue` when the file cannot be written.
    #[instrument(skip_all, fields(member_id = %member))]
    pub async fn remove_items(
        &self,
        member: MemberId,
        titles: &str,
    ) -> Result<Vec<ItemOutcome>, R2pError> {
        let mut guard = self.data.write().await;
        let key = member.to_string();

        if guard
            .player_libraries
            .get(&key)
            .map_or(true, BTreeSet::is_empty)
        {
            return Err(LibraryError::LibraryEmpty.into());
        }

        let titles = split_titles(titles);
        if titles.is_empty() {
            return Err(LibraryError::EmptyInput.into());
        }

        let mut data = guard.clone();
        let mut outcomes = Vec::with_capacity(titles.len());
        for (title, normalized) in titles {
            let display = data
                .pretty_print_library
                .get(&normalized)
                .cloned()
                .unwrap_or(title);
            let removed = data
                .player_libraries
                .get_mut(&key)
                .is_some_and(|library| library.remove(&normalized));
            outcomes.push(ItemOutcome {
                title: display,
                status: if removed {
                    ItemStatus::Removed
                } else {
                    ItemStatus::NotPresent
                },
            });
        }

        self.persist(&data).await?;
        *guard = data;
        Ok(outcomes)
    }

    /// Display names of a member's items, sorted case-insensitively.
    pub async fn list_items(&self, member: MemberId) -> Vec<String> {
        let data = self.data.read().await;
        let mut names: Vec<String> = data
            .player_libraries
            .get(&member.to_string())
            .into_iter()
            .flatten()
            .map(|id| {
                data.pretty_print_library
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| id.clone())
            })
            .collect();
        names.sort_by_key(|name| name.to_lowercase());
        names
    }

    async fn persist(&self, data: &CatalogueData) -> Result<(), R2pError> {
        let bytes = serde_json::to_vec_pretty(data)
            .map_err(|e| R2pError::Catalogue(format!("serialize failed: {e}")))?;
        write_atomically(&self.path, &bytes)
            .await
            .map_err(|e| {
                error!(target: "r2p.catalogue", path = %self.path.display(), error = %e, "Failed to save catalogue");
                R2pError::Catalogue(format!("write failed: {e}"))
            })?;
        debug!(target: "r2p.catalogue", "Catalogue saved");
        Ok(())
    }
}

#[async_trait]
impl Catalogue for JsonCatalogue {
    async fn items(&self, member: MemberId) -> Result<Option<BTreeSet<String>>, R2pError> {
        Ok(self
            .data
            .read()
            .await
            .player_libraries
            .get(&member.to_string())
            .cloned())
    }

    async fn display_name(&self, normalized_id: &str) -> String {
        self.data
            .read()
            .await
            .pretty_print_library
            .get(normalized_id)
            .cloned()
            .unwrap_or_else(|| normalized_id.to_string())
    }
}

/// Write `bytes` to a sibling temp file and rename it over `path`.
pub(crate) async fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}
