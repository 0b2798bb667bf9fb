//! Menu item storage.
//!
//! [`MenuStore`] is the only thing the pipeline knows about persistence. A
//! batch insert answers per item, so one rejected item never hides the fate
//! of the others. Two implementations ship with the crate:
//!
//! * [`InMemoryMenuStore`] for tests and dry runs, with an optional
//!   per-item rejection hook.
//! * [`SqliteMenuStore`] backed by `rusqlite`, used by the CLI.

mod memory;
mod sqlite;

pub use memory::InMemoryMenuStore;
pub use sqlite::SqliteMenuStore;

use crate::model::CanonicalMenuItem;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Store errors, per item or for a whole batch.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store refused this particular item (constraint, duplicate, ...).
    #[error("{0}")]
    Rejected(String),

    /// The underlying database reported an error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The store could not be reached or its lock was poisoned.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// No item with this id belongs to the caller.
    #[error("menu item {0} not found")]
    NotFound(String),
}

/// A menu item as persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedMenuItem {
    pub id: String,
    #[serde(flatten)]
    pub item: CanonicalMenuItem,
    pub created_at: DateTime<Utc>,
}

impl SavedMenuItem {
    /// Assign a fresh id and timestamp to a validated item.
    pub fn assign(item: CanonicalMenuItem) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            item,
            created_at: Utc::now(),
        }
    }
}

/// One item the store refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistFailure {
    /// 0-based position in the submitted batch.
    pub index: usize,
    pub item_name: String,
    pub reason: String,
}

impl PersistFailure {
    /// Human-readable line, numbering items from 1.
    pub fn describe(&self) -> String {
        format!(
            "Database error on item {} ({}): {}",
            self.index + 1,
            self.item_name,
            self.reason
        )
    }
}

/// Result of submitting one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistOutcome {
    pub saved: Vec<SavedMenuItem>,
    pub failures: Vec<PersistFailure>,
}

impl PersistOutcome {
    pub fn saved_count(&self) -> usize {
        self.saved.len()
    }
}

/// Optional listing filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    pub category: Option<String>,
    pub is_available: Option<bool>,
}

impl ItemFilter {
    pub fn matches(&self, item: &CanonicalMenuItem) -> bool {
        self.category
            .as_deref()
            .is_none_or(|c| item.category() == c)
            && self.is_available.is_none_or(|a| item.is_available() == a)
    }
}

/// Listing order: category, then name.
pub(crate) fn sort_listing(items: &mut [SavedMenuItem]) {
    items.sort_by(|a, b| {
        a.item
            .category()
            .cmp(b.item.category())
            .then_with(|| a.item.name().cmp(b.item.name()))
    });
}

/// Persistence backend for menu items.
#[async_trait]
pub trait MenuStore: Send + Sync {
    /// Insert every item independently.
    ///
    /// The inner vector has exactly one entry per input item, in input
    /// order. An outer `Err` means the batch as a whole could not be
    /// attempted.
    async fn insert_many(
        &self,
        items: &[CanonicalMenuItem],
    ) -> Result<Vec<Result<SavedMenuItem, StoreError>>, StoreError>;

    /// Items belonging to `owner_id` that pass `filter`, sorted by category
    /// then name.
    async fn list(
        &self,
        owner_id: &str,
        filter: &ItemFilter,
    ) -> Result<Vec<SavedMenuItem>, StoreError>;

    /// The item `id`, if it exists and belongs to `owner_id`.
    async fn find(&self, owner_id: &str, id: &str) -> Result<Option<SavedMenuItem>, StoreError>;

    /// Replace the fields of item `id`, keeping its id and creation time.
    ///
    /// Returns [`StoreError::NotFound`] when the id is unknown or owned by
    /// someone else.
    async fn update(
        &self,
        owner_id: &str,
        id: &str,
        item: &CanonicalMenuItem,
    ) -> Result<SavedMenuItem, StoreError>;

    /// Remove item `id`. Same ownership rule as [`MenuStore::update`].
    async fn delete(&self, owner_id: &str, id: &str) -> Result<(), StoreError>;
}
