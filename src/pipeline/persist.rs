//! Batch persistence with per-item failure reconciliation.

use crate::error::IngestError;
use crate::model::CanonicalMenuItem;
use crate::store::{MenuStore, PersistFailure, PersistOutcome};
use std::sync::Arc;
use tracing::{debug, warn};

/// Submits validated items to a [`MenuStore`] as one unordered batch.
#[derive(Clone)]
pub struct PersistenceCoordinator {
    store: Arc<dyn MenuStore>,
}

impl PersistenceCoordinator {
    pub fn new(store: Arc<dyn MenuStore>) -> Self {
        Self { store }
    }

    /// Persist `items`.
    ///
    /// Items the store refuses become [`PersistFailure`]s; everything else
    /// is kept. Only a batch-level store error fails the call. An empty
    /// batch never reaches the store.
    pub async fn persist(&self, items: &[CanonicalMenuItem]) -> Result<PersistOutcome, IngestError> {
        if items.is_empty() {
            debug!("Nothing to persist");
            return Ok(PersistOutcome::default());
        }

        let results = self
            .store
            .insert_many(items)
            .await
            .map_err(|e| IngestError::PersistenceFailure {
                message: e.to_string(),
            })?;

        if results.len() != items.len() {
            return Err(IngestError::Internal(format!(
                "store answered {} results for {} items",
                results.len(),
                items.len()
            )));
        }

        let mut outcome = PersistOutcome::default();
        for (index, (item, result)) in items.iter().zip(results).enumerate() {
            match result {
                Ok(saved) => outcome.saved.push(saved),
                Err(e) => {
                    let failure = PersistFailure {
                        index,
                        item_name: item.name().to_string(),
                        reason: e.to_string(),
                    };
                    warn!("{}", failure.describe());
                    outcome.failures.push(failure);
                }
            }
        }

        debug!(
            "Persisted {} of {} items ({} failures)",
            outcome.saved_count(),
            items.len(),
            outcome.failures.len()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryMenuStore;

    fn items(n: usize) -> Vec<CanonicalMenuItem> {
        (1..=n)
            .map(|i| {
                CanonicalMenuItem::from_parts(
                    "v1".into(),
                    "Mains".into(),
                    format!("Item {i}"),
                    String::new(),
                    i as f64,
                    "LKR".into(),
                    true,
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn partial_failure_keeps_the_rest() {
        let store = Arc::new(InMemoryMenuStore::with_rejection(|index, _| {
            (index == 2).then(|| "constraint violated".to_string())
        }));
        let coordinator = PersistenceCoordinator::new(store.clone());

        let outcome = coordinator.persist(&items(5)).await.unwrap();
        assert_eq!(outcome.saved_count(), 4);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 2);
        assert_eq!(outcome.failures[0].item_name, "Item 3");
        assert_eq!(outcome.failures[0].reason, "constraint violated");
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn empty_batch_skips_the_store() {
        let store = Arc::new(InMemoryMenuStore::unavailable("must not be called"));
        let outcome = PersistenceCoordinator::new(store)
            .persist(&[])
            .await
            .unwrap();
        assert_eq!(outcome, PersistOutcome::default());
    }

    #[tokio::test]
    async fn batch_error_is_persistence_failure() {
        let store = Arc::new(InMemoryMenuStore::unavailable("disk full"));
        let err = PersistenceCoordinator::new(store)
            .persist(&items(2))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::PersistenceFailure { .. }));
    }
}
