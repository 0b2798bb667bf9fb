use super::{sort_listing, ItemFilter, MenuStore, SavedMenuItem, StoreError};
use crate::model::CanonicalMenuItem;
use async_trait::async_trait;
use std::sync::Mutex;

type RejectFn = dyn Fn(usize, &CanonicalMenuItem) -> Option<String> + Send + Sync;

/// Process-local [`MenuStore`].
///
/// A rejection hook decides, per `(batch index, item)`, whether to refuse
/// an insert and with what reason. [`InMemoryMenuStore::unavailable`]
/// builds a store whose batches fail outright.
#[derive(Default)]
pub struct InMemoryMenuStore {
    items: Mutex<Vec<SavedMenuItem>>,
    reject: Option<Box<RejectFn>>,
    unavailable: Option<String>,
}

impl InMemoryMenuStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse inserts for which `reject` returns a reason.
    pub fn with_rejection<F>(reject: F) -> Self
    where
        F: Fn(usize, &CanonicalMenuItem) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            reject: Some(Box::new(reject)),
            ..Self::default()
        }
    }

    /// A store that fails every batch with `reason`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            unavailable: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Snapshot of everything stored so far, in insertion order.
    pub fn items(&self) -> Vec<SavedMenuItem> {
        self.items
            .lock()
            .map(|items| items.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl MenuStore for InMemoryMenuStore {
    async fn insert_many(
        &self,
        items: &[CanonicalMenuItem],
    ) -> Result<Vec<Result<SavedMenuItem, StoreError>>, StoreError> {
        if let Some(reason) = &self.unavailable {
            return Err(StoreError::Unavailable(reason.clone()));
        }

        let mut stored = self.items.lock().map_err(poisoned)?;
        let results = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                if let Some(reason) = self.reject.as_ref().and_then(|f| f(index, item)) {
                    return Err(StoreError::Rejected(reason));
                }
                let saved = SavedMenuItem::assign(item.clone());
                stored.push(saved.clone());
                Ok(saved)
            })
            .collect();
        Ok(results)
    }

    async fn list(
        &self,
        owner_id: &str,
        filter: &ItemFilter,
    ) -> Result<Vec<SavedMenuItem>, StoreError> {
        let stored = self.items.lock().map_err(poisoned)?;
        let mut items: Vec<SavedMenuItem> = stored
            .iter()
            .filter(|s| s.item.owner_id() == owner_id && filter.matches(&s.item))
            .cloned()
            .collect();
        sort_listing(&mut items);
        Ok(items)
    }

    async fn find(&self, owner_id: &str, id: &str) -> Result<Option<SavedMenuItem>, StoreError> {
        let stored = self.items.lock().map_err(poisoned)?;
        Ok(stored
            .iter()
            .find(|s| s.id == id && s.item.owner_id() == owner_id)
            .cloned())
    }

    async fn update(
        &self,
        owner_id: &str,
        id: &str,
        item: &CanonicalMenuItem,
    ) -> Result<SavedMenuItem, StoreError> {
        let mut stored = self.items.lock().map_err(poisoned)?;
        let slot = stored
            .iter_mut()
            .find(|s| s.id == id && s.item.owner_id() == owner_id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        slot.item = item.clone();
        Ok(slot.clone())
    }

    async fn delete(&self, owner_id: &str, id: &str) -> Result<(), StoreError> {
        let mut stored = self.items.lock().map_err(poisoned)?;
        let position = stored
            .iter()
            .position(|s| s.id == id && s.item.owner_id() == owner_id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        stored.remove(position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str) -> CanonicalMenuItem {
        CanonicalMenuItem::from_parts(
            "v1".into(),
            "Mains".into(),
            name.into(),
            String::new(),
            10.0,
            "LKR".into(),
            true,
        )
    }

    #[tokio::test]
    async fn stores_and_lists_by_owner() {
        let store = InMemoryMenuStore::new();
        let results = store.insert_many(&[item("B"), item("A")]).await.unwrap();
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(store.len(), 2);

        let listed = store.list("v1", &ItemFilter::default()).await.unwrap();
        assert_eq!(listed[0].item.name(), "A");
        assert!(store.list("v2", &ItemFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejection_hook_refuses_single_items() {
        let store = InMemoryMenuStore::with_rejection(|index, _| {
            (index == 1).then(|| "duplicate key".to_string())
        });
        let results = store
            .insert_many(&[item("A"), item("B"), item("C")])
            .await
            .unwrap();
        assert!(results[0].is_ok());
        assert!(matches!(&results[1], Err(StoreError::Rejected(r)) if r == "duplicate key"));
        assert!(results[2].is_ok());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn unavailable_store_fails_the_batch() {
        let store = InMemoryMenuStore::unavailable("connection refused");
        let err = store.insert_many(&[item("A")]).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn update_and_delete_are_owner_scoped() {
        let store = InMemoryMenuStore::new();
        let saved = store.insert_many(&[item("A")]).await.unwrap().remove(0).unwrap();

        let renamed = CanonicalMenuItem::from_parts(
            "v1".into(),
            "Mains".into(),
            "A2".into(),
            String::new(),
            12.0,
            "LKR".into(),
            false,
        );
        assert!(matches!(
            store.update("v2", &saved.id, &renamed).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(store.delete("v2", &saved.id).await, Err(StoreError::NotFound(_))));
        assert!(store.find("v2", &saved.id).await.unwrap().is_none());

        let updated = store.update("v1", &saved.id, &renamed).await.unwrap();
        assert_eq!(updated.id, saved.id);
        assert_eq!(updated.created_at, saved.created_at);
        assert_eq!(updated.item.name(), "A2");

        store.delete("v1", &saved.id).await.unwrap();
        assert!(store.is_empty());
        assert!(matches!(store.delete("v1", &saved.id).await, Err(StoreError::NotFound(_))));
    }
}
