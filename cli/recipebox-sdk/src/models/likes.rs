//! The set of recipes the user liked.

use std::sync::{Mutex, MutexGuard};

use indexmap::IndexSet;
use recipebox_catalog::RecipeId;
use tracing::{debug, warn};

use crate::storage::{SharedStore, StoreError, set_json};

pub const LIKES_KEY: &str = "liked_recipes";

/// The storage key for a user's likes.
///
/// Likes recorded without a signed-in user live under the plain key.
pub fn likes_key(owner: Option<&str>) -> String {
    match owner {
        Some(username) => format!("{LIKES_KEY}_{username}"),
        None => LIKES_KEY.to_string(),
    }
}

/// A persisted, insertion ordered set of liked recipe ids.
///
/// Every mutation writes the whole set back before returning, so the stored
/// array always matches what [LikeStore::ids] reports.
#[derive(Debug)]
pub struct LikeStore {
    store: SharedStore,
    key: String,
    liked: Mutex<IndexSet<RecipeId>>,
}

impl LikeStore {
    /// Load the likes of `owner`.
    ///
    /// Missing or unreadable data yields an empty set.
    pub fn load(store: SharedStore, owner: Option<&str>) -> Self {
        let key = likes_key(owner);
        let liked = match store.get(&key) {
            Ok(Some(stored)) => match serde_json::from_str::<Vec<RecipeId>>(&stored) {
                Ok(ids) => ids.into_iter().collect(),
                Err(err) => {
                    warn!(key, error = %err, "ignoring unreadable likes");
                    IndexSet::new()
                },
            },
            Ok(None) => IndexSet::new(),
            Err(err) => {
                warn!(key, error = %err, "couldn't read likes");
                IndexSet::new()
            },
        };
        debug!(key, count = liked.len(), "loaded likes");

        Self {
            store,
            key,
            liked: Mutex::new(liked),
        }
    }

    fn lock(&self) -> MutexGuard<'_, IndexSet<RecipeId>> {
        self.liked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Flip whether `id` is liked and persist the result.
    ///
    /// Returns the new membership. If the write fails the set is left as it
    /// was.
    pub fn toggle(&self, id: RecipeId) -> Result<bool, StoreError> {
        let mut liked = self.lock();
        let removed_at = liked.get_index_of(&id);
        match removed_at {
            Some(index) => {
                liked.shift_remove_index(index);
            },
            None => {
                liked.insert(id);
            },
        }
        let now_liked = removed_at.is_none();

        let ids: Vec<RecipeId> = liked.iter().copied().collect();
        if let Err(err) = set_json(self.store.as_ref(), &self.key, &ids) {
            match removed_at {
                Some(index) => {
                    liked.shift_insert(index, id);
                },
                None => {
                    liked.shift_remove(&id);
                },
            }
            return Err(err);
        }

        debug!(id, liked = now_liked, "toggled like");
        Ok(now_liked)
    }

    pub fn is_liked(&self, id: RecipeId) -> bool {
        self.lock().contains(&id)
    }

    /// Liked ids in the order they were liked.
    pub fn ids(&self) -> Vec<RecipeId> {
        self.lock().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use tempfile::TempDir;

    use super::*;
    use crate::storage::{FileStore, KeyValueStore, MemoryStore};

    fn stored_ids(store: &SharedStore, key: &str) -> Vec<RecipeId> {
        serde_json::from_str(&store.get(key).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn reload_and_toggle_removes_from_memory_and_storage() {
        let store = MemoryStore::shared();
        store.set(LIKES_KEY, "[3,7,9]".to_string()).unwrap();

        let likes = LikeStore::load(store.clone(), None);
        assert_eq!(likes.ids(), vec![3, 7, 9]);

        assert!(!likes.toggle(7).unwrap());
        assert_eq!(likes.ids(), vec![3, 9]);
        assert_eq!(stored_ids(&store, LIKES_KEY), vec![3, 9]);
    }

    #[test]
    fn toggle_appends_in_like_order() {
        let store = MemoryStore::shared();
        let likes = LikeStore::load(store.clone(), None);

        assert!(likes.toggle(5).unwrap());
        assert!(likes.toggle(2).unwrap());
        assert!(likes.is_liked(5));
        assert_eq!(stored_ids(&store, LIKES_KEY), vec![5, 2]);
    }

    #[test]
    fn corrupt_likes_load_empty() {
        let store = MemoryStore::shared();
        store.set(LIKES_KEY, "{\"not\": \"a list\"}".to_string()).unwrap();

        let likes = LikeStore::load(store, None);
        assert!(likes.is_empty());
    }

    #[test]
    fn likes_are_scoped_by_owner() {
        let store = MemoryStore::shared();
        let ada = LikeStore::load(store.clone(), Some("ada"));
        ada.toggle(1).unwrap();

        let grace = LikeStore::load(store.clone(), Some("grace"));
        assert!(!grace.is_liked(1));
        assert_eq!(ada.key(), "liked_recipes_ada");
        assert_eq!(stored_ids(&store, "liked_recipes_ada"), vec![1]);
        assert_eq!(store.get(LIKES_KEY).unwrap(), None);
    }

    #[test]
    fn likes_survive_restart() {
        let tempdir = TempDir::new().unwrap();
        let store: SharedStore = Arc::new(FileStore::open(tempdir.path()).unwrap());
        let likes = LikeStore::load(store, None);
        likes.toggle(42).unwrap();
        likes.toggle(7).unwrap();
        drop(likes);

        let store: SharedStore = Arc::new(FileStore::open(tempdir.path()).unwrap());
        let likes = LikeStore::load(store, None);
        assert_eq!(likes.ids(), vec![42, 7]);
    }

    /// A store that can be read but refuses writes
    #[derive(Debug)]
    struct ReadOnlyStore(MemoryStore);

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.0.get(key)
        }

        fn set(&self, _key: &str, _value: String) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }

        fn remove(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    #[test]
    fn failed_write_leaves_set_unchanged() {
        let inner = MemoryStore::new();
        inner.set(LIKES_KEY, "[3,7,9]".to_string()).unwrap();
        let likes = LikeStore::load(Arc::new(ReadOnlyStore(inner)), None);

        assert!(likes.toggle(7).is_err());
        assert!(likes.toggle(11).is_err());
        assert_eq!(likes.ids(), vec![3, 7, 9]);
    }

    proptest! {
        /// Toggling twice restores membership, and storage always matches memory.
        #[test]
        fn toggle_is_an_involution(
            initial in proptest::collection::vec(0u64..50, 0..10),
            toggles in proptest::collection::vec(0u64..50, 1..20),
        ) {
            let store = MemoryStore::shared();
            store.set(LIKES_KEY, serde_json::to_string(&initial).unwrap()).unwrap();
            let likes = LikeStore::load(store.clone(), None);

            for id in toggles {
                let before = likes.is_liked(id);
                prop_assert_eq!(likes.toggle(id).unwrap(), !before);
                prop_assert_eq!(stored_ids(&store, LIKES_KEY), likes.ids());
                prop_assert_eq!(likes.toggle(id).unwrap(), before);
                prop_assert_eq!(stored_ids(&store, LIKES_KEY), likes.ids());
                prop_assert_eq!(likes.is_liked(id), before);
            }
        }
    }
}
