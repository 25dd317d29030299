//! Persistent set of collectibles the player owns.

use std::{fmt, sync::Arc};

use storyworld_core::{OwnedCollectible, Timestamp};
use tracing::{info, warn};

use crate::store::KeyValueStore;

/// Store key holding the serialized collection.
pub const COLLECTION_KEY: &str = "owned_collection";

/// Store key holding the time of the last collection change.
pub const COLLECTION_UPDATED_KEY: &str = "owned_collection_last_updated";

/// Owned collectibles in acquisition order, unique by catalog id.
pub struct CollectionStore {
    store: Arc<dyn KeyValueStore>,
    items: Vec<OwnedCollectible>,
    last_updated: Option<Timestamp>,
}

impl CollectionStore {
    /// Restores the collection from `store`, starting empty when nothing readable is there.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let items: Vec<OwnedCollectible> =
            read_json(store.as_ref(), COLLECTION_KEY).unwrap_or_default();
        let last_updated = read_json(store.as_ref(), COLLECTION_UPDATED_KEY);
        info!(items = items.len(), "owned collection loaded");
        Self {
            store,
            items,
            last_updated,
        }
    }

    /// Adds `collectible` unless an item with the same id is already owned.
    pub fn add(&mut self, collectible: OwnedCollectible, now: Timestamp) -> bool {
        if self.contains(collectible.id) {
            return false;
        }
        info!(id = collectible.id, title = %collectible.title, "collectible added");
        self.items.push(collectible);
        self.touch(now);
        true
    }

    /// Removes the collectible with `id`. Returns `false` when it was not owned.
    pub fn remove(&mut self, id: u64, now: Timestamp) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        if self.items.len() == before {
            return false;
        }
        self.touch(now);
        true
    }

    /// Owned collectibles in acquisition order.
    #[must_use]
    pub fn items(&self) -> &[OwnedCollectible] {
        &self.items
    }

    /// Reports whether a collectible with `id` is owned.
    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.items.iter().any(|item| item.id == id)
    }

    /// Time of the last addition or removal.
    #[must_use]
    pub fn last_updated(&self) -> Option<Timestamp> {
        self.last_updated
    }

    fn touch(&mut self, now: Timestamp) {
        self.last_updated = Some(now);
        write_json(self.store.as_ref(), COLLECTION_KEY, &self.items);
        write_json(self.store.as_ref(), COLLECTION_UPDATED_KEY, &now);
    }
}

impl fmt::Debug for CollectionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionStore")
            .field("items", &self.items)
            .field("last_updated", &self.last_updated)
            .finish_non_exhaustive()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let bytes = match store.get(key) {
        Ok(bytes) => bytes?,
        Err(error) => {
            warn!(%error, key, "failed to read collection state");
            return None;
        }
    };
    serde_json::from_slice(&bytes)
        .map_err(|error| warn!(%error, key, "persisted collection state is corrupt"))
        .ok()
}

fn write_json<T: serde::Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) {
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            if let Err(error) = store.set(key, &bytes) {
                warn!(%error, key, "failed to persist collection state");
            }
        }
        Err(error) => warn!(%error, key, "failed to serialize collection state"),
    }
}
