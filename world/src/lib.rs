#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state for the Storyworld placement engine.
//!
//! The world owns the tile cache and the player's collection. Both are
//! restored from a [`KeyValueStore`] on load and written back after every
//! mutation. Mutations arrive exclusively as [`Command`] values through
//! [`apply`]; reads go through the [`query`] module.

mod cache;
mod collection;
mod expiry;
mod store;

use std::{fmt, sync::Arc, time::Duration};

use storyworld_core::{Command, ConfigurationError, Event};

pub use cache::{TileCache, DEFAULT_TTL, LAST_SWEEP_KEY, TILE_CACHE_KEY};
pub use collection::{CollectionStore, COLLECTION_KEY, COLLECTION_UPDATED_KEY};
pub use expiry::{ManualScheduler, Scheduler, Task, TimerHandle, TokioScheduler};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};

/// Represents the authoritative Storyworld state.
pub struct World {
    cache: Arc<TileCache>,
    collection: CollectionStore,
    scheduler: Arc<dyn Scheduler>,
}

impl World {
    /// Restores the world from `store`, using `scheduler` for time and expiry timers.
    pub fn load(store: Arc<dyn KeyValueStore>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            cache: TileCache::load(Arc::clone(&store), Arc::clone(&scheduler)),
            collection: CollectionStore::load(store),
            scheduler,
        }
    }

    /// Starts sweeping the tile cache every `ttl`, counting time elapsed since the last sweep.
    pub fn schedule_expiry(&self, ttl: Duration) -> Result<(), ConfigurationError> {
        self.cache.schedule_expiry(ttl)
    }

    /// Reports sweeps performed by the expiry timer since the previous call.
    pub fn drain_expired(&self, out_events: &mut Vec<Event>) {
        out_events.extend(
            self.cache
                .take_expired()
                .into_iter()
                .map(|at| Event::CacheExpired { at }),
        );
    }

    /// Shared handle to the tile cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("cache", &self.cache)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

/// Applies the provided command to the world, reporting what changed.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::StorePlacements { tile, placements } => {
            let count = placements.len();
            if world.cache.put_if_absent(tile, placements) {
                out_events.push(Event::TileStored {
                    tile,
                    placements: count,
                });
            } else {
                out_events.push(Event::TileAlreadyCached { tile });
            }
        }
        Command::ShowTile { tile } => {
            if world.cache.mark_visible(tile) {
                let placements = world
                    .cache
                    .get(tile)
                    .map(|entry| entry.placements)
                    .unwrap_or_default();
                out_events.push(Event::TileShown { tile, placements });
            }
        }
        Command::HideTile { tile } => {
            if world.cache.mark_hidden(tile) {
                out_events.push(Event::TileHidden { tile });
            }
        }
        Command::HideAllTiles => {
            out_events.extend(
                world
                    .cache
                    .hide_all()
                    .into_iter()
                    .map(|tile| Event::TileHidden { tile }),
            );
        }
        Command::ClearCache => {
            let at = world.cache.clear();
            out_events.push(Event::CacheCleared { at });
        }
        Command::Collect { collectible } => {
            let id = collectible.id;
            if world.collection.add(collectible, world.scheduler.now()) {
                out_events.push(Event::CollectibleAdded { id });
            } else {
                out_events.push(Event::CollectibleAlreadyOwned { id });
            }
        }
        Command::RemoveCollectible { id } => {
            if world.collection.remove(id, world.scheduler.now()) {
                out_events.push(Event::CollectibleRemoved { id });
            }
        }
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use storyworld_core::{
        OwnedCollectible, PlacementRecord, TileCacheEntry, TileCoordinate, TileKeyError, Timestamp,
    };

    use super::World;

    /// Snapshot of the cache entry for `tile`, if generated.
    #[must_use]
    pub fn tile(world: &World, tile: TileCoordinate) -> Option<TileCacheEntry> {
        world.cache.get(tile)
    }

    /// Looks a cache entry up by its canonical `"x-y-z"` key.
    pub fn tile_by_key(world: &World, key: &str) -> Result<Option<TileCacheEntry>, TileKeyError> {
        world.cache.get_by_key(key)
    }

    /// Reports whether placements were already generated for `tile`.
    #[must_use]
    pub fn is_cached(world: &World, tile: TileCoordinate) -> bool {
        world.cache.contains(tile)
    }

    /// Every cached tile in tile order.
    #[must_use]
    pub fn cached_tiles(world: &World) -> Vec<TileCacheEntry> {
        world.cache.entries()
    }

    /// Every cached placement, across all tiles.
    #[must_use]
    pub fn cached_placements(world: &World) -> Vec<PlacementRecord> {
        world
            .cache
            .entries()
            .into_iter()
            .flat_map(|entry| entry.placements)
            .collect()
    }

    /// Placements of tiles currently drawn on the map.
    #[must_use]
    pub fn visible_placements(world: &World) -> Vec<PlacementRecord> {
        world
            .cache
            .entries()
            .into_iter()
            .filter(|entry| entry.visible)
            .flat_map(|entry| entry.placements)
            .collect()
    }

    /// Moment of the last cache sweep or clear.
    #[must_use]
    pub fn last_sweep(world: &World) -> Timestamp {
        world.cache.last_sweep()
    }

    /// Owned collectibles in acquisition order.
    #[must_use]
    pub fn collection(world: &World) -> &[OwnedCollectible] {
        world.collection.items()
    }

    /// Reports whether a collectible with `id` is owned.
    #[must_use]
    pub fn owns(world: &World, id: u64) -> bool {
        world.collection.contains(id)
    }

    /// Time of the last collection change, if any.
    #[must_use]
    pub fn collection_last_updated(world: &World) -> Option<Timestamp> {
        world.collection.last_updated()
    }
}
