//! Persistent tile cache with a cache-wide time-to-live.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use storyworld_core::{
    ConfigurationError, PlacementRecord, TileCacheEntry, TileCoordinate, TileKeyError, Timestamp,
};
use tracing::{debug, info, warn};

use crate::{
    expiry::{Scheduler, TimerHandle},
    store::KeyValueStore,
};

/// Store key holding the serialized tile map.
pub const TILE_CACHE_KEY: &str = "tile_cache";

/// Store key holding the timestamp of the last sweep.
pub const LAST_SWEEP_KEY: &str = "tile_cache_last_sweep";

/// Default interval after which every cached tile is dropped.
pub const DEFAULT_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Sweep times kept for a host that never drains them; older ones are dropped.
const UNDRAINED_SWEEP_LIMIT: usize = 64;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CachedTile {
    placements: Vec<PlacementRecord>,
    #[serde(default)]
    visible: bool,
}

struct ExpirySchedule {
    ttl: Duration,
    generation: u64,
    handle: TimerHandle,
}

struct CacheState {
    tiles: BTreeMap<TileCoordinate, CachedTile>,
    last_sweep: Timestamp,
    schedule: Option<ExpirySchedule>,
    generation: u64,
    expired: Vec<Timestamp>,
}

/// Map from tile to generated placements, mirrored into a [`KeyValueStore`].
///
/// Entries are created at most once per tile and are never partially
/// updated: the only mutations are the visibility flag and whole-cache
/// sweeps. Every mutation is written through to the store.
pub struct TileCache {
    this: Weak<TileCache>,
    store: Arc<dyn KeyValueStore>,
    scheduler: Arc<dyn Scheduler>,
    state: Mutex<CacheState>,
}

impl TileCache {
    /// Restores the cache from `store`.
    ///
    /// A missing or unreadable blob yields an empty cache. A missing sweep
    /// timestamp is initialized to the scheduler's current time.
    pub fn load(store: Arc<dyn KeyValueStore>, scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        let tiles = load_tiles(store.as_ref());
        let last_sweep = match load_last_sweep(store.as_ref()) {
            Some(timestamp) => timestamp,
            None => {
                let now = scheduler.now();
                persist_last_sweep(store.as_ref(), now);
                now
            }
        };
        info!(
            tiles = tiles.len(),
            last_sweep = last_sweep.as_millis(),
            "tile cache loaded"
        );

        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            store,
            scheduler,
            state: Mutex::new(CacheState {
                tiles,
                last_sweep,
                schedule: None,
                generation: 0,
                expired: Vec::new(),
            }),
        })
    }

    /// Snapshot of the entry for `tile`, if cached.
    #[must_use]
    pub fn get(&self, tile: TileCoordinate) -> Option<TileCacheEntry> {
        self.lock().tiles.get(&tile).map(|cached| entry(tile, cached))
    }

    /// Looks an entry up by its canonical `"x-y-z"` key.
    pub fn get_by_key(&self, key: &str) -> Result<Option<TileCacheEntry>, TileKeyError> {
        let tile: TileCoordinate = key.parse()?;
        Ok(self.get(tile))
    }

    /// Reports whether `tile` is cached.
    #[must_use]
    pub fn contains(&self, tile: TileCoordinate) -> bool {
        self.lock().tiles.contains_key(&tile)
    }

    /// Number of cached tiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().tiles.len()
    }

    /// Reports whether no tile is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().tiles.is_empty()
    }

    /// Snapshot of every entry in tile order.
    #[must_use]
    pub fn entries(&self) -> Vec<TileCacheEntry> {
        self.lock()
            .tiles
            .iter()
            .map(|(tile, cached)| entry(*tile, cached))
            .collect()
    }

    /// Moment of the last sweep or clear.
    #[must_use]
    pub fn last_sweep(&self) -> Timestamp {
        self.lock().last_sweep
    }

    /// Stores `placements` for `tile` unless the tile is already cached.
    ///
    /// The check and the insert happen under one lock, so concurrent callers
    /// racing on the same tile see exactly one `true`.
    pub fn put_if_absent(&self, tile: TileCoordinate, placements: Vec<PlacementRecord>) -> bool {
        let mut state = self.lock();
        if state.tiles.contains_key(&tile) {
            return false;
        }
        let _ = state.tiles.insert(
            tile,
            CachedTile {
                placements,
                visible: false,
            },
        );
        self.persist_tiles(&state);
        true
    }

    /// Flags `tile` as drawn. Returns `true` when the flag changed.
    pub fn mark_visible(&self, tile: TileCoordinate) -> bool {
        self.set_visible(tile, true)
    }

    /// Flags `tile` as not drawn. Returns `true` when the flag changed.
    pub fn mark_hidden(&self, tile: TileCoordinate) -> bool {
        self.set_visible(tile, false)
    }

    /// Clears every visibility flag, returning the tiles that were visible.
    pub fn hide_all(&self) -> Vec<TileCoordinate> {
        let mut state = self.lock();
        let hidden: Vec<TileCoordinate> = state
            .tiles
            .iter_mut()
            .filter(|(_, cached)| cached.visible)
            .map(|(tile, cached)| {
                cached.visible = false;
                *tile
            })
            .collect();
        if !hidden.is_empty() {
            self.persist_tiles(&state);
        }
        hidden
    }

    /// Drops every tile and restarts the expiry window, returning the time of the wipe.
    pub fn clear(&self) -> Timestamp {
        let now = self.scheduler.now();
        let mut state = self.lock();
        let dropped = state.tiles.len();
        state.tiles.clear();
        state.last_sweep = now;
        if let Err(error) = self.store.remove(TILE_CACHE_KEY) {
            warn!(%error, "failed to remove persisted tile cache");
        }
        persist_last_sweep(self.store.as_ref(), now);
        if let Some(ttl) = state.schedule.as_ref().map(|schedule| schedule.ttl) {
            self.arm(&mut state, ttl, ttl);
        }
        info!(dropped, "tile cache cleared");
        now
    }

    /// Arms the expiry timer, replacing any previously armed one.
    ///
    /// Time elapsed since the persisted sweep timestamp counts against `ttl`,
    /// including time the process was not running. When the window already
    /// elapsed the sweep happens before this call returns. A zero `ttl` is
    /// rejected and leaves any armed timer in place.
    pub fn schedule_expiry(&self, ttl: Duration) -> Result<(), ConfigurationError> {
        if ttl.is_zero() {
            return Err(ConfigurationError::ZeroLimit("ttl"));
        }
        let now = self.scheduler.now();
        let mut state = self.lock();
        let elapsed = now.saturating_duration_since(state.last_sweep);
        let delay = if elapsed >= ttl {
            self.sweep(&mut state, now);
            ttl
        } else {
            ttl - elapsed
        };
        self.arm(&mut state, ttl, delay);
        Ok(())
    }

    /// Cancels the expiry timer, if armed.
    pub fn cancel_expiry(&self) {
        if let Some(schedule) = self.lock().schedule.take() {
            schedule.handle.cancel();
        }
    }

    /// Sweep times recorded since the previous call, oldest first.
    pub fn take_expired(&self) -> Vec<Timestamp> {
        std::mem::take(&mut self.lock().expired)
    }

    fn set_visible(&self, tile: TileCoordinate, visible: bool) -> bool {
        let mut state = self.lock();
        let Some(cached) = state.tiles.get_mut(&tile) else {
            return false;
        };
        if cached.visible == visible {
            return false;
        }
        cached.visible = visible;
        self.persist_tiles(&state);
        true
    }

    fn arm(&self, state: &mut CacheState, ttl: Duration, delay: Duration) {
        if let Some(previous) = state.schedule.take() {
            previous.handle.cancel();
        }
        state.generation += 1;
        let generation = state.generation;
        let this = self.this.clone();
        let handle = self.scheduler.after(
            delay,
            Box::new(move || {
                if let Some(cache) = this.upgrade() {
                    cache.expire(generation);
                }
            }),
        );
        debug!(delay_ms = delay.as_millis() as u64, "tile cache expiry armed");
        state.schedule = Some(ExpirySchedule {
            ttl,
            generation,
            handle,
        });
    }

    fn expire(&self, generation: u64) {
        let now = self.scheduler.now();
        let mut state = self.lock();
        let ttl = match state.schedule.as_ref() {
            Some(schedule) if schedule.generation == generation => schedule.ttl,
            _ => return,
        };
        self.sweep(&mut state, now);
        self.arm(&mut state, ttl, ttl);
    }

    fn sweep(&self, state: &mut CacheState, now: Timestamp) {
        let dropped = state.tiles.len();
        state.tiles.clear();
        state.last_sweep = now;
        if state.expired.len() >= UNDRAINED_SWEEP_LIMIT {
            let _ = state.expired.remove(0);
        }
        state.expired.push(now);
        self.persist_tiles(state);
        persist_last_sweep(self.store.as_ref(), now);
        info!(dropped, at = now.as_millis(), "tile cache expired");
    }

    fn persist_tiles(&self, state: &CacheState) {
        let blob: BTreeMap<String, &CachedTile> = state
            .tiles
            .iter()
            .map(|(tile, cached)| (tile.key(), cached))
            .collect();
        let bytes = match serde_json::to_vec(&blob) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%error, "failed to serialize tile cache");
                return;
            }
        };
        if let Err(error) = self.store.set(TILE_CACHE_KEY, &bytes) {
            warn!(%error, "failed to persist tile cache");
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for TileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("TileCache")
            .field("tiles", &state.tiles.len())
            .field("last_sweep", &state.last_sweep)
            .field("expiry_armed", &state.schedule.is_some())
            .finish()
    }
}

fn entry(tile: TileCoordinate, cached: &CachedTile) -> TileCacheEntry {
    TileCacheEntry {
        tile,
        placements: cached.placements.clone(),
        visible: cached.visible,
    }
}

fn load_tiles(store: &dyn KeyValueStore) -> BTreeMap<TileCoordinate, CachedTile> {
    let bytes = match store.get(TILE_CACHE_KEY) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return BTreeMap::new(),
        Err(error) => {
            warn!(%error, "failed to read tile cache, starting cold");
            return BTreeMap::new();
        }
    };
    let blob: BTreeMap<String, CachedTile> = match serde_json::from_slice(&bytes) {
        Ok(blob) => blob,
        Err(error) => {
            warn!(%error, "persisted tile cache is corrupt, starting cold");
            return BTreeMap::new();
        }
    };
    blob.into_iter()
        .filter_map(|(key, cached)| match key.parse::<TileCoordinate>() {
            Ok(tile) => Some((tile, cached)),
            Err(error) => {
                warn!(%key, %error, "skipping cached tile with unreadable key");
                None
            }
        })
        .collect()
}

fn load_last_sweep(store: &dyn KeyValueStore) -> Option<Timestamp> {
    let bytes = match store.get(LAST_SWEEP_KEY) {
        Ok(bytes) => bytes?,
        Err(error) => {
            warn!(%error, "failed to read last sweep timestamp");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(timestamp) => Some(timestamp),
        Err(error) => {
            warn!(%error, "persisted sweep timestamp is corrupt");
            None
        }
    }
}

fn persist_last_sweep(store: &dyn KeyValueStore, at: Timestamp) {
    let result = serde_json::to_vec(&at)
        .map_err(|error| error.to_string())
        .and_then(|bytes| {
            store
                .set(LAST_SWEEP_KEY, &bytes)
                .map_err(|error| error.to_string())
        });
    if let Err(error) = result {
        warn!(%error, "failed to persist last sweep timestamp");
    }
}
