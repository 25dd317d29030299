#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Storyworld placement engine.
//!
//! This crate defines the vocabulary that connects adapters, the authoritative
//! world, and pure systems. Systems inspect the world through read-only
//! queries and respond with [`Command`] values describing desired mutations.
//! The world executes those commands via its `apply` entry point and
//! broadcasts [`Event`] values that systems and rendering sinks react to.

mod geo;
mod tile;

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use geo::{
    meters_per_degree_longitude, GeoCoordinate, EARTH_CIRCUMFERENCE_METERS, EARTH_RADIUS_METERS,
    METERS_PER_DEGREE_LATITUDE,
};
pub use tile::{
    center_of, meters_per_tile, tiles_covering, tiles_per_axis, TileBounds, TileCoordinate,
    TileKeyError, MAX_ZOOM,
};

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Stores freshly generated placements for a tile unless the tile is already cached.
    StorePlacements {
        /// Tile the placements were generated for.
        tile: TileCoordinate,
        /// Zero or more placements located inside the tile.
        placements: Vec<PlacementRecord>,
    },
    /// Marks a cached tile as currently drawn on the map.
    ShowTile {
        /// Tile whose markers were drawn.
        tile: TileCoordinate,
    },
    /// Marks a cached tile as no longer drawn on the map.
    HideTile {
        /// Tile whose markers were removed.
        tile: TileCoordinate,
    },
    /// Marks every cached tile as hidden, typically after the map was rebuilt.
    HideAllTiles,
    /// Wipes every cached tile and resets the expiry reference point.
    ClearCache,
    /// Adds a materialized collectible to the owned collection.
    Collect {
        /// Collectible resolved from the remote catalog.
        collectible: OwnedCollectible,
    },
    /// Removes a collectible from the owned collection.
    RemoveCollectible {
        /// Catalog identifier of the collectible to remove.
        id: u64,
    },
}

/// Events broadcast by the world after processing commands or expiring state.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Confirms that placements were stored for a previously absent tile.
    TileStored {
        /// Tile that became cached.
        tile: TileCoordinate,
        /// Number of placements stored for the tile.
        placements: usize,
    },
    /// Reports that a store request lost against an existing cache entry.
    TileAlreadyCached {
        /// Tile whose existing entry was kept.
        tile: TileCoordinate,
    },
    /// Confirms that a tile's markers became visible.
    TileShown {
        /// Tile that became visible.
        tile: TileCoordinate,
        /// Placements that should now be drawn.
        placements: Vec<PlacementRecord>,
    },
    /// Confirms that a tile's markers were hidden.
    TileHidden {
        /// Tile that became hidden.
        tile: TileCoordinate,
    },
    /// Announces that the cache was wiped on request.
    CacheCleared {
        /// Moment the wipe happened; the next expiry window starts here.
        at: Timestamp,
    },
    /// Announces that the cache-wide time-to-live elapsed and every tile was dropped.
    CacheExpired {
        /// Moment the sweep happened.
        at: Timestamp,
    },
    /// Confirms that a collectible joined the owned collection.
    CollectibleAdded {
        /// Catalog identifier of the new collectible.
        id: u64,
    },
    /// Reports that the collectible was already owned and nothing changed.
    CollectibleAlreadyOwned {
        /// Catalog identifier of the duplicate collectible.
        id: u64,
    },
    /// Confirms that a collectible left the owned collection.
    CollectibleRemoved {
        /// Catalog identifier of the removed collectible.
        id: u64,
    },
}

/// Wall-clock instant measured in milliseconds since the Unix epoch.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The Unix epoch.
    pub const UNIX_EPOCH: Self = Self(0);

    /// Creates a timestamp from milliseconds since the Unix epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the Unix epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Returns the timestamp `duration` later, saturating at the representable maximum.
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// Time elapsed since `earlier`, or zero when `earlier` lies in the future.
    #[must_use]
    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

/// Rarity tier of a placement, each carrying a fixed selection probability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rarity {
    /// Frequently encountered.
    Common,
    /// Less frequent but not rare.
    Uncommon,
    /// Special and hard to find.
    Rare,
    /// Extremely unique and valuable.
    Epic,
}

impl Rarity {
    /// Every rarity in selection-table order.
    pub const ALL: [Rarity; 4] = [Self::Common, Self::Uncommon, Self::Rare, Self::Epic];

    /// Probability of rolling this rarity for a new placement.
    #[must_use]
    pub const fn probability(self) -> f64 {
        match self {
            Self::Common => 0.6,
            Self::Uncommon => 0.3,
            Self::Rare => 0.099,
            Self::Epic => 0.001,
        }
    }

    /// Human readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Common => "Common",
            Self::Uncommon => "Uncommon",
            Self::Rare => "Rare",
            Self::Epic => "Epic",
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Gameplay genre. Several raw catalog genres fold into each variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Genre {
    /// Action, adventure and western titles.
    ActionAdventure,
    /// Animated titles.
    Animation,
    /// Comedies.
    Comedy,
    /// Crime, horror, thriller and mystery titles.
    HorrorThriller,
    /// Documentary, history and war titles.
    DocumentaryWar,
    /// Fantasy and science fiction titles.
    SciFiFantasy,
    /// Drama, TV movie, music and family titles.
    Drama,
    /// Romance titles.
    Romance,
}

impl Genre {
    /// Every genre in selection-table order.
    pub const ALL: [Genre; 8] = [
        Self::ActionAdventure,
        Self::Animation,
        Self::Comedy,
        Self::HorrorThriller,
        Self::DocumentaryWar,
        Self::SciFiFantasy,
        Self::Drama,
        Self::Romance,
    ];

    /// Genre used for catalog identifiers that no variant claims.
    pub const FALLBACK: Genre = Self::Drama;

    /// Remote catalog genre identifiers folded into this genre.
    #[must_use]
    pub const fn catalog_ids(self) -> &'static [u32] {
        match self {
            Self::ActionAdventure => &[28, 12, 37],
            Self::Animation => &[16],
            Self::Comedy => &[35],
            Self::HorrorThriller => &[80, 27, 53, 9648],
            Self::DocumentaryWar => &[99, 36, 10752],
            Self::SciFiFantasy => &[14, 878],
            Self::Drama => &[18, 10770, 10402, 10751],
            Self::Romance => &[10749],
        }
    }

    /// Maps a single catalog genre identifier onto its gameplay genre.
    #[must_use]
    pub fn from_catalog_id(id: u32) -> Option<Genre> {
        Self::ALL
            .into_iter()
            .find(|genre| genre.catalog_ids().contains(&id))
    }

    /// Normalizes a catalog item's genre list, taking the first recognized identifier.
    #[must_use]
    pub fn from_catalog_ids(ids: &[u32]) -> Genre {
        ids.iter()
            .find_map(|id| Self::from_catalog_id(*id))
            .unwrap_or(Self::FALLBACK)
    }

    /// Human readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ActionAdventure => "Action & Adventure",
            Self::Animation => "Animation",
            Self::Comedy => "Comedy",
            Self::HorrorThriller => "Horror & Thriller",
            Self::DocumentaryWar => "Documentary & War",
            Self::SciFiFantasy => "Sci-Fi & Fantasy",
            Self::Drama => "Drama",
            Self::Romance => "Romance",
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Procedurally generated collectible location ("circle") awaiting a catalog item.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "PlacementWire", into = "PlacementWire")]
pub struct PlacementRecord {
    genre: Genre,
    rarity: Rarity,
    location: GeoCoordinate,
}

impl PlacementRecord {
    /// Creates a placement record.
    #[must_use]
    pub const fn new(genre: Genre, rarity: Rarity, location: GeoCoordinate) -> Self {
        Self {
            genre,
            rarity,
            location,
        }
    }

    /// Genre rolled for the placement.
    #[must_use]
    pub const fn genre(&self) -> Genre {
        self.genre
    }

    /// Rarity rolled for the placement.
    #[must_use]
    pub const fn rarity(&self) -> Rarity {
        self.rarity
    }

    /// Where the placement sits on the map.
    #[must_use]
    pub const fn location(&self) -> GeoCoordinate {
        self.location
    }
}

/// Flat `{genre, rarity, lat, lon}` layout used when persisting placements.
#[derive(Serialize, Deserialize)]
struct PlacementWire {
    genre: Genre,
    rarity: Rarity,
    lat: f64,
    lon: f64,
}

impl From<PlacementWire> for PlacementRecord {
    fn from(wire: PlacementWire) -> Self {
        Self::new(wire.genre, wire.rarity, GeoCoordinate::new(wire.lat, wire.lon))
    }
}

impl From<PlacementRecord> for PlacementWire {
    fn from(record: PlacementRecord) -> Self {
        Self {
            genre: record.genre,
            rarity: record.rarity,
            lat: record.location.latitude(),
            lon: record.location.longitude(),
        }
    }
}

/// Read-only snapshot of a single cached tile.
#[derive(Clone, Debug, PartialEq)]
pub struct TileCacheEntry {
    /// Tile the entry belongs to.
    pub tile: TileCoordinate,
    /// Placements generated for the tile; possibly empty.
    pub placements: Vec<PlacementRecord>,
    /// Whether the tile's markers are currently drawn.
    pub visible: bool,
}

/// Catalog-backed item a player acquired through a direct collect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OwnedCollectible {
    /// Catalog identifier; the owned collection never holds two items with the same id.
    pub id: u64,
    /// Title reported by the catalog.
    pub title: String,
    /// Genre of the placement the item was collected from.
    pub genre: Genre,
    /// Rarity of the placement the item was collected from.
    pub rarity: Rarity,
    /// Where the item was collected.
    pub location: GeoCoordinate,
    /// Catalog image reference, when the catalog provided one.
    pub poster_ref: Option<String>,
}

/// Single entry of a remote catalog page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Catalog identifier.
    pub id: u64,
    /// Display title.
    pub title: String,
    /// Short synopsis.
    pub overview: String,
    /// Raw catalog genre identifiers.
    pub genre_ids: Vec<u32>,
    /// Image reference, absent for items without artwork.
    pub poster_path: Option<String>,
}

/// One page of remote catalog results.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPage {
    /// Items contained in the page.
    pub items: Vec<CatalogItem>,
    /// Number of pages the catalog reports for the query.
    pub total_pages: u32,
}

/// Interaction tier granted to a player tapping a placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InteractionTier {
    /// Close enough to collect immediately.
    Direct,
    /// Within the extended radius; collecting requires a premium subscription.
    PremiumRequired,
    /// Out of range; collecting requires watching an advertisement.
    AdRequired,
}

/// Invalid tuning or weight tables detected while constructing the engine.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigurationError {
    /// A weighted table was defined without entries.
    #[error("weighted table has no entries")]
    EmptyTable,
    /// A table weight was negative, infinite or NaN.
    #[error("weight {weight} at position {index} is not a finite non-negative number")]
    InvalidWeight {
        /// Position of the offending entry.
        index: usize,
        /// Offending weight.
        weight: f64,
    },
    /// Every weight in the table was zero.
    #[error("weighted table has a total weight of zero")]
    ZeroTotalWeight,
    /// A table that must be normalized does not sum to one.
    #[error("weights sum to {sum}, expected 1.0")]
    Unnormalized {
        /// Actual sum of the weights.
        sum: f64,
    },
    /// A probability fell outside `0.0..=1.0`.
    #[error("probability {0} is outside 0.0..=1.0")]
    ProbabilityOutOfRange(f64),
    /// Interaction radii are negative, non-finite, or the near radius exceeds the far radius.
    #[error("interaction radii near={near} far={far} must satisfy 0 <= near <= far")]
    InvalidRadii {
        /// Configured direct-collect radius.
        near: f64,
        /// Configured premium radius.
        far: f64,
    },
    /// A length in meters was zero, negative or non-finite where a positive value is required.
    #[error("{name} must be a positive number of meters, got {value}")]
    InvalidLength {
        /// Name of the offending setting.
        name: &'static str,
        /// Offending value.
        value: f64,
    },
    /// A count-style limit was zero.
    #[error("{0} must be at least one")]
    ZeroLimit(&'static str),
    /// A scan zoom level lies beyond the deepest supported zoom.
    #[error("zoom level {0} is not supported")]
    UnsupportedZoom(u8),
}
