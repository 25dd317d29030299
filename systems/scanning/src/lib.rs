#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Viewport scanning system that fills cache misses around the player.
//!
//! Each scan computes the tiles covering a square area around the player,
//! generates placements for tiles the world has not cached yet and asks the
//! world to show every covered tile. Tiles that drop out of the area since
//! the previous scan are hidden again.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use storyworld_core::{
    tiles_covering, Command, ConfigurationError, Event, GeoCoordinate, PlacementRecord,
    TileCoordinate, MAX_ZOOM,
};
use storyworld_system_placement::PlacementGenerator;
use tracing::{debug, info};

/// Default zoom level of the placement grid.
pub const DEFAULT_ZOOM: u8 = 18;

/// Default edge length of the scanned square around the player.
pub const DEFAULT_SIDE_LENGTH_METERS: f64 = 1_240.0;

/// Configuration parameters required to construct the scanning system.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    zoom: u8,
    side_length_meters: f64,
}

impl Config {
    /// Creates a configuration scanning a `side_length_meters` square at `zoom`.
    pub fn new(zoom: u8, side_length_meters: f64) -> Result<Self, ConfigurationError> {
        if zoom > MAX_ZOOM {
            return Err(ConfigurationError::UnsupportedZoom(zoom));
        }
        if !side_length_meters.is_finite() || side_length_meters <= 0.0 {
            return Err(ConfigurationError::InvalidLength {
                name: "side_length_meters",
                value: side_length_meters,
            });
        }
        Ok(Self {
            zoom,
            side_length_meters,
        })
    }

    /// Zoom level of the scanned tiles.
    #[must_use]
    pub const fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Edge length of the scanned square.
    #[must_use]
    pub const fn side_length_meters(&self) -> f64 {
        self.side_length_meters
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zoom: DEFAULT_ZOOM,
            side_length_meters: DEFAULT_SIDE_LENGTH_METERS,
        }
    }
}

/// Pure system translating player positions into cache commands.
#[derive(Debug)]
pub struct Scanning {
    config: Config,
    generator: PlacementGenerator,
    shown: BTreeSet<TileCoordinate>,
    unconfirmed: BTreeMap<TileCoordinate, Vec<PlacementRecord>>,
}

impl Scanning {
    /// Creates a new scanning system around `generator`.
    #[must_use]
    pub fn new(config: Config, generator: PlacementGenerator) -> Self {
        Self {
            config,
            generator,
            shown: BTreeSet::new(),
            unconfirmed: BTreeMap::new(),
        }
    }

    /// Configuration the system was built with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Placement generator backing the system.
    #[must_use]
    pub const fn generator(&self) -> &PlacementGenerator {
        &self.generator
    }

    /// Seeds the spacing index with placements restored from a previous run.
    pub fn prime<'a, I>(&mut self, cached: I)
    where
        I: IntoIterator<Item = &'a PlacementRecord>,
    {
        self.generator.prime_spacing(cached);
        debug!(
            remembered = self.generator.spacing().len(),
            "spacing index primed"
        );
    }

    /// Reacts to world events.
    ///
    /// A cleared or expired cache takes every placement with it, so the
    /// spacing index and the set of shown tiles start over. Placements of a
    /// tile some other writer cached first are released from the spacing
    /// index.
    pub fn handle(&mut self, events: &[Event]) {
        let wiped = events
            .iter()
            .any(|event| matches!(event, Event::CacheCleared { .. } | Event::CacheExpired { .. }));
        if wiped {
            self.generator.reset_spacing();
            self.shown.clear();
            self.unconfirmed.clear();
        }

        for event in events {
            match event {
                Event::TileShown { tile, .. } => {
                    let _ = self.shown.insert(*tile);
                }
                Event::TileHidden { tile } => {
                    let _ = self.shown.remove(tile);
                }
                Event::TileStored { tile, .. } => {
                    let _ = self.unconfirmed.remove(tile);
                }
                Event::TileAlreadyCached { tile } => {
                    if let Some(lost) = self.unconfirmed.remove(tile) {
                        debug!(%tile, released = lost.len(), "tile cached elsewhere first");
                        self.generator.forget_spacing(&lost);
                    }
                }
                _ => {}
            }
        }
    }

    /// Emits the commands needed to populate and show the area around `center`.
    ///
    /// `is_cached` reports whether the world already holds an entry for a
    /// tile. Misses produce a [`Command::StorePlacements`] with zero or one
    /// placement; the world's put-if-absent keeps the first generation should
    /// two scans race. Tiles are visited in ascending order.
    pub fn scan<F, R>(
        &mut self,
        center: GeoCoordinate,
        is_cached: F,
        rng: &mut R,
        out: &mut Vec<Command>,
    ) where
        F: Fn(TileCoordinate) -> bool,
        R: Rng + ?Sized,
    {
        let covering = tiles_covering(center, self.config.side_length_meters, self.config.zoom);

        let mut misses = 0usize;
        for tile in &covering {
            if is_cached(*tile) {
                continue;
            }
            misses += 1;
            let placements: Vec<PlacementRecord> =
                self.generator.generate_tile(*tile, rng).into_iter().collect();
            if !placements.is_empty() {
                let _ = self.unconfirmed.insert(*tile, placements.clone());
            }
            out.push(Command::StorePlacements {
                tile: *tile,
                placements,
            });
        }

        for tile in self.shown.difference(&covering) {
            out.push(Command::HideTile { tile: *tile });
        }
        out.extend(covering.iter().map(|tile| Command::ShowTile { tile: *tile }));

        info!(
            lat = center.latitude(),
            lon = center.longitude(),
            tiles = covering.len(),
            misses,
            "scan complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejects_unsupported_values() {
        assert_eq!(
            Config::new(31, 100.0),
            Err(ConfigurationError::UnsupportedZoom(31))
        );
        assert!(Config::new(18, 0.0).is_err());
        assert!(Config::new(18, f64::INFINITY).is_err());
        assert_eq!(Config::new(18, 1_240.0), Ok(Config::default()));
    }
}
