#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Minimum-spacing filter that keeps placement markers from overlapping.
//!
//! Placements are bucketed into a fixed-size grid measured in meters,
//! independent of map tiles. A new placement is rejected when an already
//! accepted placement in the same bucket lies closer than the configured
//! minimum distance. Adjacent tiles can otherwise produce markers on top of
//! each other along their shared edge.

use std::collections::HashMap;

use storyworld_core::{
    meters_per_degree_longitude, ConfigurationError, GeoCoordinate, PlacementRecord,
    METERS_PER_DEGREE_LATITUDE,
};
use tracing::trace;

/// Default edge length of a spacing bucket.
pub const DEFAULT_GRID_SIZE_METERS: f64 = 100.0;

/// Default minimum distance between two placements sharing a bucket.
pub const DEFAULT_MIN_DISTANCE_METERS: f64 = 50.0;

/// Configuration parameters required to construct the spacing filter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    grid_size_meters: f64,
    min_distance_meters: f64,
}

impl Config {
    /// Creates a configuration, rejecting non-positive grid sizes and negative distances.
    pub fn new(
        grid_size_meters: f64,
        min_distance_meters: f64,
    ) -> Result<Self, ConfigurationError> {
        if !grid_size_meters.is_finite() || grid_size_meters <= 0.0 {
            return Err(ConfigurationError::InvalidLength {
                name: "grid_size_meters",
                value: grid_size_meters,
            });
        }
        if !min_distance_meters.is_finite() || min_distance_meters < 0.0 {
            return Err(ConfigurationError::InvalidLength {
                name: "min_distance_meters",
                value: min_distance_meters,
            });
        }
        Ok(Self {
            grid_size_meters,
            min_distance_meters,
        })
    }

    /// Edge length of a spacing bucket.
    #[must_use]
    pub const fn grid_size_meters(&self) -> f64 {
        self.grid_size_meters
    }

    /// Minimum distance enforced within a bucket.
    #[must_use]
    pub const fn min_distance_meters(&self) -> f64 {
        self.min_distance_meters
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grid_size_meters: DEFAULT_GRID_SIZE_METERS,
            min_distance_meters: DEFAULT_MIN_DISTANCE_METERS,
        }
    }
}

/// Identifier of a spacing bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCellKey {
    row: i64,
    column: i64,
}

impl GridCellKey {
    /// Bucket index along the north-south axis.
    #[must_use]
    pub const fn row(&self) -> i64 {
        self.row
    }

    /// Bucket index along the east-west axis.
    #[must_use]
    pub const fn column(&self) -> i64 {
        self.column
    }
}

/// Process-lifetime index of accepted placement locations per bucket.
#[derive(Clone, Debug, Default)]
pub struct SpatialGridDedup {
    config: Config,
    cells: HashMap<GridCellKey, Vec<GeoCoordinate>>,
}

impl SpatialGridDedup {
    /// Creates an empty index.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cells: HashMap::new(),
        }
    }

    /// Configuration the index was built with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Bucket containing `coordinate`.
    ///
    /// Degrees are scaled to meters and divided by the grid size, then
    /// truncated towards zero.
    #[must_use]
    pub fn cell_key(&self, coordinate: GeoCoordinate) -> GridCellKey {
        let grid = self.config.grid_size_meters;
        let north = coordinate.latitude() * METERS_PER_DEGREE_LATITUDE / grid;
        let east =
            coordinate.longitude() * meters_per_degree_longitude(coordinate.latitude()) / grid;
        GridCellKey {
            row: north as i64,
            column: east as i64,
        }
    }

    /// Reports whether `location` keeps the minimum distance to its bucket mates.
    #[must_use]
    pub fn is_far_enough(&self, location: GeoCoordinate) -> bool {
        let key = self.cell_key(location);
        let Some(accepted) = self.cells.get(&key) else {
            return true;
        };
        accepted
            .iter()
            .all(|existing| existing.distance_to(location) >= self.config.min_distance_meters)
    }

    /// Accepts the placement when it keeps its distance, remembering its location.
    pub fn accept(&mut self, record: &PlacementRecord) -> bool {
        self.accept_location(record.location())
    }

    /// Location-only variant of [`SpatialGridDedup::accept`].
    pub fn accept_location(&mut self, location: GeoCoordinate) -> bool {
        if !self.is_far_enough(location) {
            trace!(
                lat = location.latitude(),
                lon = location.longitude(),
                "placement rejected by spacing grid"
            );
            return false;
        }
        let key = self.cell_key(location);
        self.cells.entry(key).or_default().push(location);
        true
    }

    /// Records a placement unconditionally, e.g. when restoring a cached world.
    pub fn remember(&mut self, record: &PlacementRecord) {
        let location = record.location();
        let key = self.cell_key(location);
        self.cells.entry(key).or_default().push(location);
    }

    /// Drops one remembered copy of the placement's location, reporting whether it was known.
    pub fn forget(&mut self, record: &PlacementRecord) -> bool {
        let location = record.location();
        let key = self.cell_key(location);
        let Some(accepted) = self.cells.get_mut(&key) else {
            return false;
        };
        let Some(index) = accepted.iter().position(|existing| *existing == location) else {
            return false;
        };
        let _ = accepted.swap_remove(index);
        if accepted.is_empty() {
            let _ = self.cells.remove(&key);
        }
        true
    }

    /// Locations accepted in the bucket identified by `key`.
    #[must_use]
    pub fn cell(&self, key: GridCellKey) -> &[GeoCoordinate] {
        self.cells
            .get(&key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Iterator over every non-empty bucket.
    pub fn cells(&self) -> impl Iterator<Item = (GridCellKey, &[GeoCoordinate])> {
        self.cells
            .iter()
            .map(|(key, locations)| (*key, locations.as_slice()))
    }

    /// Total number of remembered locations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }

    /// Reports whether no location has been remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Forgets every remembered location.
    pub fn clear(&mut self) {
        self.cells.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyworld_core::{Genre, Rarity};

    fn placement(location: GeoCoordinate) -> PlacementRecord {
        PlacementRecord::new(Genre::Drama, Rarity::Common, location)
    }

    #[test]
    fn cell_key_truncates_towards_zero() {
        let dedup = SpatialGridDedup::default();
        let key = dedup.cell_key(GeoCoordinate::new(0.0005, -0.0005));
        // 0.0005 degrees is roughly 55 m, inside the first bucket on both sides of zero.
        assert_eq!((key.row(), key.column()), (0, 0));
    }

    #[test]
    fn rejects_close_placement_in_same_cell() {
        let mut dedup = SpatialGridDedup::new(Config::new(100.0, 30.0).expect("valid config"));
        let origin = GeoCoordinate::new(0.0002, 0.0002);
        let near = origin.offset_north(10.0);
        assert_eq!(dedup.cell_key(origin), dedup.cell_key(near));

        assert!(dedup.accept(&placement(origin)));
        assert!(!dedup.accept(&placement(near)));
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn accepts_placement_at_exact_minimum_distance() {
        let mut dedup = SpatialGridDedup::new(Config::new(1_000.0, 20.0).expect("valid config"));
        let origin = GeoCoordinate::new(10.0001, 20.0001);
        let exact = origin.offset_north(20.0 + 1e-7);
        assert!(dedup.accept_location(origin));
        assert!(dedup.accept_location(exact));
    }

    #[test]
    fn forgotten_locations_free_their_cell() {
        let mut dedup = SpatialGridDedup::new(Config::new(100.0, 30.0).expect("valid config"));
        let origin = GeoCoordinate::new(0.0002, 0.0002);
        let near = origin.offset_north(10.0);

        assert!(dedup.accept(&placement(origin)));
        assert!(dedup.forget(&placement(origin)));
        assert!(!dedup.forget(&placement(origin)));
        assert!(dedup.is_empty());
        assert!(dedup.accept(&placement(near)));
    }

    #[test]
    fn neighbouring_cells_do_not_interact() {
        let mut dedup = SpatialGridDedup::new(Config::new(100.0, 50.0).expect("valid config"));
        let south = GeoCoordinate::new(0.000_85, 10.0);
        let north = GeoCoordinate::new(0.000_95, 10.0);
        assert_ne!(dedup.cell_key(south), dedup.cell_key(north));

        assert!(dedup.accept_location(south));
        assert!(dedup.accept_location(north));
    }

    #[test]
    fn clear_forgets_everything() {
        let mut dedup = SpatialGridDedup::default();
        let location = GeoCoordinate::new(1.0, 1.0);
        assert!(dedup.accept_location(location));
        dedup.clear();
        assert!(dedup.is_empty());
        assert!(dedup.accept_location(location));
    }

    #[test]
    fn remembered_placements_block_new_ones() {
        let mut dedup = SpatialGridDedup::default();
        let location = GeoCoordinate::new(51.51, -0.12);
        dedup.remember(&placement(location));
        assert!(!dedup.is_far_enough(location.offset_north(5.0)));
    }

    #[test]
    fn config_rejects_invalid_lengths() {
        assert!(Config::new(0.0, 10.0).is_err());
        assert!(Config::new(100.0, -1.0).is_err());
        assert!(Config::new(f64::NAN, 10.0).is_err());
        assert!(Config::new(100.0, 0.0).is_ok());
    }
}
