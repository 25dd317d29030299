use std::{collections::BTreeSet, f64::consts::PI, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::{GeoCoordinate, EARTH_CIRCUMFERENCE_METERS};

/// Deepest zoom level accepted by [`TileCoordinate`].
pub const MAX_ZOOM: u8 = 30;

const KEY_DELIMITER: char = '-';

/// Number of tiles along each axis at the provided zoom level.
#[must_use]
pub const fn tiles_per_axis(zoom: u8) -> u64 {
    1_u64 << zoom
}

/// Width of a tile at the equator for the provided zoom level, in meters.
#[must_use]
pub fn meters_per_tile(zoom: u8) -> f64 {
    EARTH_CIRCUMFERENCE_METERS / tiles_per_axis(zoom) as f64
}

/// Reasons a tile coordinate or tile key may be rejected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TileKeyError {
    /// The key did not contain exactly three `-` separated integers.
    #[error("tile key '{0}' is not of the form x-y-z")]
    Malformed(String),
    /// The zoom level exceeds [`MAX_ZOOM`].
    #[error("zoom level {0} exceeds the deepest supported zoom")]
    ZoomTooDeep(u32),
    /// One of the indices lies outside `0..2^z`.
    #[error("tile index ({x}, {y}) is outside the grid at zoom {z}")]
    OutOfRange {
        /// Requested column.
        x: u32,
        /// Requested row.
        y: u32,
        /// Requested zoom level.
        z: u8,
    },
}

/// Address of a single Web Mercator slippy-map tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoordinate {
    x: u32,
    y: u32,
    z: u8,
}

/// Geographic rectangle covered by a tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileBounds {
    /// Southern edge in degrees.
    pub min_latitude: f64,
    /// Northern edge in degrees.
    pub max_latitude: f64,
    /// Western edge in degrees.
    pub min_longitude: f64,
    /// Eastern edge in degrees.
    pub max_longitude: f64,
}

impl TileBounds {
    /// Reports whether `coordinate` lies inside the bounds, edges included.
    #[must_use]
    pub fn contains(&self, coordinate: GeoCoordinate) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&coordinate.latitude())
            && (self.min_longitude..=self.max_longitude).contains(&coordinate.longitude())
    }
}

impl TileCoordinate {
    /// Creates a tile coordinate, validating the indices against the zoom level.
    pub fn new(x: u32, y: u32, z: u8) -> Result<Self, TileKeyError> {
        if z > MAX_ZOOM {
            return Err(TileKeyError::ZoomTooDeep(u32::from(z)));
        }
        let limit = tiles_per_axis(z);
        if u64::from(x) >= limit || u64::from(y) >= limit {
            return Err(TileKeyError::OutOfRange { x, y, z });
        }
        Ok(Self { x, y, z })
    }

    /// Returns the tile containing `coordinate` at `zoom`.
    ///
    /// Indices are clamped into the grid, so longitudes of exactly 180 degrees
    /// and latitudes beyond the Mercator limit land on the outermost tiles.
    /// Zoom levels deeper than [`MAX_ZOOM`] are clamped to it.
    #[must_use]
    pub fn containing(coordinate: GeoCoordinate, zoom: u8) -> Self {
        let z = zoom.min(MAX_ZOOM);
        let n = tiles_per_axis(z) as f64;
        let lat = coordinate.latitude().to_radians();
        let x = (coordinate.longitude() + 180.0) / 360.0 * n;
        let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * n;
        Self {
            x: clamp_index(x, z),
            y: clamp_index(y, z),
            z,
        }
    }

    /// Column index.
    #[must_use]
    pub const fn x(&self) -> u32 {
        self.x
    }

    /// Row index, growing southwards.
    #[must_use]
    pub const fn y(&self) -> u32 {
        self.y
    }

    /// Zoom level.
    #[must_use]
    pub const fn z(&self) -> u8 {
        self.z
    }

    /// Geographic center of the tile.
    #[must_use]
    pub fn center(&self) -> GeoCoordinate {
        GeoCoordinate::new(
            latitude_of_row(f64::from(self.y) + 0.5, self.z),
            longitude_of_column(f64::from(self.x) + 0.5, self.z),
        )
    }

    /// Geographic rectangle covered by the tile.
    #[must_use]
    pub fn bounds(&self) -> TileBounds {
        let x = f64::from(self.x);
        let y = f64::from(self.y);
        TileBounds {
            min_latitude: latitude_of_row(y + 1.0, self.z),
            max_latitude: latitude_of_row(y, self.z),
            min_longitude: longitude_of_column(x, self.z),
            max_longitude: longitude_of_column(x + 1.0, self.z),
        }
    }

    /// Canonical `x-y-z` key used by the persisted cache.
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.x, self.y, self.z)
    }
}

impl FromStr for TileCoordinate {
    type Err = TileKeyError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let malformed = || TileKeyError::Malformed(key.to_owned());
        let mut parts = key.trim().split(KEY_DELIMITER);
        let x = parts.next().ok_or_else(malformed)?;
        let y = parts.next().ok_or_else(malformed)?;
        let z = parts.next().ok_or_else(malformed)?;
        if parts.next().is_some() {
            return Err(malformed());
        }

        let x = x.parse::<u32>().map_err(|_| malformed())?;
        let y = y.parse::<u32>().map_err(|_| malformed())?;
        let z = z.parse::<u32>().map_err(|_| malformed())?;
        let z = u8::try_from(z)
            .ok()
            .filter(|z| *z <= MAX_ZOOM)
            .ok_or(TileKeyError::ZoomTooDeep(z))?;
        Self::new(x, y, z)
    }
}

/// Geographic center of tile `(x, y)` at `zoom`.
pub fn center_of(x: u32, y: u32, zoom: u8) -> Result<GeoCoordinate, TileKeyError> {
    TileCoordinate::new(x, y, zoom).map(|tile| tile.center())
}

/// Enumerates the tiles around `center` that cover a square of `side_length_meters`.
///
/// The tile radius is `ceil((side / 2) / meters_per_tile(zoom))`, using the
/// equatorial tile width, and the window is clamped to the grid.
#[must_use]
pub fn tiles_covering(
    center: GeoCoordinate,
    side_length_meters: f64,
    zoom: u8,
) -> BTreeSet<TileCoordinate> {
    let center_tile = TileCoordinate::containing(center, zoom);
    let z = center_tile.z;
    let half_side = (side_length_meters / 2.0).max(0.0);
    let delta = (half_side / meters_per_tile(z)).ceil();
    let delta = if delta.is_finite() { delta as i64 } else { 0 };

    let last = tiles_per_axis(z) as i64 - 1;
    let (x_min, x_max) = window(i64::from(center_tile.x), delta, last);
    let (y_min, y_max) = window(i64::from(center_tile.y), delta, last);

    let mut tiles = BTreeSet::new();
    for x in x_min..=x_max {
        for y in y_min..=y_max {
            // Both indices were clamped into 0..2^z, which fits in u32 for z <= 30.
            let _ = tiles.insert(TileCoordinate {
                x: x as u32,
                y: y as u32,
                z,
            });
        }
    }
    tiles
}

fn window(center: i64, delta: i64, last: i64) -> (i64, i64) {
    (
        center.saturating_sub(delta).max(0),
        center.saturating_add(delta).min(last),
    )
}

fn clamp_index(value: f64, zoom: u8) -> u32 {
    let last = (tiles_per_axis(zoom) - 1) as f64;
    if value.is_nan() {
        return 0;
    }
    value.floor().clamp(0.0, last) as u32
}

fn longitude_of_column(column: f64, zoom: u8) -> f64 {
    column / tiles_per_axis(zoom) as f64 * 360.0 - 180.0
}

fn latitude_of_row(row: f64, zoom: u8) -> f64 {
    let n = tiles_per_axis(zoom) as f64;
    (PI * (1.0 - 2.0 * row / n)).sinh().atan().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_island_lands_on_the_grid_midpoint() {
        let tile = TileCoordinate::containing(GeoCoordinate::new(0.0, 0.0), 1);
        assert_eq!((tile.x(), tile.y(), tile.z()), (1, 1, 1));
    }

    #[test]
    fn zoom_zero_has_a_single_tile() {
        let tile = TileCoordinate::containing(GeoCoordinate::new(48.85, 2.35), 0);
        assert_eq!((tile.x(), tile.y()), (0, 0));
        let bounds = tile.bounds();
        assert!((bounds.min_longitude + 180.0).abs() < 1e-9);
        assert!((bounds.max_longitude - 180.0).abs() < 1e-9);
        assert!((bounds.max_latitude - 85.051_128_78).abs() < 1e-6);
    }

    #[test]
    fn antimeridian_is_clamped_into_grid() {
        let tile = TileCoordinate::containing(GeoCoordinate::new(10.0, 180.0), 4);
        assert_eq!(tile.x(), 15);
    }

    #[test]
    fn key_uses_x_y_z_order() {
        let tile = TileCoordinate::new(223_534, 101_612, 18).expect("valid tile");
        assert_eq!(tile.key(), "223534-101612-18");
    }

    #[test]
    fn parses_canonical_key() {
        let tile: TileCoordinate = "3-5-4".parse().expect("valid key");
        assert_eq!(tile, TileCoordinate::new(3, 5, 4).expect("valid tile"));
    }

    #[test]
    fn rejects_malformed_keys() {
        for key in ["", "1-2", "1-2-3-4", "a-2-3", "-1-2-3"] {
            assert!(
                matches!(key.parse::<TileCoordinate>(), Err(TileKeyError::Malformed(_))),
                "{key} should be malformed"
            );
        }
    }

    #[test]
    fn rejects_out_of_range_indices() {
        assert_eq!(
            "4-0-2".parse::<TileCoordinate>(),
            Err(TileKeyError::OutOfRange { x: 4, y: 0, z: 2 })
        );
        assert_eq!(
            "0-0-31".parse::<TileCoordinate>(),
            Err(TileKeyError::ZoomTooDeep(31))
        );
    }

    #[test]
    fn center_of_validates_indices() {
        assert!(center_of(0, 0, 0).is_ok());
        assert!(center_of(2, 0, 1).is_err());
    }

    #[test]
    fn meters_per_tile_halves_per_zoom() {
        assert!((meters_per_tile(0) - EARTH_CIRCUMFERENCE_METERS).abs() < 1e-6);
        assert!((meters_per_tile(18) * 2.0 - meters_per_tile(17)).abs() < 1e-9);
    }

    #[test]
    fn zero_side_covers_only_the_center_tile() {
        let center = GeoCoordinate::new(37.5665, 126.9780);
        let tiles = tiles_covering(center, 0.0, 18);
        assert_eq!(tiles.len(), 1);
        assert!(tiles.contains(&TileCoordinate::containing(center, 18)));
    }

    #[test]
    fn covering_is_clamped_at_grid_corner() {
        let corner = GeoCoordinate::new(85.0, -179.99);
        let tiles = tiles_covering(corner, meters_per_tile(3) * 2.0, 3);
        // delta = 1, so only the corner tile and its in-grid neighbours remain.
        assert_eq!(tiles.len(), 4);
        assert!(tiles.iter().all(|tile| tile.x() <= 1 && tile.y() <= 1));
    }
}
