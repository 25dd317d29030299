use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine distance, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Equatorial circumference used to size slippy-map tiles, in meters.
pub const EARTH_CIRCUMFERENCE_METERS: f64 = 40_075_016.686;

/// Approximate length of one degree of latitude, in meters.
pub const METERS_PER_DEGREE_LATITUDE: f64 = 111_000.0;

/// Approximate length of one degree of longitude at the provided latitude.
#[must_use]
pub fn meters_per_degree_longitude(latitude: f64) -> f64 {
    METERS_PER_DEGREE_LATITUDE * latitude.to_radians().cos()
}

/// Point on the globe expressed in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    #[serde(rename = "lat")]
    latitude: f64,
    #[serde(rename = "lon")]
    longitude: f64,
}

impl GeoCoordinate {
    /// Creates a coordinate from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Latitude in degrees, positive north of the equator.
    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees, positive east of Greenwich.
    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Great-circle distance to `other` in meters.
    ///
    /// Placement spacing and tap gating both measure with this function so the
    /// two stay consistent with each other.
    #[must_use]
    pub fn distance_to(self, other: GeoCoordinate) -> f64 {
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();

        let a = (d_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_METERS * c
    }

    /// Returns the coordinate reached by moving `meters` due north (negative moves south).
    #[must_use]
    pub fn offset_north(self, meters: f64) -> Self {
        let degrees = (meters / EARTH_RADIUS_METERS).to_degrees();
        Self::new(self.latitude + degrees, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_to_self_is_zero() {
        let seoul = GeoCoordinate::new(37.5665, 126.9780);
        assert!(seoul.distance_to(seoul).abs() < 1e-9);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = GeoCoordinate::new(37.5665, 126.9780);
        let b = GeoCoordinate::new(37.5700, 126.9820);
        assert!((a.distance_to(b) - b.distance_to(a)).abs() < 1e-9);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let a = GeoCoordinate::new(0.0, 0.0);
        let b = GeoCoordinate::new(1.0, 0.0);
        let distance = a.distance_to(b);
        assert!((distance - 111_195.0).abs() < 10.0, "got {distance}");
    }

    #[test]
    fn offset_north_matches_haversine() {
        let origin = GeoCoordinate::new(37.5665, 126.9780);
        let moved = origin.offset_north(120.0);
        assert!((origin.distance_to(moved) - 120.0).abs() < 1e-6);
    }

    #[test]
    fn longitude_degrees_shrink_towards_poles() {
        assert!((meters_per_degree_longitude(0.0) - METERS_PER_DEGREE_LATITUDE).abs() < 1e-9);
        assert!(meters_per_degree_longitude(60.0) < METERS_PER_DEGREE_LATITUDE / 1.9);
    }
}
