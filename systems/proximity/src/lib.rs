#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Distance gate deciding how a player may interact with a tapped placement.

use storyworld_core::{ConfigurationError, GeoCoordinate, InteractionTier};
use tracing::debug;

/// Default radius inside which a placement can be collected directly.
pub const DEFAULT_NEAR_RADIUS_METERS: f64 = 50.0;

/// Default radius inside which premium players can collect.
pub const DEFAULT_FAR_RADIUS_METERS: f64 = 200.0;

/// Configuration parameters required to construct the classifier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    near_radius_meters: f64,
    far_radius_meters: f64,
}

impl Config {
    /// Creates a configuration, requiring `0 <= near <= far`.
    pub fn new(
        near_radius_meters: f64,
        far_radius_meters: f64,
    ) -> Result<Self, ConfigurationError> {
        let valid = near_radius_meters.is_finite()
            && far_radius_meters.is_finite()
            && near_radius_meters >= 0.0
            && near_radius_meters <= far_radius_meters;
        if !valid {
            return Err(ConfigurationError::InvalidRadii {
                near: near_radius_meters,
                far: far_radius_meters,
            });
        }
        Ok(Self {
            near_radius_meters,
            far_radius_meters,
        })
    }

    /// Radius for direct collection.
    #[must_use]
    pub const fn near_radius_meters(&self) -> f64 {
        self.near_radius_meters
    }

    /// Radius for premium collection.
    #[must_use]
    pub const fn far_radius_meters(&self) -> f64 {
        self.far_radius_meters
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            near_radius_meters: DEFAULT_NEAR_RADIUS_METERS,
            far_radius_meters: DEFAULT_FAR_RADIUS_METERS,
        }
    }
}

/// Classifies taps by the great-circle distance between player and placement.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProximityClassifier {
    config: Config,
}

impl ProximityClassifier {
    /// Creates a classifier using the supplied radii.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Configuration the classifier was built with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Tier granted to a player at `player` tapping a placement at `target`.
    #[must_use]
    pub fn classify(&self, player: GeoCoordinate, target: GeoCoordinate) -> InteractionTier {
        let distance = player.distance_to(target);
        let tier = self.classify_distance(distance);
        debug!(distance_m = distance, ?tier, "tap classified");
        tier
    }

    /// Tier for a precomputed distance in meters. Both radii are inclusive.
    #[must_use]
    pub fn classify_distance(&self, distance_meters: f64) -> InteractionTier {
        if distance_meters <= self.config.near_radius_meters {
            InteractionTier::Direct
        } else if distance_meters <= self.config.far_radius_meters {
            InteractionTier::PremiumRequired
        } else {
            InteractionTier::AdRequired
        }
    }
}
