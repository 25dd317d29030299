#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Procedural generation of collectible placements for map tiles.

use rand::Rng;
use storyworld_core::{
    ConfigurationError, GeoCoordinate, Genre, PlacementRecord, Rarity, TileCoordinate,
};
use storyworld_system_dedup::{self as dedup, SpatialGridDedup};
use storyworld_system_rarity::{genre_table, rarity_table, WeightedTable};
use tracing::debug;

/// Default chance that a tile receives a placement at all.
pub const DEFAULT_GENERATION_PROBABILITY: f64 = 0.6;

/// Configuration parameters required to construct the generator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    generation_probability: f64,
}

impl Config {
    /// Creates a configuration with the provided per-tile generation probability.
    pub fn new(generation_probability: f64) -> Result<Self, ConfigurationError> {
        if !(0.0..=1.0).contains(&generation_probability) {
            return Err(ConfigurationError::ProbabilityOutOfRange(
                generation_probability,
            ));
        }
        Ok(Self {
            generation_probability,
        })
    }

    /// Chance that a tile receives a placement.
    #[must_use]
    pub const fn generation_probability(&self) -> f64 {
        self.generation_probability
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            generation_probability: DEFAULT_GENERATION_PROBABILITY,
        }
    }
}

/// Generates zero or one placement per tile and filters them through the spacing grid.
#[derive(Clone, Debug)]
pub struct PlacementGenerator {
    config: Config,
    genres: WeightedTable<Genre>,
    rarities: WeightedTable<Rarity>,
    spacing: SpatialGridDedup,
}

impl PlacementGenerator {
    /// Creates a generator backed by the production genre and rarity tables.
    pub fn new(config: Config, spacing: dedup::Config) -> Result<Self, ConfigurationError> {
        Ok(Self::with_tables(
            config,
            genre_table()?,
            rarity_table()?,
            SpatialGridDedup::new(spacing),
        ))
    }

    /// Creates a generator from explicit tables and spacing index.
    #[must_use]
    pub fn with_tables(
        config: Config,
        genres: WeightedTable<Genre>,
        rarities: WeightedTable<Rarity>,
        spacing: SpatialGridDedup,
    ) -> Self {
        Self {
            config,
            genres,
            rarities,
            spacing,
        }
    }

    /// Configuration the generator was built with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Spacing index holding every placement accepted so far.
    #[must_use]
    pub const fn spacing(&self) -> &SpatialGridDedup {
        &self.spacing
    }

    /// Generates placements for every tile in `tiles`.
    ///
    /// Tiles that miss the probability roll or whose candidate is rejected by
    /// the spacing grid contribute nothing.
    pub fn generate<I, R>(&mut self, tiles: I, rng: &mut R) -> Vec<PlacementRecord>
    where
        I: IntoIterator<Item = TileCoordinate>,
        R: Rng + ?Sized,
    {
        tiles
            .into_iter()
            .filter_map(|tile| self.generate_tile(tile, rng))
            .collect()
    }

    /// Generates at most one placement inside `tile`.
    pub fn generate_tile<R>(
        &mut self,
        tile: TileCoordinate,
        rng: &mut R,
    ) -> Option<PlacementRecord>
    where
        R: Rng + ?Sized,
    {
        let roll = rng.gen::<f64>();
        if roll > self.config.generation_probability {
            return None;
        }

        // Uniform in degrees, not in area; tiles far from the equator get a
        // slight bias towards their poleward edge.
        let bounds = tile.bounds();
        let location = GeoCoordinate::new(
            rng.gen_range(bounds.min_latitude..bounds.max_latitude),
            rng.gen_range(bounds.min_longitude..bounds.max_longitude),
        );
        let genre = self.genres.sample_with(rng);
        let rarity = self.rarities.sample_with(rng);
        let record = PlacementRecord::new(genre, rarity, location);

        if !self.spacing.accept(&record) {
            return None;
        }

        debug!(%tile, %genre, %rarity, "generated placement");
        Some(record)
    }

    /// Forgets every accepted placement, e.g. after the tile cache was wiped.
    pub fn reset_spacing(&mut self) {
        self.spacing.clear();
    }

    /// Releases the spacing held by placements that never made it onto the map.
    pub fn forget_spacing<'a, I>(&mut self, records: I)
    where
        I: IntoIterator<Item = &'a PlacementRecord>,
    {
        for record in records {
            let _ = self.spacing.forget(record);
        }
    }

    /// Seeds the spacing index with placements that already exist on the map.
    pub fn prime_spacing<'a, I>(&mut self, records: I)
    where
        I: IntoIterator<Item = &'a PlacementRecord>,
    {
        for record in records {
            self.spacing.remember(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejects_probabilities_outside_unit_interval() {
        assert!(Config::new(-0.1).is_err());
        assert!(Config::new(1.5).is_err());
        assert!(Config::new(f64::NAN).is_err());
        assert!(Config::new(0.0).is_ok());
        assert!(Config::new(1.0).is_ok());
    }

    #[test]
    fn default_probability_is_sixty_percent() {
        let config = Config::default();
        assert!((config.generation_probability() - 0.6).abs() < f64::EPSILON);
    }
}
