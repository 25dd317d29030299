//! TOML configuration for the command-line host.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::Deserialize;
use storyworld_core::ConfigurationError;
use storyworld_system_catalog as catalog;
use storyworld_system_dedup as dedup;
use storyworld_system_placement as placement;
use storyworld_system_proximity as proximity;
use storyworld_system_scanning as scanning;
use storyworld_world::DEFAULT_TTL;

/// File consulted when no configuration path is given.
pub(crate) const DEFAULT_CONFIG_FILE: &str = "storyworld.toml";

/// Every tunable of the engine, grouped by the system that consumes it.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct AppConfig {
    pub(crate) storage: StorageSection,
    pub(crate) scan: ScanSection,
    pub(crate) placement: PlacementSection,
    pub(crate) spacing: SpacingSection,
    pub(crate) proximity: ProximitySection,
    pub(crate) cache: CacheSection,
    pub(crate) catalog: CatalogSection,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct StorageSection {
    pub(crate) directory: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(".storyworld"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ScanSection {
    pub(crate) zoom: u8,
    pub(crate) side_length_meters: f64,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            zoom: scanning::DEFAULT_ZOOM,
            side_length_meters: scanning::DEFAULT_SIDE_LENGTH_METERS,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct PlacementSection {
    pub(crate) generation_probability: f64,
}

impl Default for PlacementSection {
    fn default() -> Self {
        Self {
            generation_probability: placement::DEFAULT_GENERATION_PROBABILITY,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct SpacingSection {
    pub(crate) grid_size_meters: f64,
    pub(crate) min_distance_meters: f64,
}

impl Default for SpacingSection {
    fn default() -> Self {
        Self {
            grid_size_meters: dedup::DEFAULT_GRID_SIZE_METERS,
            min_distance_meters: dedup::DEFAULT_MIN_DISTANCE_METERS,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ProximitySection {
    pub(crate) near_radius_meters: f64,
    pub(crate) far_radius_meters: f64,
}

impl Default for ProximitySection {
    fn default() -> Self {
        Self {
            near_radius_meters: proximity::DEFAULT_NEAR_RADIUS_METERS,
            far_radius_meters: proximity::DEFAULT_FAR_RADIUS_METERS,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct CacheSection {
    pub(crate) ttl_seconds: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL.as_secs(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct CatalogSection {
    pub(crate) api_key: Option<String>,
    pub(crate) base_url: String,
    pub(crate) timeout_seconds: u64,
    pub(crate) max_pages: u32,
    pub(crate) max_attempts: u32,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: catalog::DEFAULT_BASE_URL.to_owned(),
            timeout_seconds: catalog::DEFAULT_TIMEOUT.as_secs(),
            max_pages: catalog::DEFAULT_MAX_PAGES,
            max_attempts: catalog::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl AppConfig {
    /// Loads `path`, or the default file when present, or built-in defaults.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    tracing::debug!("no configuration file found, using defaults");
                    return Ok(Self::default());
                }
                fallback
            }
        };
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parses a TOML document; missing sections and keys take their defaults.
    pub(crate) fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub(crate) fn scanning(&self) -> Result<scanning::Config, ConfigurationError> {
        scanning::Config::new(self.scan.zoom, self.scan.side_length_meters)
    }

    pub(crate) fn placement(&self) -> Result<placement::Config, ConfigurationError> {
        placement::Config::new(self.placement.generation_probability)
    }

    pub(crate) fn spacing(&self) -> Result<dedup::Config, ConfigurationError> {
        dedup::Config::new(
            self.spacing.grid_size_meters,
            self.spacing.min_distance_meters,
        )
    }

    pub(crate) fn proximity(&self) -> Result<proximity::Config, ConfigurationError> {
        proximity::Config::new(
            self.proximity.near_radius_meters,
            self.proximity.far_radius_meters,
        )
    }

    pub(crate) fn cache_ttl(&self) -> Result<Duration, ConfigurationError> {
        if self.cache.ttl_seconds == 0 {
            return Err(ConfigurationError::ZeroLimit("cache.ttl_seconds"));
        }
        Ok(Duration::from_secs(self.cache.ttl_seconds))
    }

    pub(crate) fn catalog(&self) -> Result<catalog::Config, ConfigurationError> {
        catalog::Config::new(self.catalog.max_pages, self.catalog.max_attempts)
    }

    pub(crate) fn catalog_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog.timeout_seconds)
    }

    /// Validates every section, failing on the first invalid one.
    pub(crate) fn validate(&self) -> Result<(), ConfigurationError> {
        let _ = self.scanning()?;
        let _ = self.placement()?;
        let _ = self.spacing()?;
        let _ = self.proximity()?;
        let _ = self.cache_ttl()?;
        let _ = self.catalog()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = AppConfig::parse("").expect("valid config");
        assert_eq!(config, AppConfig::default());
        config.validate().expect("defaults are valid");
        assert_eq!(config.cache_ttl(), Ok(Duration::from_secs(6 * 60 * 60)));
        assert_eq!(config.scanning(), Ok(scanning::Config::default()));
    }

    #[test]
    fn sections_override_individual_keys() {
        let config = AppConfig::parse(
            r#"
            [scan]
            zoom = 17

            [proximity]
            far_radius_meters = 500.0

            [catalog]
            api_key = "abc"
            max_attempts = 3
            "#,
        )
        .expect("valid config");

        assert_eq!(config.scan.zoom, 17);
        assert_eq!(config.scan.side_length_meters, 1_240.0);
        assert_eq!(config.proximity.near_radius_meters, 50.0);
        assert_eq!(config.proximity.far_radius_meters, 500.0);
        assert_eq!(config.catalog.api_key.as_deref(), Some("abc"));
        assert_eq!(config.catalog().map(|c| c.max_attempts()), Ok(3));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(AppConfig::parse("[scan]\nzooom = 3\n").is_err());
    }

    #[test]
    fn invalid_values_fail_validation() {
        let config = AppConfig::parse("[proximity]\nnear_radius_meters = 300.0\n")
            .expect("well-formed config");
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidRadii { .. })
        ));

        let config = AppConfig::parse("[cache]\nttl_seconds = 0\n").expect("well-formed config");
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::ZeroLimit("cache.ttl_seconds"))
        );
    }

    #[test]
    fn load_reads_explicit_paths() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[placement]\ngeneration_probability = 0.25\n").expect("write");

        let config = AppConfig::load(Some(&path)).expect("loads");
        assert_eq!(config.placement.generation_probability, 0.25);
        assert!(AppConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
