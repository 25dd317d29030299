#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Materializes collected placements into concrete catalog items.
//!
//! A placement only knows its genre and rarity. When the player collects it,
//! the resolver picks a random page of the remote catalog for that genre and
//! a random item with artwork from that page. Resolution never touches the
//! world; the caller persists the result by applying `Command::Collect`.

mod tmdb;

use std::future::Future;

use rand::{seq::SliceRandom, Rng};
use storyworld_core::{
    CatalogItem, CatalogPage, ConfigurationError, OwnedCollectible, PlacementRecord,
};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use tmdb::{
    parse_discover_response, poster_url, TmdbCatalog, DEFAULT_BASE_URL, DEFAULT_TIMEOUT,
    POSTER_BASE_URL,
};

/// Default upper bound on the pages the resolver draws from.
pub const DEFAULT_MAX_PAGES: u32 = 500;

/// Default number of attempts per resolve, i.e. one retry.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Failure of a single catalog request.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The request could not be sent or the response could not be read.
    #[error("catalog request failed: {0}")]
    Transport(String),
    /// The catalog answered with a non-success status code.
    #[error("catalog responded with status {0}")]
    Status(u16),
    /// The response body did not match the expected layout.
    #[error("catalog response could not be decoded: {0}")]
    Decode(String),
    /// The request exceeded the client-side timeout.
    #[error("catalog request timed out")]
    Timeout,
    /// The selected page held no item with artwork.
    #[error("catalog page {page} held no item with artwork")]
    NoCandidates {
        /// Page that was inspected.
        page: u32,
    },
}

/// Failure of a whole resolve.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Every attempt failed.
    #[error("no catalog item resolved after {attempts} attempt(s)")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Cause of the final failed attempt.
        #[source]
        last: CatalogError,
    },
}

/// Paginated remote catalog.
pub trait CatalogSource: Send + Sync {
    /// Fetches one page of items matching any of `genre_ids`. Pages start at 1.
    fn fetch_page(
        &self,
        genre_ids: &[u32],
        page: u32,
    ) -> impl Future<Output = Result<CatalogPage, CatalogError>> + Send;
}

/// Configuration parameters required to construct the resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    max_pages: u32,
    max_attempts: u32,
}

impl Config {
    /// Creates a configuration; both limits must be at least one.
    pub fn new(max_pages: u32, max_attempts: u32) -> Result<Self, ConfigurationError> {
        if max_pages == 0 {
            return Err(ConfigurationError::ZeroLimit("max_pages"));
        }
        if max_attempts == 0 {
            return Err(ConfigurationError::ZeroLimit("max_attempts"));
        }
        Ok(Self {
            max_pages,
            max_attempts,
        })
    }

    /// Highest page number the resolver will request.
    #[must_use]
    pub const fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// Attempts made before a resolve gives up.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Turns collected placements into owned collectibles using a [`CatalogSource`].
#[derive(Debug)]
pub struct CatalogResolver<C> {
    source: C,
    config: Config,
}

impl<C: CatalogSource> CatalogResolver<C> {
    /// Creates a resolver over `source`.
    #[must_use]
    pub const fn new(source: C, config: Config) -> Self {
        Self { source, config }
    }

    /// Catalog the resolver draws from.
    #[must_use]
    pub const fn source(&self) -> &C {
        &self.source
    }

    /// Configuration the resolver was built with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Picks a random catalog item matching the placement's genre.
    ///
    /// Page 1 is fetched once to learn the page count. Each attempt then
    /// fetches a random page (reusing page 1 when it is drawn again) and
    /// picks a random item with artwork. Any failure, including a failed
    /// first request, consumes one attempt.
    pub async fn resolve<R>(
        &self,
        placement: &PlacementRecord,
        rng: &mut R,
    ) -> Result<OwnedCollectible, ResolveError>
    where
        R: Rng + ?Sized,
    {
        let genre_ids = placement.genre().catalog_ids();
        let mut first_page: Option<CatalogPage> = None;
        let mut attempt = 1;
        loop {
            let first = match first_page.take() {
                Some(page) => Ok(page),
                None => self.source.fetch_page(genre_ids, 1).await,
            };
            let outcome = match first {
                Ok(page) => {
                    let drawn = self.draw(genre_ids, &page, rng).await;
                    first_page = Some(page);
                    drawn
                }
                Err(error) => Err(error),
            };

            match outcome {
                Ok(item) => {
                    info!(id = item.id, title = %item.title, attempt, "catalog item resolved");
                    return Ok(OwnedCollectible {
                        id: item.id,
                        title: item.title,
                        genre: placement.genre(),
                        rarity: placement.rarity(),
                        location: placement.location(),
                        poster_ref: item.poster_path,
                    });
                }
                Err(error) if attempt < self.config.max_attempts => {
                    warn!(%error, attempt, "catalog attempt failed, retrying");
                    attempt += 1;
                }
                Err(error) => {
                    warn!(%error, attempt, "catalog attempts exhausted");
                    return Err(ResolveError::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }
            }
        }
    }

    async fn draw<R>(
        &self,
        genre_ids: &[u32],
        first_page: &CatalogPage,
        rng: &mut R,
    ) -> Result<CatalogItem, CatalogError>
    where
        R: Rng + ?Sized,
    {
        let pages = first_page.total_pages.clamp(1, self.config.max_pages);
        let page_number = rng.gen_range(1..=pages);
        debug!(pages, page_number, "catalog page drawn");

        let fetched;
        let items = if page_number == 1 {
            &first_page.items
        } else {
            fetched = self.source.fetch_page(genre_ids, page_number).await?;
            &fetched.items
        };

        let candidates: Vec<&CatalogItem> = items
            .iter()
            .filter(|item| item.poster_path.is_some())
            .collect();
        candidates
            .choose(rng)
            .map(|item| (*item).clone())
            .ok_or(CatalogError::NoCandidates { page: page_number })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_requires_positive_limits() {
        assert_eq!(
            Config::new(0, 2),
            Err(ConfigurationError::ZeroLimit("max_pages"))
        );
        assert_eq!(
            Config::new(500, 0),
            Err(ConfigurationError::ZeroLimit("max_attempts"))
        );
        assert_eq!(Config::new(500, 2), Ok(Config::default()));
    }

    #[test]
    fn exhaustion_reports_its_cause() {
        let error = ResolveError::Exhausted {
            attempts: 2,
            last: CatalogError::Status(503),
        };
        assert_eq!(
            error.to_string(),
            "no catalog item resolved after 2 attempt(s)"
        );
        let source = std::error::Error::source(&error).map(ToString::to_string);
        assert_eq!(
            source.as_deref(),
            Some("catalog responded with status 503")
        );
    }
}
