//! HTTP catalog source speaking the TMDb discover API.

use std::{fmt, future::Future, time::Duration};

use serde::Deserialize;
use storyworld_core::{CatalogItem, CatalogPage};

use crate::{CatalogError, CatalogSource};

/// Public TMDb API root.
pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";

/// Image root that relative poster paths are resolved against.
pub const POSTER_BASE_URL: &str = "https://image.tmdb.org/t/p/w500";

/// Client-side timeout applied to every request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Catalog backed by `GET {base}/discover/movie`.
pub struct TmdbCatalog {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TmdbCatalog {
    /// Creates a source talking to the public API.
    pub fn new(api_key: impl Into<String>) -> Result<Self, CatalogError> {
        Self::with_endpoint(api_key, DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    /// Creates a source talking to `base_url` with a custom request timeout.
    pub fn with_endpoint(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| CatalogError::Transport(error.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
        })
    }

    /// API root requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl fmt::Debug for TmdbCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TmdbCatalog")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl CatalogSource for TmdbCatalog {
    fn fetch_page(
        &self,
        genre_ids: &[u32],
        page: u32,
    ) -> impl Future<Output = Result<CatalogPage, CatalogError>> + Send {
        let with_genres = genre_ids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let page = page.to_string();
        let request = self
            .client
            .get(format!("{}/discover/movie", self.base_url))
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("with_genres", with_genres.as_str()),
                ("page", page.as_str()),
            ]);

        async move {
            let response = request.send().await.map_err(transport_error)?;
            let status = response.status();
            if !status.is_success() {
                return Err(CatalogError::Status(status.as_u16()));
            }
            let body = response.bytes().await.map_err(transport_error)?;
            parse_discover_response(&body)
        }
    }
}

fn transport_error(error: reqwest::Error) -> CatalogError {
    if error.is_timeout() {
        CatalogError::Timeout
    } else {
        CatalogError::Transport(error.to_string())
    }
}

#[derive(Deserialize)]
struct DiscoverResponse {
    results: Vec<DiscoverMovie>,
    #[serde(default = "single_page")]
    total_pages: u32,
}

#[derive(Deserialize)]
struct DiscoverMovie {
    id: u64,
    title: String,
    #[serde(default)]
    overview: String,
    #[serde(default)]
    genre_ids: Vec<u32>,
    poster_path: Option<String>,
}

fn single_page() -> u32 {
    1
}

/// Decodes a discover response body.
pub fn parse_discover_response(body: &[u8]) -> Result<CatalogPage, CatalogError> {
    let response: DiscoverResponse =
        serde_json::from_slice(body).map_err(|error| CatalogError::Decode(error.to_string()))?;
    Ok(CatalogPage {
        total_pages: response.total_pages,
        items: response
            .results
            .into_iter()
            .map(|movie| CatalogItem {
                id: movie.id,
                title: movie.title,
                overview: movie.overview,
                genre_ids: movie.genre_ids,
                poster_path: movie.poster_path,
            })
            .collect(),
    })
}

/// Absolute image URL for a relative poster path.
#[must_use]
pub fn poster_url(poster_path: &str) -> String {
    format!("{POSTER_BASE_URL}{poster_path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_discover_pages() {
        let body = br#"{
            "page": 1,
            "total_pages": 812,
            "total_results": 16223,
            "results": [
                {
                    "id": 603,
                    "title": "The Matrix",
                    "overview": "Set in the 22nd century...",
                    "genre_ids": [28, 878],
                    "poster_path": "/f89U3ADr1oiB1s9GkdPOEpXUk5H.jpg",
                    "vote_average": 8.2
                },
                {
                    "id": 42,
                    "title": "Untitled",
                    "overview": "",
                    "genre_ids": [],
                    "poster_path": null
                }
            ]
        }"#;

        let page = parse_discover_response(body).expect("valid body");
        assert_eq!(page.total_pages, 812);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].genre_ids, vec![28, 878]);
        assert_eq!(
            page.items[0].poster_path.as_deref(),
            Some("/f89U3ADr1oiB1s9GkdPOEpXUk5H.jpg")
        );
        assert_eq!(page.items[1].poster_path, None);
    }

    #[test]
    fn missing_page_count_means_a_single_page() {
        let page = parse_discover_response(br#"{"results": []}"#).expect("valid body");
        assert_eq!(page.total_pages, 1);
        assert!(page.items.is_empty());
    }

    #[test]
    fn malformed_bodies_are_decode_errors() {
        assert!(matches!(
            parse_discover_response(b"<html>rate limited</html>"),
            Err(CatalogError::Decode(_))
        ));
        assert!(matches!(
            parse_discover_response(br#"{"results": [{"title": "no id"}]}"#),
            Err(CatalogError::Decode(_))
        ));
    }

    #[test]
    fn poster_paths_resolve_against_the_image_root() {
        assert_eq!(
            poster_url("/abc.jpg"),
            "https://image.tmdb.org/t/p/w500/abc.jpg"
        );
    }
}
