use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

mod client;
mod parse;
mod query;

pub use client::{HttpRemote, RemoteApi};
pub use parse::{parse_certifications, parse_genres, parse_movies};
pub use query::{QueryBuilder, RequestDescriptor, DEFAULT_BASE};
pub use query::{
    PARAM_API_KEY, PARAM_CERTIFICATION, PARAM_CERTIFICATION_CEILING, PARAM_COUNTRY, PARAM_GENRE,
    PARAM_RELEASE_YEAR, PARAM_SORT, PARAM_VOTE_FLOOR,
};

use crate::error::{CatalogError, CatalogResult};
use crate::models::{Certification, FilterCriteria, Genre, Movie};

/// Result of a fetch that never fails outright: a failure yields no items plus the error.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub items: Vec<T>,
    pub error: Option<CatalogError>,
}

impl<T> Fetched<T> {
    pub fn ok(items: Vec<T>) -> Self {
        Self { items, error: None }
    }

    pub fn failed(error: CatalogError) -> Self {
        Self {
            items: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    fn from_result(result: CatalogResult<Vec<T>>) -> Self {
        match result {
            Ok(items) => Self::ok(items),
            Err(e) => Self::failed(e),
        }
    }
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_movies(&self, criteria: &FilterCriteria) -> Fetched<Movie>;
    async fn fetch_genres(&self) -> Fetched<Genre>;
    async fn fetch_certifications(&self) -> Fetched<Certification>;
}

/// Composes query building, the remote GET, and parsing.
#[derive(Clone)]
pub struct CatalogFetcher {
    remote: Arc<dyn RemoteApi>,
    queries: QueryBuilder,
}

impl CatalogFetcher {
    pub fn new(remote: Arc<dyn RemoteApi>, queries: QueryBuilder) -> Self {
        Self { remote, queries }
    }

    pub fn queries(&self) -> &QueryBuilder {
        &self.queries
    }

    async fn get_parsed<T: Send>(
        &self,
        request: &RequestDescriptor,
        parse: fn(&[u8]) -> CatalogResult<Vec<T>>,
    ) -> CatalogResult<Vec<T>> {
        info!("GET {}", request.redacted_url());
        let body = self.remote.get(&request.to_url()).await?;
        parse(&body)
    }
}

#[async_trait]
impl CatalogSource for CatalogFetcher {
    async fn fetch_movies(&self, criteria: &FilterCriteria) -> Fetched<Movie> {
        let request = self.queries.build(criteria);
        let fetched = Fetched::from_result(self.get_parsed(&request, parse_movies).await);
        match &fetched.error {
            None => info!("Fetched {} movies", fetched.items.len()),
            Some(e) => warn!("Movie fetch failed: {}", e),
        }
        fetched
    }

    async fn fetch_genres(&self) -> Fetched<Genre> {
        let request = self.queries.genre_list();
        let fetched = Fetched::from_result(self.get_parsed(&request, parse_genres).await);
        if let Some(e) = &fetched.error {
            warn!("Genre fetch failed: {}", e);
        }
        fetched
    }

    async fn fetch_certifications(&self) -> Fetched<Certification> {
        let request = self.queries.certification_list();
        let fetched = Fetched::from_result(self.get_parsed(&request, parse_certifications).await);
        if let Some(e) = &fetched.error {
            warn!("Certification fetch failed: {}", e);
        }
        fetched
    }
}
