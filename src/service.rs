//! Cached paper and citation-network service.
//!
//! [`PaperService`] is the entry point every surface (HTTP, MCP, CLI) uses.
//! Both resource classes go through one [`ResourceCache`], so concurrent
//! requests for the same paper or network share a single upstream
//! computation, and each class keeps its own freshness window.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::aggregate::{
    looks_like_id, AggregateError, Aggregator, CitationNetworkBuilder, PdfEnhancer,
};
use crate::config::Config;
use crate::models::{normalize_doi, CitationNetwork, Paper, SearchQuery, SearchResults};
use crate::sources::{SourceError, SourceRegistry};
use crate::utils::{
    sanitize_paper_id, validate_doi, CacheKey, CacheStats, CircuitBreakerManager, CircuitState,
    HttpClient, ResourceCache, TtlPolicy, ValidationError,
};

/// Errors surfaced to callers of the service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream sources unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Unavailable(_) => "unavailable",
            ServiceError::InvalidRequest(_) => "invalid_request",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl From<AggregateError> for ServiceError {
    fn from(err: AggregateError) -> Self {
        match err {
            AggregateError::NotFound(id) => ServiceError::NotFound(id),
            AggregateError::Unavailable(id) => ServiceError::Unavailable(format!(
                "no source could resolve '{}'",
                id
            )),
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::InvalidRequest(err.to_string())
    }
}

/// A value held by the resource cache
#[derive(Debug)]
enum Resource {
    Paper(Arc<Paper>),
    Network(Arc<CitationNetwork>),
}

/// Result of [`PaperService::lookup`]
#[derive(Debug, Clone)]
pub enum Lookup {
    Paper(Arc<Paper>),
    Search(SearchResults),
}

impl Lookup {
    /// Present either outcome as search results; a resolved id is a single hit.
    pub fn into_results(self) -> SearchResults {
        match self {
            Lookup::Paper(paper) => SearchResults::new(vec![Paper::clone(&paper)]),
            Lookup::Search(results) => results,
        }
    }
}

/// One source as reported by [`PaperService::status`]
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub id: String,
    pub name: String,
    pub capabilities: Vec<String>,
    pub circuit: CircuitState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub version: &'static str,
    pub sources: Vec<SourceStatus>,
    pub cache: CacheStats,
}

/// Cache id for a lookup: the id alone, or `id|doi` when a DOI hint is given
fn cache_id(id: &str, doi: Option<&str>) -> String {
    match doi {
        Some(doi) => format!("{}|{}", id, doi),
        None => id.to_string(),
    }
}

/// Cached front for lookups, citation networks and search
#[derive(Debug, Clone)]
pub struct PaperService {
    aggregator: Arc<Aggregator>,
    enhancer: Arc<PdfEnhancer>,
    network: Arc<CitationNetworkBuilder>,
    cache: ResourceCache<Resource, ServiceError>,
    sweep_interval: Option<Duration>,
}

impl PaperService {
    /// Build the HTTP adapters and everything around them from `config`.
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        let client = HttpClient::from_config(&config.timeouts)?;
        let registry = SourceRegistry::from_config(config, &client);
        Ok(Self::new(config, registry))
    }

    /// Wire the service around an existing registry.
    pub fn new(config: &Config, registry: SourceRegistry) -> Self {
        let breakers = Arc::new(CircuitBreakerManager::new(config.circuit_breaker.clone()));
        let aggregator = Aggregator::from_config(config, registry, Arc::clone(&breakers));
        let enhancer = PdfEnhancer::new(
            aggregator.registry(),
            &config.sources.pdf_priority,
            Arc::clone(&breakers),
            config.timeouts.pdf_attempt(),
        );
        let network = CitationNetworkBuilder::new(
            aggregator.registry(),
            aggregator.merger().clone(),
            Arc::clone(&breakers),
            config.timeouts.adapter(),
            &config.network,
        );

        tracing::info!(
            sources = ?aggregator.registry().ids(),
            pdf_chain = ?enhancer.chain(),
            "Paper service ready"
        );

        Self {
            aggregator: Arc::new(aggregator),
            enhancer: Arc::new(enhancer),
            network: Arc::new(network),
            cache: ResourceCache::new(TtlPolicy::from_config(&config.cache)),
            sweep_interval: Some(config.cache.sweep_interval_seconds)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Canonical paper for `id`, with a PDF link when one can be found.
    ///
    /// Cached as paper-by-id under the id together with the DOI hint, since
    /// sources resolve the DOI before the id.
    pub async fn get_paper(&self, id: &str, doi: Option<&str>) -> Result<Arc<Paper>, ServiceError> {
        let id = sanitize_paper_id(id)?;
        let doi = validate_doi(doi)?;

        let this = self.clone();
        let key = CacheKey::paper(cache_id(&id, doi.as_deref()));
        let resource = self
            .cache
            .get(key, move || async move {
                let paper = this.aggregator.fetch_by_id(&id, doi.as_deref()).await?;
                let paper = this.enhancer.enhance(paper).await;
                Ok(Resource::Paper(Arc::new(paper)))
            })
            .await?;

        match resource.as_ref() {
            Resource::Paper(paper) => Ok(Arc::clone(paper)),
            Resource::Network(_) => Err(ServiceError::Internal(
                "paper key holds a citation network".into(),
            )),
        }
    }

    /// One-hop citation network around `id`.
    ///
    /// The root is resolved through [`get_paper`](Self::get_paper), so it
    /// shares that cache entry. Missing citation data yields empty sets.
    pub async fn get_citation_network(
        &self,
        id: &str,
        doi: Option<&str>,
    ) -> Result<Arc<CitationNetwork>, ServiceError> {
        let id = sanitize_paper_id(id)?;
        let doi = validate_doi(doi)?;

        let this = self.clone();
        let key = CacheKey::network(cache_id(&id, doi.as_deref()));
        let resource = self
            .cache
            .get(key, move || async move {
                let root = this.get_paper(&id, doi.as_deref()).await?;
                let network = this.network.build(Paper::clone(&root)).await;
                Ok(Resource::Network(Arc::new(network)))
            })
            .await?;

        match resource.as_ref() {
            Resource::Network(network) => Ok(Arc::clone(network)),
            Resource::Paper(_) => Err(ServiceError::Internal(
                "network key holds a paper".into(),
            )),
        }
    }

    /// Uncached multi-source search
    pub async fn search(&self, query: &str, limit: usize) -> Result<SearchResults, ServiceError> {
        if query.trim().is_empty() {
            return Err(ServiceError::InvalidRequest("search query is empty".into()));
        }
        let query = SearchQuery::new(query.trim()).max_results(limit);
        Ok(self.aggregator.search_all_sources(&query).await)
    }

    /// Resolve `input` as a paper id when it looks like one, else search.
    ///
    /// An id-shaped input that no source knows falls back to search.
    pub async fn lookup(&self, input: &str, limit: usize) -> Result<Lookup, ServiceError> {
        if looks_like_id(input) {
            match self.get_paper(input, None).await {
                Ok(paper) => return Ok(Lookup::Paper(paper)),
                Err(ServiceError::NotFound(_)) | Err(ServiceError::InvalidRequest(_)) => {
                    tracing::debug!(input, "Id-like input unresolved, searching instead");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(Lookup::Search(self.search(input, limit).await?))
    }

    /// Drop cached data for `id` and its DOI hint (both classes)
    pub fn invalidate(&self, id: &str, doi: Option<&str>) -> bool {
        let doi = doi.and_then(normalize_doi);
        let cache_id = cache_id(id.trim(), doi.as_deref());
        let paper = self.cache.invalidate(&CacheKey::paper(cache_id.as_str()));
        let network = self.cache.invalidate(&CacheKey::network(cache_id));
        paper || network
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn status(&self) -> ServiceStatus {
        let breakers = self.aggregator.breakers();
        let sources = self
            .aggregator
            .registry()
            .all()
            .map(|source| SourceStatus {
                id: source.id().to_string(),
                name: source.name().to_string(),
                capabilities: source
                    .capabilities()
                    .iter_names()
                    .map(|(name, _)| name.to_lowercase())
                    .collect(),
                circuit: breakers.get(source.id()).state(),
            })
            .collect();

        ServiceStatus {
            version: crate::VERSION,
            sources,
            cache: self.cache.stats(),
        }
    }

    /// Start the background cache sweep, unless disabled by configuration.
    pub fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        self.sweep_interval
            .map(|every| self.cache.spawn_sweeper(every))
    }
}
