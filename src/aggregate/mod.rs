//! Concurrent fan-out across sources.
//!
//! - [`Aggregator`]: multi-source search with merging, and parallel lookup by id
//! - [`PdfEnhancer`]: sequential open-access PDF chain with early exit
//! - [`CitationNetworkBuilder`]: one-hop citing/cited sets around a root paper
//!
//! Every adapter call goes through [`guarded`], which applies the source's
//! circuit breaker and a per-call timeout. A failed source contributes an
//! empty result; nothing here retries.

mod network;
mod pdf;

pub use network::CitationNetworkBuilder;
pub use pdf::PdfEnhancer;

use futures_util::future::join_all;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::models::{normalize_doi, Paper, SearchQuery, SearchResults};
use crate::sources::{Source, SourceCapabilities, SourceError, SourceRegistry};
use crate::utils::{CircuitBreakerManager, PaperMerger};

/// Outcome of a lookup that no source could answer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    /// Every source that was asked answered authoritatively that it has no such record
    #[error("No source has a record for '{0}'")]
    NotFound(String),

    /// At least one source failed and none produced a record
    #[error("No source could answer for '{0}'")]
    Unavailable(String),
}

/// Run one adapter call under the source's circuit breaker and a timeout.
///
/// An open circuit and an elapsed timeout both surface as `Unavailable`.
/// Only `Unavailable` counts against the breaker.
pub(crate) async fn guarded<T>(
    breakers: &CircuitBreakerManager,
    source: &dyn Source,
    limit: Duration,
    call: impl Future<Output = Result<T, SourceError>>,
) -> Result<T, SourceError> {
    let breaker = breakers.get(source.id());
    if !breaker.can_request() {
        tracing::debug!(source = source.id(), "Circuit open, skipping source");
        return Err(SourceError::Unavailable(format!(
            "{}: circuit open",
            source.id()
        )));
    }

    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => {
            breaker.record_success();
            Ok(value)
        }
        Ok(Err(err)) => {
            if err.is_unavailable() {
                breaker.record_failure();
            } else if matches!(err, SourceError::NotFound(_)) {
                breaker.record_success();
            }
            Err(err)
        }
        Err(_) => {
            breaker.record_failure();
            Err(SourceError::Unavailable(format!(
                "{}: timed out after {}ms",
                source.id(),
                limit.as_millis()
            )))
        }
    }
}

/// Whether `input` reads as an identifier rather than free text.
///
/// DOIs, Semantic Scholar hashes, OpenAlex work ids and prefixed ids
/// (`arXiv:`, `CorpusId:`, ...) qualify, as does any single token with a digit.
pub fn looks_like_id(input: &str) -> bool {
    let input = input.trim();
    if input.is_empty() || input.chars().any(char::is_whitespace) {
        return false;
    }
    if normalize_doi(input).is_some() {
        return true;
    }
    if input.len() == 40 && input.chars().all(|c| c.is_ascii_hexdigit()) {
        return true;
    }
    let lower = input.to_ascii_lowercase();
    if ["arxiv:", "corpusid:", "pmid:", "pmcid:", "mag:", "acl:"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
    {
        return true;
    }
    input.chars().any(|c| c.is_ascii_digit())
}

/// Fans requests out to every capable source and merges what comes back
#[derive(Debug, Clone)]
pub struct Aggregator {
    registry: SourceRegistry,
    merger: PaperMerger,
    breakers: Arc<CircuitBreakerManager>,
    adapter_timeout: Duration,
}

impl Aggregator {
    pub fn new(
        registry: SourceRegistry,
        merger: PaperMerger,
        breakers: Arc<CircuitBreakerManager>,
        adapter_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            merger,
            breakers,
            adapter_timeout,
        }
    }

    /// Merge policy and timeouts from `config`; tie-break priority is the registry order.
    pub fn from_config(
        config: &Config,
        registry: SourceRegistry,
        breakers: Arc<CircuitBreakerManager>,
    ) -> Self {
        let merger = PaperMerger::new(config.merge.policy, registry.ids());
        Self::new(registry, merger, breakers, config.timeouts.adapter())
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn merger(&self) -> &PaperMerger {
        &self.merger
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerManager> {
        &self.breakers
    }

    pub fn adapter_timeout(&self) -> Duration {
        self.adapter_timeout
    }

    /// Search every source concurrently and merge the results.
    ///
    /// Never fails: sources that time out or are unavailable contribute
    /// nothing and are listed in `failed_sources`.
    pub async fn search_all_sources(&self, query: &SearchQuery) -> SearchResults {
        let sources = self.registry.with_capability(SourceCapabilities::SEARCH);
        tracing::info!(
            query = %query.query,
            sources = sources.len(),
            "Searching all sources"
        );

        let calls = sources.iter().map(|source| async move {
            let outcome = guarded(
                &self.breakers,
                source.as_ref(),
                self.adapter_timeout,
                source.search(query),
            )
            .await;
            (source.id(), outcome)
        });

        let mut candidates = Vec::new();
        let mut failed_sources = Vec::new();
        for (source_id, outcome) in join_all(calls).await {
            match outcome {
                Ok(papers) => {
                    tracing::debug!(source = source_id, count = papers.len(), "Source answered");
                    candidates.extend(papers);
                }
                Err(SourceError::NotFound(_)) | Err(SourceError::NotImplemented) => {}
                Err(err) => {
                    tracing::warn!(source = source_id, error = %err, "Source failed during search");
                    failed_sources.push(source_id.to_string());
                }
            }
        }

        let mut papers = self.merger.merge(candidates);
        let total_results = papers.len();
        papers.truncate(query.max_results);

        SearchResults {
            papers,
            total_results,
            failed_sources,
        }
    }

    /// Ask every lookup-capable source in parallel; the first record wins.
    ///
    /// The remaining calls are cancelled once a record arrives.
    pub async fn fetch_by_id(&self, id: &str, doi: Option<&str>) -> Result<Paper, AggregateError> {
        let sources = self.registry.with_capability(SourceCapabilities::LOOKUP);
        if sources.is_empty() {
            tracing::warn!("No source supports lookup by id");
            return Err(AggregateError::Unavailable(id.to_string()));
        }

        let mut pending: FuturesUnordered<_> = sources
            .iter()
            .map(|source| async move {
                let outcome = guarded(
                    &self.breakers,
                    source.as_ref(),
                    self.adapter_timeout,
                    source.fetch_by_id(id, doi),
                )
                .await;
                (source.id(), outcome)
            })
            .collect();

        let mut any_unavailable = false;
        while let Some((source_id, outcome)) = pending.next().await {
            match outcome {
                Ok(paper) => {
                    tracing::debug!(source = source_id, id, "Lookup hit");
                    return Ok(paper);
                }
                Err(SourceError::NotFound(_)) | Err(SourceError::NotImplemented) => {
                    tracing::debug!(source = source_id, id, "Lookup miss");
                }
                Err(err) => {
                    tracing::warn!(source = source_id, id, error = %err, "Lookup failed");
                    any_unavailable = true;
                }
            }
        }

        if any_unavailable {
            Err(AggregateError::Unavailable(id.to_string()))
        } else {
            Err(AggregateError::NotFound(id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BreakerConfig, MergePolicy};
    use crate::models::{PaperBuilder, SourceType};
    use crate::sources::MockSource;

    fn paper(id: &str, title: &str, citations: u32, source: &str) -> Paper {
        PaperBuilder::new(id, title, SourceType::Other(source.into()))
            .year(2020)
            .citation_count(citations)
            .build()
    }

    fn aggregator(sources: Vec<Arc<MockSource>>) -> Aggregator {
        let registry = SourceRegistry::from_sources(
            sources
                .into_iter()
                .map(|s| s as Arc<dyn Source>)
                .collect(),
        );
        let merger = PaperMerger::new(MergePolicy::HighestCitations, registry.ids());
        Aggregator::new(
            registry,
            merger,
            Arc::new(CircuitBreakerManager::default()),
            Duration::from_secs(8),
        )
    }

    #[test]
    fn test_looks_like_id() {
        assert!(looks_like_id("10.1038/nature14539"));
        assert!(looks_like_id("649def34f8be52c8b66281af98ae884c09aef38b"));
        assert!(looks_like_id("W2963403868"));
        assert!(looks_like_id("arXiv:1706.03762"));
        assert!(looks_like_id("P1"));
        assert!(!looks_like_id("transformer attention"));
        assert!(!looks_like_id("transformers"));
        assert!(!looks_like_id("   "));
    }

    #[tokio::test]
    async fn test_search_merges_and_reports_failures() {
        let a = Arc::new(MockSource::new("a").with_search_results(vec![
            paper("A1", "Shared Title", 5, "a"),
            paper("A2", "Only In A", 1, "a"),
        ]));
        let b = Arc::new(
            MockSource::new("b").with_search_results(vec![paper("B1", "Shared Title", 9, "b")]),
        );
        let down = Arc::new(
            MockSource::new("down").with_search_error(SourceError::Unavailable("503".into())),
        );

        let results = aggregator(vec![a, b, down])
            .search_all_sources(&SearchQuery::new("shared"))
            .await;

        assert_eq!(results.total_results, 2);
        assert_eq!(results.papers[0].id, "B1");
        assert_eq!(results.papers[0].citation_count, 9);
        assert_eq!(results.failed_sources, vec!["down"]);
    }

    #[tokio::test]
    async fn test_search_caps_merged_results() {
        let a = Arc::new(MockSource::new("a").with_search_results(vec![
            paper("A1", "First", 5, "a"),
            paper("A2", "Second", 4, "a"),
        ]));
        let b = Arc::new(MockSource::new("b").with_search_results(vec![
            paper("B1", "Third", 9, "b"),
            paper("B2", "Fourth", 1, "b"),
        ]));

        let results = aggregator(vec![a, b])
            .search_all_sources(&SearchQuery::new("x").max_results(2))
            .await;

        assert_eq!(results.total_results, 4);
        let ids: Vec<_> = results.papers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["B1", "A1"]);
    }

    #[tokio::test]
    async fn test_search_skips_sources_without_capability() {
        let lookup_only = Arc::new(
            MockSource::new("lookup")
                .with_capabilities(SourceCapabilities::LOOKUP)
                .with_search_results(vec![paper("L1", "Hidden", 1, "lookup")]),
        );
        let results = aggregator(vec![lookup_only.clone()])
            .search_all_sources(&SearchQuery::new("x"))
            .await;
        assert!(results.papers.is_empty());
        assert_eq!(lookup_only.search_calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_by_id_outcomes() {
        let hit = Arc::new(MockSource::new("hit").with_paper(paper("P1", "Found", 3, "hit")));
        let miss = Arc::new(MockSource::new("miss"));
        let down = Arc::new(
            MockSource::new("down")
                .with_fallback_lookup(Err(SourceError::Unavailable("timeout".into()))),
        );

        let found = aggregator(vec![miss.clone(), hit])
            .fetch_by_id("P1", None)
            .await
            .unwrap();
        assert_eq!(found.title, "Found");

        let all_missing = aggregator(vec![miss.clone(), Arc::new(MockSource::new("miss2"))])
            .fetch_by_id("P9", None)
            .await;
        assert_eq!(all_missing, Err(AggregateError::NotFound("P9".into())));

        let partly_down = aggregator(vec![miss, down]).fetch_by_id("P9", None).await;
        assert_eq!(partly_down, Err(AggregateError::Unavailable("P9".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_by_id_slow_source_times_out() {
        let slow = Arc::new(
            MockSource::new("slow")
                .with_delay(Duration::from_secs(60))
                .with_paper(paper("P1", "Slow", 1, "slow")),
        );
        let agg = aggregator(vec![slow]);

        let started = tokio::time::Instant::now();
        let result = agg.fetch_by_id("P1", None).await;
        assert_eq!(result, Err(AggregateError::Unavailable("P1".into())));
        assert!(started.elapsed() >= Duration::from_secs(8));
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_open_circuit_skips_source() {
        let flaky = Arc::new(
            MockSource::new("flaky")
                .with_fallback_lookup(Err(SourceError::Unavailable("503".into()))),
        );
        let registry = SourceRegistry::from_sources(vec![flaky.clone() as Arc<dyn Source>]);
        let agg = Aggregator::new(
            registry.clone(),
            PaperMerger::new(MergePolicy::HighestCitations, registry.ids()),
            Arc::new(CircuitBreakerManager::new(BreakerConfig {
                failure_threshold: 2,
                open_seconds: 60,
            })),
            Duration::from_secs(8),
        );

        for _ in 0..4 {
            let _ = agg.fetch_by_id("P1", None).await;
        }
        assert_eq!(flaky.fetch_calls(), 2);
    }
}
