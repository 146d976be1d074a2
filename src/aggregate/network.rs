//! One-hop citation network assembly.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use super::guarded;
use crate::config::NetworkConfig;
use crate::models::{CitationEdge, CitationNetwork, CitationSet, Paper};
use crate::sources::{Source, SourceCapabilities, SourceError, SourceRegistry};
use crate::utils::{CircuitBreakerManager, PaperMerger};

/// Builds the citing/cited neighbourhood of a resolved root paper.
///
/// Citation data is enrichment: when no source answers, the root comes
/// back with empty sets instead of an error.
#[derive(Debug, Clone)]
pub struct CitationNetworkBuilder {
    sources: Vec<Arc<dyn Source>>,
    merger: PaperMerger,
    breakers: Arc<CircuitBreakerManager>,
    adapter_timeout: Duration,
    max_citing: usize,
    max_cited: usize,
}

impl CitationNetworkBuilder {
    pub fn new(
        registry: &SourceRegistry,
        merger: PaperMerger,
        breakers: Arc<CircuitBreakerManager>,
        adapter_timeout: Duration,
        limits: &NetworkConfig,
    ) -> Self {
        Self {
            sources: registry.with_capability(SourceCapabilities::CITATIONS),
            merger,
            breakers,
            adapter_timeout,
            max_citing: limits.max_citing,
            max_cited: limits.max_cited,
        }
    }

    pub async fn build(&self, root: Paper) -> CitationNetwork {
        let limit = self.max_citing.max(self.max_cited);
        let calls = self.sources.iter().map(|source| {
            let root = &root;
            async move {
                let outcome = guarded(
                    &self.breakers,
                    source.as_ref(),
                    self.adapter_timeout,
                    source.fetch_citations(&root.id, root.doi.as_deref(), limit),
                )
                .await;
                (source.id(), outcome)
            }
        });

        let mut sets: Vec<CitationSet> = Vec::new();
        for (source_id, outcome) in join_all(calls).await {
            match outcome {
                Ok(set) => {
                    tracing::debug!(
                        source = source_id,
                        citing = set.citing.len(),
                        cited = set.cited.len(),
                        "Citations fetched"
                    );
                    sets.push(set);
                }
                Err(SourceError::NotFound(_)) | Err(SourceError::NotImplemented) => {}
                Err(err) => {
                    tracing::warn!(source = source_id, error = %err, "Citation fetch failed");
                }
            }
        }

        if sets.iter().all(CitationSet::is_empty) {
            tracing::info!(id = %root.id, "No citation data; returning root only");
            return CitationNetwork::root_only(root);
        }

        let citing = self.neighbours(
            &root,
            sets.iter().flat_map(|s| s.citing.iter().cloned()).collect(),
            self.max_citing,
        );
        let cited = self.neighbours(
            &root,
            sets.iter().flat_map(|s| s.cited.iter().cloned()).collect(),
            self.max_cited,
        );

        let context = |paper: &Paper| {
            sets.iter()
                .find_map(|s| s.context_for(paper))
                .map(str::to_string)
        };
        let edges = citing
            .iter()
            .filter_map(|p| {
                CitationEdge::new(p.id.as_str(), root.id.as_str()).map(|e| e.with_context(context(p)))
            })
            .chain(cited.iter().filter_map(|p| {
                CitationEdge::new(root.id.as_str(), p.id.as_str()).map(|e| e.with_context(context(p)))
            }))
            .collect();

        CitationNetwork {
            root,
            citing,
            cited,
            edges,
        }
    }

    /// Merge one side of the network, drop the root itself and cap it.
    fn neighbours(&self, root: &Paper, candidates: Vec<Paper>, cap: usize) -> Vec<Paper> {
        let mut merged = self.merger.merge(candidates);
        merged.retain(|p| p.id != root.id && !p.same_identity(root));
        merged.truncate(cap);
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MergePolicy;
    use crate::models::{PaperBuilder, SourceType};
    use crate::sources::MockSource;

    fn paper(id: &str, title: &str, citations: u32) -> Paper {
        PaperBuilder::new(id, title, SourceType::SemanticScholar)
            .year(2019)
            .citation_count(citations)
            .build()
    }

    fn builder(sources: Vec<Arc<MockSource>>, max: usize) -> CitationNetworkBuilder {
        let registry = SourceRegistry::from_sources(
            sources.into_iter().map(|s| s as Arc<dyn Source>).collect(),
        );
        CitationNetworkBuilder::new(
            &registry,
            PaperMerger::new(MergePolicy::HighestCitations, registry.ids()),
            Arc::new(CircuitBreakerManager::default()),
            Duration::from_secs(8),
            &NetworkConfig {
                max_citing: max,
                max_cited: max,
            },
        )
    }

    fn root() -> Paper {
        paper("R", "Root Paper", 100)
    }

    #[tokio::test]
    async fn test_merges_sides_independently_and_caps() {
        let mut first = CitationSet::default();
        first.add_citing(paper("C1", "Citing One", 10), Some("builds on R".into()));
        first.add_citing(paper("C2", "Citing Two", 5), None);
        first.add_citing(paper("C3", "Citing Three", 1), None);
        first.add_cited(paper("D1", "Cited One", 7), None);

        let mut second = CitationSet::default();
        second.add_citing(paper("X1", "Citing One", 12), None);
        second.add_citing(paper("R2", "Root Paper", 100), None);

        let a = Arc::new(MockSource::new("a").with_citations(first));
        let b = Arc::new(MockSource::new("b").with_citations(second));

        let network = builder(vec![a, b], 2).build(root()).await;

        let citing: Vec<_> = network.citing.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(citing, vec!["X1", "C2"]);
        assert_eq!(network.cited.len(), 1);
        assert_eq!(network.edges.len(), 3);

        let first_edge = &network.edges[0];
        assert_eq!(first_edge.citing_paper_id(), "X1");
        assert_eq!(first_edge.cited_paper_id(), "R");
        assert_eq!(first_edge.context(), Some("builds on R"));

        let last_edge = &network.edges[2];
        assert_eq!(last_edge.citing_paper_id(), "R");
        assert_eq!(last_edge.cited_paper_id(), "D1");
    }

    #[tokio::test]
    async fn test_all_unavailable_returns_root_only() {
        let a = Arc::new(
            MockSource::new("a").with_citation_error(SourceError::Unavailable("429".into())),
        );
        let b = Arc::new(
            MockSource::new("b").with_citation_error(SourceError::Unavailable("503".into())),
        );

        let network = builder(vec![a.clone(), b], 50).build(root()).await;
        assert_eq!(network, CitationNetwork::root_only(root()));
        assert_eq!(a.citation_calls(), 1);
    }

    #[tokio::test]
    async fn test_one_source_down_still_builds() {
        let mut set = CitationSet::default();
        set.add_cited(paper("D1", "Cited One", 7), None);
        let up = Arc::new(MockSource::new("up").with_citations(set));
        let down = Arc::new(
            MockSource::new("down").with_citation_error(SourceError::Unavailable("503".into())),
        );
        let lookup_only = Arc::new(
            MockSource::new("lookup").with_capabilities(SourceCapabilities::LOOKUP),
        );

        let network = builder(vec![up, down, lookup_only.clone()], 50)
            .build(root())
            .await;
        assert!(network.citing.is_empty());
        assert_eq!(network.cited[0].id, "D1");
        assert_eq!(lookup_only.citation_calls(), 0);
    }
}
