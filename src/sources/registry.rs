//! Registry for managing source adapters.

use std::sync::Arc;

use super::{CrossRefSource, OpenAlexSource, SemanticScholarSource, Source, UnpaywallSource};
use crate::config::Config;
use crate::utils::HttpClient;

bitflags::bitflags! {
    /// Capabilities that a source can support
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SourceCapabilities: u32 {
        const SEARCH = 1 << 0;
        const LOOKUP = 1 << 1;
        const CITATIONS = 1 << 2;
        const PDF_LOOKUP = 1 << 3;
    }
}

/// Ordered collection of adapters.
///
/// Iteration order is the configured source priority.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn Source>>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the HTTP adapters described by `config`, in priority order.
    pub fn from_config(config: &Config, client: &HttpClient) -> Self {
        let keys = &config.api_keys;
        let sources_cfg = &config.sources;

        let mut semantic = SemanticScholarSource::new(client.clone());
        if let Some(key) = &keys.semantic_scholar {
            semantic = semantic.with_api_key(key.clone());
        }
        let mut openalex = OpenAlexSource::new(client.clone());
        if let Some(email) = &keys.openalex_email {
            openalex = openalex.with_mailto(email.clone());
        }
        let mut crossref = CrossRefSource::new(client.clone());
        if let Some(mailto) = &keys.crossref_mailto {
            crossref = crossref.with_mailto(mailto.clone());
        }
        let mut unpaywall = UnpaywallSource::new(client.clone());
        if let Some(email) = &keys.unpaywall_email {
            unpaywall = unpaywall.with_email(email.clone());
        }

        if let Some(url) = sources_cfg.base_url("semantic") {
            semantic = semantic.with_base_url(url);
        }
        if let Some(url) = sources_cfg.base_url("openalex") {
            openalex = openalex.with_base_url(url);
        }
        if let Some(url) = sources_cfg.base_url("crossref") {
            crossref = crossref.with_base_url(url);
        }
        if let Some(url) = sources_cfg.base_url("unpaywall") {
            unpaywall = unpaywall.with_base_url(url);
        }

        let available: Vec<Arc<dyn Source>> = vec![
            Arc::new(semantic),
            Arc::new(openalex),
            Arc::new(crossref),
            Arc::new(unpaywall),
        ];

        let enabled = available
            .into_iter()
            .filter(|s| {
                let enabled = sources_cfg.is_enabled(s.id());
                if !enabled {
                    tracing::debug!(source = s.id(), "Source disabled by configuration");
                }
                enabled
            })
            .collect();

        Self::from_sources(enabled).ordered(&sources_cfg.priority)
    }

    /// Wrap adapters as given; their order is their priority.
    pub fn from_sources(sources: Vec<Arc<dyn Source>>) -> Self {
        let mut registry = Self::new();
        for source in sources {
            registry.register(source);
        }
        registry
    }

    /// Register a source at the lowest priority, or replace one with the same id in place
    pub fn register(&mut self, source: Arc<dyn Source>) {
        match self.sources.iter_mut().find(|s| s.id() == source.id()) {
            Some(slot) => *slot = source,
            None => self.sources.push(source),
        }
    }

    /// A copy with the listed ids first, in list order; the rest keep their order.
    pub fn ordered(&self, priority: &[String]) -> Self {
        for id in priority {
            if !self.has(id) {
                tracing::debug!(source = %id, "Priority lists an unregistered source");
            }
        }
        let mut sources = self.sources.clone();
        sources.sort_by_key(|s| {
            priority
                .iter()
                .position(|id| id == s.id())
                .unwrap_or(priority.len())
        });
        Self { sources }
    }

    /// Get a source by ID
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Source>> {
        self.sources.iter().find(|s| s.id() == id)
    }

    /// All registered sources, in priority order
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources.iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.id().to_string()).collect()
    }

    /// Sources that support a specific capability, in priority order
    pub fn with_capability(&self, capability: SourceCapabilities) -> Vec<Arc<dyn Source>> {
        self.all()
            .filter(|s| s.capabilities().contains(capability))
            .cloned()
            .collect()
    }

    pub fn has(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockSource;

    fn ids(registry: &SourceRegistry) -> Vec<String> {
        registry.ids()
    }

    #[test]
    fn test_registry_from_config() {
        let client = HttpClient::default();
        let registry = SourceRegistry::from_config(&Config::default(), &client);

        assert_eq!(registry.len(), 4);
        assert_eq!(
            ids(&registry),
            vec!["semantic", "openalex", "crossref", "unpaywall"]
        );
        assert_eq!(registry.with_capability(SourceCapabilities::CITATIONS).len(), 2);
        assert_eq!(registry.with_capability(SourceCapabilities::PDF_LOOKUP).len(), 4);
    }

    #[test]
    fn test_registry_respects_priority_and_disabled() {
        let mut config = Config::default();
        config.sources.priority = vec!["crossref".into(), "semantic".into()];
        config.sources.disabled = vec!["unpaywall".into()];

        let registry = SourceRegistry::from_config(&config, &HttpClient::default());
        assert_eq!(ids(&registry), vec!["crossref", "semantic", "openalex"]);
        assert!(!registry.has("unpaywall"));
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut registry = SourceRegistry::from_sources(vec![
            Arc::new(MockSource::new("a")),
            Arc::new(MockSource::new("b")),
        ]);
        registry.register(Arc::new(MockSource::new("a")));
        registry.register(Arc::new(MockSource::new("c")));

        assert_eq!(ids(&registry), vec!["a", "b", "c"]);
        assert!(registry.get("z").is_none());
    }

    #[test]
    fn test_ordered_keeps_unlisted_sources() {
        let registry = SourceRegistry::from_sources(vec![
            Arc::new(MockSource::new("a")),
            Arc::new(MockSource::new("b")),
            Arc::new(MockSource::new("c")),
        ]);
        let reordered = registry.ordered(&["c".into(), "missing".into()]);
        assert_eq!(ids(&reordered), vec!["c", "a", "b"]);
        // original untouched
        assert_eq!(ids(&registry), vec!["a", "b", "c"]);
    }
}
