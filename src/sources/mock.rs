//! Mock source for testing purposes.
//!
//! Responses are scripted up front (builder methods) or swapped at runtime
//! (`set_*`). Every operation counts its calls and can be slowed down with
//! [`MockSource::with_delay`], which follows tokio's clock so paused-time
//! tests stay deterministic.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::models::{CitationSet, Paper, PaperBuilder, SearchQuery, SourceType};
use crate::sources::{Source, SourceCapabilities, SourceError};

/// A mock source for testing that returns predefined responses.
#[derive(Debug)]
pub struct MockSource {
    id: String,
    capabilities: SourceCapabilities,
    delay: Option<Duration>,
    search: Mutex<Result<Vec<Paper>, SourceError>>,
    papers: Mutex<HashMap<String, Result<Paper, SourceError>>>,
    fallback_lookup: Mutex<Result<Paper, SourceError>>,
    citations: Mutex<Result<CitationSet, SourceError>>,
    pdf: Mutex<Result<Option<String>, SourceError>>,
    search_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    citation_calls: AtomicUsize,
    pdf_calls: AtomicUsize,
}

impl MockSource {
    /// A source that supports everything and knows nothing.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            fallback_lookup: Mutex::new(Err(SourceError::NotFound(format!(
                "{}: unknown paper",
                id
            )))),
            id,
            capabilities: SourceCapabilities::all(),
            delay: None,
            search: Mutex::new(Ok(Vec::new())),
            papers: Mutex::new(HashMap::new()),
            citations: Mutex::new(Ok(CitationSet::default())),
            pdf: Mutex::new(Ok(None)),
            search_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            citation_calls: AtomicUsize::new(0),
            pdf_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_capabilities(mut self, capabilities: SourceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Sleep this long before answering any call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_search_results(self, papers: Vec<Paper>) -> Self {
        self.set_search_response(Ok(papers));
        self
    }

    pub fn with_search_error(self, error: SourceError) -> Self {
        self.set_search_response(Err(error));
        self
    }

    /// Answer lookups for the paper's id and DOI with the paper
    pub fn with_paper(self, paper: Paper) -> Self {
        let mut papers = lock(&self.papers);
        if let Some(doi) = &paper.doi {
            papers.insert(doi.clone(), Ok(paper.clone()));
        }
        papers.insert(paper.id.clone(), Ok(paper));
        drop(papers);
        self
    }

    /// Answer lookups of `id` with an error
    pub fn with_lookup_error(self, id: impl Into<String>, error: SourceError) -> Self {
        lock(&self.papers).insert(id.into(), Err(error));
        self
    }

    /// Answer every unscripted lookup with `result`
    pub fn with_fallback_lookup(self, result: Result<Paper, SourceError>) -> Self {
        *lock(&self.fallback_lookup) = result;
        self
    }

    pub fn with_citations(self, citations: CitationSet) -> Self {
        self.set_citations(Ok(citations));
        self
    }

    pub fn with_citation_error(self, error: SourceError) -> Self {
        self.set_citations(Err(error));
        self
    }

    pub fn with_pdf(self, result: Result<Option<String>, SourceError>) -> Self {
        *lock(&self.pdf) = result;
        self
    }

    /// Set the search response to return.
    pub fn set_search_response(&self, response: Result<Vec<Paper>, SourceError>) {
        *lock(&self.search) = response;
    }

    pub fn set_citations(&self, response: Result<CitationSet, SourceError>) {
        *lock(&self.citations) = response;
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn citation_calls(&self) -> usize {
        self.citation_calls.load(Ordering::SeqCst)
    }

    pub fn pdf_calls(&self) -> usize {
        self.pdf_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Mock Source"
    }

    fn capabilities(&self) -> SourceCapabilities {
        self.capabilities
    }

    async fn search(&self, _query: &SearchQuery) -> Result<Vec<Paper>, SourceError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        lock(&self.search).clone()
    }

    async fn fetch_by_id(&self, id: &str, doi: Option<&str>) -> Result<Paper, SourceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let papers = lock(&self.papers);
        match papers.get(id).or_else(|| doi.and_then(|d| papers.get(d))) {
            Some(result) => result.clone(),
            None => lock(&self.fallback_lookup).clone(),
        }
    }

    async fn fetch_citations(
        &self,
        _id: &str,
        _doi: Option<&str>,
        limit: usize,
    ) -> Result<CitationSet, SourceError> {
        self.citation_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let mut set = lock(&self.citations).clone()?;
        set.citing.truncate(limit);
        set.cited.truncate(limit);
        Ok(set)
    }

    async fn find_pdf(&self, _paper: &Paper) -> Result<Option<String>, SourceError> {
        self.pdf_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        lock(&self.pdf).clone()
    }
}

/// Helper function to create a mock paper for testing.
pub fn make_paper(paper_id: &str, title: &str, source_type: SourceType) -> Paper {
    PaperBuilder::new(paper_id, title, source_type)
        .url(format!("http://example.com/{}", paper_id))
        .build()
}
