//! Bibliographic source adapters behind a common trait.
//!
//! This module defines the [`Source`] trait that every adapter implements.
//! An adapter owns the wire format of exactly one external API and converts
//! its records into the canonical [`Paper`] shape; nothing source-specific
//! leaves the adapter's module.
//!
//! Adapters report failures as one of three outcomes:
//!
//! - [`SourceError::Unavailable`] - timeout, rate limit, transport or 5xx error
//!   (retryable; callers treat it as an empty contribution)
//! - [`SourceError::NotFound`] - the source authoritatively has no such record
//! - [`SourceError::Malformed`] - the response could not be decoded at all
//!
//! A single undecodable record inside a bulk response is dropped with a
//! warning and never fails the call (see [`decode_records`]).
//!
//! # Source order
//!
//! The [`SourceRegistry`] keeps adapters in the configured priority order.
//! That order breaks ranking ties in merged results; the PDF chain has its
//! own order (`sources.pdf_priority`).

mod crossref;
pub mod mock;
mod openalex;
mod registry;
mod semantic;
mod unpaywall;

pub use crossref::CrossRefSource;
pub use mock::MockSource;
pub use openalex::OpenAlexSource;
pub use registry::{SourceCapabilities, SourceRegistry};
pub use semantic::SemanticScholarSource;
pub use unpaywall::UnpaywallSource;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::models::{CitationSet, Paper, SearchQuery};

/// The Source trait defines the interface for all bibliographic adapters.
///
/// # Implementing a New Source
///
/// 1. Create a struct that implements `Source`
/// 2. Implement `id`, `name` and `capabilities`
/// 3. Implement the operations named by the capabilities; the rest keep
///    their default `NotImplemented` body
/// 4. Register it with [`SourceRegistry::register`]
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this source (used in configuration, e.g. "semantic")
    fn id(&self) -> &str;

    /// Human-readable name of this source
    fn name(&self) -> &str;

    /// Describe the capabilities of this source
    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
    }

    fn supports_lookup(&self) -> bool {
        self.capabilities().contains(SourceCapabilities::LOOKUP)
    }

    /// Free-text search
    async fn search(&self, _query: &SearchQuery) -> Result<Vec<Paper>, SourceError> {
        Err(SourceError::NotImplemented)
    }

    /// Look up one paper by identifier, preferring the DOI hint when given.
    ///
    /// Identifiers in a foreign namespace with no DOI yield `NotFound`.
    async fn fetch_by_id(&self, _id: &str, _doi: Option<&str>) -> Result<Paper, SourceError> {
        Err(SourceError::NotImplemented)
    }

    /// Papers citing and cited by the given paper, at most `limit` of each
    async fn fetch_citations(
        &self,
        _id: &str,
        _doi: Option<&str>,
        _limit: usize,
    ) -> Result<CitationSet, SourceError> {
        Err(SourceError::NotImplemented)
    }

    /// Locate an open-access PDF for a paper.
    ///
    /// The default implementation re-fetches the record and reports its PDF link.
    async fn find_pdf(&self, paper: &Paper) -> Result<Option<String>, SourceError> {
        if !self.supports_lookup() {
            return Err(SourceError::NotImplemented);
        }
        let found = self.fetch_by_id(&paper.id, paper.doi.as_deref()).await?;
        Ok(found.pdf_url)
    }
}

/// Errors that can occur when talking to a source
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("Operation not supported by this source")]
    NotImplemented,

    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl SourceError {
    /// Map a non-success HTTP status to an outcome.
    ///
    /// 400/404/410 are authoritative negatives; everything else, including
    /// 429 and 5xx, is treated as the source being unavailable.
    pub fn from_status(status: u16, context: &str) -> Self {
        match status {
            400 | 404 | 410 => SourceError::NotFound(format!("{} (HTTP {})", context, status)),
            429 => SourceError::Unavailable(format!("{}: rate limited (HTTP 429)", context)),
            _ => SourceError::Unavailable(format!("{} (HTTP {})", context, status)),
        }
    }

    /// Whether this outcome counts against a source's health
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SourceError::Unavailable(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Malformed(err.to_string())
        } else {
            SourceError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Malformed(err.to_string())
    }
}

/// Decode each record of a bulk response on its own, dropping bad ones.
pub(crate) fn decode_records<T: DeserializeOwned>(source: &str, records: Vec<Value>) -> Vec<T> {
    records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value::<T>(record) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!(source, index, error = %e, "Dropping malformed record");
                None
            }
        })
        .collect()
}

/// Pull the array at `key` out of a response envelope.
pub(crate) fn records_at(envelope: &mut Value, key: &str) -> Result<Vec<Value>, SourceError> {
    match envelope.get_mut(key).map(Value::take) {
        Some(Value::Array(records)) => Ok(records),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(other) => Err(SourceError::Malformed(format!(
            "expected array at '{}', found {}",
            key,
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_source_capabilities() {
        let source = MockSource::new("mock");
        assert!(source.supports_lookup());

        let search_only = MockSource::new("search").with_capabilities(SourceCapabilities::SEARCH);
        assert!(!search_only.supports_lookup());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            SourceError::from_status(404, "paper"),
            SourceError::NotFound(_)
        ));
        assert!(matches!(
            SourceError::from_status(410, "paper"),
            SourceError::NotFound(_)
        ));
        assert!(SourceError::from_status(429, "paper").is_unavailable());
        assert!(SourceError::from_status(503, "paper").is_unavailable());
        assert!(!SourceError::from_status(400, "paper").is_unavailable());
    }

    #[derive(Deserialize)]
    struct Rec {
        title: String,
    }

    #[test]
    fn test_decode_records_skips_bad_entries() {
        let records = vec![
            json!({"title": "ok"}),
            json!({"title": 42}),
            json!("garbage"),
            json!({"title": "also ok"}),
        ];
        let decoded: Vec<Rec> = decode_records("test", records);
        let titles: Vec<_> = decoded.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["ok", "also ok"]);
    }

    #[test]
    fn test_records_at() {
        let mut envelope = json!({"data": [1, 2], "none": null, "bad": "x"});
        assert_eq!(records_at(&mut envelope, "data").unwrap().len(), 2);
        assert!(records_at(&mut envelope, "none").unwrap().is_empty());
        assert!(records_at(&mut envelope, "missing").unwrap().is_empty());
        assert!(matches!(
            records_at(&mut envelope, "bad"),
            Err(SourceError::Malformed(_))
        ));
    }
}
