//! Search query and aggregated result types.

use serde::{Deserialize, Serialize};

use super::Paper;

/// A free-text search across sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,

    /// Per-source result limit
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    10
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: default_max_results(),
        }
    }

    pub fn max_results(mut self, max: usize) -> Self {
        self.max_results = max.clamp(1, 100);
        self
    }
}

/// Merged, ranked output of a multi-source search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub papers: Vec<Paper>,

    /// Number of distinct papers after merging, before the limit is applied
    pub total_results: usize,

    /// Sources that timed out or were unavailable
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_sources: Vec<String>,
}

impl SearchResults {
    pub fn new(papers: Vec<Paper>) -> Self {
        Self {
            total_results: papers.len(),
            papers,
            failed_sources: Vec::new(),
        }
    }
}
