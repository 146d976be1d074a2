//! Canonical data model shared by every source and the aggregation core.

mod citation;
mod paper;
mod search;

pub use citation::{CitationEdge, CitationNetwork, CitationSet};
pub use paper::{
    normalize_doi, normalize_title, Author, Fingerprint, Paper, PaperBuilder, SourceType,
};
pub use search::{SearchQuery, SearchResults};
