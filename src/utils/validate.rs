//! Input validation for inbound paper identifiers and DOIs.
//!
//! Identifiers arrive from URL paths and tool arguments and are interpolated
//! into upstream request URLs, so anything that could change the shape of
//! those requests is rejected up front.

use thiserror::Error;

use crate::models::normalize_doi;

const MAX_ID_LEN: usize = 256;

/// Validation error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid paper ID: {0}")]
    InvalidPaperId(String),

    #[error("Invalid DOI format: {0}")]
    InvalidDoi(String),

    #[error("Path traversal detected: {0}")]
    PathTraversal(String),
}

/// Validate a paper ID.
///
/// Accepts source-native ids (`W2741809807`, 40-hex Semantic Scholar ids,
/// `arXiv:1706.03762`, `CorpusId:13756489`) and bare DOIs, which may contain
/// parentheses, semicolons and (in SICI DOIs) angle brackets.
pub fn sanitize_paper_id(id: &str) -> Result<String, ValidationError> {
    let id = id.trim();

    if id.is_empty() {
        return Err(ValidationError::InvalidPaperId("empty ID".to_string()));
    }

    if id.len() > MAX_ID_LEN {
        return Err(ValidationError::InvalidPaperId(format!(
            "longer than {} bytes",
            MAX_ID_LEN
        )));
    }

    if id.contains("..") || id.contains("./") || id.contains('\\') {
        return Err(ValidationError::PathTraversal(id.to_string()));
    }

    if id.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ValidationError::InvalidPaperId(
            "contains whitespace or control characters".to_string(),
        ));
    }

    let dangerous_chars = ['|', '&', '$', '`', '{', '}', '<', '>', '"', '\'', '?', '#'];
    let is_doi = normalize_doi(id).is_some();
    if let Some(ch) = id
        .chars()
        .filter(|c| !(is_doi && matches!(c, '<' | '>')))
        .find(|c| dangerous_chars.contains(c))
    {
        return Err(ValidationError::InvalidPaperId(format!(
            "contains disallowed character: {}",
            ch
        )));
    }

    Ok(id.to_string())
}

/// Validate and normalize a DOI hint.
///
/// Blank input is treated as "no hint".
pub fn validate_doi(doi: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(raw) = doi.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };

    if raw.contains("..") {
        return Err(ValidationError::PathTraversal(raw.to_string()));
    }

    normalize_doi(raw)
        .map(Some)
        .ok_or_else(|| ValidationError::InvalidDoi(raw.to_string()))
}
