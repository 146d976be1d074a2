//! Unpaywall research source implementation.
//!
//! Uses the Unpaywall API for checking open access status of papers.
//! API documentation: <https://unpaywall.org/products/api>

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use super::{Source, SourceCapabilities, SourceError};
use crate::models::{normalize_doi, Author, Paper, PaperBuilder, SourceType};
use crate::utils::{encode_id, fetch_json, HttpClient};

const UNPAYWALL_API_BASE: &str = "https://api.unpaywall.org/v2";

/// Unpaywall research source
///
/// DOI lookups only. The API requires an email address (free, no key
/// needed); without one every operation reports `NotImplemented`.
#[derive(Debug, Clone)]
pub struct UnpaywallSource {
    client: HttpClient,
    base_url: String,
    email: Option<String>,
}

impl UnpaywallSource {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            base_url: UNPAYWALL_API_BASE.to_string(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into()).filter(|e| !e.trim().is_empty());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn lookup(&self, doi: &str) -> Result<UnpaywallResponse, SourceError> {
        let Some(email) = &self.email else {
            tracing::debug!(source = "unpaywall", "No email configured; skipping lookup");
            return Err(SourceError::NotImplemented);
        };

        let context = format!("unpaywall: {}", doi);
        let request = self
            .client
            .get(&format!("{}/{}", self.base_url, encode_id(doi)))
            .query(&[("email", email)]);
        let record = fetch_json(request, &context).await?;
        Ok(serde_json::from_value(record)?)
    }
}

#[async_trait]
impl Source for UnpaywallSource {
    fn id(&self) -> &str {
        "unpaywall"
    }

    fn name(&self) -> &str {
        "Unpaywall"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::LOOKUP | SourceCapabilities::PDF_LOOKUP
    }

    async fn fetch_by_id(&self, id: &str, doi: Option<&str>) -> Result<Paper, SourceError> {
        let doi = doi
            .and_then(normalize_doi)
            .or_else(|| normalize_doi(id))
            .ok_or_else(|| SourceError::NotFound(format!("unpaywall: '{}' is not a DOI", id)))?;

        self.lookup(&doi).await?.into_paper(&doi).ok_or_else(|| {
            SourceError::Malformed(format!("unpaywall: record for {} has no title", doi))
        })
    }

    async fn find_pdf(&self, paper: &Paper) -> Result<Option<String>, SourceError> {
        let Some(doi) = paper.doi.as_deref() else {
            return Ok(None);
        };
        let record = self.lookup(doi).await?;
        Ok(record.best_oa_location.and_then(|loc| loc.url_for_pdf))
    }
}

/// Unpaywall API response
#[derive(Debug, Deserialize)]
struct UnpaywallResponse {
    title: Option<String>,
    year: Option<i32>,
    published_date: Option<String>,
    journal_name: Option<String>,
    doi_url: Option<String>,
    is_oa: Option<bool>,
    #[serde(default)]
    z_authors: Option<Vec<UnpaywallAuthor>>,
    best_oa_location: Option<UnpaywallLocation>,
}

#[derive(Debug, Deserialize)]
struct UnpaywallAuthor {
    given: Option<String>,
    family: Option<String>,
    raw_author_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UnpaywallLocation {
    url_for_pdf: Option<String>,
}

impl UnpaywallResponse {
    fn into_paper(self, doi: &str) -> Option<Paper> {
        let title = self.title.filter(|t| !t.trim().is_empty())?;

        let authors = self
            .z_authors
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| match (a.given, a.family) {
                (Some(given), Some(family)) => Some(format!("{} {}", given, family)),
                (None, Some(family)) => Some(family),
                _ => a.raw_author_name,
            })
            .map(Author::new)
            .collect();

        let pdf_url = self.best_oa_location.and_then(|loc| loc.url_for_pdf);
        let mut builder = PaperBuilder::new(doi, title, SourceType::Unpaywall)
            .authors(authors)
            .venue(self.journal_name)
            .doi(doi.to_string())
            .open_access(self.is_oa.unwrap_or(false) || pdf_url.is_some())
            .pdf_url(pdf_url)
            .url(self.doi_url);

        if let Some(year) = self.year {
            builder = builder.year(year);
        }
        if let Some(date) = self
            .published_date
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
        {
            builder = builder.publication_date(date);
        }
        Some(builder.build())
    }
}
