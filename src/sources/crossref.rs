//! CrossRef research source implementation.
//!
//! CrossRef only knows papers by DOI, so lookups for any other identifier
//! are answered with `NotFound` without a request.

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use super::{decode_records, records_at, Source, SourceCapabilities, SourceError};
use crate::models::{normalize_doi, Author, Paper, PaperBuilder, SearchQuery, SourceType};
use crate::utils::{encode_id, fetch_json, HttpClient};

const CROSSREF_API_BASE: &str = "https://api.crossref.org";

/// CrossRef research source
///
/// Uses CrossRef REST API for DOI metadata lookup and search.
#[derive(Debug, Clone)]
pub struct CrossRefSource {
    client: HttpClient,
    base_url: String,
    mailto: Option<String>,
}

impl CrossRefSource {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            base_url: CROSSREF_API_BASE.to_string(),
            mailto: None,
        }
    }

    /// Contact address sent with every request (CrossRef "polite" pool)
    pub fn with_mailto(mut self, mailto: impl Into<String>) -> Self {
        self.mailto = Some(mailto.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let builder = self.client.get(&format!("{}{}", self.base_url, endpoint));
        match &self.mailto {
            Some(mailto) => builder.query(&[("mailto", mailto)]),
            None => builder,
        }
    }
}

#[async_trait]
impl Source for CrossRefSource {
    fn id(&self) -> &str {
        "crossref"
    }

    fn name(&self) -> &str {
        "CrossRef"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH | SourceCapabilities::LOOKUP | SourceCapabilities::PDF_LOOKUP
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Paper>, SourceError> {
        let endpoint = format!(
            "/works?query={}&rows={}",
            urlencoding::encode(&query.query),
            query.max_results
        );
        let mut envelope = fetch_json(self.request(&endpoint), "crossref: search").await?;
        let mut message = envelope
            .get_mut("message")
            .map(serde_json::Value::take)
            .ok_or_else(|| SourceError::Malformed("crossref: search has no message".into()))?;

        let items = records_at(&mut message, "items")?;
        Ok(decode_records::<CRItem>("crossref", items)
            .into_iter()
            .filter_map(|item| {
                let paper = item.into_paper();
                if paper.is_none() {
                    tracing::debug!(source = "crossref", "Skipping item without DOI or title");
                }
                paper
            })
            .collect())
    }

    async fn fetch_by_id(&self, id: &str, doi: Option<&str>) -> Result<Paper, SourceError> {
        let doi = doi
            .and_then(normalize_doi)
            .or_else(|| normalize_doi(id))
            .ok_or_else(|| SourceError::NotFound(format!("crossref: '{}' is not a DOI", id)))?;

        let context = format!("crossref: work {}", doi);
        let envelope =
            fetch_json(self.request(&format!("/works/{}", encode_id(&doi))), &context).await?;
        let response: CRResponse = serde_json::from_value(envelope)?;

        response
            .message
            .into_paper()
            .ok_or_else(|| SourceError::Malformed(format!("{}: record has no title", context)))
    }
}

// ===== CrossRef API Types =====

#[derive(Debug, Deserialize)]
struct CRResponse {
    message: CRItem,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CRItem {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    container_title: Vec<String>,
    #[serde(default)]
    author: Vec<CRAuthor>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    issued: Option<CRDate>,
    published: Option<CRDate>,
    is_referenced_by_count: Option<u32>,
    references_count: Option<u32>,
    #[serde(default)]
    subject: Vec<String>,
    #[serde(default)]
    link: Vec<CRLink>,
}

#[derive(Debug, Deserialize)]
struct CRAuthor {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
    #[serde(rename = "ORCID")]
    orcid: Option<String>,
    #[serde(default)]
    affiliation: Vec<CRAffiliation>,
}

#[derive(Debug, Deserialize)]
struct CRAffiliation {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CRDate {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i32>>>,
}

#[derive(Debug, Deserialize)]
struct CRLink {
    #[serde(rename = "URL")]
    url: Option<String>,
    #[serde(rename = "content-type")]
    content_type: Option<String>,
}

impl CRDate {
    fn parts(&self) -> (Option<i32>, Option<NaiveDate>) {
        let parts: Vec<i32> = self
            .date_parts
            .first()
            .map(|p| p.iter().map_while(|v| *v).collect())
            .unwrap_or_default();
        let year = parts.first().copied();
        let date = match parts.as_slice() {
            [y, m, d, ..] => NaiveDate::from_ymd_opt(*y, *m as u32, *d as u32),
            _ => None,
        };
        (year, date)
    }
}

impl CRAuthor {
    fn into_author(self) -> Option<Author> {
        let name = match (self.given, self.family) {
            (Some(given), Some(family)) => format!("{} {}", given.trim(), family.trim()),
            (None, Some(family)) => family,
            (given, None) => self.name.or(given)?,
        };
        if name.trim().is_empty() {
            return None;
        }
        let affiliations = self.affiliation.into_iter().filter_map(|a| a.name).collect();
        let author = Author::new(name.trim()).with_affiliations(affiliations);
        Some(match self.orcid {
            Some(orcid) => author.with_id(orcid),
            None => author,
        })
    }
}

/// Remove JATS/XML markup from CrossRef abstracts
fn strip_jats(text: &str) -> String {
    static TAGS: OnceLock<Option<Regex>> = OnceLock::new();
    let stripped = match TAGS.get_or_init(|| Regex::new(r"<[^>]+>").ok()) {
        Some(tags) => tags.replace_all(text, " ").into_owned(),
        None => text.to_string(),
    };
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl CRItem {
    fn into_paper(self) -> Option<Paper> {
        let doi = self.doi.as_deref().and_then(normalize_doi)?;
        let title = self
            .title
            .into_iter()
            .map(|t| strip_jats(&t))
            .find(|t| !t.is_empty())?;

        let (year, date) = self
            .issued
            .as_ref()
            .or(self.published.as_ref())
            .map(CRDate::parts)
            .unwrap_or((None, None));

        let pdf_url = self
            .link
            .into_iter()
            .find(|l| l.content_type.as_deref() == Some("application/pdf"))
            .and_then(|l| l.url);

        let mut builder = PaperBuilder::new(doi.clone(), title, SourceType::CrossRef)
            .authors(
                self.author
                    .into_iter()
                    .filter_map(CRAuthor::into_author)
                    .collect(),
            )
            .abstract_text(self.abstract_text.map(|a| strip_jats(&a)))
            .venue(self.container_title.into_iter().next())
            .citation_count(self.is_referenced_by_count.unwrap_or(0))
            .reference_count(self.references_count.unwrap_or(0))
            .fields_of_study(self.subject)
            .doi(doi)
            .pdf_url(pdf_url)
            .url(self.url);

        if let Some(year) = year {
            builder = builder.year(year);
        }
        if let Some(date) = date {
            builder = builder.publication_date(date);
        }
        Some(builder.build())
    }
}
