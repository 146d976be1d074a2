//! OpenAlex research source implementation.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;

use super::{decode_records, records_at, Source, SourceCapabilities, SourceError};
use crate::models::{normalize_doi, Author, CitationSet, Paper, PaperBuilder, SearchQuery, SourceType};
use crate::utils::{encode_id, fetch_json, HttpClient};

const OPENALEX_API_BASE: &str = "https://api.openalex.org";
const OPENALEX_ID_PREFIX: &str = "https://openalex.org/";

/// OpenAlex research source
#[derive(Debug, Clone)]
pub struct OpenAlexSource {
    client: HttpClient,
    base_url: String,
    mailto: Option<String>,
}

impl OpenAlexSource {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            base_url: OPENALEX_API_BASE.to_string(),
            mailto: None,
        }
    }

    /// Identify requests for the polite pool
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

    /// A bare `W…` work id, if `id` is one (optionally as an OpenAlex URL)
    fn work_id(id: &str) -> Option<String> {
        let id = id.trim();
        let id = id.strip_prefix(OPENALEX_ID_PREFIX).unwrap_or(id);
        let digits = id.strip_prefix('W').or_else(|| id.strip_prefix('w'))?;
        (!digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
            .then(|| format!("W{}", digits))
    }

    /// Path segment for `/works/{…}`, preferring the DOI
    fn lookup_key(id: &str, doi: Option<&str>) -> Option<String> {
        doi.and_then(normalize_doi)
            .or_else(|| normalize_doi(id))
            .map(|doi| format!("doi:{}", doi))
            .or_else(|| Self::work_id(id))
    }

    async fn works(&self, endpoint: &str, context: &str) -> Result<Vec<Paper>, SourceError> {
        let mut envelope = fetch_json(self.request(endpoint), context).await?;
        let records = records_at(&mut envelope, "results")?;
        Ok(decode_records::<OpenAlexWork>("openalex", records)
            .into_iter()
            .filter_map(|work| {
                let paper = work.into_paper();
                if paper.is_none() {
                    tracing::warn!(source = "openalex", "Dropping work without id or title");
                }
                paper
            })
            .collect())
    }
}

#[async_trait]
impl Source for OpenAlexSource {
    fn id(&self) -> &str {
        "openalex"
    }

    fn name(&self) -> &str {
        "OpenAlex"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
            | SourceCapabilities::LOOKUP
            | SourceCapabilities::CITATIONS
            | SourceCapabilities::PDF_LOOKUP
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Paper>, SourceError> {
        let endpoint = format!(
            "/works?search={}&per-page={}",
            urlencoding::encode(&query.query),
            query.max_results
        );
        self.works(&endpoint, "openalex: search").await
    }

    async fn fetch_by_id(&self, id: &str, doi: Option<&str>) -> Result<Paper, SourceError> {
        let key = Self::lookup_key(id, doi).ok_or_else(|| {
            SourceError::NotFound(format!("openalex: '{}' is not an OpenAlex id", id))
        })?;

        let context = format!("openalex: work {}", key);
        let record = fetch_json(self.request(&format!("/works/{}", encode_id(&key))), &context)
            .await?;

        let work: OpenAlexWork = serde_json::from_value(record)?;
        work.into_paper()
            .ok_or_else(|| SourceError::Malformed(format!("{}: record has no title", context)))
    }

    async fn fetch_citations(
        &self,
        id: &str,
        doi: Option<&str>,
        limit: usize,
    ) -> Result<CitationSet, SourceError> {
        // Filters need the W id; a DOI costs one extra lookup
        let work_id = match Self::work_id(id) {
            Some(work_id) if doi.is_none() => work_id,
            _ => self.fetch_by_id(id, doi).await?.id,
        };

        let per_page = limit.clamp(1, 200);
        let citing_endpoint = format!("/works?filter=cites:{}&per-page={}", work_id, per_page);
        let cited_endpoint = format!("/works?filter=cited_by:{}&per-page={}", work_id, per_page);
        let (citing, cited) = tokio::try_join!(
            self.works(&citing_endpoint, "openalex: citing works"),
            self.works(&cited_endpoint, "openalex: referenced works"),
        )?;

        let mut set = CitationSet::default();
        for paper in citing {
            set.add_citing(paper, None);
        }
        for paper in cited {
            set.add_cited(paper, None);
        }
        Ok(set)
    }
}

#[derive(Debug, Deserialize)]
struct OpenAlexWork {
    id: Option<String>,
    doi: Option<String>,
    title: Option<String>,
    display_name: Option<String>,
    publication_year: Option<i32>,
    publication_date: Option<String>,
    cited_by_count: Option<u32>,
    referenced_works_count: Option<u32>,
    authorships: Option<Vec<Authorship>>,
    primary_location: Option<Location>,
    best_oa_location: Option<Location>,
    open_access: Option<OpenAccess>,
    concepts: Option<Vec<Concept>>,
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
}

#[derive(Debug, Deserialize)]
struct Authorship {
    author: Option<AuthorRef>,
    institutions: Option<Vec<Institution>>,
}

#[derive(Debug, Deserialize)]
struct AuthorRef {
    id: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Institution {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    pdf_url: Option<String>,
    landing_page_url: Option<String>,
    source: Option<LocationSource>,
}

#[derive(Debug, Deserialize)]
struct LocationSource {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAccess {
    is_oa: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct Concept {
    display_name: Option<String>,
    level: Option<u32>,
}

/// Rebuild abstract text from `{word: [positions]}`.
fn rebuild_abstract(index: HashMap<String, Vec<usize>>) -> Option<String> {
    let mut positioned: Vec<(usize, String)> = index
        .into_iter()
        .flat_map(|(word, positions)| positions.into_iter().map(move |p| (p, word.clone())))
        .collect();
    if positioned.is_empty() {
        return None;
    }
    positioned.sort_by_key(|(position, _)| *position);
    Some(
        positioned
            .into_iter()
            .map(|(_, word)| word)
            .collect::<Vec<_>>()
            .join(" "),
    )
}

impl OpenAlexWork {
    fn into_paper(self) -> Option<Paper> {
        let title = self
            .title
            .or(self.display_name)
            .filter(|t| !t.trim().is_empty())?;
        let raw_id = self.id?;
        let id = raw_id
            .strip_prefix(OPENALEX_ID_PREFIX)
            .unwrap_or(&raw_id)
            .to_string();

        let authors = self
            .authorships
            .unwrap_or_default()
            .into_iter()
            .filter_map(|authorship| {
                let author_ref = authorship.author?;
                let name = author_ref.display_name.filter(|n| !n.trim().is_empty())?;
                let affiliations = authorship
                    .institutions
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|i| i.display_name)
                    .collect();
                let mut author = Author::new(name).with_affiliations(affiliations);
                if let Some(author_id) = author_ref.id {
                    let short = author_id
                        .strip_prefix(OPENALEX_ID_PREFIX)
                        .unwrap_or(&author_id)
                        .to_string();
                    author = author.with_id(short);
                }
                Some(author)
            })
            .collect();

        let fields = self
            .concepts
            .unwrap_or_default()
            .into_iter()
            .filter(|c| c.level == Some(0))
            .filter_map(|c| c.display_name);

        let venue = self
            .primary_location
            .as_ref()
            .and_then(|l| l.source.as_ref())
            .and_then(|s| s.display_name.clone());
        let landing = self
            .primary_location
            .as_ref()
            .and_then(|l| l.landing_page_url.clone());
        let pdf_url = self
            .best_oa_location
            .as_ref()
            .and_then(|l| l.pdf_url.clone())
            .or_else(|| self.primary_location.as_ref().and_then(|l| l.pdf_url.clone()));
        let is_oa = self.open_access.and_then(|oa| oa.is_oa).unwrap_or(false);

        let mut builder = PaperBuilder::new(id, title, SourceType::OpenAlex)
            .authors(authors)
            .abstract_text(self.abstract_inverted_index.and_then(rebuild_abstract))
            .venue(venue)
            .citation_count(self.cited_by_count.unwrap_or(0))
            .reference_count(self.referenced_works_count.unwrap_or(0))
            .fields_of_study(fields)
            .doi(self.doi)
            .open_access(is_oa || pdf_url.is_some())
            .pdf_url(pdf_url)
            .url(landing.or(Some(raw_id)));

        if let Some(year) = self.publication_year {
            builder = builder.year(year);
        }
        if let Some(date) = self
            .publication_date
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
        {
            builder = builder.publication_date(date);
        }
        Some(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn source(server: &mockito::Server) -> OpenAlexSource {
        OpenAlexSource::new(HttpClient::default()).with_base_url(server.url())
    }

    fn work_json() -> serde_json::Value {
        json!({
            "id": "https://openalex.org/W2963403868",
            "doi": "https://doi.org/10.48550/arxiv.1706.03762",
            "title": "Attention Is All You Need",
            "publication_year": 2017,
            "publication_date": "2017-06-12",
            "cited_by_count": 90000,
            "referenced_works_count": 40,
            "authorships": [
                {"author": {"id": "https://openalex.org/A1", "display_name": "Ashish Vaswani"},
                 "institutions": [{"display_name": "Google"}]}
            ],
            "primary_location": {"source": {"display_name": "arXiv"}, "landing_page_url": "https://arxiv.org/abs/1706.03762"},
            "best_oa_location": {"pdf_url": "https://arxiv.org/pdf/1706.03762"},
            "open_access": {"is_oa": true},
            "concepts": [
                {"display_name": "Computer science", "level": 0},
                {"display_name": "Transformer", "level": 2}
            ],
            "abstract_inverted_index": {"The": [0], "dominant": [1], "models": [3], "sequence": [2]}
        })
    }

    #[test]
    fn test_work_id() {
        assert_eq!(OpenAlexSource::work_id("W123"), Some("W123".into()));
        assert_eq!(
            OpenAlexSource::work_id("https://openalex.org/W123"),
            Some("W123".into())
        );
        assert_eq!(OpenAlexSource::work_id("W12a"), None);
        assert_eq!(OpenAlexSource::work_id("P1"), None);
        assert_eq!(
            OpenAlexSource::lookup_key("W1", Some("10.1/X")),
            Some("doi:10.1/x".into())
        );
    }

    #[test]
    fn test_into_paper() {
        let work: OpenAlexWork = serde_json::from_value(work_json()).unwrap();
        let paper = work.into_paper().unwrap();

        assert_eq!(paper.id, "W2963403868");
        assert_eq!(paper.doi.as_deref(), Some("10.48550/arxiv.1706.03762"));
        assert_eq!(
            paper.abstract_text.as_deref(),
            Some("The dominant sequence models")
        );
        assert_eq!(paper.venue.as_deref(), Some("arXiv"));
        assert_eq!(paper.authors[0].affiliations, vec!["Google"]);
        assert_eq!(paper.authors[0].id.as_deref(), Some("A1"));
        assert!(paper.fields_of_study.contains("Computer science"));
        assert!(!paper.fields_of_study.contains("Transformer"));
        assert!(paper.is_open_access);
    }

    #[tokio::test]
    async fn test_search() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::UrlEncoded("search".into(), "transformer attention".into()))
            .with_status(200)
            .with_body(
                json!({"meta": {"count": 2}, "results": [work_json(), {"id": "https://openalex.org/W9"}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let papers = source(&server)
            .search(&SearchQuery::new("transformer attention"))
            .await
            .unwrap();
        assert_eq!(papers.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_citations_resolves_doi_first() {
        let mut server = mockito::Server::new_async().await;
        let lookup = server
            .mock("GET", "/works/doi:10.48550/arxiv.1706.03762")
            .with_status(200)
            .with_body(work_json().to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/works")
            .match_query(Matcher::UrlEncoded("filter".into(), "cites:W2963403868".into()))
            .with_status(200)
            .with_body(
                json!({"results": [{"id": "https://openalex.org/W1", "title": "BERT", "publication_year": 2018}]})
                    .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/works")
            .match_query(Matcher::UrlEncoded("filter".into(), "cited_by:W2963403868".into()))
            .with_status(200)
            .with_body(json!({"results": []}).to_string())
            .create_async()
            .await;

        let set = source(&server)
            .fetch_citations("P1", Some("10.48550/arXiv.1706.03762"), 25)
            .await
            .unwrap();
        assert_eq!(set.citing.len(), 1);
        assert_eq!(set.citing[0].id, "W1");
        assert!(set.cited.is_empty());
        lookup.assert_async().await;
    }

    #[tokio::test]
    async fn test_foreign_id_not_found() {
        let server = mockito::Server::new_async().await;
        let result = source(&server).fetch_citations("CorpusId:1", None, 10).await;
        assert!(matches!(result, Err(SourceError::NotFound(_))));
    }
}
