//! Semantic Scholar research source implementation.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use super::{decode_records, records_at, Source, SourceCapabilities, SourceError};
use crate::models::{
    normalize_doi, Author, CitationSet, Paper, PaperBuilder, SearchQuery, SourceType,
};
use crate::utils::{encode_id, fetch_json, HttpClient};

const SEMANTIC_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

const PAPER_FIELDS: &str = "paperId,corpusId,externalIds,title,abstract,year,venue,\
publicationDate,citationCount,referenceCount,fieldsOfStudy,url,openAccessPdf,isOpenAccess,\
authors.authorId,authors.name,authors.affiliations,authors.hIndex";

const LIST_FIELDS: &str = "paperId,corpusId,externalIds,title,abstract,year,venue,\
publicationDate,citationCount,referenceCount,fieldsOfStudy,url,openAccessPdf,isOpenAccess,authors";

/// Id prefixes the Graph API accepts in `/paper/{id}`
const ID_PREFIXES: &[&str] = &[
    "CorpusId:", "ARXIV:", "MAG:", "ACL:", "PMID:", "PMCID:",
];

/// Semantic Scholar research source
///
/// Uses the Semantic Scholar Graph API.
#[derive(Debug, Clone)]
pub struct SemanticScholarSource {
    client: HttpClient,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarSource {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            base_url: SEMANTIC_API_BASE.to_string(),
            api_key: None,
        }
    }

    /// Use an API key (optional, for higher rate limits)
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let builder = self.client.get(&format!("{}{}", self.base_url, endpoint));
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    /// Translate `(id, doi)` into a Graph API paper id.
    fn resolve_id(id: &str, doi: Option<&str>) -> Option<String> {
        if let Some(doi) = doi.and_then(normalize_doi).or_else(|| normalize_doi(id)) {
            return Some(format!("DOI:{}", doi));
        }

        let id = id.trim();
        if id.len() == 40 && id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Some(id.to_lowercase());
        }

        ID_PREFIXES.iter().find_map(|prefix| {
            let head = id.get(..prefix.len())?;
            let rest = &id[prefix.len()..];
            (head.eq_ignore_ascii_case(prefix) && !rest.is_empty())
                .then(|| format!("{}{}", prefix, rest))
        })
    }

    fn papers_from(records: Vec<serde_json::Value>) -> Vec<Paper> {
        decode_records::<S2Paper>("semantic", records)
            .into_iter()
            .filter_map(|raw| {
                let paper = raw.into_paper();
                if paper.is_none() {
                    tracing::warn!(source = "semantic", "Dropping record without id or title");
                }
                paper
            })
            .collect()
    }

    async fn neighbours(
        &self,
        paper_id: &str,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<(Paper, Option<String>)>, SourceError> {
        let endpoint = format!(
            "/paper/{}/{}?fields=contexts,{}&limit={}",
            encode_id(paper_id),
            direction.endpoint(),
            LIST_FIELDS,
            limit.clamp(1, 1000)
        );
        let context = format!("semantic: {} of {}", direction.endpoint(), paper_id);
        let mut envelope = fetch_json(self.request(&endpoint), &context).await?;
        let records = records_at(&mut envelope, "data")?;

        Ok(decode_records::<S2Edge>("semantic", records)
            .into_iter()
            .filter_map(|edge| {
                let context = edge.contexts.and_then(|c| c.into_iter().next());
                let paper = match direction {
                    Direction::Citing => edge.citing_paper,
                    Direction::Cited => edge.cited_paper,
                };
                paper.and_then(S2Paper::into_paper).map(|p| (p, context))
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Citing,
    Cited,
}

impl Direction {
    fn endpoint(self) -> &'static str {
        match self {
            Direction::Citing => "citations",
            Direction::Cited => "references",
        }
    }
}

#[async_trait]
impl Source for SemanticScholarSource {
    fn id(&self) -> &str {
        "semantic"
    }

    fn name(&self) -> &str {
        "Semantic Scholar"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
            | SourceCapabilities::LOOKUP
            | SourceCapabilities::CITATIONS
            | SourceCapabilities::PDF_LOOKUP
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Paper>, SourceError> {
        let endpoint = format!(
            "/paper/search?query={}&limit={}&fields={}",
            urlencoding::encode(&query.query),
            query.max_results,
            LIST_FIELDS
        );
        let mut envelope = fetch_json(self.request(&endpoint), "semantic: search").await?;
        let records = records_at(&mut envelope, "data")?;
        Ok(Self::papers_from(records))
    }

    async fn fetch_by_id(&self, id: &str, doi: Option<&str>) -> Result<Paper, SourceError> {
        let paper_id = Self::resolve_id(id, doi).ok_or_else(|| {
            SourceError::NotFound(format!("semantic: '{}' is not a Semantic Scholar id", id))
        })?;

        let endpoint = format!("/paper/{}?fields={}", encode_id(&paper_id), PAPER_FIELDS);
        let context = format!("semantic: paper {}", paper_id);
        let record = fetch_json(self.request(&endpoint), &context).await?;

        let raw: S2Paper = serde_json::from_value(record)?;
        raw.into_paper()
            .ok_or_else(|| SourceError::Malformed(format!("{}: record has no title", context)))
    }

    async fn fetch_citations(
        &self,
        id: &str,
        doi: Option<&str>,
        limit: usize,
    ) -> Result<CitationSet, SourceError> {
        let paper_id = Self::resolve_id(id, doi).ok_or_else(|| {
            SourceError::NotFound(format!("semantic: '{}' is not a Semantic Scholar id", id))
        })?;

        let (citing, cited) = tokio::try_join!(
            self.neighbours(&paper_id, Direction::Citing, limit),
            self.neighbours(&paper_id, Direction::Cited, limit),
        )?;

        let mut set = CitationSet::default();
        for (paper, context) in citing {
            set.add_citing(paper, context);
        }
        for (paper, context) in cited {
            set.add_cited(paper, context);
        }
        Ok(set)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    paper_id: Option<String>,
    corpus_id: Option<u64>,
    external_ids: Option<S2ExternalIds>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    year: Option<i32>,
    venue: Option<String>,
    publication_date: Option<String>,
    citation_count: Option<u32>,
    reference_count: Option<u32>,
    fields_of_study: Option<Vec<String>>,
    url: Option<String>,
    open_access_pdf: Option<S2OpenAccessPdf>,
    is_open_access: Option<bool>,
    authors: Option<Vec<S2Author>>,
}

#[derive(Debug, Deserialize)]
struct S2ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2OpenAccessPdf {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Author {
    author_id: Option<String>,
    name: Option<String>,
    affiliations: Option<Vec<String>>,
    h_index: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Edge {
    contexts: Option<Vec<String>>,
    citing_paper: Option<S2Paper>,
    cited_paper: Option<S2Paper>,
}

impl S2Paper {
    /// `None` when the record lacks an id or title.
    fn into_paper(self) -> Option<Paper> {
        let title = self.title.filter(|t| !t.trim().is_empty())?;
        let id = self
            .paper_id
            .or_else(|| self.corpus_id.map(|c| format!("CorpusId:{}", c)))?;

        let authors = self
            .authors
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| {
                let mut author = Author::new(a.name.filter(|n| !n.trim().is_empty())?);
                if let Some(id) = a.author_id {
                    author = author.with_id(id);
                }
                if let Some(h) = a.h_index {
                    author = author.with_h_index(h);
                }
                Some(author.with_affiliations(a.affiliations.unwrap_or_default()))
            })
            .collect();

        let pdf_url = self.open_access_pdf.and_then(|p| p.url);
        let mut builder = PaperBuilder::new(id, title, SourceType::SemanticScholar)
            .authors(authors)
            .abstract_text(self.abstract_text)
            .venue(self.venue)
            .citation_count(self.citation_count.unwrap_or(0))
            .reference_count(self.reference_count.unwrap_or(0))
            .fields_of_study(self.fields_of_study.unwrap_or_default())
            .doi(self.external_ids.and_then(|ids| ids.doi))
            .open_access(self.is_open_access.unwrap_or(false) || pdf_url.is_some())
            .pdf_url(pdf_url)
            .url(self.url);

        if let Some(year) = self.year {
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

    fn source(server: &mockito::Server) -> SemanticScholarSource {
        SemanticScholarSource::new(HttpClient::default()).with_base_url(server.url())
    }

    fn attention_json() -> serde_json::Value {
        json!({
            "paperId": "204e3073870fae3d05bcbc2f6a8e263d9b72e776",
            "corpusId": 13756489,
            "externalIds": {"DOI": "10.48550/arXiv.1706.03762", "CorpusId": 13756489},
            "title": "Attention is All you Need",
            "abstract": "The dominant sequence transduction models...",
            "year": 2017,
            "venue": "Neural Information Processing Systems",
            "publicationDate": "2017-06-12",
            "citationCount": 100000,
            "referenceCount": 41,
            "fieldsOfStudy": ["Computer Science"],
            "url": "https://www.semanticscholar.org/paper/204e3073870fae3d05bcbc2f6a8e263d9b72e776",
            "openAccessPdf": {"url": "https://arxiv.org/pdf/1706.03762"},
            "isOpenAccess": true,
            "authors": [
                {"authorId": "40348417", "name": "Ashish Vaswani", "hIndex": 30, "affiliations": []},
                {"authorId": "1846258", "name": "Noam Shazeer"}
            ]
        })
    }

    #[test]
    fn test_resolve_id() {
        assert_eq!(
            SemanticScholarSource::resolve_id("anything", Some("https://doi.org/10.1/X")),
            Some("DOI:10.1/x".into())
        );
        assert_eq!(
            SemanticScholarSource::resolve_id("arxiv:1706.03762", None),
            Some("ARXIV:1706.03762".into())
        );
        assert_eq!(
            SemanticScholarSource::resolve_id("204E3073870FAE3D05BCBC2F6A8E263D9B72E776", None),
            Some("204e3073870fae3d05bcbc2f6a8e263d9b72e776".into())
        );
        assert_eq!(SemanticScholarSource::resolve_id("W2741809807", None), None);
        assert_eq!(SemanticScholarSource::resolve_id("CorpusId:", None), None);
    }

    #[test]
    fn test_into_paper() {
        let raw: S2Paper = serde_json::from_value(attention_json()).unwrap();
        let paper = raw.into_paper().unwrap();

        assert_eq!(paper.id, "204e3073870fae3d05bcbc2f6a8e263d9b72e776");
        assert_eq!(paper.doi.as_deref(), Some("10.48550/arxiv.1706.03762"));
        assert_eq!(paper.year(), Some(2017));
        assert_eq!(paper.authors.len(), 2);
        assert_eq!(paper.authors[0].h_index, Some(30));
        assert_eq!(paper.pdf_url.as_deref(), Some("https://arxiv.org/pdf/1706.03762"));
        assert!(paper.is_open_access);
        assert_eq!(paper.source, SourceType::SemanticScholar);
    }

    #[tokio::test]
    async fn test_search_skips_malformed_records() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/paper/search")
            .match_query(Matcher::UrlEncoded(
                "query".into(),
                "transformer attention".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "total": 3,
                    "data": [
                        attention_json(),
                        {"paperId": "abc", "title": null},
                        {"paperId": "def", "title": "Bad count", "citationCount": "many"}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let papers = source(&server)
            .search(&SearchQuery::new("transformer attention"))
            .await
            .unwrap();

        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].title, "Attention is All you Need");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_by_id_uses_doi_hint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/paper/DOI:10.48550/arxiv.1706.03762")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(attention_json().to_string())
            .create_async()
            .await;

        let paper = source(&server)
            .fetch_by_id("W2963403868", Some("10.48550/arXiv.1706.03762"))
            .await
            .unwrap();
        assert_eq!(paper.citation_count, 100000);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_by_id_foreign_id_is_not_found_without_request() {
        let server = mockito::Server::new_async().await;
        let result = source(&server).fetch_by_id("W2963403868", None).await;
        assert!(matches!(result, Err(SourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_fetch_by_id_404_and_429() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/paper/CorpusId:1")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/paper/CorpusId:2")
            .match_query(Matcher::Any)
            .with_status(429)
            .create_async()
            .await;

        let s2 = source(&server);
        assert!(matches!(
            s2.fetch_by_id("CorpusId:1", None).await,
            Err(SourceError::NotFound(_))
        ));
        assert!(matches!(
            s2.fetch_by_id("CorpusId:2", None).await,
            Err(SourceError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_citations() {
        let mut server = mockito::Server::new_async().await;
        let id = "204e3073870fae3d05bcbc2f6a8e263d9b72e776";
        server
            .mock("GET", format!("/paper/{}/citations", id).as_str())
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({"data": [
                    {"contexts": ["building on the Transformer [12]"],
                     "citingPaper": {"paperId": "c1", "title": "BERT", "year": 2018}},
                    {"contexts": [], "citingPaper": {"paperId": "c2", "title": null}}
                ]})
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", format!("/paper/{}/references", id).as_str())
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({"data": [
                    {"citedPaper": {"paperId": "r1", "title": "Neural Machine Translation", "year": 2014}}
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let set = source(&server).fetch_citations(id, None, 10).await.unwrap();
        assert_eq!(set.citing.len(), 1);
        assert_eq!(set.cited.len(), 1);
        assert_eq!(
            set.context_for(&set.citing[0]),
            Some("building on the Transformer [12]")
        );
        assert_eq!(set.cited[0].id, "r1");
    }
}
