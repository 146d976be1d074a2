//! Paper model representing a research paper from any source.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The bibliographic service a record was read from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    SemanticScholar,
    OpenAlex,
    CrossRef,
    Unpaywall,
    #[serde(untagged)]
    Other(String),
}

impl SourceType {
    /// Returns the display name of the source
    pub fn name(&self) -> &str {
        match self {
            SourceType::SemanticScholar => "Semantic Scholar",
            SourceType::OpenAlex => "OpenAlex",
            SourceType::CrossRef => "CrossRef",
            SourceType::Unpaywall => "Unpaywall",
            SourceType::Other(s) => s,
        }
    }

    /// Returns the source identifier used in configuration
    pub fn id(&self) -> &str {
        match self {
            SourceType::SemanticScholar => "semantic",
            SourceType::OpenAlex => "openalex",
            SourceType::CrossRef => "crossref",
            SourceType::Unpaywall => "unpaywall",
            SourceType::Other(s) => s,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A paper author, scoped to the record it came with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    /// Source-scoped identifier, not stable across sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affiliations: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_index: Option<u32>,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            affiliations: Vec::new(),
            h_index: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_affiliations(mut self, affiliations: Vec<String>) -> Self {
        self.affiliations = affiliations;
        self
    }

    pub fn with_h_index(mut self, h_index: u32) -> Self {
        self.h_index = Some(h_index);
        self
    }

    /// Lower-cased family name.
    ///
    /// Handles both "Ashish Vaswani" and "Vaswani, Ashish".
    pub fn surname(&self) -> Option<String> {
        let name = self.name.trim();
        let raw = match name.split_once(',') {
            Some((family, _)) => family.trim(),
            None => name.split_whitespace().last().unwrap_or(""),
        };
        let surname: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        (!surname.is_empty()).then_some(surname)
    }
}

/// A research paper in canonical form.
///
/// Every adapter converts its native record into this shape; nothing
/// source-specific survives past the adapter boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    /// Identifier in the originating source's namespace
    pub id: String,

    pub title: String,

    /// Authors in byline order
    #[serde(default)]
    pub authors: Vec<Author>,

    #[serde(rename = "abstract", default)]
    pub abstract_text: Option<String>,

    #[serde(default)]
    pub publication_date: Option<NaiveDate>,

    /// Publication year, kept separately since many records carry only a year
    #[serde(default)]
    pub year: Option<i32>,

    #[serde(default)]
    pub venue: Option<String>,

    #[serde(default)]
    pub citation_count: u32,

    #[serde(default)]
    pub reference_count: u32,

    #[serde(default)]
    pub fields_of_study: BTreeSet<String>,

    /// Normalized DOI (lower-case, no resolver prefix)
    #[serde(default)]
    pub doi: Option<String>,

    #[serde(default)]
    pub pdf_url: Option<String>,

    /// Landing page
    #[serde(default)]
    pub url: Option<String>,

    pub source: SourceType,

    #[serde(default)]
    pub is_open_access: bool,
}

impl Paper {
    /// Identity used for deduplication: DOI when present, else the title key.
    pub fn fingerprint(&self) -> Fingerprint {
        match &self.doi {
            Some(doi) => Fingerprint::Doi(doi.clone()),
            None => self.title_key(),
        }
    }

    /// Normalized title + year + first-author surname.
    pub fn title_key(&self) -> Fingerprint {
        Fingerprint::Title {
            title: normalize_title(&self.title),
            year: self.year(),
            surname: self.authors.first().and_then(Author::surname),
        }
    }

    /// All keys this record can be recognized by.
    pub fn identity_keys(&self) -> Vec<Fingerprint> {
        let mut keys = Vec::with_capacity(2);
        if let Some(doi) = &self.doi {
            keys.push(Fingerprint::Doi(doi.clone()));
        }
        keys.push(self.title_key());
        keys
    }

    /// Whether two records describe the same logical paper.
    ///
    /// Records carrying different DOIs are never the same paper.
    pub fn same_identity(&self, other: &Paper) -> bool {
        match (&self.doi, &other.doi) {
            (Some(a), Some(b)) => a == b,
            _ => self.title_key() == other.title_key(),
        }
    }

    pub fn year(&self) -> Option<i32> {
        self.publication_date.map(|d| d.year()).or(self.year)
    }

    /// Sort key for "more recent": full date if known, otherwise Jan 1 of the year.
    pub fn recency(&self) -> Option<NaiveDate> {
        self.publication_date
            .or_else(|| self.year.and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1)))
    }
}

/// Identity key used to recognize the same paper across sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Fingerprint {
    Doi(String),
    Title {
        title: String,
        year: Option<i32>,
        surname: Option<String>,
    },
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fingerprint::Doi(doi) => write!(f, "doi:{}", doi),
            Fingerprint::Title {
                title,
                year,
                surname,
            } => write!(
                f,
                "title:{}|{}|{}",
                title,
                year.map(|y| y.to_string()).unwrap_or_default(),
                surname.as_deref().unwrap_or("")
            ),
        }
    }
}

/// Lower-case alphanumerics with whitespace collapsed; punctuation dropped.
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical DOI form, or `None` if the input is not DOI-shaped.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let lower = raw.trim().to_lowercase();
    let stripped = [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi:",
    ]
    .iter()
    .find_map(|prefix| lower.strip_prefix(prefix))
    .unwrap_or(&lower)
    .trim();

    if stripped.starts_with("10.") && stripped.contains('/') {
        Some(stripped.to_string())
    } else {
        None
    }
}

/// Builder for creating Paper instances
#[derive(Debug, Clone)]
pub struct PaperBuilder {
    paper: Paper,
}

impl PaperBuilder {
    /// Create a new paper builder with required fields
    pub fn new(id: impl Into<String>, title: impl Into<String>, source: SourceType) -> Self {
        Self {
            paper: Paper {
                id: id.into(),
                title: title.into().trim().to_string(),
                authors: Vec::new(),
                abstract_text: None,
                publication_date: None,
                year: None,
                venue: None,
                citation_count: 0,
                reference_count: 0,
                fields_of_study: BTreeSet::new(),
                doi: None,
                pdf_url: None,
                url: None,
                source,
                is_open_access: false,
            },
        }
    }

    pub fn author(mut self, author: Author) -> Self {
        self.paper.authors.push(author);
        self
    }

    pub fn authors(mut self, authors: Vec<Author>) -> Self {
        self.paper.authors = authors;
        self
    }

    pub fn abstract_text(mut self, text: impl Into<Option<String>>) -> Self {
        self.paper.abstract_text = non_blank(text.into());
        self
    }

    /// Sets the date and the year it implies
    pub fn publication_date(mut self, date: NaiveDate) -> Self {
        self.paper.publication_date = Some(date);
        self.paper.year = Some(date.year());
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.paper.year = Some(year);
        self
    }

    pub fn venue(mut self, venue: impl Into<Option<String>>) -> Self {
        self.paper.venue = non_blank(venue.into());
        self
    }

    pub fn citation_count(mut self, count: u32) -> Self {
        self.paper.citation_count = count;
        self
    }

    pub fn reference_count(mut self, count: u32) -> Self {
        self.paper.reference_count = count;
        self
    }

    pub fn field_of_study(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !field.trim().is_empty() {
            self.paper.fields_of_study.insert(field.trim().to_string());
        }
        self
    }

    pub fn fields_of_study<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            self = self.field_of_study(field);
        }
        self
    }

    /// Accepts any common DOI spelling; non-DOI input is ignored
    pub fn doi(mut self, doi: impl Into<Option<String>>) -> Self {
        self.paper.doi = doi.into().as_deref().and_then(normalize_doi);
        self
    }

    pub fn pdf_url(mut self, url: impl Into<Option<String>>) -> Self {
        self.paper.pdf_url = non_blank(url.into());
        self
    }

    pub fn url(mut self, url: impl Into<Option<String>>) -> Self {
        self.paper.url = non_blank(url.into());
        self
    }

    pub fn open_access(mut self, is_open_access: bool) -> Self {
        self.paper.is_open_access = is_open_access;
        self
    }

    pub fn build(self) -> Paper {
        self.paper
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_ids() {
        assert_eq!(SourceType::SemanticScholar.id(), "semantic");
        assert_eq!(SourceType::OpenAlex.name(), "OpenAlex");
        assert_eq!(SourceType::Other("local".into()).id(), "local");
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(
            normalize_title("  Attention Is All You Need!  "),
            "attention is all you need"
        );
        assert_eq!(
            normalize_title("BERT: Pre-training of Deep\tBidirectional Transformers"),
            "bert pre training of deep bidirectional transformers"
        );
    }

    #[test]
    fn test_normalize_doi() {
        assert_eq!(
            normalize_doi("https://doi.org/10.48550/ARXIV.1706.03762"),
            Some("10.48550/arxiv.1706.03762".into())
        );
        assert_eq!(normalize_doi("doi:10.1000/XYZ"), Some("10.1000/xyz".into()));
        assert_eq!(normalize_doi("not-a-doi"), None);
        assert_eq!(normalize_doi("10.1000"), None);
    }

    #[test]
    fn test_author_surname() {
        assert_eq!(Author::new("Ashish Vaswani").surname(), Some("vaswani".into()));
        assert_eq!(Author::new("Vaswani, Ashish").surname(), Some("vaswani".into()));
        assert_eq!(Author::new("  ").surname(), None);
    }

    #[test]
    fn test_builder_normalizes_optional_fields() {
        let paper = PaperBuilder::new("p1", " Title ", SourceType::OpenAlex)
            .abstract_text("   ".to_string())
            .doi("https://doi.org/10.1/ABC".to_string())
            .publication_date(NaiveDate::from_ymd_opt(2020, 5, 1).unwrap())
            .build();

        assert_eq!(paper.title, "Title");
        assert_eq!(paper.abstract_text, None);
        assert_eq!(paper.doi.as_deref(), Some("10.1/abc"));
        assert_eq!(paper.year(), Some(2020));
    }

    #[test]
    fn test_fingerprint_prefers_doi() {
        let with_doi = PaperBuilder::new("a", "Same Title", SourceType::CrossRef)
            .doi("10.1/x".to_string())
            .build();
        let without = PaperBuilder::new("b", "Same Title", SourceType::OpenAlex).build();

        assert_eq!(with_doi.fingerprint(), Fingerprint::Doi("10.1/x".into()));
        assert!(matches!(without.fingerprint(), Fingerprint::Title { .. }));
        assert_eq!(with_doi.identity_keys().len(), 2);
        assert!(with_doi.same_identity(&without));
    }

    #[test]
    fn test_different_dois_never_same_identity() {
        let a = PaperBuilder::new("a", "Same Title", SourceType::CrossRef)
            .doi("10.1/a".to_string())
            .build();
        let b = PaperBuilder::new("b", "Same Title", SourceType::CrossRef)
            .doi("10.1/b".to_string())
            .build();
        assert!(!a.same_identity(&b));
    }

    #[test]
    fn test_paper_json_shape() {
        let paper = PaperBuilder::new("p1", "T", SourceType::SemanticScholar)
            .abstract_text("A".to_string())
            .citation_count(3)
            .build();
        let json = serde_json::to_value(&paper).unwrap();
        assert_eq!(json["abstract"], "A");
        assert_eq!(json["citationCount"], 3);
        assert_eq!(json["source"], "semanticscholar");
        assert_eq!(json["isOpenAccess"], false);
    }
}
