//! Citation edges and one-hop citation networks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::paper::{Fingerprint, Paper};

/// A directed citation: `citing_paper_id` cites `cited_paper_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationEdge {
    citing_paper_id: String,
    cited_paper_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

impl CitationEdge {
    /// Returns `None` for a self-citation.
    pub fn new(citing: impl Into<String>, cited: impl Into<String>) -> Option<Self> {
        let citing = citing.into();
        let cited = cited.into();
        if citing == cited {
            return None;
        }
        Some(Self {
            citing_paper_id: citing,
            cited_paper_id: cited,
            context: None,
        })
    }

    pub fn with_context(mut self, context: impl Into<Option<String>>) -> Self {
        self.context = context
            .into()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        self
    }

    pub fn citing_paper_id(&self) -> &str {
        &self.citing_paper_id
    }

    pub fn cited_paper_id(&self) -> &str {
        &self.cited_paper_id
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

/// Raw citation data one source returned for one paper.
#[derive(Debug, Clone, Default)]
pub struct CitationSet {
    /// Papers that cite the target
    pub citing: Vec<Paper>,
    /// Papers the target cites
    pub cited: Vec<Paper>,
    /// Citation context text, keyed by the neighbour's fingerprint
    pub contexts: HashMap<Fingerprint, String>,
}

impl CitationSet {
    pub fn add_citing(&mut self, paper: Paper, context: Option<String>) {
        self.remember_context(&paper, context);
        self.citing.push(paper);
    }

    pub fn add_cited(&mut self, paper: Paper, context: Option<String>) {
        self.remember_context(&paper, context);
        self.cited.push(paper);
    }

    fn remember_context(&mut self, paper: &Paper, context: Option<String>) {
        if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
            self.contexts.entry(paper.fingerprint()).or_insert(context);
        }
    }

    /// First known context for any identity key of `paper`.
    pub fn context_for(&self, paper: &Paper) -> Option<&str> {
        paper
            .identity_keys()
            .iter()
            .find_map(|key| self.contexts.get(key))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.citing.is_empty() && self.cited.is_empty()
    }
}

/// A paper together with its direct neighbours in the citation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationNetwork {
    pub root: Paper,
    pub citing: Vec<Paper>,
    pub cited: Vec<Paper>,
    pub edges: Vec<CitationEdge>,
}

impl CitationNetwork {
    /// A network with no neighbours.
    pub fn root_only(root: Paper) -> Self {
        Self {
            root,
            citing: Vec::new(),
            cited: Vec::new(),
            edges: Vec::new(),
        }
    }
}
