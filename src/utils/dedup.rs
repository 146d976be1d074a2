//! Identity reconciliation and merging of papers across sources.
//!
//! Records are grouped by identity: equal DOIs always group, and records
//! with equal title keys (normalized title, year, first-author surname)
//! group as long as that does not put two different DOIs in one group.
//! Each group collapses into one representative whose missing fields are
//! backfilled from the other members.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::config::MergePolicy;
use crate::models::{Fingerprint, Paper};

/// Merges and ranks papers coming from several sources
#[derive(Debug, Clone)]
pub struct PaperMerger {
    policy: MergePolicy,
    priority: Vec<String>,
}

impl PaperMerger {
    /// `priority` lists source ids, most preferred first
    pub fn new(policy: MergePolicy, priority: Vec<String>) -> Self {
        Self { policy, priority }
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Position of a source in the priority list; unknown sources rank last
    pub fn priority_of(&self, source_id: &str) -> usize {
        self.priority
            .iter()
            .position(|id| id == source_id)
            .unwrap_or(self.priority.len())
    }

    /// Collapse duplicates and return the ranked result.
    pub fn merge(&self, papers: Vec<Paper>) -> Vec<Paper> {
        let groups = group_by_identity(&papers);
        let mut slots: Vec<Option<Paper>> = papers.into_iter().map(Some).collect();

        let mut merged: Vec<Paper> = groups
            .into_iter()
            .filter_map(|indices| {
                let members: Vec<Paper> =
                    indices.iter().filter_map(|&i| slots[i].take()).collect();
                self.merge_group(members)
            })
            .collect();

        self.rank(&mut merged);
        merged
    }

    /// Citation count descending, then more recent, then source priority.
    pub fn rank(&self, papers: &mut [Paper]) {
        papers.sort_by(|a, b| {
            b.citation_count
                .cmp(&a.citation_count)
                .then_with(|| compare_recency(a, b))
                .then_with(|| {
                    self.priority_of(a.source.id())
                        .cmp(&self.priority_of(b.source.id()))
                })
                .then_with(|| a.id.cmp(&b.id))
        });
    }

    fn merge_group(&self, mut members: Vec<Paper>) -> Option<Paper> {
        // Best donor first: the representative is members[0]
        match self.policy {
            MergePolicy::HighestCitations => members.sort_by(|a, b| {
                b.citation_count.cmp(&a.citation_count).then_with(|| {
                    self.priority_of(a.source.id())
                        .cmp(&self.priority_of(b.source.id()))
                })
            }),
            MergePolicy::SourcePriority => members.sort_by(|a, b| {
                self.priority_of(a.source.id())
                    .cmp(&self.priority_of(b.source.id()))
                    .then_with(|| b.citation_count.cmp(&a.citation_count))
            }),
        }

        let mut donors = members.into_iter();
        let mut representative = donors.next()?;
        let mut max_citations = representative.citation_count;
        let mut max_references = representative.reference_count;

        for donor in donors {
            max_citations = max_citations.max(donor.citation_count);
            max_references = max_references.max(donor.reference_count);
            backfill(&mut representative, donor);
        }

        if self.policy == MergePolicy::SourcePriority {
            representative.citation_count = max_citations;
            representative.reference_count = max_references;
        } else if representative.reference_count == 0 {
            representative.reference_count = max_references;
        }

        Some(representative)
    }
}

impl Default for PaperMerger {
    fn default() -> Self {
        Self::new(MergePolicy::default(), Vec::new())
    }
}

fn compare_recency(a: &Paper, b: &Paper) -> Ordering {
    match (a.recency(), b.recency()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Fill fields the representative lacks from a donor record.
fn backfill(target: &mut Paper, donor: Paper) {
    if target.abstract_text.is_none() {
        target.abstract_text = donor.abstract_text;
    }
    if target.pdf_url.is_none() {
        target.pdf_url = donor.pdf_url;
    }
    if target.fields_of_study.is_empty() {
        target.fields_of_study = donor.fields_of_study;
    }
    if target.doi.is_none() {
        target.doi = donor.doi;
    }
    if target.venue.is_none() {
        target.venue = donor.venue;
    }
    if target.url.is_none() {
        target.url = donor.url;
    }
    if target.publication_date.is_none() {
        target.publication_date = donor.publication_date;
    }
    if target.year.is_none() {
        target.year = donor.year;
    }
    if target.authors.is_empty() {
        target.authors = donor.authors;
    }
    target.is_open_access |= donor.is_open_access;
}

/// Group paper indices by identity, in order of first appearance.
///
/// Every index appears in exactly one group; singletons included.
pub fn group_by_identity(papers: &[Paper]) -> Vec<Vec<usize>> {
    let mut sets = DisjointSet::new(papers);

    let mut by_doi: HashMap<&str, usize> = HashMap::new();
    for (i, paper) in papers.iter().enumerate() {
        if let Some(doi) = paper.doi.as_deref() {
            match by_doi.get(doi) {
                Some(&first) => {
                    sets.union(first, i);
                }
                None => {
                    by_doi.insert(doi, i);
                }
            }
        }
    }

    let mut by_title: HashMap<Fingerprint, Vec<usize>> = HashMap::new();
    for (i, paper) in papers.iter().enumerate() {
        let key = paper.title_key();
        if let Fingerprint::Title { title, .. } = &key {
            if title.is_empty() {
                continue;
            }
        }
        let seen = by_title.entry(key).or_default();
        // Join the first compatible group that shares this title key
        if let Some(&other) = seen.iter().find(|&&j| sets.compatible(i, j)) {
            sets.union(other, i);
        }
        seen.push(i);
    }

    let mut order: Vec<usize> = Vec::new();
    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..papers.len() {
        let root = sets.find(i);
        let members = groups.entry(root).or_insert_with(|| {
            order.push(root);
            Vec::new()
        });
        members.push(i);
    }

    order
        .into_iter()
        .filter_map(|root| groups.remove(&root))
        .collect()
}

/// Union-find that tracks the (at most one) DOI carried by each group.
struct DisjointSet {
    parent: Vec<usize>,
    doi: Vec<Option<String>>,
}

impl DisjointSet {
    fn new(papers: &[Paper]) -> Self {
        Self {
            parent: (0..papers.len()).collect(),
            doi: papers.iter().map(|p| p.doi.clone()).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    /// Whether joining the groups of `a` and `b` keeps at most one DOI
    fn compatible(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        match (&self.doi[ra], &self.doi[rb]) {
            (Some(x), Some(y)) => x == y,
            _ => true,
        }
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[child] = root;
        if self.doi[root].is_none() {
            self.doi[root] = self.doi[child].take();
        }
    }
}
