//! Bucketing classified pages into per-identifier outputs and problem lists.

use std::collections::HashMap;

use super::types::{DocumentKind, PageOutcome, PageResult};

/// Insertion-ordered map from identifier to an ascending page list.
///
/// Keys keep the order in which they were first seen. Each page list stays
/// sorted and free of duplicates regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buckets {
    entries: Vec<(String, Vec<u32>)>,
    index: HashMap<String, usize>,
}

impl Buckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `page` to the bucket for `id`, creating the bucket if needed.
    pub fn insert(&mut self, id: &str, page: u32) {
        let slot = match self.index.get(id) {
            Some(&slot) => slot,
            None => {
                self.entries.push((id.to_string(), Vec::new()));
                let slot = self.entries.len() - 1;
                self.index.insert(id.to_string(), slot);
                slot
            }
        };
        insert_sorted(&mut self.entries[slot].1, page);
    }

    /// Pages assigned to `id`, if any.
    pub fn get(&self, id: &str) -> Option<&[u32]> {
        self.index
            .get(id)
            .map(|&slot| self.entries[slot].1.as_slice())
    }

    /// Iterate buckets in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u32])> {
        self.entries
            .iter()
            .map(|(id, pages)| (id.as_str(), pages.as_slice()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn insert_sorted(pages: &mut Vec<u32>, page: u32) {
    let at = pages.partition_point(|&p| p < page);
    if pages.get(at) != Some(&page) {
        pages.insert(at, page);
    }
}

/// Everything produced by one full pass over a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassResult {
    /// Per-identifier buckets; empty when the pass was gated.
    pub buckets: Buckets,
    pub unknown: Vec<u32>,
    pub ambiguous: Vec<u32>,
    /// One result per page, ascending page number.
    pub results: Vec<PageResult>,
    pub document_kind: DocumentKind,
    /// Identifier buckets were withheld because of problem pages.
    pub gated: bool,
    /// Number of resolved pages, counted before any gating.
    pub resolved_pages: usize,
}

impl PassResult {
    pub fn problem_pages(&self) -> usize {
        self.unknown.len() + self.ambiguous.len()
    }

    pub fn page_count(&self) -> usize {
        self.results.len()
    }

    /// Whether nothing on the document could be attributed, ignoring the gate.
    pub fn nothing_resolved(&self) -> bool {
        self.resolved_pages == 0
    }
}

/// Turns an ordered list of page results into a [`PassResult`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentPartitioner {
    stop_on_problems: bool,
}

impl DocumentPartitioner {
    pub fn new(stop_on_problems: bool) -> Self {
        Self { stop_on_problems }
    }

    /// Bucket every page. `first_page_text` is the full text of page 1 and
    /// only decides the document kind.
    pub fn partition(&self, mut results: Vec<PageResult>, first_page_text: &str) -> PassResult {
        results.sort_by_key(|r| r.page_number);

        let mut buckets = Buckets::new();
        let mut unknown = Vec::new();
        let mut ambiguous = Vec::new();
        let mut resolved_pages = 0;

        for result in &results {
            match &result.outcome {
                PageOutcome::Resolved(id) => {
                    buckets.insert(id, result.page_number);
                    resolved_pages += 1;
                }
                PageOutcome::Unresolved => insert_sorted(&mut unknown, result.page_number),
                PageOutcome::Conflicted(_) => insert_sorted(&mut ambiguous, result.page_number),
            }
        }

        let has_problems = !unknown.is_empty() || !ambiguous.is_empty();
        let gated = self.stop_on_problems && has_problems;
        if gated {
            tracing::info!(
                "Withholding {} identifier outputs: {} problem pages",
                buckets.len(),
                unknown.len() + ambiguous.len()
            );
            buckets = Buckets::new();
        }

        PassResult {
            buckets,
            unknown,
            ambiguous,
            results,
            document_kind: DocumentKind::detect(first_page_text),
            gated,
            resolved_pages,
        }
    }
}
