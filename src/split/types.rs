//! Per-page classification outcomes and whole-document kind.

use std::collections::BTreeSet;

/// Label used in problem-bucket filenames (`UNKNOWN_BEO.pdf`, `AMBIGUOUS_BEO.pdf`).
pub const PROBLEM_LABEL: &str = "BEO";

/// Outcome of classifying a single page.
///
/// Each variant carries only the data valid for it: a resolved page has
/// exactly one identifier, a conflicted page has two or more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Resolved(String),
    Unresolved,
    Conflicted(BTreeSet<String>),
}

impl PageOutcome {
    /// Status column value used in the split report.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Resolved(_) => "OK",
            Self::Unresolved => "UNKNOWN",
            Self::Conflicted(_) => "AMBIGUOUS",
        }
    }

    /// The resolved identifier, if any.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Self::Resolved(id) => Some(id),
            _ => None,
        }
    }

    /// Whether the page needs manual review.
    pub fn is_problem(&self) -> bool {
        !matches!(self, Self::Resolved(_))
    }
}

/// Audit-ready classification of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult {
    /// 1-based page number within the pass.
    pub page_number: u32,
    pub outcome: PageOutcome,
}

impl PageResult {
    pub fn new(page_number: u32, outcome: PageOutcome) -> Self {
        Self {
            page_number,
            outcome,
        }
    }

    /// Sorted identifiers that drove the outcome. Empty only for unresolved pages.
    pub fn raw_matches(&self) -> Vec<String> {
        match &self.outcome {
            PageOutcome::Resolved(id) => vec![id.clone()],
            PageOutcome::Unresolved => Vec::new(),
            PageOutcome::Conflicted(ids) => ids.iter().cloned().collect(),
        }
    }
}

/// Whole-document sub-type, used only to pick the output filename prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DocumentKind {
    #[default]
    Standard,
    ChangeOrder,
}

/// Phrase on the first page that marks a change-order packet.
const CHANGE_ORDER_MARKER: &str = "CHANGE ORDER";

impl DocumentKind {
    /// Detect the kind from the first page's full text.
    pub fn detect(first_page_text: &str) -> Self {
        let normalized = first_page_text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();
        if normalized.contains(CHANGE_ORDER_MARKER) {
            Self::ChangeOrder
        } else {
            Self::Standard
        }
    }

    /// Filename prefix for resolved outputs.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Standard => "BEO_",
            Self::ChangeOrder => "BCO_",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::ChangeOrder => "change_order",
        }
    }
}
