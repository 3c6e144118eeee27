//! Page classification cascade.
//!
//! A page is classified by walking a fixed list of stages, each pairing a
//! pattern family with a text scope. The first stage that finds anything
//! decides the outcome: one distinct identifier resolves the page, two or
//! more make it conflicted. Later stages are never consulted after that.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use super::extract::{band_text, full_text, PageContent};
use super::types::{PageOutcome, PageResult};

/// Canonical long form: "BANQUET EVENT ORDER #: 35325".
static LONG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bBANQUET\s+EVENT\s+ORDER\s*(?:#|NO\.?|NUMBER)?\s*:\s*(\d{3,})\b").unwrap()
});

/// Compact tagged form: "BEO#:35325" or "BEO: 35325".
static COMPACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bBEO#?:\s*(\d{3,})\b").unwrap());

/// Canonical short form: "BEO #: 35325".
static SHORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bBEO\s*#?\s*:\s*(\d{3,})\b").unwrap());

/// Loose form, colon optional: "BEO 35325", "BEO# 35325".
static LOOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bBEO\s*#?\s*:?\s*(\d{3,})\b").unwrap());

/// Substrings marking a line as a cross-reference to another event.
/// Only the final stage honors these.
pub const REFERENCE_LINE_HINTS: &[&str] = &[
    "REFERENCE",
    "REFER TO",
    "REF ",
    "SPLIT BEO",
    "SPLIT BEOS",
    "NEXT DAY",
    "FROM BEO",
    "ALSO OCCURRING",
];

/// A family of identifier patterns, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternFamily {
    Long,
    Compact,
    Short,
    Loose,
}

impl PatternFamily {
    fn regex(&self) -> &'static Regex {
        match self {
            Self::Long => &LONG_RE,
            Self::Compact => &COMPACT_RE,
            Self::Short => &SHORT_RE,
            Self::Loose => &LOOSE_RE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Compact => "compact",
            Self::Short => "short",
            Self::Loose => "loose",
        }
    }

    /// Distinct identifiers this family finds in `text`.
    pub fn find_all(&self, text: &str) -> BTreeSet<String> {
        self.regex()
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

/// Which part of the page a stage looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Header and footer band only.
    Band,
    /// Whole page.
    Full,
    /// Whole page, line by line, skipping reference lines.
    FullExcludingReferences,
}

/// One step of the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub family: PatternFamily,
    pub scope: Scope,
}

impl Stage {
    const fn new(family: PatternFamily, scope: Scope) -> Self {
        Self { family, scope }
    }

    fn evaluate(&self, band: &str, full: &str) -> BTreeSet<String> {
        match self.scope {
            Scope::Band => self.family.find_all(band),
            Scope::Full => self.family.find_all(full),
            Scope::FullExcludingReferences => full
                .lines()
                .filter(|line| !is_reference_line(line))
                .flat_map(|line| self.family.find_all(line))
                .collect(),
        }
    }
}

/// The cascade, in evaluation order.
pub const CASCADE: &[Stage] = &[
    Stage::new(PatternFamily::Long, Scope::Band),
    Stage::new(PatternFamily::Long, Scope::Full),
    Stage::new(PatternFamily::Compact, Scope::Band),
    Stage::new(PatternFamily::Compact, Scope::Full),
    Stage::new(PatternFamily::Short, Scope::Band),
    Stage::new(PatternFamily::Short, Scope::Full),
    Stage::new(PatternFamily::Loose, Scope::Band),
    Stage::new(PatternFamily::Loose, Scope::FullExcludingReferences),
];

fn is_reference_line(line: &str) -> bool {
    let upper = line.to_uppercase();
    REFERENCE_LINE_HINTS.iter().any(|hint| upper.contains(hint))
}

/// Runs a stage list against a page's band and full text.
#[derive(Debug, Clone, Copy)]
pub struct PageClassifier {
    stages: &'static [Stage],
}

impl Default for PageClassifier {
    fn default() -> Self {
        Self { stages: CASCADE }
    }
}

impl PageClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify from already-extracted text.
    pub fn classify(&self, band: &str, full: &str) -> PageOutcome {
        for stage in self.stages {
            let matches = stage.evaluate(band, full);
            match matches.len() {
                0 => continue,
                1 => {
                    if let Some(id) = matches.into_iter().next() {
                        return PageOutcome::Resolved(id);
                    }
                }
                _ => {
                    tracing::trace!(
                        "Stage {}/{:?} found {} identifiers",
                        stage.family.as_str(),
                        stage.scope,
                        matches.len()
                    );
                    return PageOutcome::Conflicted(matches);
                }
            }
        }
        PageOutcome::Unresolved
    }

    /// Extract and classify one page.
    pub fn classify_page(
        &self,
        page_number: u32,
        page: &PageContent,
        margin_ratio: f64,
    ) -> PageResult {
        let band = band_text(page, margin_ratio);
        let full = full_text(page);
        PageResult::new(page_number, self.classify(&band, &full))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::extract::{TextBlock, DEFAULT_MARGIN_RATIO};

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn page(height: f64, blocks: &[(f64, f64, &str)]) -> PageContent {
        let blocks: Vec<TextBlock> = blocks
            .iter()
            .map(|(y0, y1, text)| TextBlock {
                y0: *y0,
                y1: *y1,
                text: text.to_string(),
            })
            .collect();
        let text = blocks
            .iter()
            .map(|b| b.text.clone())
            .collect::<Vec<_>>()
            .join("\n");
        PageContent {
            text,
            blocks,
            height: Some(height),
        }
    }

    #[test]
    fn test_header_colon_form_resolves() {
        let classifier = PageClassifier::new();
        assert_eq!(
            classifier.classify("BEO #: 35325", "BEO #: 35325\nDinner service"),
            PageOutcome::Resolved("35325".to_string())
        );
    }

    #[test]
    fn test_band_beats_body_mentions() {
        let classifier = PageClassifier::new();
        // Body has another colon-form id, but the band stage fires first.
        let full = "BEO #: 100\nSee BEO #: 200 for the reception";
        assert_eq!(
            classifier.classify("BEO #: 100", full),
            PageOutcome::Resolved("100".to_string())
        );
    }

    #[test]
    fn test_long_form_takes_precedence() {
        let classifier = PageClassifier::new();
        let band = "Banquet Event Order #: 4410\nBEO: 9999";
        assert_eq!(
            classifier.classify(band, band),
            PageOutcome::Resolved("4410".to_string())
        );
    }

    #[test]
    fn test_long_form_variants() {
        for text in [
            "BANQUET EVENT ORDER: 123",
            "banquet  event order no.: 123",
            "Banquet Event Order Number : 123",
        ] {
            assert_eq!(PatternFamily::Long.find_all(text), ids(&["123"]), "{text}");
        }
    }

    #[test]
    fn test_no_match_is_unresolved() {
        let classifier = PageClassifier::new();
        assert_eq!(
            classifier.classify("", "Menu\nChicken\nBEO 12"),
            PageOutcome::Unresolved
        );
        assert_eq!(classifier.classify("", ""), PageOutcome::Unresolved);
    }

    #[test]
    fn test_conflict_uses_first_firing_stage_only() {
        let classifier = PageClassifier::new();
        // Short/band finds two ids; the loose body mention of 777 is never reached.
        let band = "BEO #: 300\nBEO #: 400";
        let full = "BEO #: 300\nBEO #: 400\nBEO 777";
        assert_eq!(
            classifier.classify(band, full),
            PageOutcome::Conflicted(ids(&["300", "400"]))
        );
    }

    #[test]
    fn test_repeated_id_is_not_a_conflict() {
        let classifier = PageClassifier::new();
        let band = "BEO #: 500\nPage 2 of 3 BEO #: 500";
        assert_eq!(
            classifier.classify(band, band),
            PageOutcome::Resolved("500".to_string())
        );
    }

    #[test]
    fn test_final_stage_skips_reference_lines() {
        let classifier = PageClassifier::new();
        let full = "Reference BEO 37057\nBEO 35325\nsplit beo 11111";
        assert_eq!(
            classifier.classify("", full),
            PageOutcome::Resolved("35325".to_string())
        );

        // Only reference lines carry ids.
        assert_eq!(
            classifier.classify("", "Refer to BEO 37057\nAlso occurring BEO 2222"),
            PageOutcome::Unresolved
        );
    }

    #[test]
    fn test_reference_hint_on_genuine_line_is_missed() {
        let classifier = PageClassifier::new();
        assert_eq!(
            classifier.classify("", "BEO 35325 Next Day Setup"),
            PageOutcome::Unresolved
        );
    }

    #[test]
    fn test_loose_band_before_filtered_body() {
        let classifier = PageClassifier::new();
        assert_eq!(
            classifier.classify("BEO 808", "BEO 808\nBEO 909"),
            PageOutcome::Resolved("808".to_string())
        );
    }

    #[test]
    fn test_short_identifiers_are_ignored() {
        assert!(PatternFamily::Loose.find_all("BEO 12").is_empty());
        assert!(PatternFamily::Short.find_all("BEO #: 12").is_empty());
    }

    #[test]
    fn test_classification_is_pure() {
        let classifier = PageClassifier::new();
        let p = page(
            100.0,
            &[(1.0, 10.0, "BEO #: 100"), (40.0, 50.0, "Reference BEO 999")],
        );
        let first = classifier.classify_page(1, &p, DEFAULT_MARGIN_RATIO);
        let second = classifier.classify_page(1, &p, DEFAULT_MARGIN_RATIO);
        assert_eq!(first, second);
        assert_eq!(first.outcome, PageOutcome::Resolved("100".to_string()));
    }

    #[test]
    fn test_classify_page_uses_band_geometry() {
        let classifier = PageClassifier::new();
        // Two colon-form ids on the page, only one in the footer band.
        let p = page(
            100.0,
            &[(40.0, 50.0, "Transfer from BEO #: 222"), (90.0, 98.0, "BEO #: 111")],
        );
        let result = classifier.classify_page(4, &p, DEFAULT_MARGIN_RATIO);
        assert_eq!(result.page_number, 4);
        assert_eq!(result.outcome, PageOutcome::Resolved("111".to_string()));
    }
}
