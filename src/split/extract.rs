//! Page text extraction using pdftotext (Poppler).
//!
//! Two views are produced per page: the full native text, and the text of
//! blocks sitting entirely in the header or footer band. Block geometry comes
//! from `pdftotext -bbox-layout`, which emits XHTML with one `<page>` per page
//! and `<block>` elements carrying `yMin`/`yMax`.

use std::path::Path;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tokio::process::Command;

/// Fraction of the page height treated as header (top) and footer (bottom).
pub const DEFAULT_MARGIN_RATIO: f64 = 0.18;

/// Errors that can occur during text extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A positioned run of text on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    /// Top edge, measured from the top of the page.
    pub y0: f64,
    /// Bottom edge, measured from the top of the page.
    pub y1: f64,
    pub text: String,
}

/// Extracted content of one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContent {
    /// Native text as reported by the text layer.
    pub text: String,
    /// Text blocks in reading order.
    pub blocks: Vec<TextBlock>,
    /// Page height in points, if known.
    pub height: Option<f64>,
}

impl PageContent {
    /// Page with native text only.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Full-page text, falling back to the concatenated blocks when the native
/// text is empty or whitespace.
pub fn full_text(page: &PageContent) -> String {
    if !page.text.trim().is_empty() {
        return page.text.clone();
    }
    page.blocks
        .iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text of the blocks lying entirely in the header or footer band.
///
/// Blocks straddling either band edge are excluded. Returns an empty string
/// when the page height is unknown or non-positive.
pub fn band_text(page: &PageContent, margin_ratio: f64) -> String {
    let height = match page.height {
        Some(h) if h > 0.0 => h,
        _ => return String::new(),
    };
    let top_y = height * margin_ratio;
    let bottom_y = height * (1.0 - margin_ratio);

    page.blocks
        .iter()
        .filter(|b| b.y1 <= top_y || b.y0 >= bottom_y)
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Source of per-page content for a document.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load every page of the document, in page order.
    async fn load(&self, path: &Path) -> Result<Vec<PageContent>, ExtractError>;
}

/// Loader backed by the `pdftotext` binary.
#[derive(Debug, Clone)]
pub struct PopplerLoader {
    pdftotext: String,
}

impl Default for PopplerLoader {
    fn default() -> Self {
        Self {
            pdftotext: "pdftotext".to_string(),
        }
    }
}

impl PopplerLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific pdftotext binary.
    pub fn with_binary(mut self, binary: &str) -> Self {
        self.pdftotext = binary.to_string();
        self
    }

    /// Run pdftotext with the given leading arguments, writing to stdout.
    async fn run_pdftotext(&self, args: &[&str], file_path: &Path) -> Result<String, ExtractError> {
        let output = Command::new(&self.pdftotext)
            .args(args)
            .arg(file_path)
            .arg("-")
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ExtractError::ExtractionFailed(format!(
                    "pdftotext failed: {}",
                    stderr.trim()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ExtractError::ToolNotFound(
                "pdftotext (install poppler-utils)".to_string(),
            )),
            Err(e) => Err(ExtractError::Io(e)),
        }
    }
}

#[async_trait]
impl DocumentLoader for PopplerLoader {
    async fn load(&self, path: &Path) -> Result<Vec<PageContent>, ExtractError> {
        let text = self
            .run_pdftotext(&["-layout", "-enc", "UTF-8"], path)
            .await?;
        let layout = self
            .run_pdftotext(&["-bbox-layout", "-enc", "UTF-8"], path)
            .await?;

        let texts = split_pages(&text);
        let layouts = parse_bbox_layout(&layout);
        let page_count = texts.len().max(layouts.len());
        tracing::debug!(
            "Loaded {} pages from {} ({} text, {} layout)",
            page_count,
            path.display(),
            texts.len(),
            layouts.len()
        );

        let mut texts = texts.into_iter();
        let mut layouts = layouts.into_iter();
        Ok((0..page_count)
            .map(|_| {
                let (height, blocks) = layouts.next().unwrap_or_default();
                PageContent {
                    text: texts.next().unwrap_or_default(),
                    blocks,
                    height,
                }
            })
            .collect())
    }
}

/// Split pdftotext output into pages.
///
/// pdftotext terminates every page with a form feed, so the final segment
/// after the last form feed is dropped.
pub fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split('\u{c}').map(str::to_string).collect();
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    if pages.len() == 1 && pages[0].is_empty() {
        pages.clear();
    }
    pages
}

/// Parse `pdftotext -bbox-layout` XHTML into (height, blocks) per page.
///
/// The HTML parser lower-cases attribute names, so `yMin` is read as `ymin`.
pub fn parse_bbox_layout(xhtml: &str) -> Vec<(Option<f64>, Vec<TextBlock>)> {
    let document = Html::parse_document(xhtml);
    let (Ok(page_sel), Ok(block_sel), Ok(line_sel), Ok(word_sel)) = (
        Selector::parse("page"),
        Selector::parse("block"),
        Selector::parse("line"),
        Selector::parse("word"),
    ) else {
        return Vec::new();
    };

    document
        .select(&page_sel)
        .map(|page| {
            let height = attr_f64(&page, "height");
            let blocks = page
                .select(&block_sel)
                .filter_map(|block| {
                    let y0 = attr_f64(&block, "ymin")?;
                    let y1 = attr_f64(&block, "ymax")?;
                    let text = block
                        .select(&line_sel)
                        .map(|line| {
                            line.select(&word_sel)
                                .map(|w| w.text().collect::<String>())
                                .collect::<Vec<_>>()
                                .join(" ")
                        })
                        .collect::<Vec<_>>()
                        .join("\n");
                    Some(TextBlock { y0, y1, text })
                })
                .collect();
            (height, blocks)
        })
        .collect()
}

fn attr_f64(element: &ElementRef<'_>, name: &str) -> Option<f64> {
    element.value().attr(name)?.trim().parse().ok()
}
