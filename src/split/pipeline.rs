//! Whole-document split: load, classify, partition, OCR retry, write.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use super::classify::PageClassifier;
use super::extract::{full_text, DocumentLoader, ExtractError, DEFAULT_MARGIN_RATIO};
use super::ocr::{OcrEngine, OcrOutcome, OcrRetryCoordinator};
use super::partition::{DocumentPartitioner, PassResult};
use super::report::write_report;
use super::types::PROBLEM_LABEL;
use super::writer::{PdfError, PdfSource};

/// Knobs for one split run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitOptions {
    /// Header/footer band size as a fraction of page height.
    pub margin_ratio: f64,
    /// Withhold all identifier outputs when any page is a problem.
    pub stop_on_problems: bool,
    /// Allow the OCR fallback when nothing resolves.
    pub ocr_enabled: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            margin_ratio: DEFAULT_MARGIN_RATIO,
            stop_on_problems: false,
            ocr_enabled: true,
        }
    }
}

/// Errors that abort a split.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Document has no pages")]
    EmptyDocument,

    #[error("Page count mismatch: text layer has {text} pages, PDF has {pdf}")]
    PageCountMismatch { text: usize, pdf: usize },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Pdf(#[from] PdfError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Split task failed: {0}")]
    Task(String),
}

/// What happened with the OCR fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrStatus {
    /// Something resolved on the first pass.
    NotNeeded,
    /// Nothing resolved but OCR is turned off or not configured.
    Disabled,
    /// The OCR'd document's pass replaced the original.
    Replaced,
    /// OCR was attempted and the original pass stands.
    NoReplacement,
}

impl OcrStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotNeeded => "not_needed",
            Self::Disabled => "disabled",
            Self::Replaced => "replaced",
            Self::NoReplacement => "no_replacement",
        }
    }
}

/// Result of splitting one document.
#[derive(Debug, Clone, Serialize)]
pub struct SplitSummary {
    /// Number of per-identifier files written.
    pub resolved_count: usize,
    /// Pages in the UNKNOWN and AMBIGUOUS buckets.
    pub problem_pages: usize,
    pub page_count: usize,
    pub report_path: PathBuf,
    /// Every file written to the output directory.
    pub files: Vec<PathBuf>,
    pub document_kind: String,
    pub gated: bool,
    pub ocr: OcrStatus,
}

impl SplitSummary {
    /// Resolved identifier files only (excludes problem buckets and the report).
    pub fn identifier_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.iter().filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| (n.starts_with("BEO_") || n.starts_with("BCO_")) && n.ends_with(".pdf"))
        })
    }
}

pub fn unknown_filename() -> String {
    format!("UNKNOWN_{}.pdf", PROBLEM_LABEL)
}

pub fn ambiguous_filename() -> String {
    format!("AMBIGUOUS_{}.pdf", PROBLEM_LABEL)
}

/// Output filenames and their pages, in write order.
pub fn output_plan(pass: &PassResult) -> Vec<(String, Vec<u32>)> {
    let prefix = pass.document_kind.prefix();
    let mut plan: Vec<(String, Vec<u32>)> = pass
        .buckets
        .iter()
        .map(|(id, pages)| (format!("{}{}.pdf", prefix, id), pages.to_vec()))
        .collect();
    if !pass.unknown.is_empty() {
        plan.push((unknown_filename(), pass.unknown.clone()));
    }
    if !pass.ambiguous.is_empty() {
        plan.push((ambiguous_filename(), pass.ambiguous.clone()));
    }
    plan
}

/// Load, classify and partition one document.
pub async fn run_pass(
    loader: &dyn DocumentLoader,
    classifier: &PageClassifier,
    path: &Path,
    options: &SplitOptions,
) -> Result<PassResult, SplitError> {
    let pages = loader.load(path).await?;
    if pages.is_empty() {
        return Err(SplitError::EmptyDocument);
    }

    let results = pages
        .iter()
        .enumerate()
        .map(|(idx, page)| classifier.classify_page(idx as u32 + 1, page, options.margin_ratio))
        .collect();
    let first_page_text = full_text(&pages[0]);

    let pass = DocumentPartitioner::new(options.stop_on_problems).partition(results, &first_page_text);
    tracing::debug!(
        "Pass over {}: {} pages, {} identifiers, {} unknown, {} ambiguous",
        path.display(),
        pass.page_count(),
        pass.buckets.len(),
        pass.unknown.len(),
        pass.ambiguous.len()
    );
    Ok(pass)
}

/// Splits documents into per-identifier PDFs.
pub struct Splitter {
    loader: Arc<dyn DocumentLoader>,
    ocr: Option<Arc<dyn OcrEngine>>,
    classifier: PageClassifier,
    options: SplitOptions,
}

impl Splitter {
    pub fn new(loader: Arc<dyn DocumentLoader>, options: SplitOptions) -> Self {
        Self {
            loader,
            ocr: None,
            classifier: PageClassifier::new(),
            options,
        }
    }

    /// Attach an OCR engine for the fallback pass.
    pub fn with_ocr(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(engine);
        self
    }

    pub fn options(&self) -> &SplitOptions {
        &self.options
    }

    /// Split `input` into `outdir`.
    ///
    /// Outputs are staged inside `outdir` and moved into place only once every
    /// file has been written.
    pub async fn split(&self, input: &Path, outdir: &Path) -> Result<SplitSummary, SplitError> {
        if !input.exists() {
            return Err(SplitError::InputNotFound(input.to_path_buf()));
        }
        tokio::fs::create_dir_all(outdir).await?;
        let staging = tempfile::Builder::new()
            .prefix(".beo-staging-")
            .tempdir_in(outdir)?;

        let mut pass = run_pass(self.loader.as_ref(), &self.classifier, input, &self.options).await?;
        let mut source_path = input.to_path_buf();

        let ocr_status = if !OcrRetryCoordinator::should_retry(&pass) {
            OcrStatus::NotNeeded
        } else {
            match (&self.ocr, self.options.ocr_enabled) {
                (Some(engine), true) => {
                    let mut coordinator = OcrRetryCoordinator::new(Arc::clone(engine), input);
                    let status = match coordinator.attempt(staging.path()).await {
                        OcrOutcome::Replaced(ocr_path) => {
                            match run_pass(self.loader.as_ref(), &self.classifier, &ocr_path, &self.options)
                                .await
                            {
                                Ok(ocr_pass) => {
                                    coordinator.record(format!(
                                        "OCR pass resolved {} of {} pages",
                                        ocr_pass.resolved_pages,
                                        ocr_pass.page_count()
                                    ));
                                    pass = ocr_pass;
                                    source_path = ocr_path;
                                    OcrStatus::Replaced
                                }
                                Err(e) => {
                                    coordinator.record(format!("OCR output could not be processed: {}", e));
                                    OcrStatus::NoReplacement
                                }
                            }
                        }
                        OcrOutcome::NoReplacement => OcrStatus::NoReplacement,
                    };
                    coordinator.write_log(staging.path()).await?;
                    status
                }
                _ => {
                    tracing::info!("Nothing resolved in {} and OCR is disabled", input.display());
                    OcrStatus::Disabled
                }
            }
        };

        let plan = output_plan(&pass);
        let expected_pages = pass.page_count();
        let staging_path = staging.path().to_path_buf();
        let pdf_path = source_path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), SplitError> {
            let source = PdfSource::open(&pdf_path)?;
            if source.page_count() as usize != expected_pages {
                return Err(SplitError::PageCountMismatch {
                    text: expected_pages,
                    pdf: source.page_count() as usize,
                });
            }
            for (name, pages) in &plan {
                source.write_pages(pages, &staging_path.join(name))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| SplitError::Task(e.to_string()))??;

        write_report(staging.path(), &pass.results).await?;

        let files = promote_staged(staging.path(), outdir).await?;
        let report_path = outdir.join(super::report::REPORT_FILENAME);

        let summary = SplitSummary {
            resolved_count: pass.buckets.len(),
            problem_pages: pass.problem_pages(),
            page_count: pass.page_count(),
            report_path,
            files,
            document_kind: pass.document_kind.as_str().to_string(),
            gated: pass.gated,
            ocr: ocr_status,
        };
        tracing::info!(
            "Split {}: {} identifiers, {} problem pages of {} (ocr: {})",
            input.display(),
            summary.resolved_count,
            summary.problem_pages,
            summary.page_count,
            summary.ocr.as_str()
        );
        Ok(summary)
    }
}

/// Move every staged file into `outdir`, returning the final paths sorted by name.
///
/// If any move fails, the files already moved go back to staging so `outdir`
/// is left without outputs for this document.
async fn promote_staged(staging: &Path, outdir: &Path) -> Result<Vec<PathBuf>, SplitError> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(staging).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            names.push(entry.file_name());
        }
    }
    names.sort();

    let mut files: Vec<PathBuf> = Vec::with_capacity(names.len());
    for name in &names {
        let dest = outdir.join(name);
        if let Err(e) = tokio::fs::rename(staging.join(name), &dest).await {
            tracing::warn!("Failed to promote {}: {}", dest.display(), e);
            for (moved, name) in files.iter().zip(&names) {
                if let Err(undo) = tokio::fs::rename(moved, staging.join(name)).await {
                    tracing::warn!("Removing {} after failed promotion: {}", moved.display(), undo);
                    let _ = tokio::fs::remove_file(moved).await;
                }
            }
            return Err(e.into());
        }
        files.push(dest);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::extract::PageContent;
    use crate::split::types::{DocumentKind, PageOutcome, PageResult};
    use crate::split::writer::test_support::build_pdf;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct TextLoader(Vec<&'static str>);

    #[async_trait]
    impl DocumentLoader for TextLoader {
        async fn load(&self, _path: &Path) -> Result<Vec<PageContent>, ExtractError> {
            Ok(self.0.iter().map(|t| PageContent::from_text(*t)).collect())
        }
    }

    #[test]
    fn test_output_plan_names() {
        let pass = DocumentPartitioner::new(false).partition(
            vec![
                PageResult::new(1, PageOutcome::Resolved("200".to_string())),
                PageResult::new(2, PageOutcome::Resolved("100".to_string())),
                PageResult::new(3, PageOutcome::Unresolved),
            ],
            "CHANGE ORDER",
        );
        assert_eq!(pass.document_kind, DocumentKind::ChangeOrder);
        let plan = output_plan(&pass);
        let names: Vec<&str> = plan.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["BCO_200.pdf", "BCO_100.pdf", "UNKNOWN_BEO.pdf"]);
    }

    #[tokio::test]
    async fn test_run_pass_empty_document() {
        let loader = TextLoader(vec![]);
        let err = run_pass(&loader, &PageClassifier::new(), Path::new("x.pdf"), &SplitOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SplitError::EmptyDocument));
    }

    #[tokio::test]
    async fn test_split_missing_input() {
        let dir = TempDir::new().unwrap();
        let splitter = Splitter::new(Arc::new(TextLoader(vec![])), SplitOptions::default());
        let err = splitter
            .split(&dir.path().join("missing.pdf"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, SplitError::InputNotFound(_)));
    }

    #[tokio::test]
    async fn test_page_count_mismatch_leaves_no_outputs() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("packet.pdf");
        build_pdf(&["a", "b"]).save(&input).unwrap();
        let outdir = dir.path().join("out");

        let splitter = Splitter::new(
            Arc::new(TextLoader(vec!["BEO #: 100", "BEO #: 100", "BEO #: 200"])),
            SplitOptions::default(),
        );
        let err = splitter.split(&input, &outdir).await.unwrap_err();
        assert!(matches!(err, SplitError::PageCountMismatch { text: 3, pdf: 2 }));
        assert_eq!(std::fs::read_dir(&outdir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_promotion_leaves_no_outputs() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("packet.pdf");
        build_pdf(&["a", "b", "c"]).save(&input).unwrap();
        let outdir = dir.path().join("out");
        let blocked = outdir.join("BEO_200.pdf");
        std::fs::create_dir_all(&blocked).unwrap();
        std::fs::write(blocked.join("keep.txt"), b"x").unwrap();

        let splitter = Splitter::new(
            Arc::new(TextLoader(vec!["BEO #: 100", "BEO #: 100", "BEO #: 200"])),
            SplitOptions::default(),
        );
        let err = splitter.split(&input, &outdir).await.unwrap_err();
        assert!(matches!(err, SplitError::Io(_)));

        let mut left: Vec<String> = std::fs::read_dir(&outdir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec!["BEO_200.pdf".to_string()]);
        assert!(blocked.is_dir());
    }

    #[tokio::test]
    async fn test_split_writes_outputs() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("packet.pdf");
        build_pdf(&["a", "b", "c"]).save(&input).unwrap();
        let outdir = dir.path().join("out");

        let splitter = Splitter::new(
            Arc::new(TextLoader(vec!["BEO #: 100", "nothing", "BEO #: 100"])),
            SplitOptions::default(),
        );
        let summary = splitter.split(&input, &outdir).await.unwrap();
        assert_eq!(summary.resolved_count, 1);
        assert_eq!(summary.problem_pages, 1);
        assert_eq!(summary.ocr, OcrStatus::NotNeeded);
        assert!(outdir.join("BEO_100.pdf").exists());
        assert!(outdir.join("UNKNOWN_BEO.pdf").exists());
        assert!(summary.report_path.exists());
        assert_eq!(summary.identifier_files().count(), 1);
        assert_eq!(summary.files.len(), 3);
    }
}
