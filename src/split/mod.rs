//! Splitting concatenated event-order packets into one PDF per event.
//!
//! Each page is classified independently by an ordered pattern cascade over
//! its header/footer band and full text. Classified pages are bucketed by
//! identifier, problem pages are collected for review, and a per-page report
//! is written alongside the outputs. Documents with no usable text layer get
//! a single OCR retry.

pub mod classify;
pub mod extract;
pub mod ocr;
pub mod partition;
pub mod pipeline;
pub mod report;
pub mod types;
pub mod writer;

pub use classify::{PageClassifier, PatternFamily, Scope, Stage, CASCADE};
pub use extract::{
    band_text, full_text, DocumentLoader, ExtractError, PageContent, PopplerLoader, TextBlock,
    DEFAULT_MARGIN_RATIO,
};
pub use ocr::{OcrEngine, OcrError, OcrMyPdf, OcrOutcome, OcrRetryCoordinator};
pub use partition::{Buckets, DocumentPartitioner, PassResult};
pub use pipeline::{run_pass, OcrStatus, SplitError, SplitOptions, SplitSummary, Splitter};
pub use report::{render_csv, write_report, REPORT_FILENAME};
pub use types::{DocumentKind, PageOutcome, PageResult};
pub use writer::{PdfError, PdfSource};
