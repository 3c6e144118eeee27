//! OCR fallback for documents with no usable text layer.
//!
//! When a pass resolves nothing, the coordinator runs an external OCR engine
//! once and hands back the path of the OCR'd copy so the caller can re-run the
//! pipeline against it. Every failure is recorded and non-fatal.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use super::partition::PassResult;

pub const OCR_LOG_FILENAME: &str = "ocr_log.txt";

/// Default upper bound on one OCR run.
pub const DEFAULT_OCR_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors that can occur while running OCR.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR tool not available: {0}")]
    NotAvailable(String),

    #[error("OCR timed out after {0:?}")]
    Timeout(Duration),

    #[error("OCR failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An external OCR capability that turns `input` into a searchable `output`.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Human-readable engine name for logs.
    fn name(&self) -> &str;

    async fn run(&self, input: &Path, output: &Path) -> Result<(), OcrError>;
}

/// OCR via the `ocrmypdf` command.
#[derive(Debug, Clone)]
pub struct OcrMyPdf {
    command: String,
    timeout: Duration,
}

impl Default for OcrMyPdf {
    fn default() -> Self {
        Self {
            command: "ocrmypdf".to_string(),
            timeout: DEFAULT_OCR_TIMEOUT,
        }
    }
}

impl OcrMyPdf {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    /// Whether the configured command can be found.
    pub fn is_available(&self) -> bool {
        which::which(&self.command).is_ok()
    }
}

#[async_trait]
impl OcrEngine for OcrMyPdf {
    fn name(&self) -> &str {
        &self.command
    }

    async fn run(&self, input: &Path, output: &Path) -> Result<(), OcrError> {
        let binary = which::which(&self.command)
            .map_err(|_| OcrError::NotAvailable(self.command.clone()))?;

        tracing::debug!("Running {} on {}", binary.display(), input.display());
        let child = Command::new(&binary)
            .args(["--force-ocr", "--deskew", "--clean"])
            .arg(input)
            .arg(output)
            .kill_on_drop(true)
            .output();

        let output_result = match tokio::time::timeout(self.timeout, child).await {
            Ok(result) => result,
            Err(_) => return Err(OcrError::Timeout(self.timeout)),
        };

        match output_result {
            Ok(out) if out.status.success() => Ok(()),
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                let code = out
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                Err(OcrError::Failed(format!("exit {}: {}", code, stderr.trim())))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OcrError::NotAvailable(self.command.clone()))
            }
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}

/// Result of asking the coordinator for an OCR'd replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrOutcome {
    /// A new document was produced at this path.
    Replaced(PathBuf),
    /// Keep the original pass.
    NoReplacement,
}

/// Filename for the OCR'd copy of `input`: `ocr_<stem>.pdf`.
pub fn ocr_output_name(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    format!("ocr_{}.pdf", stem)
}

/// Aborts the spawned engine when the caller stops waiting, so the child
/// process is dropped and killed with it.
struct AbortOnDrop<T>(tokio::task::JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs OCR at most once for one document.
pub struct OcrRetryCoordinator {
    engine: Arc<dyn OcrEngine>,
    input: PathBuf,
    attempted: bool,
    log: Vec<String>,
}

impl OcrRetryCoordinator {
    pub fn new(engine: Arc<dyn OcrEngine>, input: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            input: input.into(),
            attempted: false,
            log: Vec::new(),
        }
    }

    /// OCR is warranted only when nothing on the document resolved.
    pub fn should_retry(pass: &PassResult) -> bool {
        pass.nothing_resolved()
    }

    pub fn attempted(&self) -> bool {
        self.attempted
    }

    /// Diagnostic lines recorded so far.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    fn note(&mut self, line: String) {
        tracing::info!("{}", line);
        self.log.push(line);
    }

    /// Run OCR into `output_dir`. Only the first call invokes the engine.
    pub async fn attempt(&mut self, output_dir: &Path) -> OcrOutcome {
        if self.attempted {
            self.note("OCR already attempted for this document; skipping".to_string());
            return OcrOutcome::NoReplacement;
        }
        self.attempted = true;

        let output = output_dir.join(ocr_output_name(&self.input));
        self.note(format!(
            "Running OCR ({}) on {}",
            self.engine.name(),
            self.input.display()
        ));

        let engine = Arc::clone(&self.engine);
        let input = self.input.clone();
        let target = output.clone();
        let mut task = AbortOnDrop(tokio::spawn(async move {
            engine.run(&input, &target).await
        }));

        match (&mut task.0).await {
            Ok(Ok(())) if output.exists() => {
                self.note(format!("OCR produced {}", output.display()));
                OcrOutcome::Replaced(output)
            }
            Ok(Ok(())) => {
                self.note(format!(
                    "OCR reported success but {} was not written",
                    output.display()
                ));
                OcrOutcome::NoReplacement
            }
            Ok(Err(e)) => {
                tracing::warn!("OCR failed for {}: {}", self.input.display(), e);
                self.note(format!("OCR failed: {}", e));
                OcrOutcome::NoReplacement
            }
            Err(e) => {
                tracing::error!("OCR task aborted for {}: {}", self.input.display(), e);
                self.note(format!("OCR failed with an unexpected fault: {}", e));
                OcrOutcome::NoReplacement
            }
        }
    }

    /// Record a line from the caller (e.g. the OCR'd copy failed to load).
    pub fn record(&mut self, line: impl Into<String>) {
        self.note(line.into());
    }

    /// Write the log into `dir` as `ocr_log.txt`.
    pub async fn write_log(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(OCR_LOG_FILENAME);
        let mut content = self.log.join("\n");
        content.push('\n');
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }
}
