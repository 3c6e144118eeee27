//! Background processing of uploaded packets.
//!
//! Splits the upload, archives the results, publishes the archive and emails
//! a download link. The submission record tracks every step; any failure
//! marks it failed with the error message.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::email::{DownloadReady, Notifier, NotifyError};
use super::storage::{ObjectStorage, StorageError};
use crate::models::{SubmissionStatus, SubmissionUpdate};
use crate::repository::{DieselError, SubmissionStore};
use crate::split::{SplitError, SplitSummary, Splitter, REPORT_FILENAME};

/// Errors that fail a submission.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Split failed: {0}")]
    Split(#[from] SplitError),

    #[error("Failed to build archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Failed to upload file to storage: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] DieselError),

    #[error("Failed to send notification: {0}")]
    Notify(#[from] NotifyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Processing task failed: {0}")]
    Task(String),
}

/// One uploaded packet awaiting processing.
pub struct SubmissionJob {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub event_name: Option<String>,
    pub upload_path: PathBuf,
    // Removed with the job.
    upload_dir: Option<TempDir>,
}

impl SubmissionJob {
    pub fn new(
        id: Uuid,
        name: String,
        email: String,
        event_name: Option<String>,
        upload_path: PathBuf,
    ) -> Self {
        Self {
            id,
            name,
            email,
            event_name,
            upload_path,
            upload_dir: None,
        }
    }

    /// Tie the lifetime of the directory holding the upload to this job.
    pub fn with_upload_dir(mut self, dir: TempDir) -> Self {
        self.upload_dir = Some(dir);
        self
    }
}

/// Result of a completed submission.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub download_url: String,
    pub beo_count: usize,
    pub summary: SplitSummary,
}

/// Remote path of a submission's archive.
pub fn archive_remote_path(id: Uuid) -> String {
    format!("submissions/{}/beos.zip", id)
}

/// Whether a split output belongs in the delivered archive.
pub fn is_archive_entry(name: &str) -> bool {
    if name == REPORT_FILENAME {
        return true;
    }
    name.ends_with(".pdf")
        && ["BEO_", "BCO_", "UNKNOWN_", "AMBIGUOUS_"]
            .iter()
            .any(|prefix| name.starts_with(prefix))
}

/// Zip the deliverable outputs of a split into `dest`.
pub fn build_archive(files: &[PathBuf], dest: &Path) -> Result<usize, ProcessError> {
    let mut zip = zip::ZipWriter::new(File::create(dest)?);
    let options = zip::write::FileOptions::<()>::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let mut count = 0;
    for path in files {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !is_archive_entry(name) {
            continue;
        }
        zip.start_file(name, options)?;
        std::io::copy(&mut File::open(path)?, &mut zip)?;
        count += 1;
    }
    zip.finish()?;
    Ok(count)
}

/// Runs submissions through split, archive, upload and notify.
#[derive(Clone)]
pub struct SubmissionProcessor {
    store: Arc<dyn SubmissionStore>,
    storage: Arc<dyn ObjectStorage>,
    notifier: Arc<dyn Notifier>,
    splitter: Arc<Splitter>,
    expiry_days: u64,
}

impl SubmissionProcessor {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        storage: Arc<dyn ObjectStorage>,
        notifier: Arc<dyn Notifier>,
        splitter: Arc<Splitter>,
        expiry_days: u64,
    ) -> Self {
        Self {
            store,
            storage,
            notifier,
            splitter,
            expiry_days,
        }
    }

    fn url_ttl(&self) -> Duration {
        Duration::from_secs(self.expiry_days * 24 * 60 * 60)
    }

    /// Process a job to completion, recording the outcome on the submission.
    ///
    /// The uploaded file and all scratch files are removed on every path.
    pub async fn process(&self, job: SubmissionJob) -> Result<ProcessOutcome, ProcessError> {
        let id = job.id;
        info!("Processing submission {}", id);

        let result = self.run(&job).await;
        if let Err(ref e) = result {
            error!("Submission {} failed: {}", id, e);
            if let Err(db_err) = self
                .store
                .update_status(id, &SubmissionUpdate::failed(e.to_string()))
                .await
            {
                warn!("Could not mark submission {} failed: {}", id, db_err);
            }
        }

        if let Err(e) = tokio::fs::remove_file(&job.upload_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove upload {}: {}", job.upload_path.display(), e);
            }
        }
        result
    }

    async fn run(&self, job: &SubmissionJob) -> Result<ProcessOutcome, ProcessError> {
        self.store
            .update_status(job.id, &SubmissionUpdate::status(SubmissionStatus::Processing))
            .await?;

        let work = tempfile::Builder::new().prefix("beo_process_").tempdir()?;
        let outdir = work.path().join("output");
        let summary = self.splitter.split(&job.upload_path, &outdir).await?;

        let zip_path = work.path().join(format!("beos_{}.zip", job.id));
        let files = summary.files.clone();
        let archive_path = zip_path.clone();
        let entries = tokio::task::spawn_blocking(move || build_archive(&files, &archive_path))
            .await
            .map_err(|e| ProcessError::Task(e.to_string()))??;
        info!("Archived {} files for submission {}", entries, job.id);

        let remote = archive_remote_path(job.id);
        self.storage.upload(&zip_path, &remote).await?;
        let download_url = self.storage.create_signed_url(&remote, self.url_ttl()).await?;

        let beo_count = summary.resolved_count;
        self.store
            .update_status(
                job.id,
                &SubmissionUpdate::completed(download_url.clone(), beo_count as i32),
            )
            .await?;

        let message = DownloadReady {
            to_name: job.name.clone(),
            event_name: job.event_name.clone(),
            download_url: download_url.clone(),
            beo_count,
            expiry_days: self.expiry_days,
        };
        self.notifier.send(&job.email, &message).await?;

        info!("Submission {} completed with {} BEOs", job.id, beo_count);
        Ok(ProcessOutcome {
            download_url,
            beo_count,
            summary,
        })
    }
}
