//! Service layer for beo-split.
//!
//! Storage, notification and background processing used by the web server.
//! The CLI calls the split pipeline directly.

pub mod email;
pub mod processor;
pub mod storage;

pub use email::{DownloadReady, LogNotifier, Notifier, NotifyError, PostmarkNotifier};
pub use processor::{ProcessError, ProcessOutcome, SubmissionJob, SubmissionProcessor};
pub use storage::{LocalStorage, ObjectStorage, StorageError, SupabaseStorage};
