//! Upload submissions and their processing lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing state of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether processing has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A stored submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub event_name: Option<String>,
    pub status: SubmissionStatus,
    pub file_size: Option<i64>,
    pub beo_count: Option<i32>,
    pub download_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields supplied when a submission is created.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub name: String,
    pub email: String,
    pub event_name: Option<String>,
    pub file_size: i64,
}

/// A status change. `None` fields leave the stored value unchanged.
#[derive(Debug, Clone)]
pub struct SubmissionUpdate {
    pub status: SubmissionStatus,
    pub download_url: Option<String>,
    pub error_message: Option<String>,
    pub beo_count: Option<i32>,
}

impl SubmissionUpdate {
    pub fn status(status: SubmissionStatus) -> Self {
        Self {
            status,
            download_url: None,
            error_message: None,
            beo_count: None,
        }
    }

    pub fn completed(download_url: String, beo_count: i32) -> Self {
        Self {
            download_url: Some(download_url),
            beo_count: Some(beo_count),
            ..Self::status(SubmissionStatus::Completed)
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::status(SubmissionStatus::Failed)
        }
    }
}
