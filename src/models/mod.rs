//! Data models for beo-split.

mod submission;

pub use submission::{NewSubmission, Submission, SubmissionStatus, SubmissionUpdate};
