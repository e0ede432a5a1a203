//! Conversion job records and the status machine they move through.
//!
//! ```text
//!            ┌────────────┐
//!  create ──▶│   queued   │──────────────┐
//!            └─────┬──────┘              │
//!                  ▼                     ▼
//!            ┌────────────┐      completed | failed | cancelled
//!            │ processing │─────▶     (terminal)
//!            └────────────┘
//! ```
//!
//! Mutations are expressed as a [`JobUpdate`] rather than a bag of optional
//! fields: only [`JobUpdate::Completed`] carries an output path, so
//! "`output_file_path` is set iff status is completed" holds by construction.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle state of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// `completed`, `failed` and `cancelled` accept no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked request to convert a single input document to PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionJob {
    pub id: u64,
    pub original_file_name: String,
    pub original_file_path: PathBuf,
    pub file_size: u64,
    pub status: JobStatus,
    /// 0–100; only meaningful while `processing`.
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversionJob {
    /// A freshly created job: `queued`, progress 0, both timestamps = `now`.
    pub fn new(id: u64, input: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id,
            original_file_name: input.original_file_name,
            original_file_path: input.original_file_path,
            file_size: input.file_size,
            status: JobStatus::Queued,
            progress: 0,
            output_file_path: None,
            output_file_size: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply `update` in place, refreshing `updated_at`.
    ///
    /// Leaves the job untouched and returns [`StoreError::InvalidTransition`]
    /// when the status machine forbids the move.
    pub fn apply(&mut self, update: JobUpdate, now: DateTime<Utc>) -> Result<(), StoreError> {
        let target = update.target_status(self.status);
        let allowed = match (&update, self.status) {
            (_, from) if from.is_terminal() => false,
            (JobUpdate::Processing, JobStatus::Queued) => true,
            (JobUpdate::Processing, _) => false,
            (JobUpdate::Progress(_), JobStatus::Processing) => true,
            (JobUpdate::Progress(_), _) => false,
            _ => true,
        };
        if !allowed {
            return Err(StoreError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: target,
            });
        }

        match update {
            JobUpdate::Processing => {
                self.status = JobStatus::Processing;
                self.progress = 0;
            }
            JobUpdate::Progress(p) => {
                // Never move backwards while processing.
                self.progress = self.progress.max(p.min(100));
            }
            JobUpdate::Completed {
                output_file_path,
                output_file_size,
            } => {
                self.status = JobStatus::Completed;
                self.progress = 100;
                self.output_file_path = Some(output_file_path);
                self.output_file_size = Some(output_file_size);
            }
            JobUpdate::Failed { error } => {
                self.status = JobStatus::Failed;
                self.error = Some(error);
            }
            JobUpdate::Cancelled => {
                self.status = JobStatus::Cancelled;
            }
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Fields supplied when a job is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub original_file_name: String,
    pub original_file_path: PathBuf,
    pub file_size: u64,
}

/// A single mutation of a job record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobUpdate {
    /// `queued → processing`, progress reset to 0.
    Processing,
    /// Raise progress while processing (clamped to 100, never lowered).
    Progress(u8),
    /// Terminal success; progress jumps to 100.
    Completed {
        output_file_path: PathBuf,
        output_file_size: u64,
    },
    /// Terminal failure with the message shown to the caller.
    Failed { error: String },
    /// Terminal, advisory cancellation.
    Cancelled,
}

impl JobUpdate {
    fn target_status(&self, current: JobStatus) -> JobStatus {
        match self {
            Self::Processing => JobStatus::Processing,
            Self::Progress(_) => current,
            Self::Completed { .. } => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
            Self::Cancelled => JobStatus::Cancelled,
        }
    }
}

/// Descriptor returned for a successfully converted upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub id: u64,
    pub name: String,
    pub pdf_url: String,
    pub pdf_size: u64,
}

/// Retrieval URL for a job's output: `/api/files/{id}/{encoded name}`.
pub fn pdf_url(id: u64, file_name: &str) -> String {
    format!("/api/files/{id}/{}", encode_uri_component(file_name))
}

/// ASCII letters and digits, the RFC 3986 unreserved marks, and `!*'()`
/// pass through. Everything else is percent-encoded as UTF-8.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode one path segment or header parameter.
pub fn encode_uri_component(s: &str) -> String {
    utf8_percent_encode(s, URI_COMPONENT).to_string()
}
