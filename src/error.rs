//! Error types for the office2pdf library.
//!
//! Two tiers mirror the two places failures land:
//!
//! * [`Office2PdfError`]: **Fatal** for one operation: an upload rejected,
//!   a conversion that failed, an unknown job id. The server turns it into an
//!   HTTP status plus `{message, error}` body (see [`Office2PdfError::status_code`]).
//!
//! * [`FileError`]: **Non-fatal** within a client batch: one file timed out
//!   or was rejected, but the rest of the batch keeps going. Stored on the
//!   file's queue entry so callers can report it next to the file name.
//!
//! The adapter ([`ConversionError`]) and the job store ([`StoreError`]) have
//! their own narrower enums; both convert into [`Office2PdfError`].

use crate::job::JobStatus;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the office2pdf library.
#[derive(Debug, Error)]
pub enum Office2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Wrong file type, size or count; rejected before any job exists.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The uploaded bytes could not be written to the uploads directory.
    #[error("Failed to store upload at '{path}': {source}")]
    UploadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Lookup errors ─────────────────────────────────────────────────────
    /// No job with this id exists in the store.
    #[error("Conversion job {id} not found")]
    JobNotFound { id: u64 },

    /// The job exists but has no downloadable output (not completed, or the
    /// file has been reaped).
    #[error("File not found for job {id}")]
    FileNotFound { id: u64 },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The external conversion tool is missing from this machine.
    #[error("{hint}")]
    ToolNotInstalled { hint: String },

    /// The adapter failed; the same message is recorded on the job.
    #[error("Conversion of job {id} failed: {source}")]
    ConversionFailed {
        id: u64,
        #[source]
        source: ConversionError,
    },

    /// The job was cancelled while the tool was running; its output was discarded.
    #[error("Conversion job {id} was cancelled")]
    Cancelled { id: u64 },

    /// Cancel was requested for a job that already reached a terminal state.
    #[error("Conversion job {id} already finished with status '{status}'")]
    AlreadyFinished { id: u64, status: JobStatus },

    // ── Archive errors ────────────────────────────────────────────────────
    /// Reading an output or encoding the ZIP failed.
    #[error("Error creating ZIP file: {detail}")]
    ArchiveFailed { detail: String },

    // ── Store errors ──────────────────────────────────────────────────────
    #[error(transparent)]
    Store(#[from] StoreError),

    // ── Client errors ─────────────────────────────────────────────────────
    /// The server answered with a non-success status.
    #[error("Server returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request could not be sent or its body could not be read.
    #[error("Request to '{url}' failed: {reason}")]
    RequestFailed { url: String, reason: String },

    /// The request did not complete within the configured timeout.
    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Office2PdfError {
    /// HTTP status code the server answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput { .. } => 400,
            Self::JobNotFound { .. } | Self::FileNotFound { .. } => 404,
            Self::Store(StoreError::NotFound { .. }) => 404,
            Self::Cancelled { .. } | Self::AlreadyFinished { .. } => 409,
            Self::Store(StoreError::InvalidTransition { .. }) => 409,
            Self::Http { status, .. } => *status,
            Self::RequestFailed { .. } => 502,
            Self::Timeout { .. } => 504,
            _ => 500,
        }
    }

    /// Short summary used as the `message` field of an error body.
    pub fn summary(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "Invalid upload",
            Self::UploadFailed { .. } => "File upload failed",
            Self::JobNotFound { .. } | Self::FileNotFound { .. } => "File not found",
            Self::Store(StoreError::NotFound { .. }) => "File not found",
            Self::ToolNotInstalled { .. } | Self::ConversionFailed { .. } => "Conversion failed",
            Self::Cancelled { .. } => "Conversion cancelled",
            Self::AlreadyFinished { .. } | Self::Store(StoreError::InvalidTransition { .. }) => {
                "Error cancelling conversion"
            }
            Self::ArchiveFailed { .. } => "Error creating ZIP file",
            _ => "Internal server error",
        }
    }
}

/// Failures of the document-to-PDF adapter.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Input file not found: '{path}'")]
    InputNotFound { path: PathBuf },

    /// The tool could not be spawned because it does not exist.
    #[error("{hint}")]
    ToolNotInstalled { hint: String },

    #[error("Conversion tool timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The tool ran but exited unsuccessfully.
    #[error("Conversion tool exited with {status}: {stderr}")]
    ToolFailed { status: String, stderr: String },

    #[error("PDF conversion failed - output file not created (expected '{expected}')")]
    OutputNotProduced { expected: PathBuf },

    #[error("Failed to move converted PDF file to '{path}'")]
    OutputMoveFailed { path: PathBuf },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConversionError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Failures of the job store contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Conversion job with id {id} not found")]
    NotFound { id: u64 },

    /// The update would leave a terminal state or skip the state machine.
    #[error("Conversion job {id} cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        id: u64,
        from: JobStatus,
        to: JobStatus,
    },
}

/// A non-fatal error for a single file in a client batch.
///
/// Stored on the file's [`crate::queue::UploadedFile`]; the batch continues
/// with the next file.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum FileError {
    /// The local file could not be read.
    #[error("{name}: could not read file: {detail}")]
    Read { name: String, detail: String },

    /// The per-file request timeout elapsed.
    #[error("{name}: request timed out after {secs}s")]
    Timeout { name: String, secs: u64 },

    /// The server answered with an error status.
    #[error("{name}: Error: {status} {message}")]
    Rejected {
        name: String,
        status: u16,
        message: String,
    },

    /// Connection-level failure.
    #[error("{name}: network error: {detail}")]
    Network { name: String, detail: String },
}
