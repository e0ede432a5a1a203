//! # office2pdf
//!
//! Batch-convert PowerPoint and Word documents to PDF through a headless
//! LibreOffice, behind a small HTTP API with a matching client.
//!
//! ## Pipeline Overview
//!
//! ```text
//! client (BatchQueue)                 server (ConversionService)
//!  │                                   │
//!  ├─ add_files   local checks ──────▶ ├─ 1. Intake   type/size check, persist upload
//!  ├─ submit_all  one POST per file ─▶ ├─ 2. Job      create record, mark processing
//!  │                                   ├─ 3. Convert  soffice in a scratch dir, 60 s limit
//!  │              ◀── {id, pdfUrl} ─── ├─ 4. Record   completed / failed
//!  └─ download_zip ──────────────────▶ └─ 5. Archive  ZIP of finished outputs
//!                                        reaper: hourly cleanup of day-old files
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use office2pdf::{BatchQueue, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let queue = BatchQueue::new(ClientConfig::builder().build()?)?;
//!     queue.add_files(["deck.pptx", "memo.docx"]).await;
//!     let summary = queue.submit_all(None).await;
//!     eprintln!("{} converted, {} failed", summary.succeeded, summary.failed);
//!     queue.download_zip(std::path::Path::new(".")).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `office2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! office2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod config;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod progress;
pub mod queue;
pub mod server;
pub mod service;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::ConverterClient;
pub use config::{ClientConfig, ClientConfigBuilder, ServerConfig, ServerConfigBuilder};
pub use error::{ConversionError, FileError, Office2PdfError, StoreError};
pub use job::{ConversionJob, JobResult, JobStatus, JobUpdate, NewJob};
pub use pipeline::convert::{DocumentConverter, LibreOfficeConverter};
pub use pipeline::intake::Upload;
pub use progress::{BatchProgressCallback, NoopBatchCallback, ProgressCallback};
pub use queue::{
    AddOutcome, BatchQueue, BatchSummary, CancelOutcome, ConvertedFile, UploadedFile,
};
pub use server::{router, serve, serve_on};
pub use service::ConversionService;
pub use store::{JobStore, MemoryJobStore};
