//! Pipeline stages for office-document-to-PDF conversion.
//!
//! Each submodule implements one step; the orchestrator in
//! [`crate::service`] strings them together.
//!
//! ## Data Flow
//!
//! ```text
//! intake ──▶ convert ──▶ (job store) ──▶ archive
//! (upload)   (soffice)                   (zip)
//!                 sweep: hourly reaper over uploads/ and converted/
//! ```
//!
//! 1. [`intake`]: validate type and size, persist the upload under a unique name
//! 2. [`convert`]: run headless LibreOffice in an isolated scratch directory
//!    with a hard timeout
//! 3. [`archive`]: bundle finished PDFs into a ZIP on the blocking pool
//! 4. [`sweep`]: delete files and job records past the retention window

pub mod archive;
pub mod convert;
pub mod intake;
pub mod sweep;
