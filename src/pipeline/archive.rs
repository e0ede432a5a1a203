//! In-memory ZIP bundling of finished PDFs.

use crate::error::Office2PdfError;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// File name offered for downloaded archives.
pub const ARCHIVE_NAME: &str = "converted_pdfs.zip";

/// One file to place in the archive under `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub path: PathBuf,
}

/// Build a deflated ZIP from `entries`, in order.
///
/// Entries whose file vanished since they were resolved, and repeated names,
/// are skipped. An empty input yields a valid empty archive. Runs on the
/// blocking pool.
pub async fn build_zip(entries: Vec<ArchiveEntry>) -> Result<Vec<u8>, Office2PdfError> {
    tokio::task::spawn_blocking(move || write_zip(&entries))
        .await
        .map_err(|e| Office2PdfError::Internal(format!("ZIP task panicked: {e}")))?
}

fn write_zip(entries: &[ArchiveEntry]) -> Result<Vec<u8>, Office2PdfError> {
    let fail = |detail: String| Office2PdfError::ArchiveFailed { detail };

    let mut zip_writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut seen = HashSet::new();
    for entry in entries {
        if !seen.insert(entry.name.as_str()) {
            debug!("Skipping duplicate archive entry '{}'", entry.name);
            continue;
        }
        let data = match std::fs::read(&entry.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Skipping '{}': {} is gone", entry.name, entry.path.display());
                continue;
            }
            Err(e) => {
                return Err(fail(format!("failed to read '{}': {e}", entry.path.display())))
            }
        };

        zip_writer
            .start_file(&entry.name, options)
            .map_err(|e| fail(format!("failed to add '{}': {e}", entry.name)))?;
        zip_writer
            .write_all(&data)
            .map_err(|e| fail(format!("failed to write '{}': {e}", entry.name)))?;
    }

    let finished = zip_writer
        .finish()
        .map_err(|e| fail(format!("failed to finalize archive: {e}")))?;
    Ok(finished.into_inner())
}
