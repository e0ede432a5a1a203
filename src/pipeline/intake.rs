//! Upload intake: validate an uploaded document and persist it to disk.
//!
//! Validation is extension/MIME sniffing only; the document body is never
//! inspected. A file is accepted when either its extension or its declared
//! MIME type is one of the supported office formats, the same leniency the
//! browser upload widget applies.

use crate::config::{ACCEPTED_EXTENSIONS, ACCEPTED_MIME_TYPES};
use crate::error::Office2PdfError;
use bytes::Bytes;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Letters and digits of any script are kept, as are `._()-` and spaces.
/// Controls, shell and filesystem punctuation (`<>:"|?*;` ...) become `_`.
static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\p{M}._()\- ]").unwrap());

const TYPE_ERROR: &str = "Only PowerPoint (.ppt, .pptx) and Word (.doc, .docx) files are allowed";

/// One uploaded file as received from the transport.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Name as supplied by the client; used for display and the output name.
    pub file_name: String,
    /// Declared MIME type of the multipart field, if any.
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Lowercase extension without the dot.
pub fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}

/// `true` when the extension or the declared MIME type is supported.
pub fn is_accepted(name: &str, content_type: Option<&str>) -> bool {
    let ext_ok = extension(name).is_some_and(|e| ACCEPTED_EXTENSIONS.contains(&e.as_str()));
    let mime_ok = content_type.is_some_and(|m| ACCEPTED_MIME_TYPES.contains(&m));
    ext_ok || mime_ok
}

/// Reject uploads with no name, an unsupported type, or too many bytes.
pub fn validate(upload: &Upload, max_bytes: u64) -> Result<(), Office2PdfError> {
    if upload.file_name.trim().is_empty() {
        return Err(Office2PdfError::InvalidInput {
            reason: "No file uploaded".into(),
        });
    }
    if !is_accepted(&upload.file_name, upload.content_type.as_deref()) {
        return Err(Office2PdfError::InvalidInput {
            reason: TYPE_ERROR.into(),
        });
    }
    if upload.bytes.len() as u64 > max_bytes {
        return Err(Office2PdfError::InvalidInput {
            reason: format!(
                "'{}' is {} bytes; the limit is {} bytes",
                upload.file_name,
                upload.bytes.len(),
                max_bytes
            ),
        });
    }
    Ok(())
}

/// Base name of a client-supplied path with unsafe characters replaced.
///
/// Browsers on Windows may send `C:\fakepath\deck.pptx`; both separators are
/// stripped so the name can never escape the output directory.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = UNSAFE_CHARS.replace_all(base, "_");
    let cleaned = cleaned.trim_start_matches('.').trim();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `<stem>.pdf` for an original upload name.
pub fn output_file_name(original: &str) -> String {
    let safe = sanitize_file_name(original);
    let stem = Path::new(&safe)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    format!("{stem}.pdf")
}

/// Unique on-disk name for an upload: `<unix millis>-<random><.ext>`.
pub fn stored_name(original: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    let ext = extension(&sanitize_file_name(original))
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    format!("{}-{}{}", Utc::now().timestamp_millis(), &random[..12], ext)
}

/// Write the upload into `upload_dir` and return its path and on-disk size.
pub async fn persist(upload: &Upload, upload_dir: &Path) -> Result<(PathBuf, u64), Office2PdfError> {
    let path = upload_dir.join(stored_name(&upload.file_name));
    let fail = |source| Office2PdfError::UploadFailed {
        path: path.clone(),
        source,
    };

    tokio::fs::create_dir_all(upload_dir).await.map_err(fail)?;
    tokio::fs::write(&path, &upload.bytes).await.map_err(fail)?;
    let size = tokio::fs::metadata(&path).await.map_err(fail)?.len();

    debug!("Stored upload '{}' at {} ({} bytes)", upload.file_name, path.display(), size);
    Ok((path, size))
}
