//! Client-side batch queue.
//!
//! [`BatchQueue`] tracks local files through the same statuses the server
//! uses for jobs, submits them one request per file, and collects the
//! converted results for download.
//!
//! ## Why per-file failure isolation?
//!
//! One corrupt deck should not cost the user the other nine conversions.
//! Every per-file problem (unreadable file, timeout, server rejection) is
//! stored as a [`FileError`] on that file and the batch moves on, the same
//! way a failed page does not abort a document.

use crate::client::ConverterClient;
use crate::config::ClientConfig;
use crate::error::{FileError, Office2PdfError};
use crate::job::{JobResult, JobStatus};
use crate::pipeline::archive::ARCHIVE_NAME;
use crate::pipeline::intake;
use crate::progress::{BatchProgressCallback, NoopBatchCallback};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ── Types ────────────────────────────────────────────────────────────────

/// A local file tracked by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// Local identifier, independent of the server's job id.
    pub id: Uuid,
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    /// Server job id, known once the server has answered.
    pub job_id: Option<u64>,
    pub pdf_url: Option<String>,
    pub pdf_size: Option<u64>,
    pub error: Option<FileError>,
}

/// A finished conversion available for download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedFile {
    /// The [`UploadedFile`] this came from.
    pub source_id: Uuid,
    pub job_id: u64,
    pub name: String,
    pub pdf_url: String,
    pub pdf_size: u64,
    pub converted_at: DateTime<Utc>,
}

/// A path refused by [`BatchQueue::add_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of [`BatchQueue::add_files`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOutcome {
    /// Ids of the newly queued files, in input order.
    pub added: Vec<Uuid>,
    /// Unsupported, unreadable or oversized files.
    pub rejected: Vec<Rejection>,
    /// Valid files beyond the per-call limit.
    pub skipped: Vec<PathBuf>,
    /// User-facing notices about rejected or skipped files.
    pub warnings: Vec<String>,
}

/// What [`BatchQueue::cancel`] did with a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The file is now, or already was, `cancelled`.
    Cancelled,
    /// The file had already finished with this status; nothing changed.
    AlreadyFinished(JobStatus),
    /// No tracked file has this id.
    NotFound,
}

/// Counts for one [`BatchQueue::submit_all`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

enum Outcome {
    Succeeded,
    Failed,
    Cancelled,
}

// ── Queue ────────────────────────────────────────────────────────────────

/// Local batch of documents bound to one server.
#[derive(Debug)]
pub struct BatchQueue {
    client: ConverterClient,
    config: ClientConfig,
    files: Mutex<Vec<UploadedFile>>,
    converted: Mutex<Vec<ConvertedFile>>,
}

impl BatchQueue {
    pub fn new(config: ClientConfig) -> Result<Self, Office2PdfError> {
        Ok(Self {
            client: ConverterClient::new(&config)?,
            config,
            files: Mutex::new(Vec::new()),
            converted: Mutex::new(Vec::new()),
        })
    }

    pub fn client(&self) -> &ConverterClient {
        &self.client
    }

    fn files_lock(&self) -> MutexGuard<'_, Vec<UploadedFile>> {
        self.files.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn converted_lock(&self) -> MutexGuard<'_, Vec<ConvertedFile>> {
        self.converted.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Snapshot of every tracked file.
    pub fn files(&self) -> Vec<UploadedFile> {
        self.files_lock().clone()
    }

    pub fn file(&self, id: Uuid) -> Option<UploadedFile> {
        self.files_lock().iter().find(|f| f.id == id).cloned()
    }

    /// Snapshot of the converted results, in completion order.
    pub fn converted(&self) -> Vec<ConvertedFile> {
        self.converted_lock().clone()
    }

    /// Queue local files for conversion.
    ///
    /// Each path is checked for a supported extension and the size limit.
    /// At most `max_files` of the valid ones are queued; the surplus is
    /// reported in [`AddOutcome::skipped`]. Nothing is sent to the server.
    pub async fn add_files<I, P>(&self, paths: I) -> AddOutcome
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut outcome = AddOutcome::default();
        let mut valid = Vec::new();
        let mut any_type_ok = false;
        let mut any_too_large = false;

        for path in paths {
            let path = path.as_ref();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let guessed = mime_guess::from_path(path).first_raw();
            if !intake::is_accepted(&name, guessed) {
                outcome.rejected.push(Rejection {
                    path: path.to_path_buf(),
                    reason: "unsupported file type".into(),
                });
                continue;
            }
            any_type_ok = true;

            let meta = match tokio::fs::metadata(path).await {
                Ok(m) if m.is_file() => m,
                Ok(_) => {
                    outcome.rejected.push(Rejection {
                        path: path.to_path_buf(),
                        reason: "not a regular file".into(),
                    });
                    continue;
                }
                Err(e) => {
                    outcome.rejected.push(Rejection {
                        path: path.to_path_buf(),
                        reason: format!("cannot read file: {e}"),
                    });
                    continue;
                }
            };
            if meta.len() > self.config.max_file_bytes {
                any_too_large = true;
                outcome.rejected.push(Rejection {
                    path: path.to_path_buf(),
                    reason: format!(
                        "{} bytes exceeds the {} MB limit",
                        meta.len(),
                        self.config.max_file_bytes / (1024 * 1024)
                    ),
                });
                continue;
            }
            valid.push((path.to_path_buf(), name, meta.len()));
        }

        if !any_type_ok && !outcome.rejected.is_empty() {
            outcome.warnings.push(
                "Please upload only PowerPoint (.ppt/.pptx) or Word (.doc/.docx) files".into(),
            );
        }
        if any_too_large {
            outcome.warnings.push(format!(
                "Some files exceed the {}MB limit and were excluded.",
                self.config.max_file_bytes / (1024 * 1024)
            ));
        }
        if valid.len() > self.config.max_files {
            let max = self.config.max_files;
            outcome
                .skipped
                .extend(valid.drain(max..).map(|(path, _, _)| path));
            outcome.warnings.push(format!(
                "Maximum {max} files can be uploaded at once. Only the first {max} will be processed."
            ));
        }
        for w in &outcome.warnings {
            warn!("{}", w);
        }

        let now = Utc::now();
        let mut files = self.files_lock();
        for (path, name, size) in valid {
            let id = Uuid::new_v4();
            files.push(UploadedFile {
                id,
                name,
                path,
                size,
                status: JobStatus::Queued,
                progress: 0,
                created_at: now,
                job_id: None,
                pdf_url: None,
                pdf_size: None,
                error: None,
            });
            outcome.added.push(id);
        }
        if !outcome.added.is_empty() {
            info!("{} file(s) added to the queue", outcome.added.len());
        }
        outcome
    }

    /// Submit every `queued` file and wait for all of them.
    ///
    /// Files go out `concurrency` at a time with `pacing` between sends.
    /// A failing file is marked `failed` and the batch continues.
    pub async fn submit_all(
        &self,
        callback: Option<Arc<dyn BatchProgressCallback>>,
    ) -> BatchSummary {
        let callback = callback.unwrap_or_else(|| Arc::new(NoopBatchCallback));

        let selected: Vec<(Uuid, String, PathBuf)> = {
            let mut files = self.files_lock();
            files
                .iter_mut()
                .filter(|f| f.status == JobStatus::Queued)
                .map(|f| {
                    f.status = JobStatus::Processing;
                    f.progress = 0;
                    (f.id, f.name.clone(), f.path.clone())
                })
                .collect()
        };
        let total = selected.len();
        if total == 0 {
            warn!("No files to convert");
            return BatchSummary::default();
        }

        info!("Converting {} file(s)", total);
        callback.on_batch_start(total);

        let outcomes: Vec<Outcome> = stream::iter(selected.into_iter().enumerate())
            .map(|(i, (id, name, path))| {
                let cb = Arc::clone(&callback);
                async move { self.submit_one(i, total, id, &name, &path, cb.as_ref()).await }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        let mut summary = BatchSummary {
            total,
            ..BatchSummary::default()
        };
        for o in outcomes {
            match o {
                Outcome::Succeeded => summary.succeeded += 1,
                Outcome::Failed => summary.failed += 1,
                Outcome::Cancelled => summary.cancelled += 1,
            }
        }
        callback.on_batch_complete(total, summary.succeeded);
        info!(
            "Batch finished: {} succeeded, {} failed, {} cancelled",
            summary.succeeded, summary.failed, summary.cancelled
        );
        summary
    }

    async fn submit_one(
        &self,
        index: usize,
        total: usize,
        id: Uuid,
        name: &str,
        path: &Path,
        callback: &dyn BatchProgressCallback,
    ) -> Outcome {
        if index > 0 && !self.config.pacing().is_zero() {
            tokio::time::sleep(self.config.pacing()).await;
        }
        if self.is_cancelled(id) {
            debug!("Skipping '{}': cancelled before upload", name);
            return Outcome::Cancelled;
        }
        callback.on_file_start(index + 1, total, name);

        let result = match tokio::fs::read(path).await {
            Ok(bytes) => self
                .client
                .submit(name, bytes)
                .await
                .map_err(|e| to_file_error(name, e)),
            Err(e) => Err(FileError::Read {
                name: name.to_string(),
                detail: e.to_string(),
            }),
        };

        match self.record_result(id, result) {
            Recorded::Completed(r) => {
                callback.on_file_complete(index + 1, total, name, r.pdf_size);
                Outcome::Succeeded
            }
            Recorded::Failed(e) => {
                warn!("Conversion failed: {}", e);
                callback.on_file_error(index + 1, total, name, &e.to_string());
                Outcome::Failed
            }
            Recorded::Cancelled => Outcome::Cancelled,
        }
    }

    fn is_cancelled(&self, id: Uuid) -> bool {
        self.files_lock()
            .iter()
            .find(|f| f.id == id)
            .is_none_or(|f| f.status == JobStatus::Cancelled)
    }

    /// Store a response on the file unless it was cancelled or removed meanwhile.
    fn record_result(&self, id: Uuid, result: Result<JobResult, FileError>) -> Recorded {
        let mut files = self.files_lock();
        let Some(file) = files
            .iter_mut()
            .find(|f| f.id == id && f.status != JobStatus::Cancelled)
        else {
            return Recorded::Cancelled;
        };
        match result {
            Ok(r) => {
                file.status = JobStatus::Completed;
                file.progress = 100;
                file.job_id = Some(r.id);
                file.pdf_url = Some(r.pdf_url.clone());
                file.pdf_size = Some(r.pdf_size);
                drop(files);
                self.converted_lock().push(ConvertedFile {
                    source_id: id,
                    job_id: r.id,
                    name: r.name.clone(),
                    pdf_url: r.pdf_url.clone(),
                    pdf_size: r.pdf_size,
                    converted_at: Utc::now(),
                });
                Recorded::Completed(r)
            }
            Err(e) => {
                file.status = JobStatus::Failed;
                file.error = Some(e.clone());
                Recorded::Failed(e)
            }
        }
    }

    /// Mark a queued or in-flight file `cancelled`, asking the server to
    /// cancel its job when the job id is known. The local status changes
    /// whatever the server says.
    ///
    /// Completed and failed files are left as they are, so a finished
    /// conversion stays in [`Self::converted`] and in the ZIP.
    pub async fn cancel(&self, id: Uuid) -> CancelOutcome {
        let job_id = {
            let mut files = self.files_lock();
            let Some(file) = files.iter_mut().find(|f| f.id == id) else {
                return CancelOutcome::NotFound;
            };
            match file.status {
                JobStatus::Queued | JobStatus::Processing => {}
                JobStatus::Cancelled => return CancelOutcome::Cancelled,
                status @ (JobStatus::Completed | JobStatus::Failed) => {
                    debug!("'{}' already {}; not cancelling", file.name, status);
                    return CancelOutcome::AlreadyFinished(status);
                }
            }
            file.status = JobStatus::Cancelled;
            file.job_id
        };
        if let Some(job_id) = job_id {
            match self.client.cancel(job_id).await {
                Ok(message) => info!("Server cancel of job {}: {}", job_id, message),
                Err(e) => warn!("Server cancel of job {} failed: {}", job_id, e),
            }
        }
        CancelOutcome::Cancelled
    }

    /// Stop tracking a file without contacting the server.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut files = self.files_lock();
        let before = files.len();
        files.retain(|f| f.id != id);
        files.len() != before
    }

    /// Stop tracking every file. Converted results stay downloadable.
    pub fn clear_all(&self) {
        self.files_lock().clear();
    }

    /// Download every converted result as one ZIP into `dest_dir`.
    pub async fn download_zip(&self, dest_dir: &Path) -> Result<PathBuf, Office2PdfError> {
        let ids: Vec<u64> = self.converted_lock().iter().map(|c| c.job_id).collect();
        if ids.is_empty() {
            return Err(Office2PdfError::InvalidInput {
                reason: "No files to download. Convert files first.".into(),
            });
        }

        let bytes = self.client.download_zip(&ids).await.map_err(|e| {
            Office2PdfError::ArchiveFailed {
                detail: format!("{e}. Download the files individually instead."),
            }
        })?;
        let dest = dest_dir.join(ARCHIVE_NAME);
        write_file(&dest, &bytes).await?;
        info!("Saved {} ({} bytes)", dest.display(), bytes.len());
        Ok(dest)
    }

    /// Download one converted PDF into `dest_dir` under its display name.
    pub async fn download_file(
        &self,
        converted: &ConvertedFile,
        dest_dir: &Path,
    ) -> Result<PathBuf, Office2PdfError> {
        let bytes = self.client.download(&converted.pdf_url).await?;
        let dest = dest_dir.join(intake::sanitize_file_name(&converted.name));
        write_file(&dest, &bytes).await?;
        debug!("Saved {}", dest.display());
        Ok(dest)
    }
}

enum Recorded {
    Completed(JobResult),
    Failed(FileError),
    Cancelled,
}

fn to_file_error(name: &str, e: Office2PdfError) -> FileError {
    let name = name.to_string();
    match e {
        Office2PdfError::Timeout { secs } => FileError::Timeout { name, secs },
        Office2PdfError::Http { status, message } => FileError::Rejected {
            name,
            status,
            message,
        },
        other => FileError::Network {
            name,
            detail: other.to_string(),
        },
    }
}

async fn write_file(dest: &Path, bytes: &[u8]) -> Result<(), Office2PdfError> {
    let fail = |source| Office2PdfError::UploadFailed {
        path: dest.to_path_buf(),
        source,
    };
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }
    tokio::fs::write(dest, bytes).await.map_err(fail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> BatchQueue {
        BatchQueue::new(ClientConfig::builder().pacing_ms(0).build().unwrap()).unwrap()
    }

    fn touch(dir: &Path, name: &str, len: u64) -> PathBuf {
        let p = dir.join(name);
        let f = std::fs::File::create(&p).unwrap();
        f.set_len(len).unwrap();
        p
    }

    #[tokio::test]
    async fn eleven_files_queue_ten_and_warn() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<_> = (0..11)
            .map(|i| touch(dir.path(), &format!("deck{i}.pptx"), 10))
            .collect();
        let q = queue();
        let out = q.add_files(&paths).await;
        assert_eq!(out.added.len(), 10);
        assert_eq!(out.skipped, [paths[10].clone()]);
        assert!(out.warnings.iter().any(|w| w.contains("Maximum 10 files")));
        assert!(q.files().iter().all(|f| f.status == JobStatus::Queued));
    }

    #[tokio::test]
    async fn oversized_and_wrong_type_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let big = touch(dir.path(), "huge.docx", 150 * 1024 * 1024);
        let txt = touch(dir.path(), "notes.txt", 10);
        let ok = touch(dir.path(), "memo.DOC", 10);

        let q = queue();
        let out = q.add_files([&big, &txt, &ok]).await;
        assert_eq!(out.added.len(), 1);
        assert_eq!(out.rejected.len(), 2);
        assert!(out.rejected.iter().any(|r| r.path == big && r.reason.contains("100 MB")));
        assert!(out.rejected.iter().any(|r| r.path == txt));
        assert!(out.warnings.iter().any(|w| w.contains("100MB limit")));
        assert_eq!(q.files()[0].name, "memo.DOC");
    }

    #[tokio::test]
    async fn only_wrong_types_warns_about_formats() {
        let dir = tempfile::tempdir().unwrap();
        let txt = touch(dir.path(), "a.txt", 1);
        let out = queue().add_files([txt]).await;
        assert!(out.added.is_empty());
        assert!(out.warnings[0].contains("PowerPoint"));
    }

    #[tokio::test]
    async fn submit_with_empty_queue_is_noop() {
        let summary = queue().submit_all(None).await;
        assert_eq!(summary, BatchSummary::default());
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue();
        let out = q
            .add_files([touch(dir.path(), "a.ppt", 1), touch(dir.path(), "b.ppt", 1)])
            .await;
        assert!(q.remove(out.added[0]));
        assert!(!q.remove(out.added[0]));
        assert_eq!(q.files().len(), 1);
        q.clear_all();
        assert!(q.files().is_empty());
    }

    #[tokio::test]
    async fn cancel_without_job_id_is_local_only() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue();
        let out = q.add_files([touch(dir.path(), "a.pptx", 1)]).await;
        assert_eq!(q.cancel(out.added[0]).await, CancelOutcome::Cancelled);
        assert_eq!(q.file(out.added[0]).unwrap().status, JobStatus::Cancelled);
        assert_eq!(q.cancel(out.added[0]).await, CancelOutcome::Cancelled);
        assert_eq!(q.cancel(Uuid::new_v4()).await, CancelOutcome::NotFound);

        // Cancelled files are not picked up again.
        assert_eq!(q.submit_all(None).await.total, 0);
    }

    #[tokio::test]
    async fn finished_files_cannot_be_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue();
        let out = q
            .add_files([touch(dir.path(), "a.pptx", 1), touch(dir.path(), "b.docx", 1)])
            .await;
        {
            let mut files = q.files_lock();
            for file in files.iter_mut() {
                if file.id == out.added[0] {
                    file.status = JobStatus::Completed;
                    file.job_id = Some(7);
                } else {
                    file.status = JobStatus::Failed;
                }
            }
        }

        assert_eq!(
            q.cancel(out.added[0]).await,
            CancelOutcome::AlreadyFinished(JobStatus::Completed)
        );
        assert_eq!(
            q.cancel(out.added[1]).await,
            CancelOutcome::AlreadyFinished(JobStatus::Failed)
        );
        assert_eq!(q.file(out.added[0]).unwrap().status, JobStatus::Completed);
        assert_eq!(q.file(out.added[1]).unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn download_zip_requires_converted_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = queue().download_zip(dir.path()).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn error_mapping_keeps_status() {
        let e = to_file_error(
            "a.docx",
            Office2PdfError::Http {
                status: 500,
                message: "boom".into(),
            },
        );
        assert_eq!(e.to_string(), "a.docx: Error: 500 boom");
        assert!(matches!(
            to_file_error("a.docx", Office2PdfError::Timeout { secs: 30 }),
            FileError::Timeout { secs: 30, .. }
        ));
    }
}
