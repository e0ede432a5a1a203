//! The job orchestrator.
//!
//! [`ConversionService`] owns the job store and the converter and implements
//! every server operation independent of HTTP: a request handler is a thin
//! wrapper around one method here.

use crate::config::ServerConfig;
use crate::error::{ConversionError, Office2PdfError, StoreError};
use crate::job::{pdf_url, ConversionJob, JobResult, JobStatus, JobUpdate, NewJob};
use crate::pipeline::archive::{self, ArchiveEntry};
use crate::pipeline::convert::{DocumentConverter, LibreOfficeConverter};
use crate::pipeline::intake::{self, Upload};
use crate::store::{JobStore, MemoryJobStore};
use soffice_locate::SofficeCommand;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives uploads through intake, conversion and the job store.
///
/// Cheap to clone; clones share the store and converter.
#[derive(Clone)]
pub struct ConversionService {
    config: Arc<ServerConfig>,
    store: Arc<dyn JobStore>,
    converter: Arc<dyn DocumentConverter>,
}

impl std::fmt::Debug for ConversionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConversionService {
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn JobStore>,
        converter: Arc<dyn DocumentConverter>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            converter,
        }
    }

    /// In-memory store plus headless LibreOffice, as configured.
    pub fn from_config(config: ServerConfig) -> Self {
        let converter = match &config.soffice_path {
            Some(path) => LibreOfficeConverter::new(SofficeCommand::new(path), &config.scratch_dir),
            None => LibreOfficeConverter::auto(&config.scratch_dir),
        }
        .with_timeout(config.conversion_timeout());
        Self::new(config, Arc::new(MemoryJobStore::new()), Arc::new(converter))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    /// Validate, persist and convert one upload, waiting for the result.
    ///
    /// # Errors
    /// - [`Office2PdfError::InvalidInput`] before any job exists
    /// - [`Office2PdfError::UploadFailed`] when the bytes cannot be stored
    /// - [`Office2PdfError::ToolNotInstalled`] when LibreOffice is missing; the
    ///   install hint is also the job's recorded error
    /// - [`Office2PdfError::ConversionFailed`] after the job is marked `failed`
    /// - [`Office2PdfError::Cancelled`] when the job was cancelled while the
    ///   tool ran; the produced PDF is discarded
    pub async fn submit(&self, upload: Upload) -> Result<JobResult, Office2PdfError> {
        let start = Instant::now();

        // ── Step 1: Intake ───────────────────────────────────────────────
        intake::validate(&upload, self.config.max_upload_bytes)?;
        let (input_path, file_size) = intake::persist(&upload, &self.config.upload_dir).await?;

        // ── Step 2: Register the job ─────────────────────────────────────
        let job = self.store.create(NewJob {
            original_file_name: upload.file_name.clone(),
            original_file_path: input_path.clone(),
            file_size,
        });
        let id = job.id;
        let output_name = intake::output_file_name(&upload.file_name);
        let output_path = self.config.output_dir.join(format!("{id}_{output_name}"));
        info!("Job {}: converting '{}' ({} bytes)", id, upload.file_name, file_size);

        if let Err(e) = self.store.update(id, JobUpdate::Processing) {
            return Err(self.rejected_update(id, e));
        }

        // ── Step 3: Convert ──────────────────────────────────────────────
        if let Err(source) = self.converter.convert(&input_path, &output_path).await {
            let message = source.to_string();
            warn!("Job {}: conversion failed: {}", id, message);
            if let Err(e) = self.store.update(id, JobUpdate::Failed { error: message }) {
                return Err(self.rejected_update(id, e));
            }
            return Err(match source {
                ConversionError::ToolNotInstalled { hint } => {
                    Office2PdfError::ToolNotInstalled { hint }
                }
                source => Office2PdfError::ConversionFailed { id, source },
            });
        }

        // ── Step 4: Record the result ────────────────────────────────────
        let pdf_size = match tokio::fs::metadata(&output_path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                let source = ConversionError::io("Failed to stat converted PDF", e);
                if tokio::fs::remove_file(&output_path).await.is_ok() {
                    debug!("Job {}: discarded {}", id, output_path.display());
                }
                let failed = JobUpdate::Failed {
                    error: source.to_string(),
                };
                if let Err(e) = self.store.update(id, failed) {
                    warn!("Job {}: could not record failure: {}", id, e);
                    return Err(self.rejected_update(id, e));
                }
                return Err(Office2PdfError::ConversionFailed { id, source });
            }
        };
        let completed = JobUpdate::Completed {
            output_file_path: output_path.clone(),
            output_file_size: pdf_size,
        };
        if let Err(e) = self.store.update(id, completed) {
            if tokio::fs::remove_file(&output_path).await.is_ok() {
                debug!("Job {}: discarded {}", id, output_path.display());
            }
            return Err(self.rejected_update(id, e));
        }

        info!(
            "Job {}: completed '{}' ({} bytes) in {}ms",
            id,
            output_name,
            pdf_size,
            start.elapsed().as_millis()
        );
        Ok(JobResult {
            id,
            pdf_url: pdf_url(id, &output_name),
            name: output_name,
            pdf_size,
        })
    }

    /// A store update during [`Self::submit`] was refused. The only way that
    /// happens is a concurrent cancel, so report the job as cancelled.
    fn rejected_update(&self, id: u64, err: StoreError) -> Office2PdfError {
        match self.store.get(id) {
            Some(job) if job.status == JobStatus::Cancelled => {
                info!("Job {}: cancelled during conversion", id);
                Office2PdfError::Cancelled { id }
            }
            _ => err.into(),
        }
    }

    /// Mark a job `cancelled`.
    ///
    /// Advisory: a running tool invocation is not interrupted, but its result
    /// will be discarded. Cancelling a cancelled job returns it unchanged.
    pub fn cancel(&self, id: u64) -> Result<ConversionJob, Office2PdfError> {
        let job = self.store.get(id).ok_or(Office2PdfError::JobNotFound { id })?;
        match job.status {
            JobStatus::Cancelled => return Ok(job),
            status @ (JobStatus::Completed | JobStatus::Failed) => {
                return Err(Office2PdfError::AlreadyFinished { id, status })
            }
            JobStatus::Queued | JobStatus::Processing => {}
        }
        match self.store.update(id, JobUpdate::Cancelled) {
            Ok(job) => {
                info!("Job {}: cancelled", id);
                Ok(job)
            }
            // Lost a race with completion or failure.
            Err(StoreError::InvalidTransition { from, .. }) if from != JobStatus::Cancelled => {
                Err(Office2PdfError::AlreadyFinished { id, status: from })
            }
            Err(StoreError::InvalidTransition { .. }) => self
                .store
                .get(id)
                .ok_or(Office2PdfError::JobNotFound { id }),
            Err(StoreError::NotFound { .. }) => Err(Office2PdfError::JobNotFound { id }),
        }
    }

    pub fn job(&self, id: u64) -> Result<ConversionJob, Office2PdfError> {
        self.store.get(id).ok_or(Office2PdfError::JobNotFound { id })
    }

    pub fn jobs(&self) -> Vec<ConversionJob> {
        self.store.list()
    }

    /// The job and its output path, if the PDF can be served.
    pub async fn open_output(&self, id: u64) -> Result<(ConversionJob, PathBuf), Office2PdfError> {
        let job = self.store.get(id).ok_or(Office2PdfError::FileNotFound { id })?;
        let path = job
            .output_file_path
            .clone()
            .ok_or(Office2PdfError::FileNotFound { id })?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!("Job {}: output {} is gone", id, path.display());
            return Err(Office2PdfError::FileNotFound { id });
        }
        Ok((job, path))
    }

    /// ZIP of the outputs of `ids`, in request order.
    ///
    /// Unknown, unfinished and reaped jobs are skipped, so the result may be
    /// an empty archive.
    pub async fn build_archive(&self, ids: &[u64]) -> Result<Vec<u8>, Office2PdfError> {
        let mut entries = Vec::with_capacity(ids.len());
        for &id in ids {
            let Some(job) = self.store.get(id) else {
                debug!("Archive: job {} not found, skipping", id);
                continue;
            };
            let Some(path) = job
                .output_file_path
                .filter(|_| job.status == JobStatus::Completed)
            else {
                debug!("Archive: job {} is {}, skipping", id, job.status);
                continue;
            };
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!("Archive: output of job {} is gone, skipping", id);
                continue;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("{id}.pdf"));
            entries.push(ArchiveEntry { name, path });
        }
        info!("Building archive with {} of {} requested file(s)", entries.len(), ids.len());
        archive::build_zip(entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    /// Writes a fake PDF unless the output name contains "broken".
    struct FakeConverter;

    #[async_trait]
    impl DocumentConverter for FakeConverter {
        async fn convert(&self, _input: &Path, output: &Path) -> Result<(), ConversionError> {
            if output.to_string_lossy().contains("broken") {
                return Err(ConversionError::OutputNotProduced {
                    expected: output.to_path_buf(),
                });
            }
            tokio::fs::create_dir_all(output.parent().unwrap()).await.unwrap();
            tokio::fs::write(output, b"%PDF-1.4").await.unwrap();
            Ok(())
        }
    }

    /// Behaves as if LibreOffice were not installed.
    struct MissingToolConverter;

    #[async_trait]
    impl DocumentConverter for MissingToolConverter {
        async fn convert(&self, _input: &Path, _output: &Path) -> Result<(), ConversionError> {
            Err(ConversionError::ToolNotInstalled {
                hint: "LibreOffice is not installed".into(),
            })
        }
    }

    /// Reports success without writing anything.
    struct SilentConverter;

    #[async_trait]
    impl DocumentConverter for SilentConverter {
        async fn convert(&self, _input: &Path, _output: &Path) -> Result<(), ConversionError> {
            Ok(())
        }
    }

    /// Parks inside `convert` until released.
    struct GatedConverter {
        entered: Notify,
        release: Notify,
        started: AtomicBool,
    }

    #[async_trait]
    impl DocumentConverter for GatedConverter {
        async fn convert(&self, _input: &Path, output: &Path) -> Result<(), ConversionError> {
            self.started.store(true, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            tokio::fs::create_dir_all(output.parent().unwrap()).await.unwrap();
            tokio::fs::write(output, b"%PDF-1.4").await.unwrap();
            Ok(())
        }
    }

    fn service_in(dir: &Path, converter: Arc<dyn DocumentConverter>) -> ConversionService {
        let config = ServerConfig::builder()
            .upload_dir(dir.join("uploads"))
            .output_dir(dir.join("converted"))
            .scratch_dir(dir.join("temp"))
            .build()
            .unwrap();
        ConversionService::new(config, Arc::new(MemoryJobStore::new()), converter)
    }

    fn upload(name: &str) -> Upload {
        Upload {
            file_name: name.into(),
            content_type: None,
            bytes: Bytes::from_static(b"office bytes"),
        }
    }

    #[tokio::test]
    async fn submit_completes_job_and_names_output() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service_in(dir.path(), Arc::new(FakeConverter));

        let result = svc.submit(upload("Q1 Review.pptx")).await.unwrap();
        assert_eq!(result.name, "Q1 Review.pdf");
        assert_eq!(result.pdf_url, format!("/api/files/{}/Q1%20Review.pdf", result.id));
        assert_eq!(result.pdf_size, 8);

        let job = svc.job(result.id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.file_size, 12);
        let out = job.output_file_path.unwrap();
        assert_eq!(
            out,
            dir.path().join("converted").join(format!("{}_Q1 Review.pdf", result.id))
        );
    }

    #[tokio::test]
    async fn invalid_upload_creates_no_job() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service_in(dir.path(), Arc::new(FakeConverter));
        let err = svc.submit(upload("notes.txt")).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(svc.jobs().is_empty());
    }

    #[tokio::test]
    async fn failure_is_recorded_with_same_message() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service_in(dir.path(), Arc::new(FakeConverter));
        let err = svc.submit(upload("broken.docx")).await.unwrap_err();
        let Office2PdfError::ConversionFailed { id, ref source } = err else {
            panic!("unexpected error: {err:?}");
        };
        let job = svc.job(id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some(source.to_string().as_str()));
        assert!(job.output_file_path.is_none());
    }

    #[tokio::test]
    async fn missing_tool_surfaces_install_hint() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service_in(dir.path(), Arc::new(MissingToolConverter));
        let err = svc.submit(upload("deck.pptx")).await.unwrap_err();
        assert!(matches!(err, Office2PdfError::ToolNotInstalled { .. }));
        assert_eq!(err.status_code(), 500);

        let job = svc.jobs().pop().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("LibreOffice is not installed"));
        let body = err.error_body();
        assert_eq!(body.message, "Conversion failed");
        assert_eq!(body.error.as_deref(), job.error.as_deref());
    }

    #[tokio::test]
    async fn missing_output_marks_job_failed() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service_in(dir.path(), Arc::new(SilentConverter));
        let err = svc.submit(upload("deck.pptx")).await.unwrap_err();
        let Office2PdfError::ConversionFailed { id, .. } = err else {
            panic!("expected a conversion failure");
        };
        let job = svc.job(id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().starts_with("Failed to stat converted PDF"));
        assert!(job.output_file_path.is_none());
    }

    #[tokio::test]
    async fn cancel_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service_in(dir.path(), Arc::new(FakeConverter));

        assert!(matches!(
            svc.cancel(42).unwrap_err(),
            Office2PdfError::JobNotFound { id: 42 }
        ));

        let done = svc.submit(upload("a.docx")).await.unwrap();
        let err = svc.cancel(done.id).unwrap_err();
        assert_eq!(err.status_code(), 409);
        assert_eq!(svc.job(done.id).unwrap().status, JobStatus::Completed);

        let queued = svc.store().create(NewJob {
            original_file_name: "b.docx".into(),
            original_file_path: dir.path().join("uploads/b.docx"),
            file_size: 1,
        });
        assert_eq!(svc.cancel(queued.id).unwrap().status, JobStatus::Cancelled);
        assert_eq!(svc.cancel(queued.id).unwrap().status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_during_conversion_discards_output() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(GatedConverter {
            entered: Notify::new(),
            release: Notify::new(),
            started: AtomicBool::new(false),
        });
        let svc = service_in(dir.path(), gate.clone());

        let task = tokio::spawn({
            let svc = svc.clone();
            async move { svc.submit(upload("deck.pptx")).await }
        });
        gate.entered.notified().await;
        assert!(gate.started.load(Ordering::SeqCst));

        let id = svc.jobs()[0].id;
        assert_eq!(svc.job(id).unwrap().status, JobStatus::Processing);
        svc.cancel(id).unwrap();
        gate.release.notify_one();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, Office2PdfError::Cancelled { .. }));
        assert_eq!(err.status_code(), 409);
        let job = svc.job(id).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.output_file_path.is_none());
        let leftovers = std::fs::read_dir(dir.path().join("converted")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn open_output_requires_completed_file() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service_in(dir.path(), Arc::new(FakeConverter));
        assert!(matches!(
            svc.open_output(1).await.unwrap_err(),
            Office2PdfError::FileNotFound { id: 1 }
        ));

        let r = svc.submit(upload("a.doc")).await.unwrap();
        let (_, path) = svc.open_output(r.id).await.unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(svc.open_output(r.id).await.unwrap_err().status_code(), 404);
    }

    #[tokio::test]
    async fn archive_skips_missing_and_unfinished() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service_in(dir.path(), Arc::new(FakeConverter));
        let ok = svc.submit(upload("good.docx")).await.unwrap();
        let bad = svc.submit(upload("broken.docx")).await.unwrap_err();
        let Office2PdfError::ConversionFailed { id: bad_id, .. } = bad else {
            panic!("expected conversion failure");
        };

        let bytes = svc.build_archive(&[ok.id, bad_id, 999]).await.unwrap();
        let archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let names: Vec<_> = archive.file_names().collect();
        assert_eq!(names, [format!("{}_good.pdf", ok.id)]);
    }
}
