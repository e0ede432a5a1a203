//! End-to-end tests: the real axum router on an ephemeral port, driven
//! through `ConverterClient`, `BatchQueue` and raw HTTP.
//!
//! The external tool is replaced by an in-process converter, so none of
//! these need LibreOffice. The one test that does is gated behind the
//! `E2E_ENABLED` environment variable.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture
//!
//! Including the LibreOffice round trip:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use async_trait::async_trait;
use office2pdf::{
    BatchQueue, CancelOutcome, ClientConfig, ConversionError, ConversionService, ConverterClient,
    DocumentConverter, FileError, JobStatus, LibreOfficeConverter, MemoryJobStore,
    Office2PdfError, ServerConfig,
};
use std::collections::HashSet;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_test::{assert_err, assert_ok};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Writes a small fake PDF. Output names containing `broken` fail like a
/// crashed tool; `slow` takes three seconds.
struct FakeConverter;

#[async_trait]
impl DocumentConverter for FakeConverter {
    async fn convert(&self, _input: &Path, output: &Path) -> Result<(), ConversionError> {
        let name = output.to_string_lossy().into_owned();
        if name.contains("broken") {
            return Err(ConversionError::ToolFailed {
                status: "exit status: 1".into(),
                stderr: "source file could not be loaded".into(),
            });
        }
        if name.contains("slow") {
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
        tokio::fs::create_dir_all(output.parent().unwrap()).await.unwrap();
        tokio::fs::write(output, b"%PDF-1.4 fake").await.unwrap();
        Ok(())
    }
}

struct TestServer {
    base: String,
    service: ConversionService,
    dir: TempDir,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start(converter: Arc<dyn DocumentConverter>) -> Self {
        Self::start_with(converter, |b| b).await
    }

    async fn start_with(
        converter: Arc<dyn DocumentConverter>,
        tweak: impl FnOnce(office2pdf::ServerConfigBuilder) -> office2pdf::ServerConfigBuilder,
    ) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let builder = ServerConfig::builder()
            .upload_dir(dir.path().join("uploads"))
            .output_dir(dir.path().join("converted"))
            .scratch_dir(dir.path().join("temp"));
        let config = tweak(builder).build().unwrap();
        let service = ConversionService::new(config, Arc::new(MemoryJobStore::new()), converter);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(office2pdf::serve_on(listener, service.clone(), async {
            rx.await.ok();
        }));

        Self {
            base,
            service,
            dir,
            shutdown: Some(tx),
        }
    }

    fn client_config(&self) -> ClientConfig {
        ClientConfig::builder()
            .server_url(&self.base)
            .pacing_ms(0)
            .build()
            .unwrap()
    }

    fn client(&self) -> ConverterClient {
        ConverterClient::new(&self.client_config()).unwrap()
    }

    fn queue(&self) -> BatchQueue {
        BatchQueue::new(self.client_config()).unwrap()
    }

    /// A local document under the test's temp dir.
    fn document(&self, name: &str) -> PathBuf {
        let local = self.dir.path().join("local");
        std::fs::create_dir_all(&local).unwrap();
        let p = local.join(name);
        std::fs::write(&p, b"office document bytes").unwrap();
        p
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Logs from the server show up with `RUST_LOG=office2pdf=debug`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn zip_names(bytes: &[u8]) -> Vec<String> {
    let archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    archive.file_names().map(String::from).collect()
}

// ── Upload & retrieval ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_convert_and_fetch_pdf() {
    let server = TestServer::start(Arc::new(FakeConverter)).await;
    let client = server.client();

    let result = assert_ok!(client.submit("Quarterly Review.pptx", b"pptx".to_vec()).await);
    assert_eq!(result.name, "Quarterly Review.pdf");
    assert_eq!(
        result.pdf_url,
        format!("/api/files/{}/Quarterly%20Review.pdf", result.id)
    );
    assert_eq!(result.pdf_size, 13);

    let response = reqwest::get(client.url(&result.pdf_url)).await.unwrap();
    assert_eq!(response.status(), 200);
    let headers = response.headers().clone();
    assert_eq!(headers["content-type"], "application/pdf");
    assert_eq!(headers["content-length"], "13");
    assert_eq!(
        headers["content-disposition"],
        "attachment; filename=\"Quarterly%20Review.pdf\""
    );
    assert!(response.bytes().await.unwrap().starts_with(b"%PDF"));

    let job = assert_ok!(client.job(result.id).await);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.original_file_name, "Quarterly Review.pptx");
}

#[tokio::test]
async fn test_non_ascii_names_survive() {
    let server = TestServer::start(Arc::new(FakeConverter)).await;
    let client = server.client();

    let result = assert_ok!(client.submit("Präsentation 日本.pptx", b"pptx".to_vec()).await);
    assert_eq!(result.name, "Präsentation 日本.pdf");
    assert_eq!(
        result.pdf_url,
        format!(
            "/api/files/{}/Pr%C3%A4sentation%20%E6%97%A5%E6%9C%AC.pdf",
            result.id
        )
    );
    let pdf = assert_ok!(client.download(&result.pdf_url).await);
    assert!(pdf.starts_with(b"%PDF"));

    let zip = assert_ok!(client.download_zip(&[result.id]).await);
    assert_eq!(
        zip_names(&zip),
        [format!("{}_Präsentation 日本.pdf", result.id)]
    );
}

#[tokio::test]
async fn test_unknown_file_is_404() {
    let server = TestServer::start(Arc::new(FakeConverter)).await;

    let response = reqwest::get(format!("{}/api/files/999/whatever.pdf", server.base))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "File not found");

    let err = assert_err!(server.client().download("/api/files/abc/x.pdf").await);
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_reaped_output_is_404() {
    let server = TestServer::start(Arc::new(FakeConverter)).await;
    let client = server.client();
    let result = assert_ok!(client.submit("memo.docx", b"doc".to_vec()).await);

    let job = server.service.job(result.id).unwrap();
    std::fs::remove_file(job.output_file_path.unwrap()).unwrap();
    let err = assert_err!(client.download(&result.pdf_url).await);
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_failed_conversion_reports_job_error() {
    let server = TestServer::start(Arc::new(FakeConverter)).await;

    let err = assert_err!(server.client().submit("broken.docx", b"doc".to_vec()).await);
    let Office2PdfError::Http { status, message } = err else {
        panic!("expected an HTTP error");
    };
    assert_eq!(status, 500);

    let jobs = server.service.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert_eq!(jobs[0].error.as_deref(), Some(message.as_str()));
    assert!(message.contains("could not be loaded"));
}

#[tokio::test]
async fn test_rejected_uploads_are_400() {
    let server = TestServer::start_with(Arc::new(FakeConverter), |b| b.max_upload_bytes(1024)).await;
    let http = reqwest::Client::new();
    let url = format!("{}/api/conversion", server.base);

    // Wrong type.
    let err = assert_err!(server.client().submit("photo.png", vec![0; 10]).await);
    assert_eq!(err.status_code(), 400);

    // Too large for the configured limit.
    let err = assert_err!(server.client().submit("big.docx", vec![0; 4096]).await);
    assert_eq!(err.status_code(), 400);

    // No `file` field.
    let form = reqwest::multipart::Form::new().text("other", "value");
    let response = http.post(&url).multipart(form).send().await.unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "No file uploaded");

    assert!(server.service.jobs().is_empty(), "no job may be created");
}

// ── Cancellation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cancel_over_http() {
    let server = TestServer::start(Arc::new(FakeConverter)).await;
    let client = server.client();

    let err = assert_err!(client.cancel(77).await);
    assert_eq!(err.status_code(), 404);

    let done = assert_ok!(client.submit("a.docx", b"doc".to_vec()).await);
    let err = assert_err!(client.cancel(done.id).await);
    assert_eq!(err.status_code(), 409);
    assert_eq!(
        assert_ok!(client.job(done.id).await).status,
        JobStatus::Completed
    );
}

// ── Archive ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_zip_skips_missing_ids() {
    let server = TestServer::start(Arc::new(FakeConverter)).await;
    let client = server.client();
    let ok = assert_ok!(client.submit("slides.ppt", b"ppt".to_vec()).await);

    let response = reqwest::Client::new()
        .post(format!("{}/api/download/zip", server.base))
        .json(&serde_json::json!({ "fileIds": [ok.id, 999] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/zip");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"converted_pdfs.zip\""
    );
    let bytes = response.bytes().await.unwrap();

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    assert_eq!(archive.len(), 1);
    let mut entry = archive.by_index(0).unwrap();
    assert_eq!(entry.name(), format!("{}_slides.pdf", ok.id));
    let mut content = Vec::new();
    entry.read_to_end(&mut content).unwrap();
    assert_eq!(content, b"%PDF-1.4 fake");
}

#[tokio::test]
async fn test_zip_of_only_missing_ids_is_empty() {
    let server = TestServer::start(Arc::new(FakeConverter)).await;
    let bytes = assert_ok!(server.client().download_zip(&[41, 42]).await);
    assert!(zip_names(&bytes).is_empty());
}

#[tokio::test]
async fn test_zip_requires_ids() {
    let server = TestServer::start(Arc::new(FakeConverter)).await;
    let err = assert_err!(server.client().download_zip(&[]).await);
    assert_eq!(err.status_code(), 400);

    let response = reqwest::Client::new()
        .post(format!("{}/api/download/zip", server.base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

// ── Batch queue ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_batch_with_one_failure_continues() {
    let server = TestServer::start(Arc::new(FakeConverter)).await;
    let queue = server.queue();
    let files = [
        server.document("first.pptx"),
        server.document("broken.docx"),
        server.document("third.doc"),
    ];
    let added = queue.add_files(&files).await;
    assert_eq!(added.added.len(), 3);

    let summary = queue.submit_all(None).await;
    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    let tracked = queue.files();
    assert_eq!(tracked[0].status, JobStatus::Completed);
    assert_eq!(tracked[1].status, JobStatus::Failed);
    assert!(matches!(
        tracked[1].error,
        Some(FileError::Rejected { status: 500, .. })
    ));
    assert_eq!(tracked[2].status, JobStatus::Completed);
    assert!(tracked[2].pdf_url.is_some());

    let converted = queue.converted();
    assert_eq!(converted.len(), 2);
    assert_eq!(converted[0].name, "first.pdf");
    assert_eq!(converted[1].name, "third.pdf");

    // A second run finds nothing queued.
    assert_eq!(queue.submit_all(None).await.total, 0);
}

#[tokio::test]
async fn test_batch_timeout_marks_file_failed() {
    let server = TestServer::start(Arc::new(FakeConverter)).await;
    let config = ClientConfig::builder()
        .server_url(&server.base)
        .pacing_ms(0)
        .request_timeout_secs(1)
        .build()
        .unwrap();
    let queue = BatchQueue::new(config).unwrap();
    queue
        .add_files([server.document("slow.pptx"), server.document("fast.pptx")])
        .await;

    let summary = queue.submit_all(None).await;
    assert_eq!((summary.succeeded, summary.failed), (1, 1));
    assert!(matches!(
        queue.files()[0].error,
        Some(FileError::Timeout { secs: 1, .. })
    ));
}

#[tokio::test]
async fn test_concurrent_batch_converts_everything() {
    let server = TestServer::start(Arc::new(FakeConverter)).await;
    let config = ClientConfig::builder()
        .server_url(&server.base)
        .pacing_ms(0)
        .concurrency(4)
        .build()
        .unwrap();
    let queue = BatchQueue::new(config).unwrap();
    let files: Vec<_> = (0..6)
        .map(|i| server.document(&format!("deck{i}.pptx")))
        .collect();
    queue.add_files(&files).await;

    let summary = queue.submit_all(None).await;
    assert_eq!(summary.succeeded, 6);
    assert_eq!(summary.failed, 0);

    let converted = queue.converted();
    assert_eq!(converted.len(), 6);
    let urls: HashSet<&str> = converted.iter().map(|c| c.pdf_url.as_str()).collect();
    assert_eq!(urls.len(), 6, "every upload gets its own output");
    let names: HashSet<&str> = converted.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names.len(), 6);
}

#[tokio::test]
async fn test_queue_downloads_zip_and_files() {
    let server = TestServer::start(Arc::new(FakeConverter)).await;
    let queue = server.queue();
    queue
        .add_files([server.document("a.docx"), server.document("b.pptx")])
        .await;
    queue.submit_all(None).await;

    let out = server.dir.path().join("downloads");
    let zip_path = assert_ok!(queue.download_zip(&out).await);
    assert_eq!(zip_path.file_name().unwrap(), "converted_pdfs.zip");
    let names = zip_names(&std::fs::read(&zip_path).unwrap());
    assert_eq!(names.len(), 2);
    assert!(names.iter().all(|n| n.ends_with(".pdf")));

    let first = queue.converted()[0].clone();
    let pdf = assert_ok!(queue.download_file(&first, &out).await);
    assert_eq!(pdf, out.join("a.pdf"));
    assert!(std::fs::read(pdf).unwrap().starts_with(b"%PDF"));
}

#[tokio::test]
async fn test_queue_cancel_leaves_finished_file_alone() {
    let server = TestServer::start(Arc::new(FakeConverter)).await;
    let queue = server.queue();
    let added = queue.add_files([server.document("a.docx")]).await;
    queue.submit_all(None).await;

    let id = added.added[0];
    assert_eq!(
        queue.cancel(id).await,
        CancelOutcome::AlreadyFinished(JobStatus::Completed)
    );
    let file = queue.file(id).unwrap();
    assert_eq!(file.status, JobStatus::Completed);
    let job_id = file.job_id.unwrap();
    assert_eq!(server.service.job(job_id).unwrap().status, JobStatus::Completed);

    // Still part of the batch download.
    assert_eq!(queue.converted().len(), 1);
    let zip_path = assert_ok!(queue.download_zip(&server.dir.path().join("out")).await);
    let names = zip_names(&std::fs::read(zip_path).unwrap());
    assert_eq!(names, [format!("{job_id}_a.pdf")]);
}

#[tokio::test]
async fn test_status_endpoints() {
    let server = TestServer::start(Arc::new(FakeConverter)).await;
    let client = server.client();
    assert!(assert_ok!(client.jobs().await).is_empty());

    assert_ok!(client.submit("a.docx", b"x".to_vec()).await);
    assert_ok!(client.submit("b.docx", b"x".to_vec()).await);
    let jobs = assert_ok!(client.jobs().await);
    assert_eq!(jobs.iter().map(|j| j.id).collect::<Vec<_>>(), [1, 2]);

    assert_eq!(assert_err!(client.job(3).await).status_code(), 404);

    let health: serde_json::Value = reqwest::get(format!("{}/healthz", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
}

// ── Real LibreOffice ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_libreoffice_round_trip() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP: set E2E_ENABLED=1 to run the LibreOffice test");
        return;
    }
    let Ok(command) = soffice_locate::locate_soffice() else {
        println!("SKIP: LibreOffice not installed");
        return;
    };
    let scratch = tempfile::tempdir().unwrap();
    let converter = LibreOfficeConverter::new(command, scratch.path())
        .with_timeout(Duration::from_secs(120));
    let server = TestServer::start(Arc::new(converter)).await;

    // LibreOffice opens plain text saved as .doc.
    let doc = server.dir.path().join("hello.doc");
    std::fs::write(&doc, "Hello from office2pdf\n").unwrap();

    let result = assert_ok!(
        server
            .client()
            .submit("hello.doc", std::fs::read(&doc).unwrap())
            .await
    );
    let pdf = assert_ok!(server.client().download(&result.pdf_url).await);
    assert!(pdf.starts_with(b"%PDF"));
}
