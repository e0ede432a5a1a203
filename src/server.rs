//! HTTP surface over [`ConversionService`].
//!
//! | Method | Path                             | Handler        |
//! |--------|----------------------------------|----------------|
//! | POST   | `/api/conversion`                | [`convert`]    |
//! | GET    | `/api/conversion`                | [`list_jobs`]  |
//! | GET    | `/api/conversion/{id}`           | [`get_job`]    |
//! | POST   | `/api/conversion/{id}/cancel`    | [`cancel`]     |
//! | GET    | `/api/files/{id}/{filename}`     | [`fetch_file`] |
//! | POST   | `/api/download/zip`              | [`download_zip`] |
//! | GET    | `/healthz`                       | [`health`]     |
//!
//! Every error answers with `{"message": ..., "error": ...}` and the status
//! from [`Office2PdfError::status_code`].

use crate::client::{ErrorBody, MessageBody, ZipRequest};
use crate::config::ServerConfig;
use crate::error::Office2PdfError;
use crate::job::{encode_uri_component, ConversionJob, JobResult};
use crate::pipeline::archive::ARCHIVE_NAME;
use crate::pipeline::intake::Upload;
use crate::pipeline::sweep;
use crate::service::ConversionService;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::future::Future;
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

/// Room for multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

// ── Errors ───────────────────────────────────────────────────────────────

impl Office2PdfError {
    /// The JSON body sent for this error.
    pub fn error_body(&self) -> ErrorBody {
        match self {
            Self::InvalidInput { reason } => ErrorBody {
                message: reason.clone(),
                error: None,
            },
            // Same text that was recorded on the job.
            Self::ConversionFailed { source, .. } => ErrorBody {
                message: self.summary().to_string(),
                error: Some(source.to_string()),
            },
            _ => ErrorBody {
                message: self.summary().to_string(),
                error: Some(self.to_string()),
            },
        }
    }
}

impl IntoResponse for Office2PdfError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!("{}", self);
        }
        (status, Json(self.error_body())).into_response()
    }
}

// ── Router ───────────────────────────────────────────────────────────────

/// All routes bound to `service`.
pub fn router(service: ConversionService) -> Router {
    let body_limit = service
        .config()
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new()
        .route("/api/conversion", post(convert).get(list_jobs))
        .route("/api/conversion/{id}", get(get_job))
        .route("/api/conversion/{id}/cancel", post(cancel))
        .route("/api/files/{id}/{filename}", get(fetch_file))
        .route("/api/download/zip", post(download_zip))
        .route("/healthz", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(service)
}

/// Ids are path text; anything non-numeric names no job.
fn parse_id(raw: &str) -> Option<u64> {
    raw.parse().ok()
}

/// `POST /api/conversion`: convert the multipart field `file`.
pub async fn convert(
    State(service): State<ConversionService>,
    mut multipart: Multipart,
) -> Result<Json<JobResult>, Office2PdfError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(String::from);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some(Upload {
            file_name,
            content_type,
            bytes,
        });
        break;
    }
    let upload = upload.ok_or_else(|| Office2PdfError::InvalidInput {
        reason: "No file uploaded".into(),
    })?;
    service.submit(upload).await.map(Json)
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> Office2PdfError {
    let reason = if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        "File exceeds the upload size limit".to_string()
    } else {
        format!("Malformed upload: {}", e.body_text())
    };
    Office2PdfError::InvalidInput { reason }
}

/// `GET /api/conversion`
pub async fn list_jobs(State(service): State<ConversionService>) -> Json<Vec<ConversionJob>> {
    Json(service.jobs())
}

/// `GET /api/conversion/{id}`
pub async fn get_job(
    State(service): State<ConversionService>,
    Path(id): Path<String>,
) -> Result<Json<ConversionJob>, Office2PdfError> {
    let id = parse_id(&id).ok_or(Office2PdfError::JobNotFound { id: 0 })?;
    service.job(id).map(Json)
}

/// `POST /api/conversion/{id}/cancel`
pub async fn cancel(
    State(service): State<ConversionService>,
    Path(id): Path<String>,
) -> Result<Json<MessageBody>, Office2PdfError> {
    let id = parse_id(&id).ok_or(Office2PdfError::JobNotFound { id: 0 })?;
    service.cancel(id)?;
    Ok(Json(MessageBody {
        message: "Conversion cancelled".into(),
    }))
}

/// `GET /api/files/{id}/{filename}`: stream a finished PDF.
///
/// `filename` only labels the download; the job id picks the file.
pub async fn fetch_file(
    State(service): State<ConversionService>,
    Path((id, filename)): Path<(String, String)>,
) -> Result<Response, Office2PdfError> {
    let id = parse_id(&id).ok_or(Office2PdfError::FileNotFound { id: 0 })?;
    let (_, path) = service.open_output(id).await?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| Office2PdfError::FileNotFound { id })?;
    let len = file.metadata().await.map(|m| m.len()).ok();

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", encode_uri_component(&filename)),
        );
    if let Some(len) = len {
        response = response.header(header::CONTENT_LENGTH, len);
    }
    response
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| Office2PdfError::Internal(e.to_string()))
}

/// `POST /api/download/zip` with `{"fileIds": [..]}`.
pub async fn download_zip(
    State(service): State<ConversionService>,
    body: Result<Json<ZipRequest>, JsonRejection>,
) -> Result<Response, Office2PdfError> {
    let Json(request) = body.map_err(|e| Office2PdfError::InvalidInput {
        reason: format!("Malformed request: {}", e.body_text()),
    })?;
    if request.file_ids.is_empty() {
        return Err(Office2PdfError::InvalidInput {
            reason: "No file IDs provided".into(),
        });
    }

    let bytes = service.build_archive(&request.file_ids).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{ARCHIVE_NAME}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// `GET /healthz`
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ── Serving ──────────────────────────────────────────────────────────────

/// Run the server from `config` until Ctrl-C.
pub async fn serve(config: ServerConfig) -> Result<(), Office2PdfError> {
    if config.soffice_path.is_none() && !soffice_locate::is_installed() {
        warn!("{}", soffice_locate::INSTALL_HINT);
    }
    let service = ConversionService::from_config(config);
    let listener = TcpListener::bind(service.config().bind)
        .await
        .map_err(|e| {
            Office2PdfError::Internal(format!("failed to bind {}: {e}", service.config().bind))
        })?;
    serve_on(listener, service, shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
///
/// Creates the working directories and runs the reaper for the lifetime of
/// the server.
pub async fn serve_on(
    listener: TcpListener,
    service: ConversionService,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Office2PdfError> {
    let config = service.config().clone();
    for dir in [&config.upload_dir, &config.output_dir, &config.scratch_dir] {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            Office2PdfError::Internal(format!("failed to create {}: {e}", dir.display()))
        })?;
    }

    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }
    let reaper = sweep::spawn_reaper(config, service.store());
    let result = axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await;
    reaper.abort();
    info!("Server stopped");
    result.map_err(|e| Office2PdfError::Internal(format!("server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
