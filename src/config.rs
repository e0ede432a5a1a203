//! Configuration for the conversion server and the batch client.
//!
//! Both sides are configured through a plain struct with documented defaults
//! and a builder whose setters clamp obviously bad values; `build()` rejects
//! what clamping cannot fix.

use crate::error::Office2PdfError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// 100 MB, the per-file ceiling on both the server and the client.
pub const MAX_FILE_BYTES: u64 = 100 * 1024 * 1024;

/// Maximum number of files accepted into one client batch.
pub const MAX_FILES_PER_BATCH: usize = 10;

/// Extensions accepted for conversion (lowercase, without the dot).
pub const ACCEPTED_EXTENSIONS: &[&str] = &["ppt", "pptx", "doc", "docx"];

/// MIME types accepted for conversion.
pub const ACCEPTED_MIME_TYPES: &[&str] = &[
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

// ── Server ───────────────────────────────────────────────────────────────

/// Configuration for `office2pdf serve`.
///
/// # Example
/// ```rust
/// use office2pdf::ServerConfig;
///
/// let config = ServerConfig::builder()
///     .upload_dir("/var/lib/office2pdf/uploads")
///     .conversion_timeout_secs(120)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address. Default: `127.0.0.1:5000`.
    pub bind: SocketAddr,

    /// Where uploaded documents are persisted. Default: `./uploads`.
    pub upload_dir: PathBuf,

    /// Where finished PDFs live, named `<job id>_<stem>.pdf`. Default: `./converted`.
    pub output_dir: PathBuf,

    /// Parent of the per-conversion scratch directories. Default: `./temp`.
    pub scratch_dir: PathBuf,

    /// Explicit LibreOffice executable. `None` searches via `soffice-locate`.
    pub soffice_path: Option<PathBuf>,

    /// Hard limit on one external tool invocation. Default: 60 s.
    pub conversion_timeout_secs: u64,

    /// Largest accepted upload in bytes. Default: 100 MB.
    pub max_upload_bytes: u64,

    /// Age after which uploads, outputs and terminal job records are reaped. Default: 24 h.
    pub retention_secs: u64,

    /// How often the reaper runs. Default: 1 h.
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("converted"),
            scratch_dir: PathBuf::from("temp"),
            soffice_path: None,
            conversion_timeout_secs: 60,
            max_upload_bytes: MAX_FILE_BYTES,
            retention_secs: 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn conversion_timeout(&self) -> Duration {
        Duration::from_secs(self.conversion_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.bind = addr;
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = Some(path.into());
        self
    }

    pub fn conversion_timeout_secs(mut self, secs: u64) -> Self {
        self.config.conversion_timeout_secs = secs.max(1);
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn retention_secs(mut self, secs: u64) -> Self {
        self.config.retention_secs = secs;
        self
    }

    pub fn sweep_interval_secs(mut self, secs: u64) -> Self {
        self.config.sweep_interval_secs = secs.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServerConfig, Office2PdfError> {
        let c = &self.config;
        if c.max_upload_bytes == 0 {
            return Err(Office2PdfError::InvalidConfig(
                "max upload size must be > 0".into(),
            ));
        }
        // The reaper must never catch a file that a running conversion is writing.
        if c.retention_secs <= c.conversion_timeout_secs {
            return Err(Office2PdfError::InvalidConfig(format!(
                "retention ({}s) must exceed the conversion timeout ({}s)",
                c.retention_secs, c.conversion_timeout_secs
            )));
        }
        if c.upload_dir == c.output_dir {
            return Err(Office2PdfError::InvalidConfig(
                "upload and output directories must differ".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Client ───────────────────────────────────────────────────────────────

/// Configuration for the batch client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server base URL. Default: `http://127.0.0.1:5000`.
    pub server_url: String,

    /// Files accepted per `add_files` call. Default: 10.
    pub max_files: usize,

    /// Largest file the client will send. Default: 100 MB.
    pub max_file_bytes: u64,

    /// Per-file request timeout covering upload, conversion and response. Default: 30 s.
    pub request_timeout_secs: u64,

    /// Pause between consecutive submissions. Default: 500 ms.
    pub pacing_ms: u64,

    /// Files in flight at once. Default: 1 (strictly sequential).
    ///
    /// The server isolates every conversion (own scratch directory, id-prefixed
    /// output name), so raising this is safe. It trades server load for latency.
    pub concurrency: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".into(),
            max_files: MAX_FILES_PER_BATCH,
            max_file_bytes: MAX_FILE_BYTES,
            request_timeout_secs: 30,
            pacing_ms: 500,
            concurrency: 1,
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn max_files(mut self, n: usize) -> Self {
        self.config.max_files = n.max(1);
        self
    }

    pub fn max_file_bytes(mut self, bytes: u64) -> Self {
        self.config.max_file_bytes = bytes;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn pacing_ms(mut self, ms: u64) -> Self {
        self.config.pacing_ms = ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, Office2PdfError> {
        let c = &self.config;
        if !(c.server_url.starts_with("http://") || c.server_url.starts_with("https://")) {
            return Err(Office2PdfError::InvalidConfig(format!(
                "server URL must start with http:// or https://, got '{}'",
                c.server_url
            )));
        }
        if c.max_file_bytes == 0 {
            return Err(Office2PdfError::InvalidConfig(
                "max file size must be > 0".into(),
            ));
        }
        Ok(self.config)
    }
}
