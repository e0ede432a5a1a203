//! The document-to-PDF adapter.
//!
//! [`DocumentConverter`] is the seam between the orchestrator and the
//! external tool. [`LibreOfficeConverter`] drives a headless `soffice`
//! process; tests substitute shell-script fakes or in-process converters.
//!
//! Every invocation runs in its own scratch directory with its own
//! LibreOffice user profile, so concurrent conversions never share state.

use crate::error::ConversionError;
use async_trait::async_trait;
use soffice_locate::{locate_soffice, SofficeCommand, INSTALL_HINT};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Converts one document on disk into a PDF at a destination path.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Produce `output` from `input`.
    ///
    /// On error no file is left at `output`.
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError>;
}

/// Headless LibreOffice behind a timeout.
#[derive(Debug, Clone)]
pub struct LibreOfficeConverter {
    /// `None` defers the executable search to the first conversion.
    command: Option<SofficeCommand>,
    timeout: Duration,
    scratch_root: PathBuf,
}

impl LibreOfficeConverter {
    /// Use an explicit command.
    pub fn new(command: SofficeCommand, scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            command: Some(command),
            timeout: Duration::from_secs(60),
            scratch_root: scratch_root.into(),
        }
    }

    /// Locate `soffice` lazily via `SOFFICE_PATH`, `PATH` and the platform
    /// install directories.
    ///
    /// A missing installation is reported per conversion rather than at
    /// construction, so a server can start before LibreOffice is installed.
    pub fn auto(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            command: None,
            timeout: Duration::from_secs(60),
            scratch_root: scratch_root.into(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn resolve_command(&self) -> Result<SofficeCommand, ConversionError> {
        match &self.command {
            Some(cmd) => Ok(cmd.clone()),
            None => locate_soffice().map_err(|e| ConversionError::ToolNotInstalled {
                hint: e.to_string(),
            }),
        }
    }

    async fn run(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        // ── Step 1: Check input ──────────────────────────────────────────
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Err(ConversionError::InputNotFound {
                path: input.to_path_buf(),
            });
        }
        let command = self.resolve_command()?;

        // ── Step 2: Prepare directories ──────────────────────────────────
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ConversionError::io("Failed to create output directory", e))?;
        }
        tokio::fs::create_dir_all(&self.scratch_root)
            .await
            .map_err(|e| ConversionError::io("Failed to create scratch directory", e))?;
        let scratch_root = std::path::absolute(&self.scratch_root)
            .map_err(|e| ConversionError::io("Failed to resolve scratch directory", e))?;

        // Removed on drop, including on every early return below.
        let scratch = tempfile::Builder::new()
            .prefix("convert-")
            .tempdir_in(&scratch_root)
            .map_err(|e| ConversionError::io("Failed to create scratch directory", e))?;

        let file_name = input
            .file_name()
            .ok_or_else(|| ConversionError::InputNotFound {
                path: input.to_path_buf(),
            })?;
        let scratch_input = scratch.path().join(file_name);
        tokio::fs::copy(input, &scratch_input)
            .await
            .map_err(|e| ConversionError::io("Failed to copy input into scratch directory", e))?;

        // ── Step 3: Run the tool ─────────────────────────────────────────
        let profile = scratch.path().join("profile");
        let mut cmd = tokio::process::Command::new(command.program());
        cmd.args(command.leading_args())
            .arg(format!("-env:UserInstallation={}", file_url(&profile)))
            .args(["--headless", "--convert-to", "pdf", "--outdir"])
            .arg(scratch.path())
            .arg(&scratch_input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running {:?}", cmd.as_std());
        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConversionError::ToolNotInstalled {
                hint: INSTALL_HINT.to_string(),
            },
            _ => ConversionError::io("Failed to start LibreOffice", e),
        })?;

        // Dropping the future on timeout drops the child, which kills it.
        let out = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => {
                result.map_err(|e| ConversionError::io("Failed to wait for LibreOffice", e))?
            }
            Err(_) => {
                warn!(
                    "LibreOffice timed out after {}s on {}",
                    self.timeout.as_secs(),
                    input.display()
                );
                return Err(ConversionError::Timeout {
                    secs: self.timeout.as_secs(),
                });
            }
        };
        if !out.status.success() {
            return Err(ConversionError::ToolFailed {
                status: out.status.to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }

        // ── Step 4: Collect the artifact ─────────────────────────────────
        let stem = scratch_input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let produced = scratch.path().join(format!("{stem}.pdf"));
        if !tokio::fs::try_exists(&produced).await.unwrap_or(false) {
            return Err(ConversionError::OutputNotProduced { expected: produced });
        }

        move_file(&produced, output).await?;
        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(ConversionError::OutputMoveFailed {
                path: output.to_path_buf(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentConverter for LibreOfficeConverter {
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        info!("Converting {} -> {}", input.display(), output.display());
        let result = self.run(input, output).await;
        if let Err(ref e) = result {
            warn!("Conversion of {} failed: {}", input.display(), e);
            if tokio::fs::try_exists(output).await.unwrap_or(false) {
                let _ = tokio::fs::remove_file(output).await;
            }
        }
        result
    }
}

/// Rename, falling back to copy + remove across filesystems.
async fn move_file(from: &Path, to: &Path) -> Result<(), ConversionError> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|_| ConversionError::OutputMoveFailed {
            path: to.to_path_buf(),
        })?;
    let _ = tokio::fs::remove_file(from).await;
    Ok(())
}

/// `file://` URL for an absolute path, as LibreOffice expects for `-env:`.
fn file_url(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    if s.starts_with('/') {
        format!("file://{s}")
    } else {
        format!("file:///{s}")
    }
}
