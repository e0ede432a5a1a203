//! # soffice-locate
//!
//! Find the LibreOffice `soffice` executable so callers can shell out to
//! `soffice --headless --convert-to pdf` without asking users to configure a
//! path by hand.
//!
//! ## How it works
//!
//! On first call to [`locate_soffice`]:
//!
//! 1. `SOFFICE_PATH` wins if it is set and points at an executable file.
//! 2. Otherwise every directory of `PATH` is searched for the platform's
//!    program names (`soffice`, `libreoffice`, `soffice.exe`, …).
//! 3. Otherwise the well-known install locations of the current platform are
//!    probed (app bundles, `/opt/libreoffice*`, snap and flatpak exports,
//!    `Program Files`).
//!
//! The resolved command is cached for the life of the process; later calls
//! never touch the file system.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use soffice_locate::locate_soffice;
//!
//! let soffice = locate_soffice().expect("LibreOffice not installed");
//! println!("converting with {}", soffice.program().display());
//! ```
//!
//! ## Platform support
//!
//! | OS      | Searched names                 | Install locations probed                         |
//! |---------|--------------------------------|--------------------------------------------------|
//! | macOS   | `soffice`                      | `/Applications/LibreOffice.app`, `~/Applications` |
//! | Linux   | `soffice`, `libreoffice`       | `/usr/lib/libreoffice`, `/opt/libreoffice*`, snap, flatpak |
//! | Windows | `soffice.exe`, `soffice.com`   | `Program Files`, `Program Files (x86)`           |
//!
//! ## Environment variable overrides
//!
//! - `SOFFICE_PATH`: path to an existing `soffice` executable; skips the search.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable that pins the executable and bypasses the search.
pub const SOFFICE_PATH_ENV: &str = "SOFFICE_PATH";

/// Remediation text shared by every "not installed" error.
pub const INSTALL_HINT: &str = "LibreOffice not installed. Please install LibreOffice to use the converter.\n\
  • Debian/Ubuntu:  sudo apt install libreoffice-core libreoffice-impress libreoffice-writer\n\
  • macOS:          brew install --cask libreoffice\n\
  • Windows:        https://www.libreoffice.org/download/\n\
Or point SOFFICE_PATH at an existing soffice executable.";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by soffice-locate.
#[derive(Error, Debug)]
pub enum LocateError {
    /// `SOFFICE_PATH` is set but does not name an executable file.
    #[error("SOFFICE_PATH '{path}' is not an executable file")]
    OverrideInvalid { path: PathBuf },

    /// Nothing was found on `PATH` or in any install location.
    #[error("{hint}\n(searched PATH and {} install locations)", .searched.len(), hint = INSTALL_HINT)]
    NotInstalled { searched: Vec<PathBuf> },
}

// ── The located command ──────────────────────────────────────────────────────

/// A runnable LibreOffice command: the executable plus any arguments that must
/// precede the conversion flags (wrappers such as `flatpak run <app-id>` or an
/// interpreter running a launcher script).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SofficeCommand {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

impl SofficeCommand {
    /// A command that runs `program` directly.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Arguments inserted between the program and the conversion flags.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn leading_args(&self) -> &[OsString] {
        &self.leading_args
    }
}

// ── Internal: platform metadata ──────────────────────────────────────────────

fn program_names() -> &'static [&'static str] {
    match std::env::consts::OS {
        "windows" => &["soffice.exe", "soffice.com"],
        "macos" => &["soffice"],
        _ => &["soffice", "libreoffice"],
    }
}

/// Install locations probed after `PATH`, most specific first.
pub fn platform_candidates() -> Vec<PathBuf> {
    let home = dirs::home_dir();
    let mut out = Vec::new();

    match std::env::consts::OS {
        "macos" => {
            out.push(PathBuf::from(
                "/Applications/LibreOffice.app/Contents/MacOS/soffice",
            ));
            if let Some(h) = home {
                out.push(h.join("Applications/LibreOffice.app/Contents/MacOS/soffice"));
            }
        }
        "windows" => {
            for var in ["ProgramFiles", "ProgramFiles(x86)"] {
                if let Some(base) = std::env::var_os(var) {
                    out.push(
                        PathBuf::from(base)
                            .join("LibreOffice")
                            .join("program")
                            .join("soffice.exe"),
                    );
                }
            }
            out.push(PathBuf::from(
                r"C:\Program Files\LibreOffice\program\soffice.exe",
            ));
        }
        _ => {
            out.push(PathBuf::from("/usr/lib/libreoffice/program/soffice"));
            out.push(PathBuf::from("/usr/lib64/libreoffice/program/soffice"));
            out.extend(opt_installs(Path::new("/opt")));
            out.push(PathBuf::from("/snap/bin/libreoffice"));
            out.push(PathBuf::from(
                "/var/lib/flatpak/exports/bin/org.libreoffice.LibreOffice",
            ));
            if let Some(h) = home {
                out.push(h.join(".local/share/flatpak/exports/bin/org.libreoffice.LibreOffice"));
            }
        }
    }

    out
}

/// Vendor tarballs install into `/opt/libreoffice<version>/program/soffice`.
fn opt_installs(opt: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(opt) else {
        return Vec::new();
    };
    let mut found: Vec<(u32, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let version = name.strip_prefix("libreoffice")?;
            let major = version
                .split('.')
                .next()
                .and_then(|m| m.parse().ok())
                .unwrap_or(0);
            Some((major, e.path().join("program").join("soffice")))
        })
        .collect();
    // Newest major version first.
    found.sort_by(|a, b| b.cmp(a));
    found.into_iter().map(|(_, p)| p).collect()
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

// ── Thread-safe singleton ────────────────────────────────────────────────────

static RESOLVED: OnceLock<SofficeCommand> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Search the directories of a `PATH`-style value for any of `names`.
pub fn find_in_path(path_var: &OsStr, names: &[&str]) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .flat_map(|dir| names.iter().map(move |n| dir.join(n)))
        .find(|p| is_executable(p))
}

/// Resolve the executable from explicit inputs, without touching the cache.
///
/// `override_path` plays the role of `SOFFICE_PATH`, `path_var` of `PATH`.
pub fn resolve_from(
    override_path: Option<&OsStr>,
    path_var: Option<&OsStr>,
) -> Result<SofficeCommand, LocateError> {
    // 1. Explicit override.
    if let Some(p) = override_path.filter(|p| !p.is_empty()) {
        let p = PathBuf::from(p);
        if is_executable(&p) {
            return Ok(SofficeCommand::new(p));
        }
        return Err(LocateError::OverrideInvalid { path: p });
    }

    // 2. PATH lookup.
    if let Some(found) = path_var.and_then(|pv| find_in_path(pv, program_names())) {
        return Ok(SofficeCommand::new(found));
    }

    // 3. Platform install locations.
    let candidates = platform_candidates();
    match candidates.iter().find(|p| is_executable(p)) {
        Some(found) => Ok(SofficeCommand::new(found.clone())),
        None => Err(LocateError::NotInstalled {
            searched: candidates,
        }),
    }
}

/// Returns the LibreOffice command, searching on first call and caching the
/// result for the rest of the process.
///
/// Failures are not cached, so installing LibreOffice while a long-running
/// server is up takes effect on the next call.
pub fn locate_soffice() -> Result<SofficeCommand, LocateError> {
    if let Some(cmd) = RESOLVED.get() {
        return Ok(cmd.clone());
    }

    let override_path = std::env::var_os(SOFFICE_PATH_ENV);
    let path_var = std::env::var_os("PATH");
    let cmd = resolve_from(override_path.as_deref(), path_var.as_deref())?;

    // Both racers resolve the same command; whichever lands first wins.
    let _ = RESOLVED.set(cmd.clone());
    Ok(cmd)
}

/// Returns `true` when [`locate_soffice`] would succeed.
pub fn is_installed() -> bool {
    locate_soffice().is_ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
