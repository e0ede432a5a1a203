//! Periodic reaping of stale uploads, outputs and job records.
//!
//! Only files whose modification time is older than the retention window are
//! touched. Retention always exceeds the conversion timeout (enforced by
//! [`crate::ServerConfig`]), so a file that a running conversion is reading or
//! writing is never removed.

use crate::config::ServerConfig;
use crate::store::JobStore;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReadDirStream;
use tracing::{debug, info, warn};

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub files_removed: usize,
    pub records_evicted: usize,
}

/// Delete regular files directly inside `dir` older than `max_age`.
///
/// A missing directory counts as empty. Per-entry failures are logged and
/// skipped.
pub async fn sweep_dir(dir: &Path, max_age: Duration) -> std::io::Result<usize> {
    let read_dir = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0;
    let mut entries = ReadDirStream::new(read_dir);
    while let Some(entry) = entries.next().await {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Failed to read entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        let meta = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                warn!("Failed to stat {}: {}", path.display(), e);
                continue;
            }
        };
        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age <= max_age {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed stale file {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

/// Drop terminal job records last updated before `now - max_age`.
pub fn evict_records(store: &dyn JobStore, max_age: Duration, now: DateTime<Utc>) -> usize {
    let Ok(max_age) = chrono::Duration::from_std(max_age) else {
        return 0;
    };
    let cutoff = now - max_age;
    store
        .list()
        .into_iter()
        .filter(|job| job.status.is_terminal() && job.updated_at < cutoff)
        .filter(|job| store.delete(job.id))
        .count()
}

/// One full pass over both directories and the store.
pub async fn sweep_once(config: &ServerConfig, store: &dyn JobStore) -> SweepReport {
    let mut report = SweepReport::default();
    for dir in [&config.upload_dir, &config.output_dir] {
        match sweep_dir(dir, config.retention()).await {
            Ok(n) => report.files_removed += n,
            Err(e) => warn!("Cleanup of {} failed: {}", dir.display(), e),
        }
    }
    report.records_evicted = evict_records(store, config.retention(), Utc::now());

    if report.files_removed > 0 || report.records_evicted > 0 {
        info!(
            "Cleanup removed {} file(s) and {} job record(s)",
            report.files_removed, report.records_evicted
        );
    }
    report
}

/// Run [`sweep_once`] every `config.sweep_interval()`, starting one interval
/// from now. Abort the handle to stop it.
pub fn spawn_reaper(config: ServerConfig, store: Arc<dyn JobStore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = config.sweep_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweep_once(&config, store.as_ref()).await;
        }
    })
}
