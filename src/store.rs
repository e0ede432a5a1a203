//! The conversion job store.
//!
//! [`JobStore`] is the only authority on job state. The server holds it as
//! `Arc<dyn JobStore>` so the in-memory [`MemoryJobStore`] can be replaced by
//! a database-backed one without touching the orchestrator.

use crate::error::StoreError;
use crate::job::{ConversionJob, JobUpdate, NewJob};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// CRUD over conversion jobs keyed by a monotonically increasing id.
///
/// Implementations must issue ids atomically: two concurrent `create` calls
/// never receive the same id, and ids are never reused after `delete`.
pub trait JobStore: Send + Sync {
    /// Insert a new `queued` job and return it.
    fn create(&self, input: NewJob) -> ConversionJob;

    fn get(&self, id: u64) -> Option<ConversionJob>;

    /// Apply `update` atomically and return the updated record.
    fn update(&self, id: u64, update: JobUpdate) -> Result<ConversionJob, StoreError>;

    /// All jobs in creation order.
    fn list(&self) -> Vec<ConversionJob>;

    /// Remove a job; `false` when it did not exist.
    fn delete(&self, id: u64) -> bool;
}

#[derive(Debug)]
struct Inner {
    next_id: u64,
    jobs: BTreeMap<u64, ConversionJob>,
}

/// In-process job store behind a single mutex.
///
/// Ids start at 1. A `BTreeMap` keyed by id gives creation order for free.
#[derive(Debug)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                jobs: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave a half-applied update:
        // `ConversionJob::apply` validates before it mutates.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl JobStore for MemoryJobStore {
    fn create(&self, input: NewJob) -> ConversionJob {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let job = ConversionJob::new(id, input, Utc::now());
        inner.jobs.insert(id, job.clone());
        debug!("Created conversion job {} for '{}'", id, job.original_file_name);
        job
    }

    fn get(&self, id: u64) -> Option<ConversionJob> {
        self.lock().jobs.get(&id).cloned()
    }

    fn update(&self, id: u64, update: JobUpdate) -> Result<ConversionJob, StoreError> {
        let mut inner = self.lock();
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::NotFound { id })?;
        job.apply(update, Utc::now())?;
        Ok(job.clone())
    }

    fn list(&self) -> Vec<ConversionJob> {
        self.lock().jobs.values().cloned().collect()
    }

    fn delete(&self, id: u64) -> bool {
        self.lock().jobs.remove(&id).is_some()
    }
}
