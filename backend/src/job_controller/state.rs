//! Manages the state of bulk ingestion jobs.
//!
//! The main components are:
//! - `JobsState`: a clonable, thread-safe registry of every `IngestionJob`, keyed by
//!   upload id. It is the single source of truth for progress and is injected into the
//!   Actix application state.
//! - `JobUpdate`: a message sent by a background worker describing one mutation of
//!   one job (row count known, one row recorded, job finished).
//! - `start_job_updater`: a long-running task that drains `JobUpdate`s from an MPSC
//!   channel and applies each one under a single write lock, so a polling reader
//!   always sees `processed_rows == successful_rows + failed_rows`.
//!
//! The upload intake inserts new jobs directly with `JobsState::create`; after that
//! only the worker owning the job (through the channel) and the reaper mutate it.
//! The reaper never races a running worker on the counters: it raises the job's
//! cancel flag and the worker finalizes the job itself after its last recorded row.

use chrono::{DateTime, Utc};
use common::jobs::{IngestionProgress, IngestionStatus};
use common::model::row_error::RowError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::{collections::HashMap, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobStoreError {
    #[error("job `{0}` not found")]
    NotFound(String),
    #[error("job `{0}` already exists")]
    Duplicate(String),
    #[error("job `{id}` cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: IngestionStatus,
        to: IngestionStatus,
    },
    #[error("job `{id}` is {status}; row outcomes are only accepted while processing")]
    NotProcessing { id: String, status: IngestionStatus },
    #[error("job `{id}` already recorded all {total} rows")]
    RowOverflow { id: String, total: u32 },
    #[error("job `{id}` cannot complete after {processed} of {total} rows")]
    Incomplete { id: String, processed: u32, total: u32 },
}

/// Details of the uploaded file captured by the intake.
#[derive(Clone, Debug, Default)]
pub struct UploadMeta {
    pub file_name: String,
    pub file_bytes: usize,
    pub file_md5: String,
    pub owner_id: String,
}

/// Raw cells of a failed row, kept so the error report can mirror the source file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedRow {
    pub row_number: u32,
    pub values: Vec<String>,
}

/// Outcome of one data row as reported by the batch processor.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedRow {
    Succeeded {
        row_number: u32,
    },
    Failed {
        row_number: u32,
        errors: Vec<RowError>,
        values: Vec<String>,
    },
}

#[derive(Clone, Debug)]
pub struct IngestionJob {
    pub id: String,
    pub status: IngestionStatus,
    pub total_rows: u32,
    pub processed_rows: u32,
    pub successful_rows: u32,
    pub failed_rows: u32,
    /// Append-only while the job runs, in row order.
    pub row_errors: Vec<RowError>,
    pub failed_row_values: Vec<FailedRow>,
    /// Header of the source file as uploaded, empty until processing starts.
    pub header: Vec<String>,
    pub error: Option<String>,
    pub meta: UploadMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set on entry to `processing`; the watchdog times running jobs from here.
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    cancelled: Arc<AtomicBool>,
}

impl IngestionJob {
    pub fn new(id: impl Into<String>, meta: UploadMeta) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: IngestionStatus::Pending,
            total_rows: 0,
            processed_rows: 0,
            successful_rows: 0,
            failed_rows: 0,
            row_errors: Vec::new(),
            failed_row_values: Vec::new(),
            header: Vec::new(),
            error: None,
            meta,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn has_error_report(&self) -> bool {
        self.failed_rows > 0 && self.status != IngestionStatus::Pending
    }

    pub fn progress(&self) -> IngestionProgress {
        IngestionProgress {
            upload_id: self.id.clone(),
            status: self.status,
            total_rows: self.total_rows,
            processed_rows: self.processed_rows,
            successful_rows: self.successful_rows,
            failed_rows: self.failed_rows,
            has_error_report: self.has_error_report(),
            error: self.error.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }

    fn transition(&mut self, next: IngestionStatus) -> Result<(), JobStoreError> {
        if !self.status.can_transition_to(next) {
            return Err(JobStoreError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    pub(crate) fn start(&mut self, total_rows: u32, header: Vec<String>) -> Result<(), JobStoreError> {
        self.transition(IngestionStatus::Processing)?;
        self.started_at = Some(self.updated_at);
        self.total_rows = total_rows;
        self.header = header;
        Ok(())
    }

    pub(crate) fn record_row(&mut self, row: RecordedRow) -> Result<(), JobStoreError> {
        if self.status != IngestionStatus::Processing {
            return Err(JobStoreError::NotProcessing {
                id: self.id.clone(),
                status: self.status,
            });
        }
        if self.processed_rows >= self.total_rows {
            return Err(JobStoreError::RowOverflow {
                id: self.id.clone(),
                total: self.total_rows,
            });
        }

        match row {
            RecordedRow::Succeeded { .. } => self.successful_rows += 1,
            RecordedRow::Failed {
                row_number,
                errors,
                values,
            } => {
                self.failed_rows += 1;
                self.row_errors.extend(errors);
                self.failed_row_values.push(FailedRow { row_number, values });
            }
        }
        self.processed_rows += 1;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub(crate) fn finalize(
        &mut self,
        status: IngestionStatus,
        reason: Option<String>,
    ) -> Result<(), JobStoreError> {
        if status == IngestionStatus::Completed
            && self.status == IngestionStatus::Processing
            && self.processed_rows != self.total_rows
        {
            return Err(JobStoreError::Incomplete {
                id: self.id.clone(),
                processed: self.processed_rows,
                total: self.total_rows,
            });
        }
        self.transition(status)?;
        if status == IngestionStatus::Failed {
            let reason = reason.unwrap_or_else(|| "ingestion failed".to_string());
            self.row_errors.push(RowError::structural(reason.clone()));
            self.error = Some(reason);
        }
        Ok(())
    }
}

/// A mutation of a single job, sent by the worker that owns it.
#[derive(Debug)]
pub struct JobUpdate {
    pub(crate) job_id: String,
    pub(crate) kind: JobUpdateKind,
}

#[derive(Debug)]
pub enum JobUpdateKind {
    /// The file parsed; row iteration is about to begin.
    TotalRows { total_rows: u32, header: Vec<String> },
    Row(RecordedRow),
    Finalize {
        status: IngestionStatus,
        reason: Option<String>,
    },
}

impl JobUpdate {
    pub fn new(job_id: impl Into<String>, kind: JobUpdateKind) -> Self {
        Self {
            job_id: job_id.into(),
            kind,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

/// Thread-safe registry of every ingestion job.
#[derive(Clone)]
pub struct JobsState {
    /// Upload id to job. Concurrent reads from pollers, exclusive writes per update.
    jobs: Arc<RwLock<HashMap<String, IngestionJob>>>,

    /// Workers push `JobUpdate`s here instead of writing to `jobs` directly.
    tx: mpsc::Sender<JobUpdate>,
}

/// Jobs touched by one watchdog pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StaleJobs {
    /// Failed outright: they had not started, or their worker ignored cancellation.
    pub failed: Vec<String>,
    /// Still processing; their worker stops before the next insert and fails them.
    pub cancelled: Vec<String>,
}

impl JobsState {
    pub fn new(channel_capacity: usize) -> (Self, mpsc::Receiver<JobUpdate>) {
        let (tx, rx) = mpsc::channel(channel_capacity);
        let state = Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            tx,
        };
        (state, rx)
    }

    pub async fn create(&self, id: &str, meta: UploadMeta) -> Result<IngestionProgress, JobStoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(id) {
            return Err(JobStoreError::Duplicate(id.to_string()));
        }
        let job = IngestionJob::new(id, meta);
        let progress = job.progress();
        jobs.insert(id.to_string(), job);
        Ok(progress)
    }

    pub(crate) fn sender(&self) -> mpsc::Sender<JobUpdate> {
        self.tx.clone()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Shared cancel flag of a job, raised by the watchdog.
    pub(crate) async fn cancel_flag(&self, id: &str) -> Option<Arc<AtomicBool>> {
        self.jobs.read().await.get(id).map(|job| job.cancelled.clone())
    }

    pub async fn get(&self, id: &str) -> Option<IngestionJob> {
        self.jobs.read().await.get(id).cloned()
    }

    pub async fn progress(&self, id: &str) -> Option<IngestionProgress> {
        self.jobs.read().await.get(id).map(IngestionJob::progress)
    }

    /// Runs `f` against the job under the read lock without cloning it.
    pub async fn inspect<R>(&self, id: &str, f: impl FnOnce(&IngestionJob) -> R) -> Option<R> {
        self.jobs.read().await.get(id).map(f)
    }

    pub async fn set_total_rows(
        &self,
        id: &str,
        total_rows: u32,
        header: Vec<String>,
    ) -> Result<(), JobStoreError> {
        self.mutate(id, |job| job.start(total_rows, header)).await
    }

    pub async fn record_row_outcome(&self, id: &str, row: RecordedRow) -> Result<(), JobStoreError> {
        self.mutate(id, |job| job.record_row(row)).await
    }

    pub async fn finalize(
        &self,
        id: &str,
        status: IngestionStatus,
        reason: Option<String>,
    ) -> Result<(), JobStoreError> {
        self.mutate(id, |job| job.finalize(status, reason)).await
    }

    pub async fn apply(&self, update: JobUpdate) -> Result<(), JobStoreError> {
        let JobUpdate { job_id, kind } = update;
        match kind {
            JobUpdateKind::TotalRows { total_rows, header } => {
                self.set_total_rows(&job_id, total_rows, header).await
            }
            JobUpdateKind::Row(row) => self.record_row_outcome(&job_id, row).await,
            JobUpdateKind::Finalize { status, reason } => self.finalize(&job_id, status, reason).await,
        }
    }

    /// Applies the processing timeout.
    ///
    /// A pending job waiting longer than `timeout` since upload is failed and
    /// cancelled, so a worker picking it up later skips it. A processing job running
    /// longer than `timeout` since it started is only cancelled; its worker records
    /// what it already persisted and fails the job. If it is still processing after
    /// twice the timeout the job is failed here.
    pub async fn fail_stale(&self, now: DateTime<Utc>, timeout: Duration) -> StaleJobs {
        let mut jobs = self.jobs.write().await;
        let mut stale = StaleJobs::default();
        let reason = format!("processing timed out after {}s", timeout.as_secs());
        for job in jobs.values_mut() {
            let overdue = match (job.status, job.started_at) {
                (IngestionStatus::Pending, _) => age(job.created_at, now) >= timeout,
                (IngestionStatus::Processing, Some(started)) => {
                    let running = age(started, now);
                    if running >= timeout.saturating_mul(2) {
                        true
                    } else {
                        if running >= timeout && !job.is_cancelled() {
                            job.cancel();
                            stale.cancelled.push(job.id.clone());
                        }
                        false
                    }
                }
                _ => false,
            };
            if !overdue {
                continue;
            }
            job.cancel();
            if job.finalize(IngestionStatus::Failed, Some(reason.clone())).is_ok() {
                stale.failed.push(job.id.clone());
            }
        }
        stale
    }

    /// Drops terminal jobs that finished more than `retention` ago.
    pub async fn purge_expired(&self, now: DateTime<Utc>, retention: Duration) -> Vec<String> {
        let mut jobs = self.jobs.write().await;
        let expired: Vec<String> = jobs
            .values()
            .filter(|job| {
                job.completed_at
                    .is_some_and(|done| age(done, now) >= retention)
            })
            .map(|job| job.id.clone())
            .collect();
        for id in &expired {
            jobs.remove(id);
        }
        expired
    }

    async fn mutate(
        &self,
        id: &str,
        f: impl FnOnce(&mut IngestionJob) -> Result<(), JobStoreError>,
    ) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobStoreError::NotFound(id.to_string()))?;
        f(job)
    }
}

fn age(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or_default()
}

/// Starts the central job state updater task.
///
/// Spawned once at startup; applies every `JobUpdate` in arrival order. Updates the
/// store refuses (for instance rows arriving after the reaper timed the job out) are
/// logged and dropped.
pub async fn start_job_updater(state: JobsState, mut rx: mpsc::Receiver<JobUpdate>) {
    while let Some(update) = rx.recv().await {
        let job_id = update.job_id.clone();
        if let Err(e) = state.apply(update).await {
            log::warn!("dropped update for job {}: {}", job_id, e);
        }
    }
}
