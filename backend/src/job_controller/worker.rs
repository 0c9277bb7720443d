//! Bounded worker pool for ingestion jobs.
//!
//! `schedule_ingestion_job` registers the job and returns its id straight away.
//! The job itself waits for a pool permit on a detached task and then runs the
//! batch processor on tokio's blocking pool, so parsing, validation and SQLite
//! writes never stall the HTTP runtime. The final status goes through the same
//! update channel as every row outcome, after the last row.

use crate::config::IngestConfig;
use crate::ingestion::processor::{process_upload_blocking, ProcessLimits, ProcessRequest};
use crate::job_controller::state::{JobStoreError, JobUpdate, JobUpdateKind, JobsState, UploadMeta};
use crate::persistence::PropertyStore;
use common::jobs::IngestionStatus;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use uuid::Uuid;

#[derive(Clone)]
pub struct IngestWorkers {
    permits: Arc<Semaphore>,
    store: Arc<dyn PropertyStore>,
    limits: ProcessLimits,
}

impl IngestWorkers {
    pub fn new(config: &IngestConfig, store: Arc<dyn PropertyStore>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            store,
            limits: ProcessLimits {
                max_rows: config.max_rows,
                chunk_size: config.chunk_size,
            },
        }
    }

    /// Jobs that could start right now without queueing.
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Creates a pending job for `bytes` and detaches its processing. Returns the upload id.
pub async fn schedule_ingestion_job(
    jobs: &JobsState,
    workers: &IngestWorkers,
    meta: UploadMeta,
    bytes: Vec<u8>,
) -> Result<String, JobStoreError> {
    let job_id = Uuid::new_v4().to_string();
    let owner_id = meta.owner_id.clone();
    jobs.create(&job_id, meta).await?;
    let cancelled = jobs
        .cancel_flag(&job_id)
        .await
        .ok_or_else(|| JobStoreError::NotFound(job_id.clone()))?;
    if workers.idle_workers() == 0 {
        log::info!("job {} queued: all ingestion workers are busy", job_id);
    }

    let jobs = jobs.clone();
    let tx = jobs.sender();
    let permits = workers.permits.clone();
    let store = workers.store.clone();
    let limits = workers.limits;
    let id = job_id.clone();

    tokio::spawn(async move {
        let permit = match permits.acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                log::error!("worker pool closed before job {} could start: {}", id, e);
                let finalize = JobUpdateKind::Finalize {
                    status: IngestionStatus::Failed,
                    reason: Some("worker pool unavailable".to_string()),
                };
                let _ = tx.send(JobUpdate::new(id.as_str(), finalize)).await;
                return;
            }
        };
        if cancelled.load(Ordering::SeqCst) {
            log::info!("job {} timed out while queued; skipping", id);
            return;
        }

        let started = Instant::now();
        let worker_tx = tx.clone();
        let worker_id = id.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            process_upload_blocking(
                &worker_tx,
                ProcessRequest {
                    job_id: &worker_id,
                    owner_id: &owner_id,
                    bytes: &bytes,
                    store: store.as_ref(),
                    limits,
                    cancelled: &cancelled,
                },
            )
        })
        .await;
        drop(permit);

        let finalize = match outcome {
            Ok(Ok(summary)) => {
                log::info!(
                    "job {} completed: {} rows, {} ok, {} failed in {:?}",
                    id,
                    summary.total_rows,
                    summary.successful_rows,
                    summary.failed_rows,
                    started.elapsed()
                );
                JobUpdateKind::Finalize {
                    status: IngestionStatus::Completed,
                    reason: None,
                }
            }
            Ok(Err(e)) => {
                if e.is_structural() {
                    log::warn!("job {} rejected after {:?}: {}", id, started.elapsed(), e);
                } else {
                    log::error!("job {} failed after {:?}: {}", id, started.elapsed(), e);
                }
                JobUpdateKind::Finalize {
                    status: IngestionStatus::Failed,
                    reason: Some(e.to_string()),
                }
            }
            Err(e) => {
                log::error!("worker for job {} panicked: {}", id, e);
                JobUpdateKind::Finalize {
                    status: IngestionStatus::Failed,
                    reason: Some("worker panicked".to_string()),
                }
            }
        };

        // The watchdog may already have failed a job that never started processing.
        if jobs
            .inspect(&id, |job| job.status.is_terminal())
            .await
            .unwrap_or(true)
        {
            return;
        }
        if tx.send(JobUpdate::new(id.as_str(), finalize)).await.is_err() {
            log::error!("job {} finished but the updater is gone", id);
        }
    });

    Ok(job_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_controller::state::start_job_updater;
    use crate::persistence::{PersistError, PropertyId, SqlitePropertyStore};
    use chrono::Utc;
    use common::jobs::IngestionProgress;
    use common::model::property::PropertyRecord;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    const HEADER: &str = "title,property_type,listing_type,price,address,city,state,bedrooms,bathrooms,area\n";

    fn listings(street: &str, count: usize) -> Vec<u8> {
        let mut body = HEADER.to_string();
        for n in 1..=count {
            body.push_str(&format!("Unit {n},condo,rent,900,{n} {street},Fargo,ND,1,1,500\n"));
        }
        body.into_bytes()
    }

    fn config(max_concurrent_jobs: usize) -> IngestConfig {
        IngestConfig {
            max_file_bytes: 1024 * 1024,
            max_rows: 100,
            max_concurrent_jobs,
            chunk_size: 10,
            update_channel_capacity: 64,
        }
    }

    async fn wait_for_terminal(jobs: &JobsState, id: &str) -> IngestionProgress {
        for _ in 0..200 {
            if let Some(progress) = jobs.progress(id).await {
                if progress.status.is_terminal() {
                    return progress;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never finished", id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn scheduled_jobs_run_to_completion() {
        let (jobs, rx) = JobsState::new(64);
        tokio::spawn(start_job_updater(jobs.clone(), rx));
        let store = Arc::new(SqlitePropertyStore::open_in_memory().unwrap());
        let workers = IngestWorkers::new(&config(1), store.clone());

        let good = b"title,property_type,listing_type,price,address,city,state,bedrooms,bathrooms,area\n\
Loft,apartment,rent,1200,1 Elm St,Boise,ID,1,1,600\n"
            .to_vec();
        let first = schedule_ingestion_job(&jobs, &workers, UploadMeta::default(), good)
            .await
            .unwrap();
        let second = schedule_ingestion_job(&jobs, &workers, UploadMeta::default(), b"\x00\x00".to_vec())
            .await
            .unwrap();
        assert_ne!(first, second);

        let done = wait_for_terminal(&jobs, &first).await;
        assert_eq!(done.status, IngestionStatus::Completed);
        assert_eq!(done.successful_rows, 1);
        assert_eq!(store.count().unwrap(), 1);

        let failed = wait_for_terminal(&jobs, &second).await;
        assert_eq!(failed.status, IngestionStatus::Failed);
        assert_eq!(failed.total_rows, 0);
        assert!(failed.error.unwrap().contains("binary"));
        assert_eq!(workers.idle_workers(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn job_timed_out_in_the_queue_is_never_persisted() {
        let (jobs, rx) = JobsState::new(64);
        tokio::spawn(start_job_updater(jobs.clone(), rx));
        let store = Arc::new(SqlitePropertyStore::open_in_memory().unwrap());
        let workers = IngestWorkers::new(&config(1), store.clone());

        let busy = workers.permits.clone().acquire_owned().await.unwrap();
        let queued = schedule_ingestion_job(&jobs, &workers, UploadMeta::default(), listings("Pine Rd", 2))
            .await
            .unwrap();
        // Let the queued job start waiting for the permit.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stale = jobs.fail_stale(Utc::now(), Duration::ZERO).await;
        assert_eq!(stale.failed, vec![queued.clone()]);
        drop(busy);

        // Permits are handed out in order, so once this job is done the queued one has had its turn.
        let next = schedule_ingestion_job(&jobs, &workers, UploadMeta::default(), listings("Ash Ct", 1))
            .await
            .unwrap();
        assert_eq!(wait_for_terminal(&jobs, &next).await.status, IngestionStatus::Completed);

        let skipped = jobs.get(&queued).await.unwrap();
        assert_eq!(skipped.status, IngestionStatus::Failed);
        assert_eq!(skipped.processed_rows, 0);
        assert!(skipped.error.unwrap().contains("timed out"));
        assert_eq!(store.count().unwrap(), 1);
    }

    /// Delegates to SQLite and, after the first insert, runs a watchdog pass
    /// as if the job had been running for 90s against a 60s timeout.
    struct SlowStore {
        inner: SqlitePropertyStore,
        jobs: JobsState,
        job_id: Mutex<Option<String>>,
        runtime: tokio::runtime::Handle,
        inserts: AtomicUsize,
    }

    impl PropertyStore for SlowStore {
        fn insert(&self, record: &PropertyRecord, owner_id: &str) -> Result<PropertyId, PersistError> {
            let id = self.inner.insert(record, owner_id)?;
            if self.inserts.fetch_add(1, Ordering::SeqCst) == 0 {
                let job_id = self.job_id.lock().unwrap().clone().unwrap();
                self.runtime.block_on(async {
                    while self.jobs.get(&job_id).await.unwrap().status != IngestionStatus::Processing {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                    let stale = self
                        .jobs
                        .fail_stale(Utc::now() + chrono::Duration::seconds(90), Duration::from_secs(60))
                        .await;
                    assert_eq!(stale.cancelled, vec![job_id.clone()]);
                });
            }
            Ok(id)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn running_job_past_timeout_stops_with_its_rows_recorded() {
        let (jobs, rx) = JobsState::new(64);
        tokio::spawn(start_job_updater(jobs.clone(), rx));
        let store = Arc::new(SlowStore {
            inner: SqlitePropertyStore::open_in_memory().unwrap(),
            jobs: jobs.clone(),
            job_id: Mutex::new(None),
            runtime: tokio::runtime::Handle::current(),
            inserts: AtomicUsize::new(0),
        });
        let workers = IngestWorkers::new(&config(1), store.clone());

        let busy = workers.permits.clone().acquire_owned().await.unwrap();
        let id = schedule_ingestion_job(&jobs, &workers, UploadMeta::default(), listings("Elm St", 3))
            .await
            .unwrap();
        *store.job_id.lock().unwrap() = Some(id.clone());
        drop(busy);

        let done = wait_for_terminal(&jobs, &id).await;
        assert_eq!(done.status, IngestionStatus::Failed);
        assert_eq!(done.total_rows, 3);
        assert_eq!(done.processed_rows, 1);
        assert_eq!(done.successful_rows, 1);
        assert_eq!(done.error.as_deref(), Some("processing timed out"));
        assert_eq!(store.inner.count().unwrap(), 1);
    }

    struct OutageAfterFirstRow {
        inserts: AtomicUsize,
    }

    impl PropertyStore for OutageAfterFirstRow {
        fn insert(&self, _: &PropertyRecord, _: &str) -> Result<PropertyId, PersistError> {
            match self.inserts.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(1),
                _ => Err(PersistError::Unavailable("disk I/O error".to_string())),
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn store_outage_fails_a_processing_job() {
        let (jobs, rx) = JobsState::new(64);
        tokio::spawn(start_job_updater(jobs.clone(), rx));
        let store = Arc::new(OutageAfterFirstRow {
            inserts: AtomicUsize::new(0),
        });
        let workers = IngestWorkers::new(&config(2), store);

        let id = schedule_ingestion_job(&jobs, &workers, UploadMeta::default(), listings("Oak Ave", 3))
            .await
            .unwrap();
        let done = wait_for_terminal(&jobs, &id).await;

        assert_eq!(done.status, IngestionStatus::Failed);
        assert_eq!(done.total_rows, 3);
        assert_eq!(done.processed_rows, 1);
        assert_eq!(done.successful_rows, 1);
        assert!(done.completed_at.is_some());
        assert!(done.error.unwrap().contains("disk I/O error"));

        let job = jobs.get(&id).await.unwrap();
        let started = job.started_at.unwrap();
        assert!(job.created_at <= started);
        assert!(started <= job.completed_at.unwrap());
    }
}
