//! Periodic sweep over the job store.
//!
//! Queued jobs that waited past the configured timeout are failed and never run.
//! Running jobs past the timeout are cancelled; their worker stops before the next
//! insert and fails the job with everything it persisted recorded. Terminal jobs
//! past the retention window are dropped so the store stays bounded.

use crate::config::JobsConfig;
use crate::job_controller::state::JobsState;
use chrono::Utc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ReaperConfig {
    /// Maximum time a job may spend pending or processing.
    pub timeout: Duration,
    /// How long a finished job stays queryable.
    pub retention: Duration,
    pub interval: Duration,
}

impl From<&JobsConfig> for ReaperConfig {
    fn from(config: &JobsConfig) -> Self {
        Self {
            timeout: config.timeout(),
            retention: config.retention(),
            interval: config.sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaperReport {
    pub timed_out: Vec<String>,
    pub cancelled: Vec<String>,
    pub purged: Vec<String>,
}

impl ReaperReport {
    pub fn is_empty(&self) -> bool {
        self.timed_out.is_empty() && self.cancelled.is_empty() && self.purged.is_empty()
    }
}

/// Runs one sweep.
pub async fn reap_jobs(state: &JobsState, config: &ReaperConfig) -> ReaperReport {
    let now = Utc::now();
    let stale = state.fail_stale(now, config.timeout).await;
    ReaperReport {
        timed_out: stale.failed,
        cancelled: stale.cancelled,
        purged: state.purge_expired(now, config.retention).await,
    }
}

/// Sweeps forever at `config.interval`. Spawned once at startup.
pub async fn start_job_reaper(state: JobsState, config: ReaperConfig) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let report = reap_jobs(&state, &config).await;
        if report.is_empty() {
            continue;
        }
        for id in &report.timed_out {
            log::warn!("job {} timed out after {:?}", id, config.timeout);
        }
        for id in &report.cancelled {
            log::warn!("job {} still running after {:?}; cancelling", id, config.timeout);
        }
        log::info!(
            "reaper: {} job(s) timed out, {} cancelled, {} expired job(s) purged",
            report.timed_out.len(),
            report.cancelled.len(),
            report.purged.len()
        );
    }
}
