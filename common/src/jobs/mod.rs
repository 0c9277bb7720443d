use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a bulk ingestion job.
///
/// The only legal sequences are `Pending -> Processing -> Completed`,
/// `Pending -> Processing -> Failed` and `Pending -> Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStatus {
    /// Registered by the upload intake, waiting for a worker.
    Pending,
    /// Rows are being validated and persisted.
    Processing,
    /// Iteration reached the end of the file. Some rows may still have failed.
    Completed,
    /// The job itself could not run (structural or unrecoverable failure).
    Failed,
}

impl IngestionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, IngestionStatus::Completed | IngestionStatus::Failed)
    }

    pub fn can_transition_to(self, next: IngestionStatus) -> bool {
        use IngestionStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IngestionStatus::Pending => "pending",
            IngestionStatus::Processing => "processing",
            IngestionStatus::Completed => "completed",
            IngestionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for IngestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot returned to polling clients.
///
/// Counters are copied out of the job store under a single lock, so
/// `processed_rows == successful_rows + failed_rows` holds for every snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionProgress {
    pub upload_id: String,
    pub status: IngestionStatus,
    pub total_rows: u32,
    pub processed_rows: u32,
    pub successful_rows: u32,
    pub failed_rows: u32,
    pub has_error_report: bool,
    /// Job-level failure reason, only present once the job is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}
