//! Property-persistence collaborator consumed by the batch processor.

mod sqlite;

pub use sqlite::SqlitePropertyStore;

use common::model::property::PropertyRecord;
use thiserror::Error;

pub type PropertyId = i64;

#[derive(Debug, Error)]
pub enum PersistError {
    /// The store refused this particular record (e.g. a uniqueness violation).
    /// Recorded as a failed row; the job carries on.
    #[error("{0}")]
    Rejected(String),
    /// The store cannot accept anything right now. Aborts the job.
    #[error("property store unavailable: {0}")]
    Unavailable(String),
}

/// Accepts one normalized record at a time on behalf of `owner_id`.
///
/// Called from the blocking worker pool, never from the async runtime.
pub trait PropertyStore: Send + Sync {
    fn insert(&self, record: &PropertyRecord, owner_id: &str) -> Result<PropertyId, PersistError>;
}
