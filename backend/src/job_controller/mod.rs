//! Background job bookkeeping: the shared job store, the worker pool that runs
//! ingestion jobs, and the reaper that times out and expires them.

pub mod reaper;
pub mod state;
pub mod worker;
