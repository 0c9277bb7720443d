//! The ingestion pipeline proper: per-row validation, the batch processor that
//! drives a whole file, error report rendering and the upload template.

pub mod processor;
pub mod report;
pub mod template;
pub mod validator;
