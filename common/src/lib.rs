//! Wire types shared between the ingestion backend and any client polling it.

pub mod jobs;
pub mod model;
pub mod requests;
