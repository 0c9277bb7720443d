//! Bulk upload API.
//!
//! - `POST /uploads/bulk/properties`: multipart upload with a `file` field holding a
//!   `.csv`. Registers an ingestion job and answers `202 Accepted` with its `uploadId`
//!   before any row is processed.
//! - `GET /uploads/bulk/properties/template`: the blank template to fill in.
//! - `GET /uploads/bulk/progress/{upload_id}`: progress snapshot for polling.
//! - `GET /uploads/bulk/error-report/{upload_id}`: CSV of the rows that failed, if any.

use actix_web::web::{get, post, scope};
use actix_web::Scope;

mod error_report;
mod intake;
mod progress;
mod template;

pub const API_PATH: &str = "/uploads/bulk";

pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("/properties", post().to(intake::process))
        .route("/properties/template", get().to(template::process))
        .route("/progress/{upload_id}", get().to(progress::process))
        .route("/error-report/{upload_id}", get().to(error_report::process))
}
