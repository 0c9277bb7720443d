//! Upload intake: authorizes the caller, reads the `file` part of the multipart
//! body, and registers an ingestion job for it. Every refusal happens here,
//! before a job exists.

use crate::app::AppState;
use crate::error::IntakeError;
use crate::job_controller::state::UploadMeta;
use crate::job_controller::worker::schedule_ingestion_job;
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpRequest, HttpResponse};
use common::requests::{ApiResponse, UploadAccepted};
use futures_util::StreamExt;
use md5::Context;

const FILE_FIELD: &str = "file";

/// Declared part types browsers and HTTP clients commonly send for CSV files.
const ACCEPTED_CONTENT_TYPES: [&str; 5] = [
    "text/csv",
    "application/csv",
    "text/plain",
    "application/vnd.ms-excel",
    "application/octet-stream",
];

struct ReceivedFile {
    name: String,
    bytes: Vec<u8>,
    md5: String,
}

pub(crate) async fn process(
    req: HttpRequest,
    payload: Multipart,
    state: web::Data<AppState>,
) -> Result<HttpResponse, IntakeError> {
    let caller = state.identity.authorize_upload(&req)?;
    let file = read_upload(payload, state.max_file_bytes).await?;

    let described = format!("{}, {} bytes, md5 {}", file.name, file.bytes.len(), file.md5);
    let meta = UploadMeta {
        file_name: file.name,
        file_bytes: file.bytes.len(),
        file_md5: file.md5,
        owner_id: caller.user_id.clone(),
    };

    let upload_id = schedule_ingestion_job(&state.jobs, &state.workers, meta, file.bytes)
        .await
        .map_err(|e| IntakeError::Registry(e.to_string()))?;
    log::info!(
        "accepted upload {} ({}) from {} ({})",
        upload_id,
        described,
        caller.user_id,
        caller.role
    );

    Ok(HttpResponse::Accepted().json(ApiResponse::ok(UploadAccepted { upload_id })))
}

/// Checks the part's file name and declared type. Returns the file name.
fn check_file_type(field: &Field) -> Result<String, IntakeError> {
    let file_name = field
        .content_disposition()
        .and_then(|cd| cd.get_filename().map(|f| f.to_string()))
        .unwrap_or_default();

    let guessed = mime_guess::from_path(&file_name).first();
    if guessed.as_ref().map(|m| m.essence_str()) != Some("text/csv") {
        let shown = if file_name.is_empty() { "<unnamed>" } else { &file_name };
        return Err(IntakeError::UnsupportedFileType(shown.to_string()));
    }

    if let Some(declared) = field.content_type() {
        let essence = declared.essence_str();
        if !ACCEPTED_CONTENT_TYPES.contains(&essence) {
            return Err(IntakeError::UnsupportedFileType(essence.to_string()));
        }
    }

    Ok(file_name)
}

/// Streams the `file` part into memory, enforcing the size limit as bytes arrive.
async fn read_upload(mut payload: Multipart, max_bytes: usize) -> Result<ReceivedFile, IntakeError> {
    let mut received = None;

    while let Some(item) = payload.next().await {
        let mut field = item?;
        let name = field
            .content_disposition()
            .and_then(|cd| cd.get_name().map(|n| n.to_string()));
        if name.as_deref() != Some(FILE_FIELD) || received.is_some() {
            continue;
        }

        let file_name = check_file_type(&field)?;
        let mut bytes = Vec::new();
        let mut hasher = Context::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(IntakeError::FileTooLarge { limit: max_bytes });
            }
            hasher.consume(&chunk);
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            return Err(IntakeError::EmptyFile);
        }
        received = Some(ReceivedFile {
            name: file_name,
            bytes,
            md5: format!("{:x}", hasher.finalize()),
        });
    }

    received.ok_or(IntakeError::MissingFile)
}
