use crate::app::AppState;
use crate::error::ApiError;
use crate::ingestion::report::render_error_report;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};

pub(crate) async fn process(
    upload_id: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let upload_id = upload_id.into_inner();

    // Rendered under the read lock so the rows and counters come from one snapshot.
    let rendered = state
        .jobs
        .inspect(&upload_id, render_error_report)
        .await
        .ok_or_else(|| ApiError::JobNotFound(upload_id.clone()))?
        .map_err(|e| ApiError::Report(e.to_string()))?;

    let report = rendered.ok_or(ApiError::NoErrorReport(upload_id))?;
    log::debug!("serving {} ({} bytes)", report.file_name, report.bytes.len());

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(report.file_name)],
        })
        .body(report.bytes))
}
