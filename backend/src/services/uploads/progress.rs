use crate::app::AppState;
use crate::error::ApiError;
use actix_web::{web, HttpResponse};
use common::requests::ApiResponse;

pub(crate) async fn process(
    upload_id: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let upload_id = upload_id.into_inner();
    match state.jobs.progress(&upload_id).await {
        Some(progress) => Ok(HttpResponse::Ok().json(ApiResponse::ok(progress))),
        None => Err(ApiError::JobNotFound(upload_id)),
    }
}
