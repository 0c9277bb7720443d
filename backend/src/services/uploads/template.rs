use crate::ingestion::template::{template_bytes, TEMPLATE_FILE_NAME, TEMPLATE_VERSION};
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::HttpResponse;

pub const TEMPLATE_VERSION_HEADER: &str = "X-Template-Version";

pub(crate) async fn process() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((TEMPLATE_VERSION_HEADER, TEMPLATE_VERSION.to_string()))
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(TEMPLATE_FILE_NAME.to_string())],
        })
        .body(template_bytes())
}
