//! HTTP-facing errors. Each variant maps to a status code and a stable `code`
//! string rendered inside the standard [`ApiResponse`] envelope.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use common::requests::ApiResponse;
use thiserror::Error;

/// Reasons the upload intake refuses a file. No job exists for any of these.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("no file was provided in the `file` field")]
    MissingFile,
    #[error("the uploaded file is empty")]
    EmptyFile,
    #[error("unsupported file type `{0}`; upload a comma-delimited .csv file")]
    UnsupportedFileType(String),
    #[error("file exceeds the {limit} byte upload limit")]
    FileTooLarge { limit: usize },
    #[error("authentication required")]
    Unauthenticated,
    #[error("role `{0}` is not allowed to create listings")]
    Forbidden(String),
    #[error("malformed multipart body: {0}")]
    Multipart(String),
    #[error("could not register the upload: {0}")]
    Registry(String),
}

impl IntakeError {
    pub fn code(&self) -> &'static str {
        match self {
            IntakeError::MissingFile => "MISSING_FILE",
            IntakeError::EmptyFile => "EMPTY_FILE",
            IntakeError::UnsupportedFileType(_) => "UNSUPPORTED_FILE_TYPE",
            IntakeError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            IntakeError::Unauthenticated => "UNAUTHENTICATED",
            IntakeError::Forbidden(_) => "FORBIDDEN",
            IntakeError::Multipart(_) => "MALFORMED_UPLOAD",
            IntakeError::Registry(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<actix_multipart::MultipartError> for IntakeError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        IntakeError::Multipart(err.to_string())
    }
}

impl ResponseError for IntakeError {
    fn status_code(&self) -> StatusCode {
        match self {
            IntakeError::MissingFile | IntakeError::EmptyFile | IntakeError::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            IntakeError::UnsupportedFileType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            IntakeError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            IntakeError::Unauthenticated => StatusCode::UNAUTHORIZED,
            IntakeError::Forbidden(_) => StatusCode::FORBIDDEN,
            IntakeError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(ApiResponse::<()>::failure(self.code(), self.to_string()))
    }
}

/// Errors of the read-only polling and download routes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("upload `{0}` was not found")]
    JobNotFound(String),
    #[error("no error report is available for upload `{0}`")]
    NoErrorReport(String),
    #[error("failed to render error report: {0}")]
    Report(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::JobNotFound(_) => "JOB_NOT_FOUND",
            ApiError::NoErrorReport(_) => "NO_ERROR_REPORT",
            ApiError::Report(_) => "INTERNAL_ERROR",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::JobNotFound(_) | ApiError::NoErrorReport(_) => StatusCode::NOT_FOUND,
            ApiError::Report(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(ApiResponse::<()>::failure(self.code(), self.to_string()))
    }
}
