use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope wrapping every JSON body the ingestion API returns.
///
/// Successful responses carry `data` and no `error`; failures carry `error`
/// and no `data`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiErrorBody {
                code: code.into(),
                message: message.into(),
            }),
            timestamp: Utc::now(),
        }
    }
}

/// Machine-readable `code` plus a human-readable `message`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

/// Payload of an accepted bulk upload. The id is the only handle a client
/// gets for polling progress and fetching the error report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAccepted {
    pub upload_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_upload_reads_back_from_json() {
        let body = r#"{"success":true,"data":{"uploadId":"abc"},"timestamp":"2026-01-05T10:00:00Z"}"#;
        let parsed: ApiResponse<UploadAccepted> = serde_json::from_str(body).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.data.unwrap().upload_id, "abc");
        assert!(parsed.error.is_none());
    }

    #[test]
    fn failure_omits_data() {
        let value = serde_json::to_value(ApiResponse::<UploadAccepted>::failure("JOB_NOT_FOUND", "no such upload")).unwrap();
        assert!(value.get("data").is_none());
        assert_eq!(value["error"]["code"], "JOB_NOT_FOUND");

        let parsed: ApiResponse<UploadAccepted> = serde_json::from_value(value).unwrap();
        assert!(parsed.data.is_none());
        assert_eq!(parsed.error.unwrap().message, "no such upload");
    }
}
