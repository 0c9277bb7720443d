use serde::{Deserialize, Serialize};

/// Origin of a row failure, surfaced in the error report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowErrorKind {
    /// The row's field values were rejected by the row validator.
    Validation,
    /// The row was valid but the property store refused it.
    Persistence,
    /// The file itself could not be processed (reported against row 0).
    Structural,
}

impl RowErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RowErrorKind::Validation => "validation",
            RowErrorKind::Persistence => "persistence",
            RowErrorKind::Structural => "structural",
        }
    }
}

/// One `(rowNumber, field, message)` entry of a job's error log.
///
/// `row_number` is 1-based over data rows, header excluded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub row_number: u32,
    pub field: String,
    pub message: String,
    pub kind: RowErrorKind,
}

impl RowError {
    pub fn validation(row_number: u32, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            row_number,
            field: field.into(),
            message: message.into(),
            kind: RowErrorKind::Validation,
        }
    }

    pub fn persistence(row_number: u32, message: impl Into<String>) -> Self {
        Self {
            row_number,
            field: "record".to_string(),
            message: message.into(),
            kind: RowErrorKind::Persistence,
        }
    }

    pub fn structural(message: impl Into<String>) -> Self {
        Self {
            row_number: 0,
            field: "file".to_string(),
            message: message.into(),
            kind: RowErrorKind::Structural,
        }
    }
}
