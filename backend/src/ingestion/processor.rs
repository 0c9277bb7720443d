//! Batch processor: turns an uploaded file into persisted property records.
//!
//! `process_upload_blocking` runs on the blocking pool. It parses the whole file
//! first (structural failures end here, before the job ever reaches `processing`),
//! reports the row count, then validates rows chunk by chunk in parallel with rayon
//! and persists and reports them one at a time in file order. Every mutation goes
//! back to the job store as a `JobUpdate`; the caller sends the final status.

use crate::ingestion::validator::{RowValidator, RowView};
use crate::job_controller::state::{JobUpdate, JobUpdateKind, RecordedRow};
use crate::persistence::{PersistError, PropertyStore};
use common::model::row_error::RowError;
use rayon::prelude::*;
use regex::Regex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("file appears to be binary, not comma-delimited text")]
    Binary,
    #[error("file is not valid UTF-8 text (invalid byte at offset {0})")]
    Encoding(usize),
    #[error("file could not be parsed as CSV: {0}")]
    Malformed(String),
    #[error("file has no header row")]
    MissingHeader,
    #[error("header column {0} is blank")]
    BlankColumn(usize),
    #[error("header column `{0}` may only contain letters, digits, spaces, '-' and '_'")]
    InvalidColumn(String),
    #[error("header column `{0}` appears more than once")]
    DuplicateColumn(String),
    #[error("file has {found} data rows; the limit is {limit}")]
    TooManyRows { found: usize, limit: usize },
    #[error("property store unavailable at row {row}: {reason}")]
    PersistenceUnavailable { row: u32, reason: String },
    #[error("processing timed out")]
    TimedOut,
    #[error("job state channel closed")]
    UpdateChannelClosed,
    #[error("row validator setup failed: {0}")]
    Setup(String),
}

impl ProcessingError {
    /// True when the file itself is unusable, as opposed to a failure while running.
    pub fn is_structural(&self) -> bool {
        !matches!(
            self,
            ProcessingError::PersistenceUnavailable { .. }
                | ProcessingError::TimedOut
                | ProcessingError::UpdateChannelClosed
                | ProcessingError::Setup(_)
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ProcessLimits {
    pub max_rows: usize,
    pub chunk_size: usize,
}

/// Header plus raw data rows of a parsed upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedFile {
    /// Normalized column names used for validation.
    pub header: Vec<String>,
    /// Column titles as uploaded (trimmed), echoed back in the error report.
    pub source_header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub total_rows: u32,
    pub successful_rows: u32,
    pub failed_rows: u32,
}

/// Lower-cases a header cell and maps inner whitespace and hyphens to `_`.
fn normalize_title(title: &str) -> String {
    title
        .trim()
        .trim_matches('"')
        .to_lowercase()
        .split(|ch: char| ch.is_whitespace() || ch == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn validate_and_normalize_titles(raw: &csv::StringRecord) -> Result<Vec<String>, ProcessingError> {
    if raw.iter().all(|cell| cell.trim().is_empty()) {
        return Err(ProcessingError::MissingHeader);
    }
    let header_re = Regex::new(r"^[a-z0-9_]+$")
        .map_err(|e| ProcessingError::Malformed(format!("regex error: {}", e)))?;

    let mut seen = HashSet::new();
    let mut titles = Vec::with_capacity(raw.len());
    for (idx, cell) in raw.iter().enumerate() {
        let title = normalize_title(cell);
        if title.is_empty() {
            return Err(ProcessingError::BlankColumn(idx + 1));
        }
        if !header_re.is_match(&title) {
            return Err(ProcessingError::InvalidColumn(cell.trim().to_string()));
        }
        if !seen.insert(title.clone()) {
            return Err(ProcessingError::DuplicateColumn(title));
        }
        titles.push(title);
    }
    Ok(titles)
}

/// Parses an upload into its header and data rows, or reports why the file is unusable.
pub fn parse_upload(bytes: &[u8], max_rows: usize) -> Result<ParsedFile, ProcessingError> {
    if bytes.contains(&0) {
        return Err(ProcessingError::Binary);
    }
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).map_err(|e| ProcessingError::Encoding(e.valid_up_to()))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let raw_header = reader
        .headers()
        .map_err(|e| ProcessingError::Malformed(e.to_string()))?
        .clone();
    if raw_header.is_empty() {
        return Err(ProcessingError::MissingHeader);
    }
    let header = validate_and_normalize_titles(&raw_header)?;
    let source_header = raw_header.iter().map(|cell| cell.trim().to_string()).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ProcessingError::Malformed(e.to_string()))?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }
    if rows.len() > max_rows {
        return Err(ProcessingError::TooManyRows {
            found: rows.len(),
            limit: max_rows,
        });
    }

    Ok(ParsedFile {
        header,
        source_header,
        rows,
    })
}

fn send(tx: &mpsc::Sender<JobUpdate>, job_id: &str, kind: JobUpdateKind) -> Result<(), ProcessingError> {
    tx.blocking_send(JobUpdate::new(job_id, kind))
        .map_err(|_| ProcessingError::UpdateChannelClosed)
}

/// Everything a worker needs to process one upload.
pub struct ProcessRequest<'a> {
    pub job_id: &'a str,
    pub owner_id: &'a str,
    pub bytes: &'a [u8],
    pub store: &'a dyn PropertyStore,
    pub limits: ProcessLimits,
    /// Raised by the watchdog; checked before anything is written to the store.
    pub cancelled: &'a AtomicBool,
}

/// Runs one ingestion job to the end of the file. Must be called off the async runtime.
///
/// Row-level problems (validation or a rejected insert) are recorded and never abort
/// the job; only a structural problem with the file, an unavailable store or a
/// watchdog cancellation returns `Err`. A cancelled job stops before its next insert,
/// so every persisted row has had its outcome sent.
pub fn process_upload_blocking(
    tx: &mpsc::Sender<JobUpdate>,
    request: ProcessRequest<'_>,
) -> Result<ProcessSummary, ProcessingError> {
    let ProcessRequest {
        job_id,
        owner_id,
        bytes,
        store,
        limits,
        cancelled,
    } = request;
    let check_cancelled = || {
        if cancelled.load(Ordering::SeqCst) {
            Err(ProcessingError::TimedOut)
        } else {
            Ok(())
        }
    };

    let parsed = parse_upload(bytes, limits.max_rows)?;
    let validator = RowValidator::new().map_err(|e| ProcessingError::Setup(e.to_string()))?;
    let total_rows = parsed.rows.len() as u32;
    check_cancelled()?;
    send(
        tx,
        job_id,
        JobUpdateKind::TotalRows {
            total_rows,
            header: parsed.source_header.clone(),
        },
    )?;

    log::info!("job {} started: {} rows, {} columns", job_id, total_rows, parsed.header.len());

    let header = parsed.header.as_slice();
    let chunk_size = limits.chunk_size.max(1);
    let mut summary = ProcessSummary {
        total_rows,
        ..ProcessSummary::default()
    };

    for (chunk_idx, chunk) in parsed.rows.chunks(chunk_size).enumerate() {
        let first_row = chunk_idx * chunk_size + 1;
        let outcomes: Vec<_> = chunk
            .par_iter()
            .enumerate()
            .map(|(i, cells)| validator.validate((first_row + i) as u32, &RowView::new(header, cells)))
            .collect();

        for (i, (cells, outcome)) in chunk.iter().zip(outcomes).enumerate() {
            let row_number = (first_row + i) as u32;
            let recorded = match outcome {
                Ok(record) => {
                    check_cancelled()?;
                    match store.insert(&record, owner_id) {
                        Ok(_) => RecordedRow::Succeeded { row_number },
                        Err(PersistError::Rejected(reason)) => RecordedRow::Failed {
                            row_number,
                            errors: vec![RowError::persistence(row_number, reason)],
                            values: cells.clone(),
                        },
                        Err(PersistError::Unavailable(reason)) => {
                            return Err(ProcessingError::PersistenceUnavailable {
                                row: row_number,
                                reason,
                            });
                        }
                    }
                }
                Err(errors) => RecordedRow::Failed {
                    row_number,
                    errors,
                    values: cells.clone(),
                },
            };

            match &recorded {
                RecordedRow::Succeeded { .. } => summary.successful_rows += 1,
                RecordedRow::Failed { errors, .. } => {
                    summary.failed_rows += 1;
                    log::debug!("job {} row {} failed with {} error(s)", job_id, row_number, errors.len());
                }
            }
            send(tx, job_id, JobUpdateKind::Row(recorded))?;
        }
    }

    Ok(summary)
}
