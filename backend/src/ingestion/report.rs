//! Error report generator: renders a job's failed rows back into CSV.

use crate::job_controller::state::IngestionJob;
use common::model::row_error::RowError;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush report: {0}")]
    Flush(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorReportFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

pub fn report_file_name(job_id: &str) -> String {
    format!("error_report_{}.csv", job_id)
}

fn join_kinds(errors: &[&RowError]) -> String {
    let mut kinds: Vec<&str> = errors.iter().map(|e| e.kind.as_str()).collect();
    kinds.dedup();
    kinds.join(";")
}

fn join_reasons(errors: &[&RowError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Renders the failed rows of `job`, or `None` when there is nothing to report.
///
/// The output mirrors the uploaded columns, prefixed by the 1-based data-row number
/// and followed by the failure kind and reasons. Rows appear in file order.
pub fn render_error_report(job: &IngestionJob) -> Result<Option<ErrorReportFile>, ReportError> {
    if job.failed_rows == 0 || job.processed_rows == 0 {
        return Ok(None);
    }

    let mut by_row: BTreeMap<u32, Vec<&RowError>> = BTreeMap::new();
    for error in job.row_errors.iter().filter(|e| e.row_number > 0) {
        by_row.entry(error.row_number).or_default().push(error);
    }

    let width = job.header.len();
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());

    let mut header = Vec::with_capacity(width + 3);
    header.push("row_number".to_string());
    header.extend(job.header.iter().cloned());
    header.push("error_kind".to_string());
    header.push("error_reason".to_string());
    writer.write_record(&header)?;

    let mut failed: Vec<_> = job.failed_row_values.iter().collect();
    failed.sort_by_key(|row| row.row_number);

    for row in failed {
        let errors = by_row.get(&row.row_number).map(Vec::as_slice).unwrap_or(&[]);

        let mut line = Vec::with_capacity(width + 3);
        line.push(row.row_number.to_string());
        line.extend(
            row.values
                .iter()
                .cloned()
                .chain(std::iter::repeat(String::new()))
                .take(width),
        );
        line.push(join_kinds(errors));
        line.push(join_reasons(errors));
        writer.write_record(&line)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ReportError::Flush(e.to_string()))?;

    Ok(Some(ErrorReportFile {
        file_name: report_file_name(&job.id),
        bytes,
    }))
}
