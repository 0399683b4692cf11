//! Spreadsheet ingestion for shop reports.
//!
//! A run locates the sheet, maps loosely spelled headers to canonical fields,
//! parses Vietnamese-formatted numbers, percentages and dates cell by cell,
//! skips bad rows with a reason and hands the aggregated rows to a
//! [`sink::ReportSink`]. Only structural problems abort a run.

pub mod headers;
pub mod parse;
pub mod pipeline;
pub mod profile;
pub mod sheet;
pub mod sink;

pub use pipeline::{import_rows, run_import, ImportBatch};
pub use profile::{ImportProfile, ReportRecord};
pub use sink::{MemoryReportSink, ReportSink};

/// A single spreadsheet cell, independent of the workbook reader.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Excel date cell, as its serial day number
    DateSerial(f64),
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    /// Human-readable rendering used in skip reasons
    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(text) => text.trim().to_string(),
            CellValue::Number(value) | CellValue::DateSerial(value) => value.to_string(),
            CellValue::Bool(value) => value.to_string(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// Structural failures. Per-row problems never surface here.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("unknown import type '{0}'")]
    UnknownProfile(String),
    #[error("could not read workbook: {0}")]
    Workbook(String),
    #[error("sheet not found (expected one of: {expected}; workbook has: {available})")]
    SheetNotFound { expected: String, available: String },
    #[error("sheet '{0}' has no data")]
    EmptySheet(String),
    #[error("required columns not found: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}
