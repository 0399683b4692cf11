use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::UploadResult;

use super::headers::{map_headers, FieldKind, FieldSpec, HeaderMap};
use super::parse;
use super::profile::{DuplicatePolicy, FieldValue, ImportProfile, ReportRecord, DATE_FIELD};
use super::sheet::read_sheet;
use super::{CellValue, IngestError};

/// How many leading rows may hold titles or notes before the header row
pub const HEADER_SCAN_ROWS: usize = 10;

/// Outcome of parsing one upload, ready for a [`super::ReportSink`].
#[derive(Debug, Clone)]
pub struct ImportBatch {
    pub result: UploadResult,
    pub records: Vec<ReportRecord>,
}

/// Reads a workbook and imports its report sheet with `profile`.
pub fn run_import(profile: &ImportProfile, bytes: Vec<u8>) -> Result<ImportBatch, IngestError> {
    let sheet = read_sheet(bytes, profile.sheet_names)?;
    import_rows(profile, &sheet.name, &sheet.rows)
}

/// Imports rows already read from a sheet. `rows[0]` is spreadsheet row 1.
pub fn import_rows(
    profile: &ImportProfile,
    sheet_name: &str,
    rows: &[Vec<CellValue>],
) -> Result<ImportBatch, IngestError> {
    if rows.iter().all(|row| is_blank_row(row)) {
        return Err(IngestError::EmptySheet(sheet_name.to_string()));
    }

    let (header_index, headers) = locate_header(rows, profile.fields)?;
    let fraction_fields = fraction_columns(profile.fields, &headers, &rows[header_index + 1..]);

    let mut result = UploadResult {
        sheet_name: sheet_name.to_string(),
        ..UploadResult::default()
    };
    let mut days: BTreeMap<NaiveDate, ReportRecord> = BTreeMap::new();

    for (index, row) in rows.iter().enumerate().skip(header_index + 1) {
        if is_blank_row(row) {
            continue;
        }
        let row_number = index + 1;
        result.total_rows += 1;

        let record = match parse_row(profile, &headers, &fraction_fields, row, row_number) {
            Ok(record) => record,
            Err(reason) => {
                result.skip(row_number, reason);
                continue;
            }
        };

        match days.entry(record.report_date) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => match profile.duplicates {
                DuplicatePolicy::Sum => slot.get_mut().merge(record, profile.fields),
                DuplicatePolicy::Reject => {
                    let first_row = slot.get().source_rows.first().copied().unwrap_or_default();
                    result.skip(
                        row_number,
                        format!(
                            "duplicate date {} (already imported from row {})",
                            record.report_date.format("%d/%m/%Y"),
                            first_row
                        ),
                    );
                }
            },
        }
    }

    let mut records: Vec<ReportRecord> = days.into_values().collect();
    for record in &mut records {
        profile.derive(record);
    }

    result.processed_rows = result.total_rows - result.skipped_count;

    tracing::info!(
        profile = profile.name,
        sheet = %sheet_name,
        header_row = header_index + 1,
        total_rows = result.total_rows,
        processed_rows = result.processed_rows,
        skipped = result.skipped_count,
        days = records.len(),
        "spreadsheet parsed"
    );

    Ok(ImportBatch { result, records })
}

fn is_blank_row(row: &[CellValue]) -> bool {
    row.iter().all(CellValue::is_blank)
}

/// First row within [`HEADER_SCAN_ROWS`] that maps every required field.
/// When none does, the error lists what the best candidate row was missing.
fn locate_header(
    rows: &[Vec<CellValue>],
    specs: &[FieldSpec],
) -> Result<(usize, HeaderMap), IngestError> {
    let mut best: Option<(usize, HeaderMap)> = None;

    for (index, row) in rows.iter().take(HEADER_SCAN_ROWS).enumerate() {
        if is_blank_row(row) {
            continue;
        }
        let headers = map_headers(row, specs);
        if headers.missing_required(specs).is_empty() {
            return Ok((index, headers));
        }
        if best.as_ref().map_or(true, |(_, current)| headers.len() > current.len()) {
            best = Some((index, headers));
        }
    }

    let missing = match best {
        Some((_, headers)) => headers.missing_required(specs),
        None => specs
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| spec.label.to_string())
            .collect(),
    };
    Err(IngestError::MissingColumns(missing))
}

/// Percentage fields whose numeric cells are all Excel fractions.
fn fraction_columns(
    specs: &[FieldSpec],
    headers: &HeaderMap,
    data_rows: &[Vec<CellValue>],
) -> Vec<&'static str> {
    specs
        .iter()
        .filter(|spec| spec.kind == FieldKind::Percentage)
        .filter(|spec| {
            headers.column(spec.field).is_some_and(|column| {
                parse::holds_fractions(data_rows.iter().filter_map(|row| row.get(column)))
            })
        })
        .map(|spec| spec.field)
        .collect()
}

fn parse_row(
    profile: &ImportProfile,
    headers: &HeaderMap,
    fraction_fields: &[&str],
    row: &[CellValue],
    row_number: usize,
) -> Result<ReportRecord, String> {
    let date_spec = profile
        .spec(DATE_FIELD)
        .ok_or_else(|| format!("profile {} has no date field", profile.name))?;
    let date_cell = cell_for(headers, row, DATE_FIELD);
    if date_cell.is_blank() {
        return Err(format!("missing {}", date_spec.label));
    }
    let report_date = parse::parse_date(date_cell)
        .ok_or_else(|| format!("invalid {} '{}'", date_spec.label, date_cell.display()))?;

    let mut record = ReportRecord::new(report_date, row_number);

    for spec in profile.fields.iter().filter(|spec| spec.field != DATE_FIELD) {
        let cell = cell_for(headers, row, spec.field);
        if cell.is_blank() {
            if spec.required {
                return Err(format!("missing {}", spec.label));
            }
            continue;
        }

        let fractions = fraction_fields.contains(&spec.field);
        match parse_field(spec.kind, cell, fractions) {
            Some(value) => {
                record.values.insert(spec.field, value);
            }
            None if spec.required => {
                return Err(format!("invalid {} '{}'", spec.label, cell.display()));
            }
            None => {
                tracing::debug!(
                    row = row_number,
                    field = spec.field,
                    value = %cell.display(),
                    "ignoring unparseable optional cell"
                );
            }
        }
    }

    Ok(record)
}

fn cell_for<'a>(headers: &HeaderMap, row: &'a [CellValue], field: &str) -> &'a CellValue {
    headers
        .column(field)
        .and_then(|column| row.get(column))
        .unwrap_or(&CellValue::Empty)
}

fn parse_field(kind: FieldKind, cell: &CellValue, fractions: bool) -> Option<FieldValue> {
    match kind {
        FieldKind::Money => parse::parse_number(cell).map(FieldValue::Number),
        FieldKind::Integer => parse::parse_integer(cell).map(FieldValue::Integer),
        FieldKind::Percentage => parse::parse_percentage(cell, fractions).map(FieldValue::Number),
        FieldKind::Date => parse::parse_date(cell)
            .map(|date| FieldValue::Text(date.format("%Y-%m-%d").to_string())),
        FieldKind::Text => Some(FieldValue::Text(cell.display())),
    }
}
