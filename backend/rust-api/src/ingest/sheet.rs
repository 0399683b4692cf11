use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use super::headers::normalize_header;
use super::{CellValue, IngestError};

/// A worksheet as plain rows. Index 0 is spreadsheet row 1.
#[derive(Debug, Clone)]
pub struct SheetRows {
    pub name: String,
    pub rows: Vec<Vec<CellValue>>,
}

/// Reads the first sheet matching one of `wanted` from xlsx/xls/ods bytes.
pub fn read_sheet(bytes: Vec<u8>, wanted: &[&str]) -> Result<SheetRows, IngestError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|err| IngestError::Workbook(err.to_string()))?;

    let names = workbook.sheet_names();
    let name = find_sheet(&names, wanted).ok_or_else(|| IngestError::SheetNotFound {
        expected: wanted.join(", "),
        available: names.join(", "),
    })?;

    let range = workbook
        .worksheet_range(&name)
        .map_err(|err| IngestError::Workbook(err.to_string()))?;

    // Ranges start at the first used cell, so pad back to row 1.
    let leading = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); leading];
    rows.extend(range.rows().map(|row| row.iter().map(to_cell).collect()));

    tracing::debug!(sheet = %name, rows = rows.len(), "worksheet loaded");
    Ok(SheetRows { name, rows })
}

fn to_cell(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(text) => CellValue::Text(text.clone()),
        Data::Int(value) => CellValue::Number(*value as f64),
        Data::Float(value) => CellValue::Number(*value),
        Data::Bool(value) => CellValue::Bool(*value),
        Data::DateTime(value) => CellValue::DateSerial(value.as_f64()),
        Data::DateTimeIso(text) | Data::DurationIso(text) => CellValue::Text(text.clone()),
        Data::Error(err) => CellValue::Text(err.to_string()),
    }
}

/// Exact normalized name first, then containment either way. A workbook with
/// a single sheet is accepted whatever that sheet is called.
pub fn find_sheet(names: &[String], wanted: &[&str]) -> Option<String> {
    let normalized: Vec<(String, String)> = names
        .iter()
        .map(|name| (compact(name), name.clone()))
        .collect();
    let wanted: Vec<String> = wanted.iter().map(|w| compact(w)).collect();

    for target in &wanted {
        if let Some((_, name)) = normalized.iter().find(|(key, _)| key == target) {
            return Some(name.clone());
        }
    }

    for target in &wanted {
        if let Some((_, name)) = normalized
            .iter()
            .find(|(key, _)| !key.is_empty() && (key.contains(target.as_str()) || target.contains(key.as_str())))
        {
            return Some(name.clone());
        }
    }

    if names.len() == 1 {
        return names.first().cloned();
    }
    None
}

fn compact(name: &str) -> String {
    normalize_header(name).replace(' ', "")
}
