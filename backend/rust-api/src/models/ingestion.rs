use serde::{Deserialize, Serialize};

/// Summary returned by every spreadsheet import, including partial failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    /// Non-blank data rows found below the header row
    pub total_rows: usize,
    pub processed_rows: usize,
    pub skipped_count: usize,
    pub skipped_details: Vec<SkippedRow>,
    /// Rows written after rows sharing a date were merged
    pub upserted_rows: usize,
    pub sheet_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_ref: Option<String>,
}

impl UploadResult {
    pub fn skip(&mut self, row: usize, reason: impl Into<String>) {
        self.skipped_details.push(SkippedRow {
            row,
            reason: reason.into(),
        });
        self.skipped_count = self.skipped_details.len();
    }
}

/// One rejected spreadsheet row. `row` is the 1-based row number as shown in Excel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub row: usize,
    pub reason: String,
}
