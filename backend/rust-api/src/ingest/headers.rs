use std::collections::HashMap;

use super::CellValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Date,
    Money,
    Integer,
    Percentage,
    Text,
}

/// One canonical field of an import profile and the header spellings that map to it.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: &'static str,
    /// Name used in skip reasons and missing-column errors
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub candidates: &'static [&'static str],
}

const FOLDS: [(&str, char); 7] = [
    ("àáạảãâầấậẩẫăằắặẳẵ", 'a'),
    ("èéẹẻẽêềếệểễ", 'e'),
    ("ìíịỉĩ", 'i'),
    ("òóọỏõôồốộổỗơờớợởỡ", 'o'),
    ("ùúụủũưừứựửữ", 'u'),
    ("ỳýỵỷỹ", 'y'),
    ("đ", 'd'),
];

fn fold_char(c: char) -> char {
    FOLDS
        .iter()
        .find(|(group, _)| group.contains(c))
        .map(|(_, base)| *base)
        .unwrap_or(c)
}

/// Lowercases, strips Vietnamese diacritics and collapses punctuation and
/// whitespace to single spaces: `"  Doanh Thu (₫) "` becomes `"doanh thu"`.
pub fn normalize_header(raw: &str) -> String {
    let folded: String = raw
        .to_lowercase()
        .chars()
        .map(fold_char)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Column index for each canonical field found in a header row.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    columns: HashMap<&'static str, usize>,
}

impl HeaderMap {
    pub fn column(&self, field: &str) -> Option<usize> {
        self.columns.get(field).copied()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Labels of required fields with no matching column, in field order.
    pub fn missing_required(&self, specs: &[FieldSpec]) -> Vec<String> {
        specs
            .iter()
            .filter(|column| column.required && !self.columns.contains_key(column.field))
            .map(|column| column.label.to_string())
            .collect()
    }
}

/// Maps a header row to canonical fields.
///
/// Exact matches on normalized text are assigned first so that a loose
/// match can never steal a column another field names exactly. Loose matches
/// (the candidate appears as whole words inside the header) are then ranked
/// over every remaining field and column together, closest first: the share
/// of the header covered by the candidate, then the longer candidate. So
/// "doanh thu (VND)" goes to revenue even when "doanh thu đơn hủy (VND)"
/// comes first in the row.
pub fn map_headers(header_row: &[CellValue], specs: &[FieldSpec]) -> HeaderMap {
    let headers: Vec<(usize, String)> = header_row
        .iter()
        .enumerate()
        .map(|(index, cell)| (index, normalize_header(&cell.display())))
        .filter(|(_, text)| !text.is_empty())
        .collect();
    let candidates: Vec<Vec<String>> = specs
        .iter()
        .map(|column| column.candidates.iter().map(|c| normalize_header(c)).collect())
        .collect();

    let mut map = HeaderMap::default();
    let mut taken = vec![false; header_row.len()];

    for (column, names) in specs.iter().zip(&candidates) {
        if let Some((index, _)) = headers
            .iter()
            .find(|(index, text)| !taken[*index] && names.iter().any(|c| c == text))
        {
            taken[*index] = true;
            map.columns.insert(column.field, *index);
        }
    }

    let mut loose: Vec<LooseMatch> = Vec::new();
    for (order, (column, names)) in specs.iter().zip(&candidates).enumerate() {
        if map.columns.contains_key(column.field) {
            continue;
        }
        for (index, text) in &headers {
            if taken[*index] {
                continue;
            }
            let padded = format!(" {} ", text);
            let best = names
                .iter()
                .filter(|c| !c.is_empty() && padded.contains(&format!(" {} ", c)))
                .map(String::len)
                .max();
            if let Some(candidate_len) = best {
                loose.push(LooseMatch {
                    order,
                    index: *index,
                    coverage: candidate_len as f64 / text.len() as f64,
                    candidate_len,
                });
            }
        }
    }

    loose.sort_by(|a, b| {
        b.coverage
            .total_cmp(&a.coverage)
            .then(b.candidate_len.cmp(&a.candidate_len))
            .then(a.order.cmp(&b.order))
            .then(a.index.cmp(&b.index))
    });

    for hit in loose {
        let field = specs[hit.order].field;
        if taken[hit.index] || map.columns.contains_key(field) {
            continue;
        }
        taken[hit.index] = true;
        map.columns.insert(field, hit.index);
    }

    map
}

struct LooseMatch {
    order: usize,
    index: usize,
    coverage: f64,
    candidate_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPECS: &[FieldSpec] = &[
        FieldSpec {
            field: "report_date",
            label: "date",
            kind: FieldKind::Date,
            required: true,
            candidates: &["ngày", "date"],
        },
        FieldSpec {
            field: "revenue",
            label: "revenue",
            kind: FieldKind::Money,
            required: true,
            candidates: &["doanh thu", "revenue"],
        },
        FieldSpec {
            field: "cancelled_revenue",
            label: "cancelled revenue",
            kind: FieldKind::Money,
            required: false,
            candidates: &["doanh thu đơn hủy", "cancelled revenue"],
        },
    ];

    fn row(cells: &[&str]) -> Vec<CellValue> {
        cells.iter().map(|c| CellValue::from(*c)).collect()
    }

    #[test]
    fn normalizes_vietnamese_headers() {
        assert_eq!(normalize_header("  Doanh   Thu (₫) "), "doanh thu");
        assert_eq!(normalize_header("Ngày"), "ngay");
        assert_eq!(normalize_header("Tỷ lệ chuyển đổi"), "ty le chuyen doi");
        assert_eq!(normalize_header("ĐƠN HÀNG"), "don hang");
    }

    #[test]
    fn exact_match_beats_contains() {
        let map = map_headers(&row(&["Doanh thu đơn hủy", "Ngày", "Doanh thu"]), SPECS);
        assert_eq!(map.column("report_date"), Some(1));
        assert_eq!(map.column("revenue"), Some(2));
        assert_eq!(map.column("cancelled_revenue"), Some(0));
    }

    #[test]
    fn contains_match_for_decorated_headers() {
        let map = map_headers(&row(&["Ngày báo cáo", "Tổng doanh thu (VND)"]), SPECS);
        assert_eq!(map.column("report_date"), Some(0));
        assert_eq!(map.column("revenue"), Some(1));
        assert_eq!(map.column("cancelled_revenue"), None);
        assert!(map.missing_required(SPECS).is_empty());
    }

    #[test]
    fn closest_loose_match_wins_regardless_of_column_order() {
        let map = map_headers(
            &row(&["Ngày", "Doanh thu đơn hủy (VND)", "Doanh thu (VND)", "Đơn hàng"]),
            SPECS,
        );
        assert_eq!(map.column("revenue"), Some(2));
        assert_eq!(map.column("cancelled_revenue"), Some(1));
    }

    #[test]
    fn loose_match_needs_whole_words() {
        let map = map_headers(&row(&["Ngày", "Doanh thuế"]), SPECS);
        assert_eq!(map.column("revenue"), None);
    }

    #[test]
    fn comprehensive_profile_keeps_revenue_off_the_cancelled_column() {
        let map = map_headers(
            &row(&["Ngày", "Doanh thu đơn hủy (VND)", "Doanh thu (VND)", "Đơn hàng"]),
            crate::ingest::profile::COMPREHENSIVE.fields,
        );
        assert_eq!(map.column("report_date"), Some(0));
        assert_eq!(map.column("revenue"), Some(2));
        assert_eq!(map.column("cancelled_revenue"), Some(1));
        assert_eq!(map.column("orders"), Some(3));
    }

    #[test]
    fn reports_missing_required_fields() {
        let map = map_headers(&row(&["Date", "Visits"]), SPECS);
        assert_eq!(map.missing_required(SPECS), vec!["revenue".to_string()]);
        assert_eq!(map.len(), 1);
    }
}
