use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use super::headers::{FieldKind, FieldSpec};

/// Name of the date field every profile keys its rows on
pub const DATE_FIELD: &str = "report_date";

/// What happens when two rows carry the same report date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Later rows are skipped with a reason
    Reject,
    /// Rows are merged into one daily total
    Sum,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Integer(i64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(value) => Some(*value),
            FieldValue::Integer(value) => Some(*value as f64),
            FieldValue::Text(_) => None,
        }
    }

    fn absorb(&mut self, other: &FieldValue) {
        match (self, other) {
            (FieldValue::Number(total), FieldValue::Number(value)) => *total += value,
            (FieldValue::Integer(total), FieldValue::Integer(value)) => *total += value,
            (FieldValue::Text(joined), FieldValue::Text(value)) => {
                if !joined.split("; ").any(|part| part == value.as_str()) {
                    joined.push_str("; ");
                    joined.push_str(value);
                }
            }
            _ => {}
        }
    }
}

/// One aggregated day of a shop report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRecord {
    pub report_date: NaiveDate,
    pub values: BTreeMap<&'static str, FieldValue>,
    /// Spreadsheet rows that contributed to this record
    pub source_rows: Vec<usize>,
}

impl ReportRecord {
    pub fn new(report_date: NaiveDate, source_row: usize) -> Self {
        Self {
            report_date,
            values: BTreeMap::new(),
            source_rows: vec![source_row],
        }
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.values.get(field).and_then(FieldValue::as_f64)
    }

    /// Adds money and count fields. Percentages keep the first row's value and
    /// text fields collect distinct values.
    pub fn merge(&mut self, other: ReportRecord, specs: &[FieldSpec]) {
        for (field, value) in other.values {
            let kind = specs
                .iter()
                .find(|column| column.field == field)
                .map(|column| column.kind);
            match self.values.get_mut(field) {
                Some(existing) if kind != Some(FieldKind::Percentage) => existing.absorb(&value),
                Some(_) => {}
                None => {
                    self.values.insert(field, value);
                }
            }
        }
        self.source_rows.extend(other.source_rows);
    }

    fn set_ratio(&mut self, field: &'static str, numerator: &str, denominator: &str, scale: f64) {
        match (self.number(numerator), self.number(denominator)) {
            (Some(top), Some(bottom)) if bottom > 0.0 => {
                let ratio = (top / bottom * scale * 100.0).round() / 100.0;
                self.values.insert(field, FieldValue::Number(ratio));
            }
            _ => {
                self.values.remove(field);
            }
        }
    }
}

/// Declarative description of one kind of report upload.
pub struct ImportProfile {
    pub name: &'static str,
    pub collection: &'static str,
    pub sheet_names: &'static [&'static str],
    pub fields: &'static [FieldSpec],
    pub duplicates: DuplicatePolicy,
    derive: fn(&mut ReportRecord),
}

impl std::fmt::Debug for ImportProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportProfile")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl ImportProfile {
    pub fn by_name(name: &str) -> Option<&'static ImportProfile> {
        PROFILES
            .iter()
            .copied()
            .find(|profile| profile.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn all() -> &'static [&'static ImportProfile] {
        PROFILES
    }

    pub fn spec(&self, field: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|column| column.field == field)
    }

    /// Fills computed fields once all rows of a day are merged.
    pub fn derive(&self, record: &mut ReportRecord) {
        (self.derive)(record)
    }
}

const fn field(
    field: &'static str,
    label: &'static str,
    kind: FieldKind,
    required: bool,
    candidates: &'static [&'static str],
) -> FieldSpec {
    FieldSpec {
        field,
        label,
        kind,
        required,
        candidates,
    }
}

pub static COMPREHENSIVE: ImportProfile = ImportProfile {
    name: "comprehensive",
    collection: "comprehensive_reports",
    sheet_names: &["Báo cáo tổng hợp", "Tổng hợp", "Tổng quan", "Comprehensive", "Overview"],
    fields: &[
        field(DATE_FIELD, "date", FieldKind::Date, true, &["ngày", "ngày báo cáo", "thời gian", "date"]),
        field("revenue", "revenue", FieldKind::Money, true, &["doanh thu", "tổng doanh thu", "doanh số", "revenue", "sales", "gmv"]),
        field("orders", "orders", FieldKind::Integer, true, &["đơn hàng", "số đơn hàng", "tổng đơn hàng", "orders"]),
        field("visits", "visits", FieldKind::Integer, false, &["lượt truy cập", "số lượt truy cập", "visits", "visitors"]),
        field("buyers", "buyers", FieldKind::Integer, false, &["người mua", "số người mua", "buyers"]),
        field("conversion_rate", "conversion rate", FieldKind::Percentage, false, &["tỷ lệ chuyển đổi", "conversion rate"]),
        field("cancelled_revenue", "cancelled revenue", FieldKind::Money, false, &["doanh thu đơn hủy", "cancelled revenue"]),
        field("returned_revenue", "returned revenue", FieldKind::Money, false, &["doanh thu hoàn trả", "returned revenue", "refunds"]),
    ],
    duplicates: DuplicatePolicy::Reject,
    derive: derive_comprehensive,
};

pub static ADS: ImportProfile = ImportProfile {
    name: "ads",
    collection: "ads_reports",
    sheet_names: &["Quảng cáo", "Báo cáo quảng cáo", "Ads", "Advertising"],
    fields: &[
        field(DATE_FIELD, "date", FieldKind::Date, true, &["ngày", "ngày báo cáo", "date"]),
        field("campaign", "campaign", FieldKind::Text, false, &["tên chiến dịch", "chiến dịch", "campaign name", "campaign"]),
        field("spend", "spend", FieldKind::Money, true, &["chi phí", "chi tiêu", "spend", "cost"]),
        field("impressions", "impressions", FieldKind::Integer, false, &["lượt hiển thị", "số lần hiển thị", "impressions"]),
        field("clicks", "clicks", FieldKind::Integer, false, &["lượt nhấp", "số lượt nhấp", "clicks"]),
        field("ad_orders", "orders", FieldKind::Integer, false, &["đơn hàng", "orders", "conversions"]),
        field("ad_revenue", "revenue", FieldKind::Money, false, &["doanh thu", "doanh số", "gmv", "revenue", "sales"]),
    ],
    duplicates: DuplicatePolicy::Sum,
    derive: derive_ads,
};

static PROFILES: &[&ImportProfile] = &[&COMPREHENSIVE, &ADS];

fn derive_comprehensive(record: &mut ReportRecord) {
    record.set_ratio("average_order_value", "revenue", "orders", 1.0);
}

fn derive_ads(record: &mut ReportRecord) {
    record.set_ratio("ctr", "clicks", "impressions", 100.0);
    record.set_ratio("cpc", "spend", "clicks", 1.0);
    record.set_ratio("roas", "ad_revenue", "spend", 1.0);
}
