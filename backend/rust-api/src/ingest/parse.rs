//! Locale-aware cell parsers. Each one is pure and independent of the others.

use chrono::{Days, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;

use super::CellValue;

/// Largest serial Excel can represent (9999-12-31)
const EXCEL_MAX_SERIAL: f64 = 2_958_465.0;

lazy_static! {
    static ref DAY_FIRST_DATE: Regex =
        Regex::new(r"^(\d{1,2})[/\-.](\d{1,2})[/\-.](\d{4}|\d{2})$").unwrap();
    static ref YEAR_FIRST_DATE: Regex =
        Regex::new(r"^(\d{4})[/\-.](\d{1,2})[/\-.](\d{1,2})$").unwrap();
    static ref COMPACT_DATE: Regex = Regex::new(r"^(\d{4})(\d{2})(\d{2})$").unwrap();
    static ref SERIAL_TEXT: Regex = Regex::new(r"^\d{1,7}(\.\d+)?$").unwrap();
}

const CURRENCY_MARKERS: [&str; 6] = ["VNĐ", "VND", "vnđ", "vnd", "₫", "đ"];

/// Parses numbers written the Vietnamese way (`1.234.567,5`) or the
/// international way (`1,234,567.5`), with optional currency markers.
///
/// A lone separator followed by exactly three digits is a thousands separator
/// (`1.234` and `1,234` are both 1234); otherwise it is the decimal mark.
/// Parentheses or a leading minus make the value negative.
pub fn parse_number_text(raw: &str) -> Option<f64> {
    let mut text: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    for marker in CURRENCY_MARKERS {
        text = text.replace(marker, "");
    }

    let mut negative = false;
    if text.starts_with('(') && text.ends_with(')') && text.len() > 2 {
        negative = true;
        text = text[1..text.len() - 1].to_string();
    }
    if let Some(stripped) = text.strip_prefix('-') {
        negative = !negative;
        text = stripped.to_string();
    } else if let Some(stripped) = text.strip_prefix('+') {
        text = stripped.to_string();
    }

    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return None;
    }

    let normalized = normalize_separators(&text)?;
    let value: f64 = normalized.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

fn normalize_separators(text: &str) -> Option<String> {
    let dots = text.matches('.').count();
    let commas = text.matches(',').count();

    let normalized = match (dots, commas) {
        (0, 0) => text.to_string(),
        (_, 0) => resolve_single_kind(text, '.')?,
        (0, _) => resolve_single_kind(text, ',')?,
        _ => {
            // Both present: whichever comes last is the decimal mark.
            let last_dot = text.rfind('.')?;
            let last_comma = text.rfind(',')?;
            let (thousands, decimal) = if last_comma > last_dot {
                ('.', ',')
            } else {
                (',', '.')
            };
            if text.matches(decimal).count() > 1 {
                return None;
            }
            text.replace(thousands, "").replace(decimal, ".")
        }
    };

    if normalized.starts_with('.') {
        Some(format!("0{}", normalized))
    } else {
        Some(normalized)
    }
}

fn resolve_single_kind(text: &str, separator: char) -> Option<String> {
    let parts: Vec<&str> = text.split(separator).collect();
    if parts.len() > 2 {
        // Repeated separator can only be grouping, and every group must have 3 digits.
        if parts[1..].iter().all(|group| group.len() == 3) && !parts[0].is_empty() {
            return Some(parts.concat());
        }
        return None;
    }

    let (integer, fraction) = (parts[0], parts[1]);
    let grouping = fraction.len() == 3 && !integer.is_empty() && integer != "0";
    if grouping {
        Some(format!("{}{}", integer, fraction))
    } else {
        Some(format!("{}.{}", integer, fraction))
    }
}

/// Money and plain numeric cells.
pub fn parse_number(cell: &CellValue) -> Option<f64> {
    match cell {
        CellValue::Number(value) if value.is_finite() => Some(*value),
        CellValue::Text(text) => parse_number_text(text),
        _ => None,
    }
}

/// Whole counts such as orders or visits. Fractional values are rejected.
pub fn parse_integer(cell: &CellValue) -> Option<i64> {
    let value = parse_number(cell)?;
    let rounded = value.round();
    if (value - rounded).abs() > 1e-6 {
        return None;
    }
    Some(rounded as i64)
}

/// Percentages as 0-100 values.
///
/// `12,5%` gives 12.5. Numeric cells are scaled by 100 only when
/// `fractions` is set, i.e. the whole column holds Excel percent-formatted
/// fractions (see [`holds_fractions`]).
pub fn parse_percentage(cell: &CellValue, fractions: bool) -> Option<f64> {
    match cell {
        CellValue::Number(value) if value.is_finite() => {
            if fractions {
                Some(value * 100.0)
            } else {
                Some(*value)
            }
        }
        CellValue::Text(text) => {
            let trimmed = text.trim();
            match trimmed.strip_suffix('%') {
                Some(number) => parse_number_text(number),
                None => parse_number_text(trimmed),
            }
        }
        _ => None,
    }
}

/// True when a percentage column stores fractions: it has numeric cells and
/// none of them is above 1 in magnitude. A single cell of `1` next to `3.5`
/// is then read as 1%, not 100%.
pub fn holds_fractions<'a>(cells: impl IntoIterator<Item = &'a CellValue>) -> bool {
    let mut seen = false;
    for cell in cells {
        if let CellValue::Number(value) = cell {
            if !value.is_finite() {
                continue;
            }
            if value.abs() > 1.0 {
                return false;
            }
            seen = true;
        }
    }
    seen
}

/// Dates from Excel serials or text (`dd/mm/yyyy`, `dd-mm-yy`, `dd.mm.yyyy`,
/// `yyyy-mm-dd`, `yyyy/mm/dd`, `yyyymmdd`), ignoring any time part.
///
/// Day-first is preferred; month-first is only tried when day-first is impossible.
pub fn parse_date(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::Number(serial) | CellValue::DateSerial(serial) => excel_serial_to_date(*serial),
        CellValue::Text(text) => parse_date_text(text),
        _ => None,
    }
}

pub fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed
        .split(|c: char| c.is_whitespace() || c == 'T')
        .next()
        .unwrap_or(trimmed);

    if let Some(caps) = DAY_FIRST_DATE.captures(date_part) {
        let first: u32 = caps[1].parse().ok()?;
        let second: u32 = caps[2].parse().ok()?;
        let year = expand_year(&caps[3])?;
        return NaiveDate::from_ymd_opt(year, second, first)
            .or_else(|| NaiveDate::from_ymd_opt(year, first, second));
    }

    if let Some(caps) = YEAR_FIRST_DATE.captures(date_part) {
        let year: i32 = caps[1].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, caps[2].parse().ok()?, caps[3].parse().ok()?);
    }

    if let Some(caps) = COMPACT_DATE.captures(date_part) {
        let year: i32 = caps[1].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, caps[2].parse().ok()?, caps[3].parse().ok()?);
    }

    if SERIAL_TEXT.is_match(date_part) {
        return excel_serial_to_date(date_part.parse().ok()?);
    }

    None
}

/// Converts an Excel serial day number (1900 date system) to a date.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..=EXCEL_MAX_SERIAL).contains(&serial) {
        return None;
    }
    // Day 0 is 1899-12-30 once Excel's phantom 1900-02-29 is accounted for.
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(Days::new(serial.floor() as u64))
}

fn expand_year(text: &str) -> Option<i32> {
    let year: i32 = text.parse().ok()?;
    if text.len() == 2 {
        Some(2000 + year)
    } else {
        Some(year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn vietnamese_number_formats() {
        assert_eq!(parse_number_text("1.234.567"), Some(1_234_567.0));
        assert_eq!(parse_number_text("1.234.567,5"), Some(1_234_567.5));
        assert_eq!(parse_number_text("12,5"), Some(12.5));
        assert_eq!(parse_number_text("1.234"), Some(1234.0));
        assert_eq!(parse_number_text("0.125"), Some(0.125));
        assert_eq!(parse_number_text("₫1.500.000"), Some(1_500_000.0));
        assert_eq!(parse_number_text("250.000 đ"), Some(250_000.0));
        assert_eq!(parse_number_text("99.000 VNĐ"), Some(99_000.0));
    }

    #[test]
    fn international_number_formats() {
        assert_eq!(parse_number_text("1,234,567.89"), Some(1_234_567.89));
        assert_eq!(parse_number_text("1,234"), Some(1234.0));
        assert_eq!(parse_number_text("3.5"), Some(3.5));
        assert_eq!(parse_number_text("42"), Some(42.0));
    }

    #[test]
    fn negative_and_invalid_numbers() {
        assert_eq!(parse_number_text("-1.000"), Some(-1000.0));
        assert_eq!(parse_number_text("(2.500)"), Some(-2500.0));
        assert_eq!(parse_number_text(""), None);
        assert_eq!(parse_number_text("-"), None);
        assert_eq!(parse_number_text("abc"), None);
        assert_eq!(parse_number_text("1.23.4"), None);
        assert_eq!(parse_number_text("1,2,3.4,5"), None);
    }

    #[test]
    fn integers_reject_fractions() {
        assert_eq!(parse_integer(&CellValue::from("1.234")), Some(1234));
        assert_eq!(parse_integer(&CellValue::Number(17.0)), Some(17));
        assert_eq!(parse_integer(&CellValue::from("12,5")), None);
    }

    #[test]
    fn percentages() {
        assert_eq!(parse_percentage(&CellValue::from("12,5%"), false), Some(12.5));
        assert_eq!(parse_percentage(&CellValue::from("3.25 %"), true), Some(3.25));
        assert_eq!(parse_percentage(&CellValue::Number(0.5), true), Some(50.0));
        assert_eq!(parse_percentage(&CellValue::Number(4.2), false), Some(4.2));
        assert_eq!(parse_percentage(&CellValue::Number(1.0), false), Some(1.0));
        assert_eq!(parse_percentage(&CellValue::from("n/a"), false), None);
        assert_eq!(parse_percentage(&CellValue::Bool(true), false), None);
    }

    #[test]
    fn fraction_columns_are_detected_as_a_whole() {
        let fractions = [CellValue::Number(0.035), CellValue::Number(1.0), CellValue::Empty];
        assert!(holds_fractions(&fractions));

        let plain = [CellValue::Number(1.0), CellValue::Number(3.5)];
        assert!(!holds_fractions(&plain));

        let text_only = [CellValue::from("3,5%")];
        assert!(!holds_fractions(&text_only));
    }

    #[test]
    fn textual_dates() {
        assert_eq!(parse_date_text("05/03/2024"), Some(date(2024, 3, 5)));
        assert_eq!(parse_date_text("5-3-24"), Some(date(2024, 3, 5)));
        assert_eq!(parse_date_text("05.03.2024"), Some(date(2024, 3, 5)));
        assert_eq!(parse_date_text("2024-03-05"), Some(date(2024, 3, 5)));
        assert_eq!(parse_date_text("2024/3/5"), Some(date(2024, 3, 5)));
        assert_eq!(parse_date_text("20240305"), Some(date(2024, 3, 5)));
        assert_eq!(parse_date_text("2024-03-05T10:15:00"), Some(date(2024, 3, 5)));
        assert_eq!(parse_date_text("05/03/2024 23:59"), Some(date(2024, 3, 5)));
    }

    #[test]
    fn month_first_only_when_day_first_is_impossible() {
        assert_eq!(parse_date_text("03/25/2024"), Some(date(2024, 3, 25)));
        assert_eq!(parse_date_text("03/04/2024"), Some(date(2024, 4, 3)));
        assert_eq!(parse_date_text("31/31/2024"), None);
    }

    #[test]
    fn excel_serial_dates() {
        assert_eq!(excel_serial_to_date(45356.0), Some(date(2024, 3, 5)));
        assert_eq!(excel_serial_to_date(45356.75), Some(date(2024, 3, 5)));
        assert_eq!(parse_date(&CellValue::DateSerial(45356.0)), Some(date(2024, 3, 5)));
        assert_eq!(parse_date(&CellValue::from("45356")), Some(date(2024, 3, 5)));
        assert_eq!(excel_serial_to_date(0.0), None);
        assert_eq!(excel_serial_to_date(-3.0), None);
    }

    #[test]
    fn unparseable_dates() {
        assert_eq!(parse_date(&CellValue::Empty), None);
        assert_eq!(parse_date(&CellValue::from("hôm qua")), None);
        assert_eq!(parse_date(&CellValue::from("2024-13-01")), None);
    }

    proptest! {
        #[test]
        fn grouped_vietnamese_integers_parse_back(value in 1_000u64..10_000_000_000u64) {
            let digits = value.to_string();
            let mut grouped = String::new();
            for (index, ch) in digits.chars().enumerate() {
                if index > 0 && (digits.len() - index) % 3 == 0 {
                    grouped.push('.');
                }
                grouped.push(ch);
            }
            prop_assert_eq!(parse_number_text(&grouped), Some(value as f64));
        }

        #[test]
        fn iso_dates_parse_for_any_valid_day(days in 0u64..40_000) {
            let expected = date(2000, 1, 1).checked_add_days(Days::new(days)).unwrap();
            let text = expected.format("%Y-%m-%d").to_string();
            prop_assert_eq!(parse_date_text(&text), Some(expected));
            let vietnamese = expected.format("%d/%m/%Y").to_string();
            prop_assert_eq!(parse_date_text(&vietnamese), Some(expected));
        }
    }
}
