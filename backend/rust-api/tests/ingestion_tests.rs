mod common;

use chrono::NaiveDate;
use common::{num, text, workbook, COMPREHENSIVE_HEADER};
use shopops_api::ingest::profile::{FieldValue, ADS, COMPREHENSIVE};
use shopops_api::ingest::{run_import, IngestError, MemoryReportSink, ReportSink};

fn march(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

#[test]
fn blank_date_row_is_skipped_and_reported() {
    let bytes = workbook(
        "Báo cáo tổng hợp",
        &COMPREHENSIVE_HEADER,
        &common::comprehensive_rows_with_blank_date(),
    );

    let batch = run_import(&COMPREHENSIVE, bytes).unwrap();
    let result = &batch.result;

    assert_eq!(result.total_rows, 10);
    assert_eq!(result.processed_rows, 9);
    assert_eq!(result.skipped_count, 1);
    assert_eq!(result.skipped_details.len(), 1);
    // Header is spreadsheet row 1, so the seventh data row is row 8
    assert_eq!(result.skipped_details[0].row, 8);
    assert!(result.skipped_details[0].reason.contains("date"));
    assert_eq!(result.sheet_name, "Báo cáo tổng hợp");

    assert_eq!(batch.records.len(), 9);
    let first = &batch.records[0];
    assert_eq!(first.report_date, march(1));
    assert_eq!(first.number("revenue"), Some(1_250_000.0));
    assert_eq!(first.values.get("orders"), Some(&FieldValue::Integer(3)));
    assert_eq!(first.number("conversion_rate"), Some(2.5));
    assert_eq!(first.source_rows, vec![2]);
    assert!(batch.records.iter().all(|r| r.report_date != march(7)));
}

#[test]
fn missing_required_column_aborts_the_import() {
    let bytes = workbook(
        "Tổng hợp",
        &["Ngày", "Doanh thu", "Lượt truy cập"],
        &[vec![text("01/03/2024"), num(1000.0), num(10.0)]],
    );

    match run_import(&COMPREHENSIVE, bytes) {
        Err(IngestError::MissingColumns(missing)) => assert_eq!(missing, vec!["orders".to_string()]),
        other => panic!("expected missing columns, got {:?}", other.map(|b| b.result)),
    }
}

#[test]
fn unrelated_sheets_are_not_guessed() {
    let mut book = rust_xlsxwriter::Workbook::new();
    book.add_worksheet().set_name("Kho hàng").unwrap();
    book.add_worksheet().set_name("Nhân sự").unwrap();
    let bytes = book.save_to_buffer().unwrap();

    let err = run_import(&COMPREHENSIVE, bytes).unwrap_err();
    assert!(matches!(err, IngestError::SheetNotFound { .. }));
    assert!(err.to_string().contains("Kho hàng"));
}

#[test]
fn header_below_title_rows_and_fuzzy_sheet_name() {
    let mut book = rust_xlsxwriter::Workbook::new();
    book.add_worksheet().set_name("Ghi chú").unwrap();
    let sheet = book.add_worksheet();
    sheet.set_name("Quảng cáo T3").unwrap();
    sheet.write_string(0, 0, "Báo cáo quảng cáo tháng 3").unwrap();
    for (col, title) in ["Ngày", "Tên chiến dịch", "Chi phí", "Lượt hiển thị", "Lượt nhấp"]
        .iter()
        .enumerate()
    {
        sheet.write_string(2, col as u16, *title).unwrap();
    }
    // 45356 is the Excel serial for 2024-03-05
    sheet.write_number(3, 0, 45356.0).unwrap();
    sheet.write_string(3, 1, "Tết").unwrap();
    sheet.write_string(3, 2, "1.000.000 ₫").unwrap();
    sheet.write_number(3, 3, 2000.0).unwrap();
    sheet.write_number(3, 4, 40.0).unwrap();
    sheet.write_string(4, 0, "05/03/2024").unwrap();
    sheet.write_string(4, 1, "Flash sale").unwrap();
    sheet.write_string(4, 2, "500.000").unwrap();
    sheet.write_number(4, 3, 2000.0).unwrap();
    sheet.write_number(4, 4, 60.0).unwrap();
    let bytes = book.save_to_buffer().unwrap();

    let batch = run_import(&ADS, bytes).unwrap();

    assert_eq!(batch.result.sheet_name, "Quảng cáo T3");
    assert_eq!(batch.result.total_rows, 2);
    assert_eq!(batch.result.processed_rows, 2);
    assert_eq!(batch.records.len(), 1);

    let day = &batch.records[0];
    assert_eq!(day.report_date, march(5));
    assert_eq!(day.number("spend"), Some(1_500_000.0));
    assert_eq!(day.number("clicks"), Some(100.0));
    assert_eq!(day.number("ctr"), Some(2.5));
    assert_eq!(day.number("cpc"), Some(15_000.0));
    assert_eq!(
        day.values.get("campaign"),
        Some(&FieldValue::Text("Tết; Flash sale".into()))
    );
    assert_eq!(day.source_rows, vec![4, 5]);
}

#[test]
fn duplicate_day_in_daily_report_is_rejected() {
    let bytes = workbook(
        "Tổng hợp",
        &COMPREHENSIVE_HEADER,
        &[
            vec![text("01/03/2024"), num(100.0), num(1.0), num(10.0), text("1%")],
            vec![text("01/03/2024"), num(200.0), num(2.0), num(20.0), text("1%")],
            vec![text("02/03/2024"), text("abc"), num(2.0), num(20.0), text("1%")],
        ],
    );

    let batch = run_import(&COMPREHENSIVE, bytes).unwrap();
    let result = &batch.result;

    assert_eq!(result.total_rows, 3);
    assert_eq!(result.processed_rows, 1);
    assert_eq!(result.skipped_count, 2);
    assert_eq!(result.skipped_details[0].row, 3);
    assert!(result.skipped_details[0].reason.contains("duplicate date"));
    assert_eq!(result.skipped_details[1].row, 4);
    assert!(result.skipped_details[1].reason.contains("revenue"));
    assert_eq!(batch.records[0].number("revenue"), Some(100.0));
}

#[tokio::test]
async fn reimporting_a_day_replaces_its_figures() {
    let sink = MemoryReportSink::new();

    for revenue in ["1.000.000", "2.000.000"] {
        let bytes = workbook(
            "Tổng hợp",
            &COMPREHENSIVE_HEADER,
            &[vec![text("01/03/2024"), text(revenue), num(4.0), num(40.0), text("10%")]],
        );
        let batch = run_import(&COMPREHENSIVE, bytes).unwrap();
        let written = sink
            .upsert_reports(&COMPREHENSIVE, "shop-1", &batch.records)
            .await
            .unwrap();
        assert_eq!(written, 1);
    }

    assert_eq!(sink.len(), 1);
    let stored = sink
        .get(COMPREHENSIVE.collection, "shop-1", march(1))
        .unwrap();
    assert_eq!(stored.number("revenue"), Some(2_000_000.0));
    assert_eq!(stored.number("average_order_value"), Some(500_000.0));
}
