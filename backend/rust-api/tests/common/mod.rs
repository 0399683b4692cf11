#![allow(dead_code)]

use axum::{body::to_bytes, response::Response, Router};
use std::sync::Arc;

use shopops_api::{
    config::Config,
    create_router,
    ingest::MemoryReportSink,
    models::Exercise,
    services::{exercise_catalog::MemoryExerciseCatalog, AppState, Backends},
    tracker::MemoryProgressStore,
};

pub const BOUNDARY: &str = "shopops-test-boundary";

/// Router over in-process backends, plus handles for assertions.
pub struct TestApp {
    pub router: Router,
    pub progress: Arc<MemoryProgressStore>,
    pub reports: Arc<MemoryReportSink>,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn exercise(id: &str, required_viewing_count: u32) -> Exercise {
    Exercise {
        id: id.to_string(),
        title: format!("Bài tập {}", id),
        order_index: 1,
        video_url: Some(format!("videos/{}.mp4", id)),
        required_viewing_count,
        is_required: true,
    }
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(Config::local())
}

pub fn create_test_app_with(config: Config) -> TestApp {
    init_tracing();

    let progress = Arc::new(MemoryProgressStore::new());
    let reports = Arc::new(MemoryReportSink::new());
    let exercises = Arc::new(MemoryExerciseCatalog::with_exercises([
        exercise("ex-1", 2),
        exercise("ex-2", 1),
    ]));

    let state = AppState::from_backends(
        config,
        Backends {
            progress: progress.clone(),
            exercises,
            reports: reports.clone(),
        },
        None,
    )
    .expect("Failed to build test app state");

    TestApp {
        router: create_router(Arc::new(state)),
        progress,
        reports,
    }
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// multipart/form-data body with a `shop_id` text part and a `file` part.
pub fn multipart_body(shop_id: Option<&str>, file_name: &str, file: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(shop_id) = shop_id {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"shop_id\"\r\n\r\n{shop_id}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/vnd.openxmlformats-officedocument.spreadsheetml.sheet\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(file);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Builds an .xlsx workbook with one sheet holding `header` and `rows`.
///
/// Numbers in `rows` are written as numeric cells, everything else as text,
/// and empty strings leave the cell blank.
pub fn workbook(sheet: &str, header: &[&str], rows: &[Vec<Cell>]) -> Vec<u8> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet).unwrap();

    for (col, title) in header.iter().enumerate() {
        worksheet.write_string(0, col as u16, *title).unwrap();
    }
    for (index, row) in rows.iter().enumerate() {
        let row_index = index as u32 + 1;
        for (col, cell) in row.iter().enumerate() {
            match cell {
                Cell::Text(text) if text.is_empty() => {}
                Cell::Text(text) => {
                    worksheet.write_string(row_index, col as u16, text).unwrap();
                }
                Cell::Number(number) => {
                    worksheet.write_number(row_index, col as u16, *number).unwrap();
                }
            }
        }
    }

    workbook.save_to_buffer().unwrap()
}

#[derive(Debug, Clone)]
pub enum Cell {
    Text(String),
    Number(f64),
}

pub fn text(value: &str) -> Cell {
    Cell::Text(value.to_string())
}

pub fn num(value: f64) -> Cell {
    Cell::Number(value)
}

/// Ten daily rows for March 2024; the seventh has no date.
pub fn comprehensive_rows_with_blank_date() -> Vec<Vec<Cell>> {
    (1..=10)
        .map(|day| {
            let date = if day == 7 {
                String::new()
            } else {
                format!("{:02}/03/2024", day)
            };
            vec![
                text(&date),
                text(&format!("{}.250.000", day)),
                num(f64::from(day * 3)),
                num(f64::from(day * 100)),
                text("2,5%"),
            ]
        })
        .collect()
}

pub const COMPREHENSIVE_HEADER: [&str; 5] = [
    "Ngày",
    "Doanh thu (₫)",
    "Số đơn hàng",
    "Lượt truy cập",
    "Tỷ lệ chuyển đổi",
];
