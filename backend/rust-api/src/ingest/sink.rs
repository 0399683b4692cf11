use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;

use super::profile::{ImportProfile, ReportRecord};

/// Destination for parsed report rows.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Upserts each record keyed by `(shop_id, report_date)` and returns how
    /// many were written.
    async fn upsert_reports(
        &self,
        profile: &ImportProfile,
        shop_id: &str,
        records: &[ReportRecord],
    ) -> Result<usize>;
}

type ReportKey = (&'static str, String, NaiveDate);

/// In-memory sink used by tests and local dry runs.
#[derive(Default)]
pub struct MemoryReportSink {
    reports: Mutex<HashMap<ReportKey, ReportRecord>>,
}

impl MemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, collection: &'static str, shop_id: &str, date: NaiveDate) -> Option<ReportRecord> {
        self.reports
            .lock()
            .ok()?
            .get(&(collection, shop_id.to_string(), date))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().map(|reports| reports.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReportSink for MemoryReportSink {
    async fn upsert_reports(
        &self,
        profile: &ImportProfile,
        shop_id: &str,
        records: &[ReportRecord],
    ) -> Result<usize> {
        let mut reports = self
            .reports
            .lock()
            .map_err(|_| anyhow!("report sink lock poisoned"))?;
        for record in records {
            reports.insert(
                (profile.collection, shop_id.to_string(), record.report_date),
                record.clone(),
            );
        }
        Ok(records.len())
    }
}
