use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use mongodb::bson::{doc, Bson, DateTime as BsonDateTime, Document};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::IndexOptions;
use mongodb::{Database, IndexModel};

use crate::ingest::profile::FieldValue;
use crate::ingest::{ImportProfile, ReportRecord, ReportSink};
use crate::metrics::track_db_operation;
use crate::utils::retry::{retry_when, RetryConfig};

/// Writes aggregated report rows into the profile's collection, one document
/// per shop and day. Re-importing a day replaces its figures.
pub struct MongoReportSink {
    mongo: Database,
    retry: RetryConfig,
}

impl MongoReportSink {
    pub fn new(mongo: Database) -> Self {
        Self {
            mongo,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn ensure_indexes(&self) -> Result<()> {
        for profile in ImportProfile::all() {
            let index = IndexModel::builder()
                .keys(doc! { "shop_id": 1, "report_date": 1 })
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .name("shop_date_unique".to_string())
                        .build(),
                )
                .build();
            self.mongo
                .collection::<Document>(profile.collection)
                .create_index(index)
                .await
                .with_context(|| format!("Failed to create index on {}", profile.collection))?;
        }
        Ok(())
    }
}

/// Network and server-selection failures are worth another attempt, bad documents are not.
fn is_transient(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<MongoError>() {
        Some(mongo_err) => {
            mongo_err.contains_label("RetryableWriteError")
                || matches!(
                    mongo_err.kind.as_ref(),
                    ErrorKind::Io(_)
                        | ErrorKind::ServerSelection { .. }
                        | ErrorKind::ConnectionPoolCleared { .. }
                )
        }
        None => false,
    }
}

fn report_day(date: NaiveDate) -> BsonDateTime {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    BsonDateTime::from_millis(midnight.timestamp_millis())
}

fn to_bson(value: &FieldValue) -> Bson {
    match value {
        FieldValue::Number(number) => Bson::Double(*number),
        FieldValue::Integer(number) => Bson::Int64(*number),
        FieldValue::Text(text) => Bson::String(text.clone()),
    }
}

/// `$set` body for one record. Fields absent from this upload are left as stored.
pub(crate) fn report_fields(shop_id: &str, record: &ReportRecord) -> Document {
    let mut fields = doc! {
        "shop_id": shop_id,
        "report_date": report_day(record.report_date),
        "date_key": record.report_date.format("%Y-%m-%d").to_string(),
        "source_rows": record.source_rows.iter().map(|row| *row as i64).collect::<Vec<_>>(),
        "updatedAt": BsonDateTime::now(),
    };
    for (field, value) in &record.values {
        fields.insert(*field, to_bson(value));
    }
    fields
}

#[async_trait]
impl ReportSink for MongoReportSink {
    async fn upsert_reports(
        &self,
        profile: &ImportProfile,
        shop_id: &str,
        records: &[ReportRecord],
    ) -> Result<usize> {
        let collection = self.mongo.collection::<Document>(profile.collection);
        let mut written = 0;

        for record in records {
            let filter = doc! {
                "shop_id": shop_id,
                "report_date": report_day(record.report_date),
            };
            let update = doc! {
                "$set": report_fields(shop_id, record),
                "$setOnInsert": { "createdAt": BsonDateTime::now() },
            };

            let (collection, filter, update) = (&collection, &filter, &update);
            track_db_operation(
                "upsert",
                profile.collection,
                retry_when(self.retry.clone(), is_transient, || async move {
                    collection
                        .update_one(filter.clone(), update.clone())
                        .upsert(true)
                        .await
                        .with_context(|| {
                            format!("Failed to upsert report for {}", record.report_date)
                        })
                }),
            )
            .await?;
            written += 1;
        }

        Ok(written)
    }
}
