use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use mongodb::bson::{doc, DateTime as BsonDateTime, Document};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};

use crate::metrics::track_db_operation;
use crate::models::{ProgressSnapshot, VideoProgress, VideoProgressRecord};
use crate::tracker::ProgressStore;

pub const VIDEO_PROGRESS_COLLECTION: &str = "video_progress";

/// Server-side [`ProgressStore`] over the `video_progress` collection.
#[derive(Clone)]
pub struct MongoProgressStore {
    collection: Collection<VideoProgressRecord>,
}

impl MongoProgressStore {
    pub fn new(mongo: Database) -> Self {
        Self {
            collection: mongo.collection::<VideoProgressRecord>(VIDEO_PROGRESS_COLLECTION),
        }
    }

    /// Unique natural key, so concurrent first writes cannot create two rows.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "exercise_id": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("user_exercise_unique".to_string())
                    .build(),
            )
            .build();
        self.collection
            .create_index(index)
            .await
            .context("Failed to create video_progress index")?;
        Ok(())
    }

    /// Upsert with a single retry: two first writes racing on the unique index
    /// leave exactly one winner, and the loser's retry becomes a plain update.
    async fn upsert_returning(&self, filter: Document, update: Document) -> Result<VideoProgressRecord> {
        let mut retried = false;
        loop {
            let result = self
                .collection
                .find_one_and_update(filter.clone(), update.clone())
                .upsert(true)
                .return_document(ReturnDocument::After)
                .await;

            match result {
                Ok(Some(record)) => return Ok(record),
                Ok(None) => return Err(anyhow!("Upsert returned no document")),
                Err(err) if !retried && is_duplicate_key(&err) => {
                    tracing::debug!("duplicate key on progress upsert, retrying as update");
                    retried = true;
                }
                Err(err) => return Err(err).context("Failed to upsert video progress"),
            }
        }
    }
}

fn key_filter(user_id: &str, exercise_id: &str) -> Document {
    doc! { "user_id": user_id, "exercise_id": exercise_id }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => command.code == 11000,
        ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == 11000,
        _ => false,
    }
}

/// `$max` keeps the monotonic fields from regressing, `$setOnInsert` seeds
/// the counter. The client's `session_count` is never written.
fn snapshot_update(snapshot: &ProgressSnapshot) -> Document {
    doc! {
        "$max": {
            "watched_minutes": snapshot.watched_minutes,
            "watch_percentage": snapshot.watch_percentage,
            "video_duration_minutes": snapshot.video_duration_minutes,
        },
        "$set": { "updatedAt": BsonDateTime::now() },
        "$setOnInsert": { "session_count": 0_i64, "is_requirement_met": false },
    }
}

fn increment_update() -> Document {
    doc! {
        "$inc": { "session_count": 1_i64 },
        "$set": { "updatedAt": BsonDateTime::now() },
        "$setOnInsert": {
            "watched_minutes": 0.0,
            "video_duration_minutes": 0.0,
            "watch_percentage": 0.0,
            "is_requirement_met": false,
        },
    }
}

#[async_trait]
impl ProgressStore for MongoProgressStore {
    async fn fetch_progress(
        &self,
        user_id: &str,
        exercise_id: &str,
    ) -> Result<Option<VideoProgress>> {
        let record = track_db_operation("find_one", VIDEO_PROGRESS_COLLECTION, async {
            self.collection
                .find_one(key_filter(user_id, exercise_id))
                .await
                .context("Failed to query video progress")
        })
        .await?;

        Ok(record.map(VideoProgress::from))
    }

    async fn upsert_progress(
        &self,
        user_id: &str,
        snapshot: &ProgressSnapshot,
    ) -> Result<VideoProgress> {
        let record = track_db_operation(
            "find_one_and_update",
            VIDEO_PROGRESS_COLLECTION,
            self.upsert_returning(
                key_filter(user_id, &snapshot.exercise_id),
                snapshot_update(snapshot),
            ),
        )
        .await?;

        Ok(record.into())
    }

    async fn increment_session_count(&self, user_id: &str, exercise_id: &str) -> Result<u32> {
        let record = track_db_operation(
            "increment",
            VIDEO_PROGRESS_COLLECTION,
            self.upsert_returning(key_filter(user_id, exercise_id), increment_update()),
        )
        .await?;

        Ok(record.session_count)
    }

    async fn mark_requirement_met(&self, user_id: &str, exercise_id: &str) -> Result<()> {
        track_db_operation("update_one", VIDEO_PROGRESS_COLLECTION, async {
            self.collection
                .update_one(
                    key_filter(user_id, exercise_id),
                    doc! { "$set": { "is_requirement_met": true } },
                )
                .await
                .context("Failed to mark requirement met")
        })
        .await?;
        Ok(())
    }
}
