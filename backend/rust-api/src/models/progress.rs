use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::bson_datetime_as_chrono;

/// Per-learner, per-exercise row stored in the "video_progress" collection.
///
/// `(user_id, exercise_id)` is the natural key. `watched_minutes` and
/// `watch_percentage` are only ever raised with `$max`, `session_count`
/// only with `$inc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoProgressRecord {
    pub user_id: String,
    pub exercise_id: String,
    #[serde(default)]
    pub watched_minutes: f64,
    #[serde(default)]
    pub video_duration_minutes: f64,
    #[serde(default)]
    pub watch_percentage: f64,
    #[serde(default)]
    pub session_count: u32,
    #[serde(default)]
    pub is_requirement_met: bool,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

/// Progress as exposed over the API and held by the tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoProgress {
    pub user_id: String,
    pub exercise_id: String,
    pub watched_minutes: f64,
    pub video_duration_minutes: f64,
    pub watch_percentage: f64,
    pub session_count: u32,
    pub is_requirement_met: bool,
    pub updated_at: DateTime<Utc>,
}

impl VideoProgress {
    pub fn empty(user_id: &str, exercise_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            exercise_id: exercise_id.to_string(),
            watched_minutes: 0.0,
            video_duration_minutes: 0.0,
            watch_percentage: 0.0,
            session_count: 0,
            is_requirement_met: false,
            updated_at: Utc::now(),
        }
    }

    /// Folds a snapshot into this row without letting any monotonic field regress.
    pub fn merge_snapshot(&mut self, snapshot: &ProgressSnapshot) {
        self.watched_minutes = self.watched_minutes.max(snapshot.watched_minutes);
        self.video_duration_minutes = self
            .video_duration_minutes
            .max(snapshot.video_duration_minutes);
        self.watch_percentage = self.watch_percentage.max(snapshot.watch_percentage);
        self.session_count = self.session_count.max(snapshot.session_count);
        self.updated_at = Utc::now();
    }
}

impl From<VideoProgressRecord> for VideoProgress {
    fn from(record: VideoProgressRecord) -> Self {
        Self {
            user_id: record.user_id,
            exercise_id: record.exercise_id,
            watched_minutes: record.watched_minutes,
            video_duration_minutes: record.video_duration_minutes,
            watch_percentage: record.watch_percentage,
            session_count: record.session_count,
            is_requirement_met: record.is_requirement_met,
            updated_at: record.updated_at,
        }
    }
}

/// Point-in-time progress emitted by the recorder and written by the debounce gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ProgressSnapshot {
    #[validate(length(min = 1, max = 128, message = "exercise_id must not be empty"))]
    pub exercise_id: String,

    #[validate(range(min = 0.0, message = "watched_minutes must not be negative"))]
    pub watched_minutes: f64,

    #[validate(range(min = 0.0, message = "video_duration_minutes must not be negative"))]
    pub video_duration_minutes: f64,

    #[validate(range(
        min = 0.0,
        max = 100.0,
        message = "watch_percentage must be between 0 and 100"
    ))]
    pub watch_percentage: f64,

    /// Informational only, the store never lowers its own counter from this
    #[serde(default)]
    pub session_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCountResponse {
    pub exercise_id: String,
    pub session_count: u32,
}
