use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{ProgressSnapshot, VideoProgress};

/// Operations the tracker needs from the remote store.
///
/// `increment_session_count` must be atomic at the store: two tabs completing
/// a session at once both get counted.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn fetch_progress(&self, user_id: &str, exercise_id: &str)
        -> Result<Option<VideoProgress>>;

    /// Upserts a snapshot, never lowering persisted maxima. Returns the stored row.
    async fn upsert_progress(
        &self,
        user_id: &str,
        snapshot: &ProgressSnapshot,
    ) -> Result<VideoProgress>;

    /// Returns the new authoritative count.
    async fn increment_session_count(&self, user_id: &str, exercise_id: &str) -> Result<u32>;

    /// Persists the derived completion flag. Stores without such a column keep the default.
    async fn mark_requirement_met(&self, _user_id: &str, _exercise_id: &str) -> Result<()> {
        Ok(())
    }
}

/// In-process store used by tests and local tooling.
#[derive(Default)]
pub struct MemoryProgressStore {
    rows: Mutex<HashMap<(String, String), VideoProgress>>,
    writes: Mutex<Vec<ProgressSnapshot>>,
    fail_writes: AtomicBool,
    fail_increments: AtomicBool,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(progress: VideoProgress) -> Self {
        let store = Self::default();
        store.rows_guard().insert(
            (progress.user_id.clone(), progress.exercise_id.clone()),
            progress,
        );
        store
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_increments(&self, fail: bool) {
        self.fail_increments.store(fail, Ordering::SeqCst);
    }

    /// Every snapshot that reached the store, in arrival order.
    pub fn writes(&self) -> Vec<ProgressSnapshot> {
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn get(&self, user_id: &str, exercise_id: &str) -> Option<VideoProgress> {
        self.rows_guard()
            .get(&(user_id.to_string(), exercise_id.to_string()))
            .cloned()
    }

    fn rows_guard(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), VideoProgress>> {
        self.rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn fetch_progress(
        &self,
        user_id: &str,
        exercise_id: &str,
    ) -> Result<Option<VideoProgress>> {
        Ok(self.get(user_id, exercise_id))
    }

    async fn upsert_progress(
        &self,
        user_id: &str,
        snapshot: &ProgressSnapshot,
    ) -> Result<VideoProgress> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("progress write rejected");
        }

        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(snapshot.clone());

        let mut rows = self.rows_guard();
        let row = rows
            .entry((user_id.to_string(), snapshot.exercise_id.clone()))
            .or_insert_with(|| VideoProgress::empty(user_id, &snapshot.exercise_id));
        let stored_sessions = row.session_count;
        row.merge_snapshot(snapshot);
        row.session_count = stored_sessions;
        Ok(row.clone())
    }

    async fn increment_session_count(&self, user_id: &str, exercise_id: &str) -> Result<u32> {
        if self.fail_increments.load(Ordering::SeqCst) {
            bail!("session increment rejected");
        }

        let mut rows = self.rows_guard();
        let row = rows
            .entry((user_id.to_string(), exercise_id.to_string()))
            .or_insert_with(|| VideoProgress::empty(user_id, exercise_id));
        row.session_count += 1;
        Ok(row.session_count)
    }

    async fn mark_requirement_met(&self, user_id: &str, exercise_id: &str) -> Result<()> {
        if let Some(row) = self
            .rows_guard()
            .get_mut(&(user_id.to_string(), exercise_id.to_string()))
        {
            row.is_requirement_met = true;
        }
        Ok(())
    }
}
