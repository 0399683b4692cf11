use std::sync::Arc;

use anyhow::Result;

use crate::metrics::{PROGRESS_WRITES_TOTAL, REQUIREMENTS_MET_TOTAL, SESSION_INCREMENTS_TOTAL};
use crate::models::{Exercise, ProgressSnapshot, VideoProgress};
use crate::tracker::evaluator::{self, RequirementInput, RequirementStatus};
use crate::tracker::ProgressStore;

use super::exercise_catalog::ExerciseCatalog;

/// Server side of the video requirement: store access plus evaluation.
pub struct ProgressService {
    store: Arc<dyn ProgressStore>,
    exercises: Arc<dyn ExerciseCatalog>,
}

impl ProgressService {
    pub fn new(store: Arc<dyn ProgressStore>, exercises: Arc<dyn ExerciseCatalog>) -> Self {
        Self { store, exercises }
    }

    pub async fn exercise(&self, exercise_id: &str) -> Result<Option<Exercise>> {
        self.exercises.find_exercise(exercise_id).await
    }

    pub async fn get_progress(
        &self,
        user_id: &str,
        exercise: &Exercise,
    ) -> Result<Option<VideoProgress>> {
        match self.store.fetch_progress(user_id, &exercise.id).await? {
            Some(mut progress) => {
                self.sync_requirement(user_id, exercise, &mut progress).await;
                Ok(Some(progress))
            }
            None => Ok(None),
        }
    }

    pub async fn record_progress(
        &self,
        user_id: &str,
        exercise: &Exercise,
        snapshot: &ProgressSnapshot,
    ) -> Result<VideoProgress> {
        let mut progress = match self.store.upsert_progress(user_id, snapshot).await {
            Ok(progress) => {
                PROGRESS_WRITES_TOTAL.with_label_values(&["success"]).inc();
                progress
            }
            Err(err) => {
                PROGRESS_WRITES_TOTAL.with_label_values(&["error"]).inc();
                return Err(err);
            }
        };

        tracing::debug!(
            user_id = %user_id,
            exercise_id = %exercise.id,
            watch_percentage = progress.watch_percentage,
            watched_minutes = progress.watched_minutes,
            "progress snapshot stored"
        );

        self.sync_requirement(user_id, exercise, &mut progress).await;
        Ok(progress)
    }

    /// Atomically counts one completed play-through and returns the new total.
    pub async fn complete_session(&self, user_id: &str, exercise: &Exercise) -> Result<u32> {
        let count = match self.store.increment_session_count(user_id, &exercise.id).await {
            Ok(count) => {
                SESSION_INCREMENTS_TOTAL.with_label_values(&["success"]).inc();
                count
            }
            Err(err) => {
                SESSION_INCREMENTS_TOTAL.with_label_values(&["error"]).inc();
                return Err(err);
            }
        };

        tracing::info!(
            user_id = %user_id,
            exercise_id = %exercise.id,
            session_count = count,
            "viewing session completed"
        );

        if let Some(mut progress) = self.store.fetch_progress(user_id, &exercise.id).await? {
            self.sync_requirement(user_id, exercise, &mut progress).await;
        }
        Ok(count)
    }

    /// Evaluation for display. A learner with no row yet gets an all-zero status.
    pub async fn requirement(&self, user_id: &str, exercise: &Exercise) -> Result<RequirementStatus> {
        let progress = self
            .store
            .fetch_progress(user_id, &exercise.id)
            .await?
            .unwrap_or_else(|| VideoProgress::empty(user_id, &exercise.id));

        Ok(evaluator::evaluate(&RequirementInput::from_progress(
            &progress, exercise,
        )))
    }

    /// Overwrites the derived flag and persists it the first time it becomes true.
    async fn sync_requirement(&self, user_id: &str, exercise: &Exercise, progress: &mut VideoProgress) {
        let met = evaluator::is_requirement_met(&RequirementInput::from_progress(progress, exercise));

        if met && !progress.is_requirement_met {
            match self.store.mark_requirement_met(user_id, &exercise.id).await {
                Ok(()) => {
                    REQUIREMENTS_MET_TOTAL.inc();
                    tracing::info!(
                        user_id = %user_id,
                        exercise_id = %exercise.id,
                        "video requirement met"
                    );
                }
                Err(err) => tracing::warn!(
                    user_id = %user_id,
                    exercise_id = %exercise.id,
                    error = %err,
                    "failed to persist requirement flag"
                ),
            }
        }
        progress.is_requirement_met = met;
    }
}
