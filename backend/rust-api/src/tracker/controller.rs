use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::models::{Exercise, ProgressSnapshot, VideoProgress};

use super::evaluator::{self, RequirementInput, RequirementStatus};
use super::recorder::{ProgressRecorder, RESTART_THRESHOLD};
use super::scheduler::{CoalescingScheduler, FlushSink, DEFAULT_DEBOUNCE};
use super::store::ProgressStore;
use super::TrackerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub debounce: Duration,
    pub max_wait: Option<Duration>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            max_wait: None,
        }
    }
}

struct StoreSink {
    store: Arc<dyn ProgressStore>,
    learner_id: String,
}

#[async_trait]
impl FlushSink<ProgressSnapshot> for StoreSink {
    async fn flush(&self, snapshot: ProgressSnapshot) -> anyhow::Result<()> {
        self.store
            .upsert_progress(&self.learner_id, &snapshot)
            .await
            .map(|_| ())
    }
}

/// Owns the video requirement state of one learner on one exercise.
///
/// Replaces the player component's lifecycle: `create` loads persisted
/// progress, `dispose` cancels the pending debounced write.
pub struct VideoRequirementController {
    learner_id: String,
    exercise: Exercise,
    store: Arc<dyn ProgressStore>,
    recorder: ProgressRecorder,
    gate: CoalescingScheduler<ProgressSnapshot>,
    session_count: u32,
    best_percentage: f64,
    session_counted: bool,
    disposed: bool,
}

impl VideoRequirementController {
    pub async fn create(
        store: Arc<dyn ProgressStore>,
        learner_id: impl Into<String>,
        exercise: Exercise,
        config: TrackerConfig,
    ) -> Result<Self, TrackerError> {
        let learner_id = learner_id.into();
        let persisted = store.fetch_progress(&learner_id, &exercise.id).await?;

        let (recorder, session_count, best_percentage) = match &persisted {
            Some(progress) => (
                ProgressRecorder::resume(
                    exercise.id.clone(),
                    progress.video_duration_minutes,
                    progress.watched_minutes,
                ),
                progress.session_count,
                progress.watch_percentage,
            ),
            None => (ProgressRecorder::new(exercise.id.clone()), 0, 0.0),
        };

        tracing::debug!(
            learner = %learner_id,
            exercise = %exercise.id,
            session_count,
            resumed = persisted.is_some(),
            "video requirement controller created"
        );

        let sink = Arc::new(StoreSink {
            store: Arc::clone(&store),
            learner_id: learner_id.clone(),
        });
        let gate = CoalescingScheduler::new(sink, config.debounce).with_max_wait(config.max_wait);

        Ok(Self {
            learner_id,
            exercise,
            store,
            recorder,
            gate,
            session_count,
            best_percentage,
            session_counted: false,
            disposed: false,
        })
    }

    pub fn on_video_loaded(&mut self, duration_seconds: f64) {
        if self.disposed {
            return;
        }
        self.recorder.on_video_loaded(duration_seconds);
    }

    /// Player tick. Schedules a debounced write when a new 10% milestone is reached.
    pub fn on_progress(&mut self, percent: f64) {
        if self.disposed {
            return;
        }

        // A counted play-through ends only when playback returns to the start.
        if self.session_counted && percent.is_finite() && percent <= RESTART_THRESHOLD {
            self.begin_play_through();
        }

        if let Some(snapshot) = self.recorder.on_progress(percent, self.session_count) {
            self.best_percentage = self.best_percentage.max(snapshot.watch_percentage);
            self.gate.schedule(snapshot);
        }
    }

    /// Explicit restart from the player (replay after "ended").
    ///
    /// Only viewing reported after this call is credited to the new play-through.
    pub fn on_playback_restarted(&mut self) {
        if self.disposed {
            return;
        }
        self.begin_play_through();
    }

    fn begin_play_through(&mut self) {
        self.recorder.start_new_session();
        self.session_counted = false;
        tracing::debug!(
            learner = %self.learner_id,
            exercise = %self.exercise.id,
            "new play-through started"
        );
    }

    /// Completion callback (>= 90% watched or the "ended" event).
    ///
    /// The store increments atomically and its answer becomes the local
    /// count. On failure the local count is left untouched.
    pub async fn on_playback_completed(&mut self) -> Result<u32, TrackerError> {
        if self.disposed {
            return Err(TrackerError::Disposed(self.exercise.id.clone()));
        }
        if self.session_counted {
            return Ok(self.session_count);
        }

        let count = match self
            .store
            .increment_session_count(&self.learner_id, &self.exercise.id)
            .await
        {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(
                    learner = %self.learner_id,
                    exercise = %self.exercise.id,
                    error = %err,
                    "session increment failed, keeping local count"
                );
                return Err(TrackerError::Store(err));
            }
        };

        self.session_count = count;
        self.session_counted = true;

        if let Some(snapshot) = self.recorder.mark_session_complete(count) {
            self.best_percentage = self.best_percentage.max(snapshot.watch_percentage);
            // The completion snapshot supersedes anything still waiting in the gate.
            self.gate.cancel();
            if let Err(err) = self.store.upsert_progress(&self.learner_id, &snapshot).await {
                tracing::warn!(
                    learner = %self.learner_id,
                    exercise = %self.exercise.id,
                    error = %err,
                    "failed to persist completed session snapshot"
                );
            }
        }

        tracing::info!(
            learner = %self.learner_id,
            exercise = %self.exercise.id,
            session_count = count,
            "video session completed"
        );

        Ok(count)
    }

    pub fn requirement_input(&self) -> RequirementInput {
        let required_count = self.exercise.required_count();
        RequirementInput {
            watched_minutes: self.recorder.watched_minutes(),
            required_minutes: evaluator::required_minutes(
                self.recorder.duration_minutes(),
                required_count,
            ),
            completion_percentage: self.best_percentage,
            session_count: self.session_count,
            required_session_count: required_count,
        }
    }

    pub fn status(&self) -> RequirementStatus {
        evaluator::evaluate(&self.requirement_input())
    }

    /// Local, read-mostly view of the learner's progress.
    pub fn progress(&self) -> VideoProgress {
        let mut progress = VideoProgress::empty(&self.learner_id, &self.exercise.id);
        progress.watched_minutes = self.recorder.watched_minutes();
        progress.video_duration_minutes = self.recorder.duration_minutes();
        progress.watch_percentage = self.best_percentage;
        progress.session_count = self.session_count;
        progress.is_requirement_met = evaluator::is_requirement_met(&self.requirement_input());
        progress
    }

    pub fn session_count(&self) -> u32 {
        self.session_count
    }

    pub fn has_pending_write(&self) -> bool {
        self.gate.is_pending()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Cancels the pending write. Later events are ignored.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if self.gate.cancel() {
            tracing::debug!(
                exercise = %self.exercise.id,
                "dropped pending progress write on dispose"
            );
        }
        self.disposed = true;
    }
}
