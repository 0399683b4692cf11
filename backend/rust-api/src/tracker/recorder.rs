use crate::models::ProgressSnapshot;

use super::evaluator::SESSION_COMPLETION_THRESHOLD;

/// Milestones are whole multiples of this many percent.
pub const MILESTONE_STEP: u32 = 10;

/// A position at or below this percent counts as playing from the start.
pub const RESTART_THRESHOLD: f64 = 5.0;

/// Turns high-frequency player callbacks into at most one snapshot per 10% milestone.
///
/// `watched_minutes` is cumulative across play-throughs: time banked by earlier
/// sessions plus the span between where the current one started and the
/// furthest point it reached. Seeking never adds time on its own.
#[derive(Debug, Clone)]
pub struct ProgressRecorder {
    exercise_id: String,
    duration_minutes: f64,
    banked_minutes: f64,
    /// `None` until the first tick of a session anchors it
    session_start_percent: Option<f64>,
    session_peak_percent: f64,
    last_milestone: u32,
}

impl ProgressRecorder {
    pub fn new(exercise_id: impl Into<String>) -> Self {
        Self {
            exercise_id: exercise_id.into(),
            duration_minutes: 0.0,
            banked_minutes: 0.0,
            session_start_percent: Some(0.0),
            session_peak_percent: 0.0,
            last_milestone: 0,
        }
    }

    /// Seeds the recorder from a persisted row.
    ///
    /// The persisted minutes are banked as-is and the resumed session is
    /// anchored at the first reported position.
    pub fn resume(
        exercise_id: impl Into<String>,
        duration_minutes: f64,
        watched_minutes: f64,
    ) -> Self {
        let mut recorder = Self::new(exercise_id);
        if duration_minutes.is_finite() && duration_minutes > 0.0 {
            recorder.duration_minutes = duration_minutes;
        }
        if watched_minutes.is_finite() && watched_minutes > 0.0 {
            recorder.banked_minutes = watched_minutes;
        }
        recorder.session_start_percent = None;
        recorder
    }

    /// Records the media duration from the first successful metadata load.
    ///
    /// Returns false when the value was ignored (already known, or not a positive number).
    pub fn on_video_loaded(&mut self, duration_seconds: f64) -> bool {
        if self.duration_minutes > 0.0 {
            return false;
        }
        if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
            tracing::debug!(
                exercise = %self.exercise_id,
                duration_seconds,
                "ignoring unusable video duration"
            );
            return false;
        }
        self.duration_minutes = duration_seconds / 60.0;
        true
    }

    /// Returns a snapshot when `percent` crosses a new 10% milestone.
    ///
    /// 5, 12, 19, 31 yields snapshots at 10 and 30 only. Nothing is emitted
    /// while the duration is unknown.
    pub fn on_progress(&mut self, percent: f64, session_count: u32) -> Option<ProgressSnapshot> {
        if !percent.is_finite() {
            return None;
        }
        let percent = percent.clamp(0.0, 100.0);
        let start = *self.session_start_percent.get_or_insert(if percent <= RESTART_THRESHOLD {
            0.0
        } else {
            percent
        });
        self.session_peak_percent = self.session_peak_percent.max(percent).max(start);

        if self.duration_minutes <= 0.0 {
            return None;
        }

        let milestone = milestone_for(percent);
        if milestone == 0 || milestone <= self.last_milestone {
            return None;
        }

        self.last_milestone = milestone;
        Some(self.snapshot(f64::from(milestone), session_count))
    }

    /// Snapshot written right after a completed session, marking at least
    /// [`SESSION_COMPLETION_THRESHOLD`] percent watched.
    pub fn mark_session_complete(&mut self, session_count: u32) -> Option<ProgressSnapshot> {
        if self.duration_minutes <= 0.0 {
            return None;
        }

        // A session with no ticks gets no credit for the completion bump
        if self.session_start_percent.is_none() {
            self.session_start_percent = Some(SESSION_COMPLETION_THRESHOLD);
        }
        self.session_peak_percent = self.session_peak_percent.max(SESSION_COMPLETION_THRESHOLD);
        let milestone = milestone_for(self.session_peak_percent);
        self.last_milestone = self.last_milestone.max(milestone);

        let percentage = self
            .session_peak_percent
            .max(SESSION_COMPLETION_THRESHOLD)
            .floor();
        Some(self.snapshot(percentage, session_count))
    }

    /// Banks the current play-through and starts counting milestones from zero.
    ///
    /// The new session is anchored by the next tick, so only viewing done from
    /// that position onwards is credited.
    pub fn start_new_session(&mut self) {
        self.banked_minutes = self.watched_minutes();
        self.session_start_percent = None;
        self.session_peak_percent = 0.0;
        self.last_milestone = 0;
    }

    pub fn watched_minutes(&self) -> f64 {
        self.banked_minutes + self.duration_minutes * self.session_span_percent() / 100.0
    }

    fn session_span_percent(&self) -> f64 {
        match self.session_start_percent {
            Some(start) => (self.session_peak_percent - start).max(0.0),
            None => 0.0,
        }
    }

    pub fn duration_minutes(&self) -> f64 {
        self.duration_minutes
    }

    pub fn last_milestone(&self) -> u32 {
        self.last_milestone
    }

    pub fn session_peak_percent(&self) -> f64 {
        self.session_peak_percent
    }

    fn snapshot(&self, watch_percentage: f64, session_count: u32) -> ProgressSnapshot {
        ProgressSnapshot {
            exercise_id: self.exercise_id.clone(),
            watched_minutes: self.watched_minutes(),
            video_duration_minutes: self.duration_minutes,
            watch_percentage,
            session_count,
        }
    }
}

fn milestone_for(percent: f64) -> u32 {
    let floored = percent.floor() as u32;
    floored - floored % MILESTONE_STEP
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(duration_seconds: f64) -> ProgressRecorder {
        let mut recorder = ProgressRecorder::new("ex-1");
        assert!(recorder.on_video_loaded(duration_seconds));
        recorder
    }

    #[test]
    fn only_new_multiples_of_ten_are_emitted() {
        let mut recorder = loaded(1800.0);
        let milestones: Vec<f64> = [5.0, 12.0, 19.0, 31.0]
            .into_iter()
            .filter_map(|pct| recorder.on_progress(pct, 0))
            .map(|snapshot| snapshot.watch_percentage)
            .collect();

        assert_eq!(milestones, vec![10.0, 30.0]);
    }

    #[test]
    fn repeated_callbacks_do_not_rewrite_the_same_milestone() {
        let mut recorder = loaded(600.0);
        let emitted = (0..1000)
            .map(|tick| f64::from(tick) / 10.0)
            .filter_map(|pct| recorder.on_progress(pct, 0))
            .count();

        assert_eq!(emitted, 9);
        assert!(recorder.on_progress(100.0, 0).is_some());
        assert!(recorder.on_progress(100.0, 0).is_none());
    }

    #[test]
    fn nothing_is_emitted_without_duration() {
        let mut recorder = ProgressRecorder::new("ex-1");
        assert!(recorder.on_progress(50.0, 0).is_none());
        assert!(recorder.mark_session_complete(1).is_none());
        assert!(!recorder.on_video_loaded(0.0));
        assert!(!recorder.on_video_loaded(f64::NAN));
    }

    #[test]
    fn duration_is_taken_from_first_load_only() {
        let mut recorder = loaded(1800.0);
        assert!(!recorder.on_video_loaded(60.0));
        assert_eq!(recorder.duration_minutes(), 30.0);
    }

    #[test]
    fn snapshot_carries_watched_minutes_and_session_count() {
        let mut recorder = loaded(1800.0);
        let snapshot = recorder.on_progress(50.0, 2).unwrap();

        assert_eq!(snapshot.exercise_id, "ex-1");
        assert_eq!(snapshot.watched_minutes, 15.0);
        assert_eq!(snapshot.video_duration_minutes, 30.0);
        assert_eq!(snapshot.watch_percentage, 50.0);
        assert_eq!(snapshot.session_count, 2);
    }

    #[test]
    fn mark_session_complete_marks_at_least_ninety_percent() {
        let mut recorder = loaded(1800.0);
        recorder.on_progress(85.0, 0);
        let snapshot = recorder.mark_session_complete(1).unwrap();

        assert_eq!(snapshot.watch_percentage, 90.0);
        assert_eq!(snapshot.watched_minutes, 27.0);
        assert_eq!(snapshot.session_count, 1);
        assert!(recorder.on_progress(95.0, 1).is_none());
        assert!(recorder.on_progress(100.0, 1).is_some());
    }

    #[test]
    fn new_session_banks_watched_time() {
        let mut recorder = ProgressRecorder::resume("ex-1", 30.0, 60.0);
        recorder.on_progress(0.0, 2);
        recorder.on_progress(100.0, 2);
        assert_eq!(recorder.watched_minutes(), 90.0);

        recorder.start_new_session();
        assert_eq!(recorder.last_milestone(), 0);
        recorder.on_progress(2.0, 3);
        let snapshot = recorder.on_progress(10.0, 3).unwrap();
        assert_eq!(snapshot.watched_minutes, 93.0);
    }

    #[test]
    fn resumed_position_is_not_counted_twice() {
        let mut recorder = ProgressRecorder::resume("ex-1", 10.0, 5.0);
        recorder.on_progress(50.0, 0);
        assert_eq!(recorder.watched_minutes(), 5.0);

        recorder.on_progress(80.0, 0);
        assert_eq!(recorder.watched_minutes(), 8.0);
    }

    #[test]
    fn session_started_mid_video_only_credits_what_follows() {
        let mut recorder = loaded(600.0);
        recorder.on_progress(100.0, 0);
        recorder.start_new_session();

        recorder.on_progress(89.0, 1);
        assert_eq!(recorder.watched_minutes(), 10.0);
        recorder.on_progress(100.0, 1);
        assert!((recorder.watched_minutes() - 11.1).abs() < 1e-9);
    }

    #[test]
    fn completion_without_ticks_adds_no_time() {
        let mut recorder = ProgressRecorder::resume("ex-1", 10.0, 10.0);
        let snapshot = recorder.mark_session_complete(2).unwrap();

        assert_eq!(snapshot.watch_percentage, 90.0);
        assert_eq!(snapshot.watched_minutes, 10.0);
    }
}
