//! Pure requirement evaluation for video exercises.
//!
//! Nothing here performs I/O or keeps state, so every function can be called
//! from the tracker, the HTTP handlers and tests alike.

use serde::Serialize;

use crate::models::{Exercise, VideoProgress};

/// Watch percentage at which a play-through counts as a completed session.
pub const SESSION_COMPLETION_THRESHOLD: f64 = 90.0;

/// Best-session watch percentage required before an exercise can be marked complete.
///
/// Equal to [`SESSION_COMPLETION_THRESHOLD`] today, kept separate so either can move.
pub const REQUIREMENT_WATCH_THRESHOLD: f64 = 90.0;

/// Total minutes a learner has to watch. Zero while the duration is unknown.
pub fn required_minutes(duration_minutes: f64, required_count: u32) -> f64 {
    if !duration_minutes.is_finite() || duration_minutes <= 0.0 {
        return 0.0;
    }
    duration_minutes * f64::from(required_count)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RequirementInput {
    pub watched_minutes: f64,
    pub required_minutes: f64,
    pub completion_percentage: f64,
    pub session_count: u32,
    pub required_session_count: u32,
}

impl RequirementInput {
    pub fn from_progress(progress: &VideoProgress, exercise: &Exercise) -> Self {
        let required_count = exercise.required_count();
        Self {
            watched_minutes: progress.watched_minutes,
            required_minutes: required_minutes(progress.video_duration_minutes, required_count),
            completion_percentage: progress.watch_percentage,
            session_count: progress.session_count,
            required_session_count: required_count,
        }
    }
}

/// True only when watched time, completion percentage and session count all pass.
///
/// An unknown duration (`required_minutes <= 0`) is never complete.
pub fn is_requirement_met(input: &RequirementInput) -> bool {
    if !(input.required_minutes > 0.0) {
        return false;
    }

    input.watched_minutes >= input.required_minutes
        && input.completion_percentage >= REQUIREMENT_WATCH_THRESHOLD
        && input.session_count >= input.required_session_count
}

/// Progress for display: the lower of time-based and session-based progress.
///
/// Never reports 100 while [`is_requirement_met`] disagrees.
pub fn display_progress(input: &RequirementInput) -> f64 {
    let time_progress = if input.required_minutes > 0.0 {
        (input.watched_minutes / input.required_minutes * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    let session_progress = if input.required_session_count == 0 {
        100.0
    } else {
        (f64::from(input.session_count) / f64::from(input.required_session_count) * 100.0)
            .min(100.0)
    };

    let progress = time_progress.min(session_progress);
    if progress >= 100.0 && !is_requirement_met(input) {
        99.0
    } else {
        progress
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RequirementStatus {
    pub is_met: bool,
    pub display_progress: f64,
    pub required_minutes: f64,
    pub remaining_minutes: f64,
    pub remaining_sessions: u32,
}

pub fn evaluate(input: &RequirementInput) -> RequirementStatus {
    RequirementStatus {
        is_met: is_requirement_met(input),
        display_progress: display_progress(input),
        required_minutes: input.required_minutes,
        remaining_minutes: (input.required_minutes - input.watched_minutes).max(0.0),
        remaining_sessions: input
            .required_session_count
            .saturating_sub(input.session_count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn input(
        watched: f64,
        required: f64,
        pct: f64,
        sessions: u32,
        required_sessions: u32,
    ) -> RequirementInput {
        RequirementInput {
            watched_minutes: watched,
            required_minutes: required,
            completion_percentage: pct,
            session_count: sessions,
            required_session_count: required_sessions,
        }
    }

    #[test]
    fn watched_time_short_of_requirement_is_incomplete() {
        let required = required_minutes(30.0, 3);
        assert_eq!(required, 90.0);
        assert!(!is_requirement_met(&input(75.0, required, 95.0, 2, 3)));
    }

    #[test]
    fn all_three_conditions_met_is_complete() {
        let required = required_minutes(45.0, 2);
        assert_eq!(required, 90.0);
        assert!(is_requirement_met(&input(90.0, required, 91.0, 2, 2)));
    }

    #[test]
    fn unknown_duration_is_incomplete() {
        let required = required_minutes(0.0, 2);
        assert_eq!(required, 0.0);
        assert!(!is_requirement_met(&input(120.0, required, 100.0, 5, 2)));
        assert_eq!(display_progress(&input(120.0, required, 100.0, 5, 2)), 0.0);
    }

    #[test]
    fn display_progress_is_the_weaker_dimension() {
        let status = evaluate(&input(45.0, 90.0, 95.0, 2, 2));
        assert_eq!(status.display_progress, 50.0);
        assert_eq!(status.remaining_minutes, 45.0);
        assert_eq!(status.remaining_sessions, 0);

        let status = evaluate(&input(90.0, 90.0, 95.0, 1, 4));
        assert_eq!(status.display_progress, 25.0);
        assert_eq!(status.remaining_sessions, 3);
    }

    #[test]
    fn display_progress_holds_back_when_percentage_is_low() {
        let low_attention = input(200.0, 90.0, 60.0, 3, 2);
        assert!(!is_requirement_met(&low_attention));
        assert_eq!(display_progress(&low_attention), 99.0);
    }

    #[test]
    fn thresholds_are_ninety_percent() {
        assert_eq!(SESSION_COMPLETION_THRESHOLD, 90.0);
        assert_eq!(REQUIREMENT_WATCH_THRESHOLD, 90.0);
        assert!(!is_requirement_met(&input(90.0, 90.0, 89.99, 2, 2)));
        assert!(is_requirement_met(&input(90.0, 90.0, 90.0, 2, 2)));
    }

    proptest! {
        #[test]
        fn required_minutes_is_duration_times_count(
            duration in 0.1f64..600.0,
            count in 1u32..20,
        ) {
            prop_assert_eq!(required_minutes(duration, count), duration * f64::from(count));
        }

        #[test]
        fn short_watch_time_never_completes(
            duration in 0.1f64..600.0,
            count in 1u32..20,
            shortfall in 0.001f64..1.0,
            pct in 0.0f64..=100.0,
            sessions in 0u32..50,
        ) {
            let required = required_minutes(duration, count);
            let watched = required * (1.0 - shortfall);
            prop_assert!(!is_requirement_met(&input(watched, required, pct, sessions, count)));
        }

        #[test]
        fn flipping_any_condition_flips_the_result(
            required in 1.0f64..1000.0,
            extra in 0.0f64..500.0,
            pct in 90.0f64..=100.0,
            required_sessions in 1u32..20,
            extra_sessions in 0u32..5,
        ) {
            let ok = input(
                required + extra,
                required,
                pct,
                required_sessions + extra_sessions,
                required_sessions,
            );
            prop_assert!(is_requirement_met(&ok));

            let short_time = RequirementInput { watched_minutes: required * 0.5, ..ok };
            prop_assert!(!is_requirement_met(&short_time));

            let low_pct = RequirementInput { completion_percentage: 89.0, ..ok };
            prop_assert!(!is_requirement_met(&low_pct));

            let few_sessions = RequirementInput { session_count: required_sessions - 1, ..ok };
            prop_assert!(!is_requirement_met(&few_sessions));
        }

        #[test]
        fn evaluation_is_deterministic(
            watched in 0.0f64..1000.0,
            required in 0.0f64..1000.0,
            pct in 0.0f64..=100.0,
            sessions in 0u32..20,
            required_sessions in 0u32..20,
        ) {
            let value = input(watched, required, pct, sessions, required_sessions);
            prop_assert_eq!(evaluate(&value), evaluate(&value));
        }

        #[test]
        fn full_display_progress_implies_completion(
            watched in 0.0f64..1000.0,
            required in 0.0f64..1000.0,
            pct in 0.0f64..=100.0,
            sessions in 0u32..20,
            required_sessions in 1u32..20,
        ) {
            let value = input(watched, required, pct, sessions, required_sessions);
            let progress = display_progress(&value);
            prop_assert!((0.0..=100.0).contains(&progress));
            if progress >= 100.0 {
                prop_assert!(is_requirement_met(&value));
            }
        }
    }
}
