//! Video learning requirement tracking.
//!
//! The recorder turns player callbacks into 10% milestones, the coalescing
//! scheduler debounces them into store writes, the controller counts
//! completed sessions through the store's atomic increment and the evaluator
//! decides whether an exercise's viewing requirement is satisfied.

pub mod controller;
pub mod evaluator;
pub mod http_store;
pub mod recorder;
pub mod scheduler;
pub mod store;

pub use controller::{TrackerConfig, VideoRequirementController};
pub use evaluator::{RequirementInput, RequirementStatus};
pub use http_store::HttpProgressStore;
pub use scheduler::{CoalescingScheduler, FlushSink};
pub use store::{MemoryProgressStore, ProgressStore};

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("progress store request failed: {0}")]
    Store(#[from] anyhow::Error),
    #[error("tracker for exercise {0} has been disposed")]
    Disposed(String),
}
