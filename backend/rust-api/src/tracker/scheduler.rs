//! Last-write-wins coalescing of high-frequency events into infrequent writes.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::AbortHandle;
use tokio::time::Instant;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

/// Destination of a coalesced payload.
#[async_trait]
pub trait FlushSink<T>: Send + Sync {
    async fn flush(&self, payload: T) -> anyhow::Result<()>;
}

#[derive(Default)]
struct SchedulerState {
    generation: u64,
    pending: Option<AbortHandle>,
    window_started: Option<Instant>,
}

/// `schedule` cancels whatever is pending and arms a new timer with the latest payload.
///
/// Earlier payloads are dropped, never queued. With `max_wait` set, a burst of
/// events is flushed no later than `max_wait` after its first event. Flush
/// failures are logged and not retried. Must be used inside a Tokio runtime.
pub struct CoalescingScheduler<T> {
    sink: Arc<dyn FlushSink<T>>,
    delay: Duration,
    max_wait: Option<Duration>,
    state: Arc<Mutex<SchedulerState>>,
}

impl<T: Send + 'static> CoalescingScheduler<T> {
    pub fn new(sink: Arc<dyn FlushSink<T>>, delay: Duration) -> Self {
        Self {
            sink,
            delay,
            max_wait: None,
            state: Arc::new(Mutex::new(SchedulerState::default())),
        }
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn schedule(&self, payload: T) {
        let mut state = lock(&self.state);
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;

        let now = Instant::now();
        let window_started = *state.window_started.get_or_insert(now);
        let mut deadline = now + self.delay;
        if let Some(max_wait) = self.max_wait {
            deadline = deadline.min(window_started + max_wait);
        }

        let shared = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;

            {
                let mut state = lock(&shared);
                if state.generation != generation {
                    return;
                }
                state.pending = None;
                state.window_started = None;
            }

            if let Err(err) = sink.flush(payload).await {
                tracing::warn!(error = %err, "debounced flush failed");
            }
        });

        state.pending = Some(handle.abort_handle());
    }

    /// Drops the pending payload, if any. Returns whether something was pending.
    pub fn cancel(&self) -> bool {
        let mut state = lock(&self.state);
        state.generation = state.generation.wrapping_add(1);
        state.window_started = None;
        match state.pending.take() {
            Some(pending) => {
                pending.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.state).pending.is_some()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl<T> Drop for CoalescingScheduler<T> {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.generation = state.generation.wrapping_add(1);
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
    }
}

fn lock(state: &Mutex<SchedulerState>) -> MutexGuard<'_, SchedulerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
