//! Purpose: Optimistic vote tracker pairing the pure machine with a pending window.
//! Exports: `OptimisticVote`.
//! Role: Applies transitions synchronously; clears `pending` via a deferred,
//! fire-and-forget timer after the confirmation window.
//! Invariants: Timers are independent and not cancellable; overlapping timers
//! are acceptable and the last to fire wins.
//! Invariants: Dropping the tracker abandons outstanding timers without error.

use crate::core::vote::{DEFAULT_CONFIRMATION_WINDOW, VoteState, VoteTransition, VoteType};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Per-target optimistic vote state with a timed confirmation window.
///
/// Each `apply` spawns its own pending-clear timer: on a tokio runtime as an
/// async task, otherwise on a plain thread, so blocking callers work too.
#[derive(Clone, Debug)]
pub struct OptimisticVote {
    state: Arc<Mutex<VoteState>>,
    window: Duration,
}

impl OptimisticVote {
    /// Seeds the tracker from the persisted stance and score.
    pub fn seeded(current: Option<VoteType>, count: i64) -> Self {
        Self {
            state: Arc::new(Mutex::new(VoteState::seeded(current, count))),
            window: DEFAULT_CONFIRMATION_WINDOW,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Applies a requested vote, returning the new synchronous state at once
    /// and scheduling a deferred pending-clear.
    pub fn apply(&self, requested: VoteType) -> VoteTransition {
        let transition = lock(&self.state).apply(requested);
        self.schedule_confirm();
        transition
    }

    pub fn current(&self) -> Option<VoteType> {
        lock(&self.state).current()
    }

    pub fn count(&self) -> i64 {
        lock(&self.state).count()
    }

    pub fn pending(&self) -> bool {
        lock(&self.state).pending()
    }

    fn schedule_confirm(&self) {
        let state = Arc::clone(&self.state);
        let window = self.window;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(window).await;
                    lock(&state).confirm();
                });
            }
            Err(_) => {
                std::thread::spawn(move || {
                    std::thread::sleep(window);
                    lock(&state).confirm();
                });
            }
        }
    }
}

fn lock(state: &Arc<Mutex<VoteState>>) -> MutexGuard<'_, VoteState> {
    state.lock().unwrap_or_else(|poison| poison.into_inner())
}
