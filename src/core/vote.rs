//! Purpose: Pure vote state machine for a single post or comment target.
//! Exports: `VoteType`, `VoteTransition`, `VoteState`, `apply_vote`.
//! Role: Synchronous transition core; the async pending window lives in `api::vote`.
//! Invariants: The (current, requested) pair fully determines (next, delta).
//! Invariants: `count` only ever changes additively by the returned delta.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Confirmation window before an optimistic change is considered acknowledged.
pub const DEFAULT_CONFIRMATION_WINDOW: Duration = Duration::from_millis(300);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Upvote,
    Downvote,
}

impl VoteType {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteType::Upvote => "upvote",
            VoteType::Downvote => "downvote",
        }
    }
}

/// Result of one transition: the stance after it and the score delta it applies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VoteTransition {
    pub next: Option<VoteType>,
    pub delta: i64,
}

/// Computes the next stance and score delta for a requested vote.
///
/// Voting the current stance again retracts it; switching stances moves the
/// score by two. The operation never fails.
pub fn apply_vote(current: Option<VoteType>, requested: VoteType) -> VoteTransition {
    let (next, delta) = match (current, requested) {
        (None, VoteType::Upvote) => (Some(VoteType::Upvote), 1),
        (None, VoteType::Downvote) => (Some(VoteType::Downvote), -1),
        (Some(VoteType::Upvote), VoteType::Upvote) => (None, -1),
        (Some(VoteType::Upvote), VoteType::Downvote) => (Some(VoteType::Downvote), -2),
        (Some(VoteType::Downvote), VoteType::Downvote) => (None, 1),
        (Some(VoteType::Downvote), VoteType::Upvote) => (Some(VoteType::Upvote), 2),
    };
    VoteTransition { next, delta }
}

/// Ephemeral per-target vote state, seeded from the persisted stance and score.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VoteState {
    current: Option<VoteType>,
    count: i64,
    pending: bool,
}

impl VoteState {
    pub fn seeded(current: Option<VoteType>, count: i64) -> Self {
        Self {
            current,
            count,
            pending: false,
        }
    }

    pub fn current(&self) -> Option<VoteType> {
        self.current
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn pending(&self) -> bool {
        self.pending
    }

    /// Applies a requested vote and marks the state pending until confirmed.
    pub fn apply(&mut self, requested: VoteType) -> VoteTransition {
        let transition = apply_vote(self.current, requested);
        self.current = transition.next;
        self.count += transition.delta;
        self.pending = true;
        transition
    }

    /// Clears the pending flag; called when a confirmation timer fires.
    pub fn confirm(&mut self) {
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::{VoteState, VoteType, apply_vote};

    #[test]
    fn transition_table_covers_all_six_cases() {
        let cases = [
            (None, VoteType::Upvote, Some(VoteType::Upvote), 1),
            (None, VoteType::Downvote, Some(VoteType::Downvote), -1),
            (Some(VoteType::Upvote), VoteType::Upvote, None, -1),
            (
                Some(VoteType::Upvote),
                VoteType::Downvote,
                Some(VoteType::Downvote),
                -2,
            ),
            (Some(VoteType::Downvote), VoteType::Downvote, None, 1),
            (
                Some(VoteType::Downvote),
                VoteType::Upvote,
                Some(VoteType::Upvote),
                2,
            ),
        ];

        for (current, requested, next, delta) in cases {
            let transition = apply_vote(current, requested);
            assert_eq!(transition.next, next, "{current:?} + {requested:?}");
            assert_eq!(transition.delta, delta, "{current:?} + {requested:?}");
        }
    }

    #[test]
    fn double_toggle_returns_to_baseline() {
        for requested in [VoteType::Upvote, VoteType::Downvote] {
            let mut state = VoteState::seeded(None, 42);
            state.apply(requested);
            state.apply(requested);
            assert_eq!(state.current(), None);
            assert_eq!(state.count(), 42);
        }
    }

    #[test]
    fn switching_stance_moves_count_by_two() {
        let mut state = VoteState::seeded(Some(VoteType::Upvote), 10);
        let transition = state.apply(VoteType::Downvote);
        assert_eq!(transition.delta, -2);
        assert_eq!(state.count(), 8);
        assert_eq!(state.current(), Some(VoteType::Downvote));
    }

    #[test]
    fn apply_sets_pending_until_confirmed() {
        let mut state = VoteState::seeded(None, 0);
        assert!(!state.pending());
        state.apply(VoteType::Upvote);
        assert!(state.pending());
        state.confirm();
        assert!(!state.pending());
    }

    #[test]
    fn delta_is_independent_of_count() {
        for baseline in [-100, 0, 7] {
            let mut state = VoteState::seeded(None, baseline);
            let transition = state.apply(VoteType::Downvote);
            assert_eq!(transition.delta, -1);
            assert_eq!(state.count(), baseline - 1);
        }
    }
}
