//! Purpose: Define the stable public Rust API boundary for kindling.
//! Exports: Core types and operations needed by the server binary and tests.
//! Role: Public, additive-only surface; hides internal core modules.
//! Invariants: This module is the only public path to core primitives.
//! Invariants: Internal modules remain private and are not directly exposed.

mod client;
pub mod schemas;
mod vote;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::schema::{Constraint, Field, FieldKind, Issue, Schema};
pub use crate::core::store::{
    Comment, Community, Flag, Notification, Post, Sanction, SanctionKind, Store, StoreResult,
    TargetType, User, Vote,
};
pub use crate::core::vote::{
    DEFAULT_CONFIRMATION_WINDOW, VoteState, VoteTransition, VoteType, apply_vote,
};
pub use client::RemoteClient;
pub use vote::OptimisticVote;
