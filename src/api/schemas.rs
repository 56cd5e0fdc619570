//! Purpose: Fixed validation schemas for every mutating resource.
//! Exports: One `Schema` static per resource, plus `all`.
//! Role: Immutable configuration consumed by every request handler; field
//! contracts are wire-stable.
//! Invariants: Field names are camelCase to match the JSON bodies.

use crate::core::schema::{Field, Schema};
use serde_json::{Value, json};
use std::sync::LazyLock;

pub const TARGET_TYPES: &[&str] = &["post", "comment"];
pub const VOTE_TYPES: &[&str] = &["upvote", "downvote"];
pub const SUBSCRIPTION_ACTIONS: &[&str] = &["subscribe", "unsubscribe"];

pub static COMMUNITY_CREATE: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(
        "community",
        vec![
            Field::text("name")
                .min_len(3)
                .max_len(21)
                .pattern("^[A-Za-z0-9_]+$"),
            Field::text("description")
                .max_len(500)
                .with_default(json!("")),
        ],
    )
});

pub static POST_CREATE: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(
        "post",
        vec![
            Field::text("communityName").min_len(1),
            Field::text("title").min_len(1).max_len(300),
            Field::text("content").min_len(1).max_len(40_000),
            Field::text("authorId").min_len(1),
        ],
    )
});

pub static COMMENT_CREATE: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(
        "comment",
        vec![
            Field::text("postId").min_len(1),
            Field::text("content").min_len(1).max_len(10_000),
            Field::text("authorId").min_len(1),
            Field::text("parentCommentId").optional(),
        ],
    )
});

pub static VOTE_CAST: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(
        "vote",
        vec![
            Field::text("targetId").uuid(),
            Field::text("targetType").one_of(TARGET_TYPES),
            Field::text("voteType").one_of(VOTE_TYPES),
        ],
    )
});

pub static FLAG_SUBMIT: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(
        "flag",
        vec![
            Field::text("targetId").min_len(1),
            Field::text("targetType").one_of(TARGET_TYPES),
            Field::text("userId").min_len(1),
            Field::text("reason").min_len(3),
        ],
    )
});

pub static BAN_USER: LazyLock<Schema> = LazyLock::new(|| Schema::new("ban", sanction_fields()));

pub static MUTE_USER: LazyLock<Schema> = LazyLock::new(|| Schema::new("mute", sanction_fields()));

pub static NOTIFICATION_READ: LazyLock<Schema> =
    LazyLock::new(|| Schema::new("notification", vec![Field::text("notificationId").uuid()]));

pub static SUBSCRIPTION_UPDATE: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(
        "subscription",
        vec![
            Field::text("communityName").min_len(1),
            Field::text("userId").min_len(1),
            Field::text("action")
                .one_of(SUBSCRIPTION_ACTIONS)
                .with_default(json!("subscribe")),
        ],
    )
});

// Ban and mute share one field contract.
fn sanction_fields() -> Vec<Field> {
    vec![
        Field::text("userId").min_len(1),
        Field::text("communityName").min_len(1),
        Field::text("reason").min_len(1).max_len(500),
        Field::integer("expiresInDays").range(1, 3650).optional(),
        Field::boolean("permanent").with_default(Value::Bool(false)),
    ]
}

pub fn all() -> Vec<&'static Schema> {
    vec![
        &COMMUNITY_CREATE,
        &POST_CREATE,
        &COMMENT_CREATE,
        &VOTE_CAST,
        &FLAG_SUBMIT,
        &BAN_USER,
        &MUTE_USER,
        &NOTIFICATION_READ,
        &SUBSCRIPTION_UPDATE,
    ]
}

pub fn by_resource(resource: &str) -> Option<&'static Schema> {
    all().into_iter().find(|schema| schema.resource() == resource)
}
