//! Purpose: Process-local store standing in for the persistence collaborator.
//! Exports: `Store`, entity records, `TargetType`.
//! Role: Backs the HTTP handlers with real lookup/404 semantics; persistence
//! itself is out of scope and owned by an external collaborator.
//! Invariants: All mutations are serialized behind one mutex.
//! Invariants: Vote casts reuse the `core::vote` transition table and never
//! fail on unknown targets (mock-handler semantics).

use crate::core::error::{Error, ErrorKind};
use crate::core::vote::{VoteType, apply_vote};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

pub type StoreResult<T> = Result<T, Error>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Post,
    Comment,
}

impl TargetType {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetType::Post => "post",
            TargetType::Comment => "comment",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    pub name: String,
    pub description: String,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub community_name: String,
    pub title: String,
    pub content: String,
    pub author_id: String,
    pub score: i64,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_comment_id: Option<String>,
    pub content: String,
    pub author_id: String,
    pub score: i64,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: String,
    pub target_id: String,
    pub target_type: TargetType,
    pub vote_type: VoteType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<VoteType>,
    pub delta: i64,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub id: String,
    pub target_id: String,
    pub target_type: TargetType,
    pub user_id: String,
    pub reason: String,
    pub created_at: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SanctionKind {
    Ban,
    Mute,
}

/// Ban and mute share one record shape; their field contracts are identical.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sanction {
    pub id: String,
    pub kind: SanctionKind,
    pub user_id: String,
    pub community_name: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_days: Option<i64>,
    pub permanent: bool,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub body: String,
    pub read: bool,
    pub created_at: String,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<String, User>,
    communities: HashMap<String, Community>,
    posts: HashMap<String, Post>,
    comments: HashMap<String, Comment>,
    // Recorded stance per target id; absence means no standing vote.
    stances: HashMap<String, VoteType>,
    flags: Vec<Flag>,
    sanctions: Vec<Sanction>,
    notifications: HashMap<String, Notification>,
    subscriptions: HashSet<(String, String)>,
}

#[derive(Debug)]
pub struct Store {
    inner: Mutex<Inner>,
}

impl Store {
    /// Creates a store seeded with a few users and one community so read
    /// paths have something to resolve.
    pub fn new() -> StoreResult<Self> {
        let store = Self {
            inner: Mutex::new(Inner::default()),
        };
        {
            let now = now_rfc3339()?;
            let mut inner = store.lock();
            for username in ["alice", "bob", "carol"] {
                let user = User {
                    id: Uuid::new_v4().to_string(),
                    username: username.to_string(),
                    created_at: now.clone(),
                };
                inner.users.insert(user.id.clone(), user);
            }
            inner.communities.insert(
                "kindling".to_string(),
                Community {
                    name: "kindling".to_string(),
                    description: "Meta discussion about this instance".to_string(),
                    created_at: now,
                },
            );
        }
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn create_community(&self, name: &str, description: &str) -> StoreResult<Community> {
        let created_at = now_rfc3339()?;
        let mut inner = self.lock();
        if inner.communities.contains_key(name) {
            return Err(Error::new(ErrorKind::AlreadyExists)
                .with_message(format!("community '{name}' already exists"))
                .with_hint("Pick a different community name."));
        }
        let community = Community {
            name: name.to_string(),
            description: description.to_string(),
            created_at,
        };
        inner
            .communities
            .insert(name.to_string(), community.clone());
        Ok(community)
    }

    pub fn get_community(&self, name: &str) -> StoreResult<Community> {
        self.lock()
            .communities
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("Community"))
    }

    pub fn create_post(
        &self,
        community_name: &str,
        title: &str,
        content: &str,
        author_id: &str,
    ) -> StoreResult<Post> {
        let created_at = now_rfc3339()?;
        let mut inner = self.lock();
        if !inner.communities.contains_key(community_name) {
            return Err(Error::not_found("Community"));
        }
        let post = Post {
            id: Uuid::new_v4().to_string(),
            community_name: community_name.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            author_id: author_id.to_string(),
            score: 0,
            created_at,
        };
        inner.posts.insert(post.id.clone(), post.clone());
        Ok(post)
    }

    pub fn create_comment(
        &self,
        post_id: &str,
        content: &str,
        author_id: &str,
        parent_comment_id: Option<&str>,
    ) -> StoreResult<Comment> {
        let created_at = now_rfc3339()?;
        let mut inner = self.lock();
        if !inner.posts.contains_key(post_id) {
            return Err(Error::not_found("Post"));
        }
        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            post_id: post_id.to_string(),
            parent_comment_id: parent_comment_id.map(str::to_string),
            content: content.to_string(),
            author_id: author_id.to_string(),
            score: 0,
            created_at,
        };
        inner.comments.insert(comment.id.clone(), comment.clone());
        Ok(comment)
    }

    /// Applies the vote transition table to the recorded stance for a target
    /// and adjusts the target's score by the resulting delta. Unknown targets
    /// still record a stance; score adjustment is skipped.
    pub fn cast_vote(
        &self,
        target_id: &str,
        target_type: TargetType,
        requested: VoteType,
    ) -> StoreResult<Vote> {
        let created_at = now_rfc3339()?;
        let mut inner = self.lock();
        let current = inner.stances.get(target_id).copied();
        let transition = apply_vote(current, requested);
        match transition.next {
            Some(next) => {
                inner.stances.insert(target_id.to_string(), next);
            }
            None => {
                inner.stances.remove(target_id);
            }
        }
        match target_type {
            TargetType::Post => {
                if let Some(post) = inner.posts.get_mut(target_id) {
                    post.score += transition.delta;
                }
            }
            TargetType::Comment => {
                if let Some(comment) = inner.comments.get_mut(target_id) {
                    comment.score += transition.delta;
                }
            }
        }
        Ok(Vote {
            id: Uuid::new_v4().to_string(),
            target_id: target_id.to_string(),
            target_type,
            vote_type: requested,
            current: transition.next,
            delta: transition.delta,
            created_at,
        })
    }

    pub fn submit_flag(
        &self,
        target_id: &str,
        target_type: TargetType,
        user_id: &str,
        reason: &str,
    ) -> StoreResult<Flag> {
        let flag = Flag {
            id: Uuid::new_v4().to_string(),
            target_id: target_id.to_string(),
            target_type,
            user_id: user_id.to_string(),
            reason: reason.to_string(),
            created_at: now_rfc3339()?,
        };
        self.lock().flags.push(flag.clone());
        Ok(flag)
    }

    pub fn sanction_user(
        &self,
        kind: SanctionKind,
        user_id: &str,
        community_name: &str,
        reason: &str,
        expires_in_days: Option<i64>,
        permanent: bool,
    ) -> StoreResult<Sanction> {
        let sanction = Sanction {
            id: Uuid::new_v4().to_string(),
            kind,
            user_id: user_id.to_string(),
            community_name: community_name.to_string(),
            reason: reason.to_string(),
            expires_in_days,
            permanent,
            created_at: now_rfc3339()?,
        };
        self.lock().sanctions.push(sanction.clone());
        Ok(sanction)
    }

    /// Marks a notification read. Unknown ids succeed; the mock handlers
    /// acknowledge without resolving the id.
    pub fn mark_notification_read(&self, notification_id: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        if let Some(notification) = inner.notifications.get_mut(notification_id) {
            notification.read = true;
        }
        Ok(())
    }

    /// Returns true when the subscription state changed.
    pub fn update_subscription(
        &self,
        community_name: &str,
        user_id: &str,
        subscribe: bool,
    ) -> StoreResult<bool> {
        let key = (community_name.to_string(), user_id.to_string());
        let mut inner = self.lock();
        let changed = if subscribe {
            inner.subscriptions.insert(key)
        } else {
            inner.subscriptions.remove(&key)
        };
        Ok(changed)
    }

    pub fn get_user(&self, user_id: &str) -> StoreResult<User> {
        self.lock()
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| Error::not_found("User"))
    }

    pub fn find_user_by_name(&self, username: &str) -> Option<User> {
        self.lock()
            .users
            .values()
            .find(|user| user.username == username)
            .cloned()
    }

    pub fn get_post(&self, post_id: &str) -> StoreResult<Post> {
        self.lock()
            .posts
            .get(post_id)
            .cloned()
            .ok_or_else(|| Error::not_found("Post"))
    }

    pub fn stance(&self, target_id: &str) -> Option<VoteType> {
        self.lock().stances.get(target_id).copied()
    }
}

fn now_rfc3339() -> Result<String, Error> {
    OffsetDateTime::now_utc().format(&Rfc3339).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("timestamp format failed")
            .with_source(err)
    })
}

#[cfg(test)]
mod tests {
    use super::{SanctionKind, Store, TargetType};
    use crate::core::error::ErrorKind;
    use crate::core::vote::VoteType;

    #[test]
    fn community_names_are_unique() {
        let store = Store::new().expect("store");
        store.create_community("rust", "systems talk").expect("create");
        let err = store
            .create_community("rust", "duplicate")
            .expect_err("duplicate");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn post_requires_existing_community() {
        let store = Store::new().expect("store");
        let err = store
            .create_post("missing", "title", "content", "author")
            .expect_err("unknown community");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), Some("Community not found"));
    }

    #[test]
    fn vote_cast_moves_post_score_through_the_table() {
        let store = Store::new().expect("store");
        let post = store
            .create_post("kindling", "hello", "world", "author-1")
            .expect("post");

        let vote = store
            .cast_vote(&post.id, TargetType::Post, VoteType::Upvote)
            .expect("vote");
        assert_eq!(vote.delta, 1);
        assert_eq!(vote.current, Some(VoteType::Upvote));
        assert_eq!(store.get_post(&post.id).expect("post").score, 1);

        // Switching stance moves the score by two.
        let vote = store
            .cast_vote(&post.id, TargetType::Post, VoteType::Downvote)
            .expect("vote");
        assert_eq!(vote.delta, -2);
        assert_eq!(store.get_post(&post.id).expect("post").score, -1);

        // Repeating the stance retracts it.
        let vote = store
            .cast_vote(&post.id, TargetType::Post, VoteType::Downvote)
            .expect("vote");
        assert_eq!(vote.current, None);
        assert_eq!(store.get_post(&post.id).expect("post").score, 0);
        assert_eq!(store.stance(&post.id), None);
    }

    #[test]
    fn vote_on_unknown_target_still_records_stance() {
        let store = Store::new().expect("store");
        let vote = store
            .cast_vote("no-such-target", TargetType::Comment, VoteType::Upvote)
            .expect("vote");
        assert_eq!(vote.delta, 1);
        assert_eq!(store.stance("no-such-target"), Some(VoteType::Upvote));
    }

    #[test]
    fn unknown_user_is_not_found() {
        let store = Store::new().expect("store");
        let err = store.get_user("user-0").expect_err("unknown");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), Some("User not found"));
    }

    #[test]
    fn seeded_users_resolve_by_name_and_id() {
        let store = Store::new().expect("store");
        let alice = store.find_user_by_name("alice").expect("seeded");
        let fetched = store.get_user(&alice.id).expect("by id");
        assert_eq!(fetched.username, "alice");
    }

    #[test]
    fn subscriptions_toggle() {
        let store = Store::new().expect("store");
        assert!(store
            .update_subscription("kindling", "user-a", true)
            .expect("subscribe"));
        assert!(!store
            .update_subscription("kindling", "user-a", true)
            .expect("repeat subscribe"));
        assert!(store
            .update_subscription("kindling", "user-a", false)
            .expect("unsubscribe"));
    }

    #[test]
    fn sanctions_record_kind_and_flags() {
        let store = Store::new().expect("store");
        let sanction = store
            .sanction_user(SanctionKind::Mute, "user-a", "kindling", "spam", Some(7), false)
            .expect("mute");
        assert_eq!(sanction.kind, SanctionKind::Mute);
        assert_eq!(sanction.expires_in_days, Some(7));
        assert!(!sanction.permanent);
    }
}
