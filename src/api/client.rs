//! Purpose: Blocking HTTP client for the kindling v1 JSON protocol.
//! Exports: `RemoteClient`.
//! Role: Mirrors the server endpoints for tooling and integration tests.
//! Invariants: Request/response envelopes align with the server's wire shapes.
//! Invariants: Wire errors map back onto `ErrorKind` by status code.

use crate::api::vote::OptimisticVote;
use crate::core::error::{Error, ErrorKind};
use crate::core::store::{Comment, Community, Flag, Post, Sanction, TargetType, User, Vote};
use crate::core::vote::{VoteTransition, VoteType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

type ApiResult<T> = Result<T, Error>;

#[derive(Clone, Debug)]
pub struct RemoteClient {
    base_url: Url,
    agent: ureq::Agent,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCommunityRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePostRequest<'a> {
    community_name: &'a str,
    title: &'a str,
    content: &'a str,
    author_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCommentRequest<'a> {
    post_id: &'a str,
    content: &'a str,
    author_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_comment_id: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CastVoteRequest<'a> {
    target_id: &'a str,
    target_type: TargetType,
    vote_type: VoteType,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitFlagRequest<'a> {
    target_id: &'a str,
    target_type: TargetType,
    user_id: &'a str,
    reason: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SanctionRequest<'a> {
    user_id: &'a str,
    community_name: &'a str,
    reason: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_in_days: Option<i64>,
    permanent: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationReadRequest<'a> {
    notification_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionRequest<'a> {
    community_name: &'a str,
    user_id: &'a str,
    action: &'a str,
}

#[derive(Deserialize)]
struct CommunityEnvelope {
    community: Community,
}

#[derive(Deserialize)]
struct PostEnvelope {
    post: Post,
}

#[derive(Deserialize)]
struct CommentEnvelope {
    comment: Comment,
}

#[derive(Deserialize)]
struct VoteEnvelope {
    vote: Vote,
}

#[derive(Deserialize)]
struct FlagEnvelope {
    flag: Flag,
}

#[derive(Deserialize)]
struct BanEnvelope {
    ban: Sanction,
}

#[derive(Deserialize)]
struct MuteEnvelope {
    mute: Sanction,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionEnvelope {
    changed: bool,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthEnvelope {
    ok: bool,
    confirm_window_ms: u64,
}

impl RemoteClient {
    pub fn new(base_url: &str) -> ApiResult<Self> {
        let base_url = Url::parse(base_url).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid base URL")
                .with_hint("Use a value like http://127.0.0.1:9400.")
                .with_source(err)
        })?;
        let agent = ureq::builder().timeout(Duration::from_secs(10)).build();
        Ok(Self { base_url, agent })
    }

    /// Probes `/healthz` and returns the server's confirmation window.
    pub fn health(&self) -> ApiResult<Duration> {
        let url = self.endpoint("healthz")?;
        let health: HealthEnvelope = self.get(&url)?;
        if !health.ok {
            return Err(Error::new(ErrorKind::Internal).with_message("server reported not ok"));
        }
        Ok(Duration::from_millis(health.confirm_window_ms))
    }

    pub fn create_community(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> ApiResult<Community> {
        let url = self.endpoint("v1/communities")?;
        let envelope: CommunityEnvelope =
            self.post(&url, &CreateCommunityRequest { name, description })?;
        Ok(envelope.community)
    }

    pub fn get_community(&self, name: &str) -> ApiResult<Community> {
        let url = self.endpoint(&format!("v1/communities/{name}"))?;
        let envelope: CommunityEnvelope = self.get(&url)?;
        Ok(envelope.community)
    }

    pub fn create_post(
        &self,
        community_name: &str,
        title: &str,
        content: &str,
        author_id: &str,
    ) -> ApiResult<Post> {
        let url = self.endpoint("v1/posts")?;
        let envelope: PostEnvelope = self.post(
            &url,
            &CreatePostRequest {
                community_name,
                title,
                content,
                author_id,
            },
        )?;
        Ok(envelope.post)
    }

    pub fn create_comment(
        &self,
        post_id: &str,
        content: &str,
        author_id: &str,
        parent_comment_id: Option<&str>,
    ) -> ApiResult<Comment> {
        let url = self.endpoint("v1/comments")?;
        let envelope: CommentEnvelope = self.post(
            &url,
            &CreateCommentRequest {
                post_id,
                content,
                author_id,
                parent_comment_id,
            },
        )?;
        Ok(envelope.comment)
    }

    pub fn cast_vote(
        &self,
        target_id: &str,
        target_type: TargetType,
        vote_type: VoteType,
    ) -> ApiResult<Vote> {
        let url = self.endpoint("v1/votes")?;
        let envelope: VoteEnvelope = self.post(
            &url,
            &CastVoteRequest {
                target_id,
                target_type,
                vote_type,
            },
        )?;
        Ok(envelope.vote)
    }

    /// Applies the vote locally first (optimistic, pending until confirmed),
    /// then casts it remotely. The local state is not rolled back on a wire
    /// failure; reconciliation belongs to the caller.
    pub fn cast_vote_optimistic(
        &self,
        tracker: &OptimisticVote,
        target_id: &str,
        target_type: TargetType,
        requested: VoteType,
    ) -> ApiResult<(VoteTransition, Vote)> {
        let transition = tracker.apply(requested);
        let vote = self.cast_vote(target_id, target_type, requested)?;
        Ok((transition, vote))
    }

    pub fn submit_flag(
        &self,
        target_id: &str,
        target_type: TargetType,
        user_id: &str,
        reason: &str,
    ) -> ApiResult<Flag> {
        let url = self.endpoint("v1/flags")?;
        let envelope: FlagEnvelope = self.post(
            &url,
            &SubmitFlagRequest {
                target_id,
                target_type,
                user_id,
                reason,
            },
        )?;
        Ok(envelope.flag)
    }

    pub fn ban_user(
        &self,
        user_id: &str,
        community_name: &str,
        reason: &str,
        expires_in_days: Option<i64>,
        permanent: bool,
    ) -> ApiResult<Sanction> {
        let url = self.endpoint("v1/bans")?;
        let envelope: BanEnvelope = self.post(
            &url,
            &SanctionRequest {
                user_id,
                community_name,
                reason,
                expires_in_days,
                permanent,
            },
        )?;
        Ok(envelope.ban)
    }

    pub fn mute_user(
        &self,
        user_id: &str,
        community_name: &str,
        reason: &str,
        expires_in_days: Option<i64>,
        permanent: bool,
    ) -> ApiResult<Sanction> {
        let url = self.endpoint("v1/mutes")?;
        let envelope: MuteEnvelope = self.post(
            &url,
            &SanctionRequest {
                user_id,
                community_name,
                reason,
                expires_in_days,
                permanent,
            },
        )?;
        Ok(envelope.mute)
    }

    pub fn mark_notification_read(&self, notification_id: &str) -> ApiResult<()> {
        let url = self.endpoint("v1/notifications/read")?;
        let _: Value = self.post(&url, &NotificationReadRequest { notification_id })?;
        Ok(())
    }

    /// Returns true when the subscription state changed.
    pub fn update_subscription(
        &self,
        community_name: &str,
        user_id: &str,
        action: &str,
    ) -> ApiResult<bool> {
        let url = self.endpoint("v1/subscriptions")?;
        let envelope: SubscriptionEnvelope = self.post(
            &url,
            &SubscriptionRequest {
                community_name,
                user_id,
                action,
            },
        )?;
        Ok(envelope.changed)
    }

    pub fn get_user(&self, user_id: &str) -> ApiResult<User> {
        let url = self.endpoint(&format!("v1/users/{user_id}"))?;
        let envelope: UserEnvelope = self.get(&url)?;
        Ok(envelope.user)
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base_url.join(path).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid endpoint path")
                .with_source(err)
        })
    }

    fn get<T: serde::de::DeserializeOwned>(&self, url: &Url) -> ApiResult<T> {
        let response = self
            .agent
            .request("GET", url.as_str())
            .call()
            .map_err(decode_wire_error)?;
        decode_body(response)
    }

    fn post<T: serde::de::DeserializeOwned>(
        &self,
        url: &Url,
        body: &impl Serialize,
    ) -> ApiResult<T> {
        let response = self
            .agent
            .request("POST", url.as_str())
            .send_json(body)
            .map_err(decode_wire_error)?;
        decode_body(response)
    }
}

fn decode_body<T: serde::de::DeserializeOwned>(response: ureq::Response) -> ApiResult<T> {
    response.into_json().map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to decode response body")
            .with_source(err)
    })
}

fn decode_wire_error(err: ureq::Error) -> Error {
    match err {
        ureq::Error::Status(code, response) => {
            let body: Value = response.into_json().unwrap_or(Value::Null);
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("request failed")
                .to_string();
            let kind = match code {
                400 => ErrorKind::Invalid,
                404 => ErrorKind::NotFound,
                409 => ErrorKind::AlreadyExists,
                _ => ErrorKind::Internal,
            };
            let mut error = Error::new(kind).with_message(message);
            if let Some(details) = body.get("details") {
                error = error.with_hint(details.to_string());
            }
            error
        }
        transport => Error::new(ErrorKind::Io)
            .with_message("request failed")
            .with_source(transport),
    }
}
