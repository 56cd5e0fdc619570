//! Purpose: End-to-end tests for the HTTP/JSON server and remote client.
//! Exports: None (integration test module).
//! Role: Validate the validation envelopes, vote casting, and lookup paths
//! across TCP against a spawned server binary.
//! Invariants: Uses loopback-only server; bounded waits avoid flakiness.
//! Invariants: Server processes are cleaned up on drop.

use kindling::api::{OptimisticVote, RemoteClient, TargetType, VoteType};
use serde_json::{Value, json};
use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread::sleep;
use std::time::{Duration, Instant};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

static SERVER_LOCK: Mutex<()> = Mutex::new(());

struct TestServer {
    child: Child,
    base_url: String,
    _server_guard: MutexGuard<'static, ()>,
}

impl TestServer {
    fn start() -> TestResult<Self> {
        Self::start_with_args(&[])
    }

    fn start_with_args(extra: &[&str]) -> TestResult<Self> {
        let guard = SERVER_LOCK
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let port = pick_port()?;
        let bind = format!("127.0.0.1:{port}");
        let base_url = format!("http://{bind}");

        let mut command = Command::new(env!("CARGO_BIN_EXE_kindling"));
        command
            .arg("serve")
            .arg("--bind")
            .arg(&bind)
            .args(extra)
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let child = command.spawn()?;

        // Drop kills the child if readiness never arrives.
        let mut server = TestServer {
            child,
            base_url,
            _server_guard: guard,
        };
        server.wait_until_ready()?;
        Ok(server)
    }

    fn wait_until_ready(&mut self) -> TestResult<()> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let url = format!("{}/healthz", self.base_url);
        loop {
            match ureq::get(&url).call() {
                Ok(response) => {
                    let body: Value = response.into_json()?;
                    if body["ok"] == json!(true) {
                        return Ok(());
                    }
                }
                Err(_) => {
                    if let Some(status) = self.child.try_wait()? {
                        return Err(format!("server exited early: {status}").into());
                    }
                }
            }
            if Instant::now() > deadline {
                return Err("server did not become ready".into());
            }
            sleep(Duration::from_millis(50));
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn pick_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

fn post_json(url: &str, body: Value) -> Result<(u16, Value), ureq::Error> {
    let response = ureq::post(url).send_json(body)?;
    let status = response.status();
    let body = response.into_json().unwrap_or(Value::Null);
    Ok((status, body))
}

fn error_body(err: ureq::Error) -> (u16, Value) {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_json().unwrap_or(Value::Null);
            (status, body)
        }
        other => panic!("expected status error, got {other}"),
    }
}

const TARGET_UUID: &str = "4b4a6a7e-6dcb-4b0e-8dbb-6e3a1c6f1a2f";

#[test]
fn vote_cast_returns_created_vote() -> TestResult<()> {
    let server = TestServer::start()?;

    let (status, body) = post_json(
        &server.url("/v1/votes"),
        json!({
            "targetId": TARGET_UUID,
            "targetType": "post",
            "voteType": "upvote",
        }),
    )?;
    assert_eq!(status, 201);
    assert_eq!(body["vote"]["targetId"], TARGET_UUID);
    assert_eq!(body["vote"]["targetType"], "post");
    assert_eq!(body["vote"]["voteType"], "upvote");
    assert_eq!(body["vote"]["delta"], 1);
    Ok(())
}

#[test]
fn short_community_name_is_invalid_input() -> TestResult<()> {
    let server = TestServer::start()?;

    let err = ureq::post(&server.url("/v1/communities"))
        .send_json(json!({ "name": "ab", "description": "x" }))
        .expect_err("expected 400");
    let (status, body) = error_body(err);
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Invalid input");
    let details = body["details"].as_array().expect("details array");
    assert!(!details.is_empty());
    assert_eq!(details[0]["path"], "name");
    Ok(())
}

#[test]
fn malformed_json_body_is_invalid_input() -> TestResult<()> {
    let server = TestServer::start()?;
    let url = server.url("/v1/votes");

    let err = ureq::post(&url)
        .set("content-type", "application/json")
        .send_string("{not json")
        .expect_err("expected 400");
    let (status, body) = error_body(err);
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Invalid input");
    let details = body["details"].as_array().expect("details array");
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["path"], "");

    // The envelope does not depend on the content-type header.
    let err = ureq::post(&url)
        .send_string("{not json")
        .expect_err("expected 400");
    let (status, body) = error_body(err);
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Invalid input");
    Ok(())
}

#[test]
fn flag_submission_succeeds_for_comment_target() -> TestResult<()> {
    let server = TestServer::start()?;

    let (status, body) = post_json(
        &server.url("/v1/flags"),
        json!({
            "targetId": "id",
            "targetType": "comment",
            "userId": "user-1",
            "reason": "Spam",
        }),
    )?;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["targetType"], "comment");
    assert_eq!(body["flag"]["reason"], "Spam");
    Ok(())
}

#[test]
fn unknown_user_lookup_is_not_found() -> TestResult<()> {
    let server = TestServer::start()?;

    let err = ureq::get(&server.url("/v1/users/user-0")).call().expect_err("expected 404");
    let (status, body) = error_body(err);
    assert_eq!(status, 404);
    assert_eq!(body["error"], "User not found");
    Ok(())
}

#[test]
fn every_violation_is_reported_in_one_pass() -> TestResult<()> {
    let server = TestServer::start()?;

    let err = ureq::post(&server.url("/v1/votes"))
        .send_json(json!({
            "targetId": "not-a-uuid",
            "targetType": "thread",
            "voteType": "sideways",
        }))
        .expect_err("expected 400");
    let (status, body) = error_body(err);
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Invalid input");
    let details = body["details"].as_array().expect("details array");
    assert!(details.len() >= 3, "expected all violations, got {details:?}");
    Ok(())
}

#[test]
fn omitted_defaults_are_substituted() -> TestResult<()> {
    let server = TestServer::start()?;

    // No action field: defaults to subscribe.
    let (status, body) = post_json(
        &server.url("/v1/subscriptions"),
        json!({ "communityName": "kindling", "userId": "user-1" }),
    )?;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["action"], "subscribe");
    assert_eq!(body["changed"], true);
    Ok(())
}

#[test]
fn remote_client_round_trips_content_creation() -> TestResult<()> {
    let server = TestServer::start()?;
    let client = RemoteClient::new(&server.base_url)?;

    let community = client.create_community("rustaceans", Some("systems talk"))?;
    assert_eq!(community.name, "rustaceans");

    let post = client.create_post("rustaceans", "hello", "first post", "author-1")?;
    assert_eq!(post.community_name, "rustaceans");
    assert_eq!(post.score, 0);

    let comment = client.create_comment(&post.id, "welcome", "author-2", None)?;
    assert_eq!(comment.post_id, post.id);

    let reply = client.create_comment(&post.id, "thanks", "author-1", Some(&comment.id))?;
    assert_eq!(reply.parent_comment_id.as_deref(), Some(comment.id.as_str()));

    let fetched = client.get_community("rustaceans")?;
    assert_eq!(fetched.description, "systems talk");

    let err = client
        .create_community("rustaceans", None)
        .expect_err("duplicate");
    assert_eq!(err.kind(), kindling::api::ErrorKind::AlreadyExists);
    Ok(())
}

#[test]
fn vote_state_machine_moves_scores_over_the_wire() -> TestResult<()> {
    let server = TestServer::start()?;
    let client = RemoteClient::new(&server.base_url)?;

    client.create_community("votes", None)?;
    let post = client.create_post("votes", "tally", "content", "author-1")?;

    let vote = client.cast_vote(&post.id, TargetType::Post, VoteType::Upvote)?;
    assert_eq!(vote.delta, 1);
    assert_eq!(vote.current, Some(VoteType::Upvote));

    // Switching stance moves the score by two.
    let vote = client.cast_vote(&post.id, TargetType::Post, VoteType::Downvote)?;
    assert_eq!(vote.delta, -2);
    assert_eq!(vote.current, Some(VoteType::Downvote));

    // Repeating the stance retracts it.
    let vote = client.cast_vote(&post.id, TargetType::Post, VoteType::Downvote)?;
    assert_eq!(vote.delta, 1);
    assert_eq!(vote.current, None);
    Ok(())
}

#[test]
fn optimistic_cast_is_pending_until_the_window_elapses() -> TestResult<()> {
    let server = TestServer::start_with_args(&["--confirm-window-ms", "100"])?;
    let client = RemoteClient::new(&server.base_url)?;

    let window = client.health()?;
    assert_eq!(window, Duration::from_millis(100));

    let tracker = OptimisticVote::seeded(None, 7).with_window(window);
    let (transition, vote) =
        client.cast_vote_optimistic(&tracker, TARGET_UUID, TargetType::Post, VoteType::Upvote)?;
    assert_eq!(transition.delta, 1);
    assert_eq!(vote.vote_type, VoteType::Upvote);
    assert!(tracker.pending());
    assert_eq!(tracker.count(), 8);

    sleep(window * 4);
    assert!(!tracker.pending());
    Ok(())
}

#[test]
fn moderation_endpoints_share_the_sanction_contract() -> TestResult<()> {
    let server = TestServer::start()?;
    let client = RemoteClient::new(&server.base_url)?;

    let ban = client.ban_user("user-1", "kindling", "spam", None, true)?;
    assert!(ban.permanent);
    assert_eq!(ban.expires_in_days, None);

    let mute = client.mute_user("user-2", "kindling", "heated thread", Some(7), false)?;
    assert!(!mute.permanent);
    assert_eq!(mute.expires_in_days, Some(7));

    // Out-of-range expiry is a validation failure, not a server error.
    let err = client
        .ban_user("user-1", "kindling", "spam", Some(0), false)
        .expect_err("expected 400");
    assert_eq!(err.kind(), kindling::api::ErrorKind::Invalid);
    Ok(())
}

#[test]
fn notification_read_requires_uuid_id() -> TestResult<()> {
    let server = TestServer::start()?;
    let client = RemoteClient::new(&server.base_url)?;

    client.mark_notification_read(TARGET_UUID)?;

    let err = ureq::post(&server.url("/v1/notifications/read"))
        .send_json(json!({ "notificationId": "nope" }))
        .expect_err("expected 400");
    let (status, body) = error_body(err);
    assert_eq!(status, 400);
    assert_eq!(body["details"][0]["path"], "notificationId");
    Ok(())
}

#[test]
fn counter_stream_emits_jsonl_events() -> TestResult<()> {
    let server = TestServer::start()?;

    let response = ureq::get(&server.url("/v1/events/count?max=3&intervalMs=10")).call()?;
    assert_eq!(
        response.header("content-type"),
        Some("application/jsonl")
    );
    let reader = BufReader::new(response.into_reader());
    let mut counts = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let event: Value = serde_json::from_str(&line)?;
        counts.push(event["count"].as_u64().expect("count"));
    }
    assert_eq!(counts, [1, 2, 3]);
    Ok(())
}
