//! Purpose: Provide the HTTP/JSON server for kindling.
//! Exports: `ServeConfig`, `serve`.
//! Role: Axum-based server implementing the v1 resource endpoints.
//! Invariants: Every mutating handler validates before acting; validation
//! failures terminate at the boundary as 400 "Invalid input" and never reach
//! the store.
//! Invariants: Action failures map NotFound to 404 and everything else to the
//! fixed 500 envelope; the error strings are wire-stable.
//! Invariants: Loopback-only bind unless explicitly allowed.

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Path as AxumPath, Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use kindling::api::schemas;
use kindling::api::{Error, ErrorKind, Issue, SanctionKind, Schema, Store, TargetType, VoteType};

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub allow_non_loopback: bool,
    pub max_body_bytes: u64,
    pub cors_origins: Vec<String>,
    pub confirm_window_ms: u64,
}

struct AppState {
    store: Store,
    confirm_window_ms: u64,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    let max_body_bytes: usize = config
        .max_body_bytes
        .try_into()
        .map_err(|_| Error::new(ErrorKind::Usage).with_message("--max-body-bytes is too large"))?;
    let cors = cors_layer(&config.cors_origins)?;

    let state = Arc::new(AppState {
        store: Store::new()?,
        confirm_window_ms: config.confirm_window_ms,
    });

    let mut app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/communities", post(create_community))
        .route("/v1/communities/:name", get(get_community))
        .route("/v1/posts", post(create_post))
        .route("/v1/comments", post(create_comment))
        .route("/v1/votes", post(cast_vote))
        .route("/v1/flags", post(submit_flag))
        .route("/v1/bans", post(ban_user))
        .route("/v1/mutes", post(mute_user))
        .route("/v1/notifications/read", post(mark_notification_read))
        .route("/v1/subscriptions", post(update_subscription))
        .route("/v1/users/:id", get(get_user))
        .route("/v1/events/count", get(count_events))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http());
    if let Some(cors) = cors {
        app = app.layer(cors);
    }
    let app = app.with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 1048576."));
    }

    if config.confirm_window_ms == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--confirm-window-ms must be greater than zero")
            .with_hint("Use a positive value like 300."));
    }

    Ok(())
}

fn cors_layer(origins: &[String]) -> Result<Option<CorsLayer>, Error> {
    if origins.is_empty() {
        return Ok(None);
    }
    let mut values = Vec::new();
    for origin in origins {
        let value = HeaderValue::from_str(origin).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid CORS origin: {origin}"))
                .with_hint("Use an origin like https://app.example.com.")
                .with_source(err)
        })?;
        values.push(value);
    }
    Ok(Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(values))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE]),
    ))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        signal.recv().await;
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

#[derive(Debug, Serialize)]
struct InvalidInputBody {
    error: &'static str,
    details: Vec<Issue>,
}

#[derive(Debug, Serialize)]
struct InternalErrorBody {
    error: &'static str,
    details: String,
}

#[derive(Debug, Serialize)]
struct NotFoundBody {
    error: String,
}

/// Boundary adapter shared by every mutating endpoint: parse and validate
/// first, then run the resource action on the trusted fields. The raw body
/// is taken as bytes so that malformed JSON and missing content types land
/// in the same fixed envelope as field-level violations.
fn respond_to_validation(
    schema: &Schema,
    body: &[u8],
    success: StatusCode,
    action: impl FnOnce(&Map<String, Value>) -> Result<Value, Error>,
) -> Response {
    let payload: Value = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(_) => return invalid_input_response(vec![Issue::new("", "malformed JSON body")]),
    };
    let fields = match schema.validate(&payload) {
        Ok(fields) => fields,
        Err(issues) => return invalid_input_response(issues),
    };
    match action(&fields) {
        Ok(body) => json_response(success, body),
        Err(err) => error_response(err),
    }
}

async fn healthz(State(state): State<Arc<AppState>>) -> Response {
    json_response(
        StatusCode::OK,
        json!({ "ok": true, "confirmWindowMs": state.confirm_window_ms }),
    )
}

async fn create_community(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    respond_to_validation(
        &schemas::COMMUNITY_CREATE,
        &body,
        StatusCode::CREATED,
        |fields| {
            let community = state
                .store
                .create_community(text(fields, "name"), text(fields, "description"))?;
            Ok(json!({ "community": community }))
        },
    )
}

async fn get_community(
    State(state): State<Arc<AppState>>,
    AxumPath(name): AxumPath<String>,
) -> Response {
    match state.store.get_community(&name) {
        Ok(community) => json_response(StatusCode::OK, json!({ "community": community })),
        Err(err) => error_response(err),
    }
}

async fn create_post(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    respond_to_validation(&schemas::POST_CREATE, &body, StatusCode::CREATED, |fields| {
        let post = state.store.create_post(
            text(fields, "communityName"),
            text(fields, "title"),
            text(fields, "content"),
            text(fields, "authorId"),
        )?;
        Ok(json!({ "post": post }))
    })
}

async fn create_comment(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    respond_to_validation(
        &schemas::COMMENT_CREATE,
        &body,
        StatusCode::CREATED,
        |fields| {
            let comment = state.store.create_comment(
                text(fields, "postId"),
                text(fields, "content"),
                text(fields, "authorId"),
                opt_text(fields, "parentCommentId"),
            )?;
            Ok(json!({ "comment": comment }))
        },
    )
}

async fn cast_vote(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    respond_to_validation(&schemas::VOTE_CAST, &body, StatusCode::CREATED, |fields| {
        let vote = state.store.cast_vote(
            text(fields, "targetId"),
            target_type(fields),
            vote_type(fields),
        )?;
        Ok(json!({ "vote": vote }))
    })
}

async fn submit_flag(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    respond_to_validation(&schemas::FLAG_SUBMIT, &body, StatusCode::OK, |fields| {
        let flag = state.store.submit_flag(
            text(fields, "targetId"),
            target_type(fields),
            text(fields, "userId"),
            text(fields, "reason"),
        )?;
        Ok(json!({
            "success": true,
            "targetType": flag.target_type,
            "flag": flag,
        }))
    })
}

async fn ban_user(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    sanction_response(&state, &body, SanctionKind::Ban, &schemas::BAN_USER, "ban")
}

async fn mute_user(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    sanction_response(&state, &body, SanctionKind::Mute, &schemas::MUTE_USER, "mute")
}

fn sanction_response(
    state: &AppState,
    body: &[u8],
    kind: SanctionKind,
    schema: &Schema,
    label: &'static str,
) -> Response {
    respond_to_validation(schema, body, StatusCode::OK, |fields| {
        let sanction = state.store.sanction_user(
            kind,
            text(fields, "userId"),
            text(fields, "communityName"),
            text(fields, "reason"),
            fields.get("expiresInDays").and_then(Value::as_i64),
            fields
                .get("permanent")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        )?;
        let record = serde_json::to_value(&sanction).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode sanction")
                .with_source(err)
        })?;
        let mut body = Map::new();
        body.insert("success".to_string(), Value::Bool(true));
        body.insert(label.to_string(), record);
        Ok(Value::Object(body))
    })
}

async fn mark_notification_read(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    respond_to_validation(
        &schemas::NOTIFICATION_READ,
        &body,
        StatusCode::OK,
        |fields| {
            state
                .store
                .mark_notification_read(text(fields, "notificationId"))?;
            Ok(json!({ "success": true }))
        },
    )
}

async fn update_subscription(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    respond_to_validation(
        &schemas::SUBSCRIPTION_UPDATE,
        &body,
        StatusCode::OK,
        |fields| {
            let action = text(fields, "action");
            let changed = state.store.update_subscription(
                text(fields, "communityName"),
                text(fields, "userId"),
                action == "subscribe",
            )?;
            Ok(json!({ "success": true, "action": action, "changed": changed }))
        },
    )
}

async fn get_user(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>) -> Response {
    match state.store.get_user(&id) {
        Ok(user) => json_response(StatusCode::OK, json!({ "user": user })),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountQuery {
    max: Option<u64>,
    interval_ms: Option<u64>,
}

/// Toy counter stream preserving the event-shape contract: one JSONL line
/// per event, body `{"count": n}`.
async fn count_events(Query(query): Query<CountQuery>) -> Response {
    let max = query.max.unwrap_or(5).min(1000);
    let interval = Duration::from_millis(query.interval_ms.unwrap_or(1000).min(60_000));

    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(16);
    tokio::spawn(async move {
        for count in 1..=max {
            let line = match serde_json::to_vec(&json!({ "count": count })) {
                Ok(mut bytes) => {
                    bytes.push(b'\n');
                    bytes
                }
                Err(_) => break,
            };
            if tx.send(Ok(Bytes::from(line))).await.is_err() {
                break;
            }
            if count < max {
                tokio::time::sleep(interval).await;
            }
        }
    });

    let mut response = Response::new(Body::from_stream(ReceiverStream::new(rx)));
    response
        .headers_mut()
        .insert("content-type", HeaderValue::from_static("application/jsonl"));
    response
}

fn text<'a>(fields: &'a Map<String, Value>, name: &str) -> &'a str {
    fields.get(name).and_then(Value::as_str).unwrap_or_default()
}

fn opt_text<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    fields.get(name).and_then(Value::as_str)
}

// Field values below are schema-validated; the fallbacks are unreachable.
fn target_type(fields: &Map<String, Value>) -> TargetType {
    match text(fields, "targetType") {
        "comment" => TargetType::Comment,
        _ => TargetType::Post,
    }
}

fn vote_type(fields: &Map<String, Value>) -> VoteType {
    match text(fields, "voteType") {
        "downvote" => VoteType::Downvote,
        _ => VoteType::Upvote,
    }
}

fn json_response(status: StatusCode, payload: Value) -> Response {
    (status, Json(payload)).into_response()
}

fn invalid_input_response(issues: Vec<Issue>) -> Response {
    let body = InvalidInputBody {
        error: "Invalid input",
        details: issues,
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

fn error_response(err: Error) -> Response {
    match err.kind() {
        ErrorKind::NotFound => {
            let body = NotFoundBody {
                error: err.message().unwrap_or("Resource not found").to_string(),
            };
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
        ErrorKind::AlreadyExists => {
            let body = NotFoundBody {
                error: err.message().unwrap_or("already exists").to_string(),
            };
            (StatusCode::CONFLICT, Json(body)).into_response()
        }
        ErrorKind::Usage | ErrorKind::Invalid => {
            invalid_input_response(vec![Issue::new("", err.message().unwrap_or("invalid request"))])
        }
        ErrorKind::Internal | ErrorKind::Io => {
            let body = InternalErrorBody {
                error: "Internal server error",
                details: err.message().unwrap_or("error").to_string(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}
