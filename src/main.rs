//! Purpose: `kindling` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.

use std::io::{self, IsTerminal};
use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use serde_json::{Value, json};

mod serve;

use kindling::api::{Constraint, Error, ErrorKind, FieldKind, Schema, schemas, to_exit_code};

#[derive(Parser)]
#[command(
    name = "kindling",
    version,
    about = "Community link-aggregation service with a schema-validated JSON API",
    after_help = r#"EXAMPLES
  $ kindling serve --bind 127.0.0.1:9400
  $ kindling schemas                     # dump every resource schema
  $ kindling schemas --resource vote
  $ curl -s -X POST http://127.0.0.1:9400/v1/votes \
      -H 'content-type: application/json' \
      -d '{"targetId":"4b4a6a7e-6dcb-4b0e-8dbb-6e3a1c6f1a2f","targetType":"post","voteType":"upvote"}'
"#
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP/JSON server
    Serve {
        #[arg(long, default_value = "127.0.0.1:9400", help = "Address to bind (host:port)")]
        bind: String,
        #[arg(long, help = "Permit binding to a non-loopback address")]
        allow_non_loopback: bool,
        #[arg(long, default_value_t = 1024 * 1024, help = "Maximum request body size in bytes")]
        max_body_bytes: u64,
        #[arg(long = "cors-origin", help = "Allowed CORS origin (repeatable)")]
        cors_origins: Vec<String>,
        #[arg(
            long,
            default_value_t = 300,
            help = "Optimistic vote confirmation window in milliseconds"
        )]
        confirm_window_ms: u64,
    },
    /// Print the resource validation schemas as JSON
    Schemas {
        #[arg(long, help = "Limit output to one resource (e.g. vote, community)")]
        resource: Option<String>,
    },
}

fn main() {
    let exit_code = match run() {
        Ok(()) => 0,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<(), Error> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            bind,
            allow_non_loopback,
            max_body_bytes,
            cors_origins,
            confirm_window_ms,
        } => {
            let bind: SocketAddr = bind.parse().map_err(|_| {
                Error::new(ErrorKind::Usage)
                    .with_message("invalid bind address")
                    .with_hint("Use a host:port value like 127.0.0.1:9400.")
            })?;
            let config = serve::ServeConfig {
                bind,
                allow_non_loopback,
                max_body_bytes,
                cors_origins,
                confirm_window_ms,
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))
        }
        Command::Schemas { resource } => {
            let value = match resource {
                Some(resource) => {
                    let schema = schemas::by_resource(&resource)
                        .ok_or_else(|| Error::not_found("Schema"))?;
                    json!({ "schema": schema_json(schema) })
                }
                None => {
                    let values: Vec<Value> = schemas::all().iter().map(|s| schema_json(s)).collect();
                    json!({ "schemas": values })
                }
            };
            emit_json(value);
            Ok(())
        }
    }
}

fn schema_json(schema: &Schema) -> Value {
    let fields: Vec<Value> = schema
        .fields()
        .iter()
        .map(|field| {
            let constraints: Vec<String> =
                field.constraints().iter().map(constraint_label).collect();
            let mut value = json!({
                "name": field.name(),
                "kind": kind_label(field.kind()),
                "required": field.is_required(),
                "constraints": constraints,
            });
            if let Some(default) = field.default_value() {
                value["default"] = default.clone();
            }
            value
        })
        .collect();
    json!({ "resource": schema.resource(), "fields": fields })
}

fn kind_label(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "string",
        FieldKind::Integer => "integer",
        FieldKind::Boolean => "boolean",
    }
}

fn constraint_label(constraint: &Constraint) -> String {
    match constraint {
        Constraint::MinLen(len) => format!("minLen:{len}"),
        Constraint::MaxLen(len) => format!("maxLen:{len}"),
        Constraint::Pattern(regex) => format!("pattern:{}", regex.as_str()),
        Constraint::OneOf(values) => format!("oneOf:{}", values.join("|")),
        Constraint::Uuid => "uuid".to_string(),
        Constraint::Range(min, max) => format!("range:{min}..{max}"),
    }
}

fn emit_json(value: Value) {
    let json = serde_json::to_string_pretty(&value)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("error: {err}");
        return;
    }
    let mut body = serde_json::Map::new();
    body.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    if let Some(message) = err.message() {
        body.insert("message".to_string(), json!(message));
    }
    if let Some(hint) = err.hint() {
        body.insert("hint".to_string(), json!(hint));
    }
    let value = json!({ "error": body });
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}
