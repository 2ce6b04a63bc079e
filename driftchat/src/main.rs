//! Driftchat — offline-tolerant chat delivery pipeline.
//!
//! Line-oriented driver around the delivery pipeline, backed by an
//! in-memory store. Type a line to send it to the configured peer; slash
//! commands exercise the rest of the surface:
//!
//! ```text
//! /offline          simulate losing connectivity (sends start queueing)
//! /online           restore connectivity (queue drains automatically)
//! /queue            show queued entries
//! /list             show the conversation as logical messages
//! /json             dump the conversation as JSON
//! /edit <id> <txt>  replace a message's content (within the window)
//! /read <id>        record a read receipt as the peer
//! /unread           unread counts for both participants
//! /quit             exit
//! ```
//!
//! ```bash
//! cargo run --bin driftchat -- --user alice --peer bob
//! ```

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;
use uuid::Uuid;

use driftchat::codec::IdentityCodec;
use driftchat::config::{CliArgs, ClientConfig};
use driftchat::limit::{FixedWindowLimiter, NoLimit, RateLimiter};
use driftchat::pipeline::{ClientIdentity, MessagePipeline, SendOutcome};
use driftchat::store::memory::InMemoryStore;
use driftchat_proto::message::{ContentType, MessageId, UserId};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("driftchat starting");

    let user = config.user.clone().unwrap_or_else(|| "me".to_string());
    let peer = config.peer.clone().unwrap_or_else(|| "friend".to_string());

    let limiter: Arc<dyn RateLimiter> = match config.rate_max_per_window {
        Some(max) => Arc::new(FixedWindowLimiter::new(config.rate_window, max)),
        None => Arc::new(NoLimit),
    };

    let store = Arc::new(InMemoryStore::new());
    let (pipeline, mut events, _connectivity) = MessagePipeline::new(
        ClientIdentity::new(user.clone()),
        store,
        Arc::new(IdentityCodec),
        limiter,
        config.to_pipeline_config(),
    );
    let pipeline = Arc::new(pipeline);
    let drain_task = pipeline.spawn_drain_task();

    println!("driftchat — {user} -> {peer} (type /quit to exit)");

    let me = UserId::new(user);
    let them = UserId::new(peer);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        // Surface pipeline events accumulated since the last command.
        while let Ok(event) = events.try_recv() {
            println!("  [event] {event:?}");
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Some(rest) = line.strip_prefix('/') {
            handle_command(&pipeline, rest, &me, &them).await;
            continue;
        }

        match pipeline.send(line, ContentType::Text, &them).await {
            Ok(SendOutcome::Sent { ids }) => {
                println!("  sent ({} row{})", ids.len(), plural(ids.len()));
            }
            Ok(SendOutcome::Queued { local_id }) => {
                println!("  queued as {local_id} (offline or store unavailable)");
            }
            Err(e) => println!("  rejected: {e}"),
        }
    }

    drain_task.abort();
    tracing::info!("driftchat exiting");
    Ok(())
}

const fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// Dispatch one slash command.
async fn handle_command(
    pipeline: &Arc<MessagePipeline<InMemoryStore>>,
    command: &str,
    me: &UserId,
    them: &UserId,
) {
    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
    match name {
        "offline" => {
            pipeline.set_online(false);
            println!("  connectivity: down");
        }
        "online" => {
            pipeline.set_online(true);
            println!("  connectivity: up (queue drains on the edge)");
        }
        "queue" => {
            let snapshot = pipeline.queue_snapshot().await;
            println!("  {} message{} queued", snapshot.len(), plural(snapshot.len()));
            for entry in snapshot {
                println!(
                    "    {} -> {} (attempt {}): {}",
                    entry.local_id,
                    entry.receiver,
                    entry.retry_count,
                    preview(&entry.content)
                );
            }
        }
        "list" => match pipeline.load_conversation(me, them).await {
            Ok(rows) => {
                for row in rows {
                    let edited = if row.is_edited { " (edited)" } else { "" };
                    println!(
                        "    {} [{}] {}: {}{edited}",
                        row.id,
                        row.status,
                        row.sender,
                        preview(&row.content)
                    );
                }
            }
            Err(e) => println!("  load failed: {e}"),
        },
        "json" => match pipeline.load_conversation(me, them).await {
            Ok(rows) => match serde_json::to_string_pretty(&rows) {
                Ok(json) => println!("{json}"),
                Err(e) => println!("  serialization failed: {e}"),
            },
            Err(e) => println!("  load failed: {e}"),
        },
        "edit" => {
            let (id, text) = rest.split_once(' ').unwrap_or((rest, ""));
            let Some(id) = parse_message_id(id) else {
                println!("  usage: /edit <message-id> <new content>");
                return;
            };
            match pipeline.edit_message(&id, text, me).await {
                Ok(()) => println!("  edited"),
                Err(e) => println!("  edit rejected: {e}"),
            }
        }
        "read" => {
            let Some(id) = parse_message_id(rest) else {
                println!("  usage: /read <message-id>");
                return;
            };
            match pipeline.status().mark_read(&id, them).await {
                Ok(true) => println!("  read receipt recorded"),
                Ok(false) => println!("  already read"),
                Err(e) => println!("  failed: {e}"),
            }
        }
        "unread" => {
            for user in [me, them] {
                match pipeline.status().unread_count(user, None).await {
                    Ok(n) => println!("  {user}: {n} unread"),
                    Err(e) => println!("  {user}: failed ({e})"),
                }
            }
        }
        _ => println!("  unknown command: /{name}"),
    }
}

fn parse_message_id(input: &str) -> Option<MessageId> {
    Uuid::parse_str(input.trim()).ok().map(MessageId::from_uuid)
}

/// Truncate long content for terminal display.
fn preview(content: &str) -> String {
    const MAX: usize = 60;
    if content.chars().count() <= MAX {
        content.to_owned()
    } else {
        let head: String = content.chars().take(MAX).collect();
        format!("{head}… ({} chars)", content.chars().count())
    }
}

/// Initialize file-based logging.
///
/// Logs go to a file, keeping stdout free for the conversation. Returns
/// a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("driftchat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
