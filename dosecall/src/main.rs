//! dosecall - medication reminder call tracker CLI
//!
//! Inspect reconciled call sessions and replay provider callback payloads
//! against the local store.

use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dosecall_core::normalize::{
    from_json, AmdEvent, CallStartEvent, NoResponseEvent, SpeechEvent, StatusEvent,
};
use dosecall_core::provider::ProviderClient;
use dosecall_core::store::{Page, SessionFilter};
use dosecall_core::{CallSession, CallStatus, Config, Database, Direction, WebhookProcessor};

#[derive(Parser, Debug)]
#[command(name = "dosecall")]
#[command(about = "Medication reminder call tracker")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List call sessions, newest first
    List {
        /// Filter by patient phone number (E.164)
        #[arg(long)]
        phone: Option<String>,

        /// Filter by status (e.g. completed, voicemail, failed)
        #[arg(long)]
        status: Option<String>,

        /// Only sessions created at or after this instant (RFC3339)
        #[arg(long)]
        since: Option<String>,

        /// Only sessions created at or before this instant (RFC3339)
        #[arg(long)]
        until: Option<String>,

        /// Maximum number of sessions to show
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Number of sessions to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one call session by call id
    Show {
        /// Provider-assigned call id
        call_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Session counts grouped by status
    Summary,

    /// Apply a provider callback payload (JSON) to the store
    Event {
        /// Callback type: start, amd, speech, no-response, status
        kind: String,

        /// Call direction, for start events
        #[arg(long, default_value = "outbound")]
        direction: String,

        /// Read the payload from a file instead of stdin
        #[arg(long)]
        file: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = dosecall_core::logging::init(&config.logging).ok();

    let db_path = Config::database_path();
    tracing::info!(path = %db_path.display(), "Opening database");
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    match args.command {
        Command::List {
            phone,
            status,
            since,
            until,
            limit,
            offset,
            json,
        } => {
            let status = status
                .map(|s| {
                    s.parse::<CallStatus>()
                        .map_err(|e| anyhow::anyhow!("invalid --status: {}", e))
                })
                .transpose()?;

            let filter = SessionFilter {
                phone_number: phone,
                status,
                since: parse_instant(since.as_deref(), "--since")?,
                until: parse_instant(until.as_deref(), "--until")?,
            };
            let page = Page { limit, offset };
            let (sessions, total) = db
                .list_sessions(&filter, page)
                .context("failed to list sessions")?;

            if json {
                let out = serde_json::json!({
                    "total_count": total,
                    "sessions": sessions,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_session_table(&sessions, total, offset);
            }
        }

        Command::Show { call_id, json } => {
            let session = db
                .get_session(&call_id)
                .context("failed to read session")?
                .with_context(|| format!("no session with call id {}", call_id))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&session)?);
            } else {
                print_session_detail(&session);
            }
        }

        Command::Summary => {
            let counts = db
                .count_sessions_by_status()
                .context("failed to count sessions")?;

            if counts.is_empty() {
                println!("No call sessions recorded.");
            } else {
                let mut rows: Vec<_> = counts.into_iter().collect();
                rows.sort_by(|a, b| b.1.cmp(&a.1));
                for (status, count) in rows {
                    println!("{:<14} {}", status, count);
                }
            }
        }

        Command::Event {
            kind,
            direction,
            file,
        } => {
            let payload = read_payload(file.as_deref())?;
            let processor = build_processor(&config, db)?;
            apply_event(&processor, &kind, &direction, &payload).await?;
        }
    }

    Ok(())
}

fn build_processor(config: &Config, db: Database) -> Result<WebhookProcessor> {
    let provider = if config.provider.is_ready() {
        Some(ProviderClient::new(config.provider.clone()).context("failed to create provider client")?)
    } else {
        None
    };
    Ok(WebhookProcessor::new(
        Arc::new(db),
        provider,
        config.callbacks.clone(),
    ))
}

fn parse_instant(
    value: Option<&str>,
    flag: &str,
) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    value
        .map(|s| {
            chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .with_context(|| format!("invalid {} (expected RFC3339)", flag))
        })
        .transpose()
}

fn read_payload(file: Option<&std::path::Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read payload from {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read payload from stdin")?;
            Ok(buf)
        }
    }
}

async fn apply_event(
    processor: &WebhookProcessor,
    kind: &str,
    direction: &str,
    payload: &str,
) -> Result<()> {
    match kind {
        "start" => {
            let direction: Direction = direction
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid --direction: {}", e))?;
            let event: CallStartEvent = from_json(payload).context("invalid start payload")?;
            let doc = processor.handle_call_start(&event, direction).await;
            println!("{}", doc);
        }
        "amd" => {
            let event: AmdEvent = from_json(payload).context("invalid amd payload")?;
            processor.handle_amd(&event).await;
        }
        "speech" => {
            let event: SpeechEvent = from_json(payload).context("invalid speech payload")?;
            let doc = processor.handle_speech(&event).await;
            println!("{}", doc);
        }
        "no-response" => {
            let event: NoResponseEvent =
                from_json(payload).context("invalid no-response payload")?;
            let doc = processor.handle_no_response(&event).await;
            println!("{}", doc);
        }
        "status" => {
            let event: StatusEvent = from_json(payload).context("invalid status payload")?;
            processor.handle_status(&event).await;
        }
        other => anyhow::bail!(
            "Unknown event type: {}. Use start, amd, speech, no-response, or status",
            other
        ),
    }
    Ok(())
}

fn print_session_table(sessions: &[CallSession], total: i64, offset: usize) {
    if sessions.is_empty() {
        println!("No call sessions match.");
        return;
    }

    println!(
        "{:<36} {:<15} {:<9} {:<12} {:<10} {}",
        "CALL ID", "PHONE", "DIR", "STATUS", "ANSWERED", "UPDATED"
    );
    for session in sessions {
        println!(
            "{:<36} {:<15} {:<9} {:<12} {:<10} {}",
            session.call_id,
            session.phone_number,
            session.direction.as_str(),
            session.status.as_str(),
            session
                .answered_by
                .map(|a| a.as_str())
                .unwrap_or("-"),
            session.updated_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    println!(
        "\nShowing {}-{} of {}",
        offset + 1,
        offset + sessions.len(),
        total
    );
}

fn print_session_detail(session: &CallSession) {
    println!("Call ID:        {}", session.call_id);
    println!("Phone:          {}", session.phone_number);
    println!("Direction:      {}", session.direction);
    println!("Status:         {}", session.status);
    println!(
        "Answered by:    {}",
        session.answered_by.map(|a| a.as_str()).unwrap_or("-")
    );
    println!(
        "Response:       {}",
        session.response_text.as_deref().unwrap_or("-")
    );
    println!(
        "Classification: {}",
        session
            .response_classification
            .map(|c| c.as_str())
            .unwrap_or("-")
    );
    println!(
        "Duration:       {}",
        session
            .duration_seconds
            .map(|d| format!("{}s", d))
            .unwrap_or_else(|| "-".to_string())
    );
    println!("AMD resolved:   {}", session.amd_resolved);
    println!("Fallback sent:  {}", session.fallback_notified);
    println!("Created:        {}", session.created_at.to_rfc3339());
    println!("Updated:        {}", session.updated_at.to_rfc3339());

    if let Some(notes) = &session.notes {
        println!("Notes:");
        for line in notes.lines() {
            println!("  - {}", line);
        }
    }
}
