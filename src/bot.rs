// src/bot.rs
// Command surface: getUpdates long polling for /start, /stop, /status.

use std::time::Duration;

use anyhow::Result;
use html_escape::encode_text;

use crate::monitor::{
    BindOutcome, MonitorHandle, MonitorState, StartOutcome, StatusReport, StopOutcome,
};
use crate::notify::ChatId;
use crate::telegram::TelegramClient;

const POLL_TIMEOUT_SECS: u64 = 50;
const POLL_RETRY_PAUSE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
}

impl Command {
    /// Accepts the bare command or the `/cmd@botname` group form; anything
    /// else is ignored by the loop.
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.trim().split_whitespace().next()?;
        let bare = first.split('@').next().unwrap_or(first);
        match bare {
            "/start" => Some(Command::Start),
            "/stop" => Some(Command::Stop),
            "/status" => Some(Command::Status),
            _ => None,
        }
    }
}

/// Poll for commands forever. Transport errors are logged and retried;
/// this loop, like the monitor's, does not die in steady state.
pub async fn run_command_loop(
    api: TelegramClient,
    monitor: MonitorHandle,
    owner_chat: Option<ChatId>,
) -> Result<()> {
    if let Some(owner) = owner_chat {
        // Admin override: pre-bind the destination so only the owner chat
        // can ever control the monitor.
        monitor.bind_destination(owner);
        tracing::info!(chat = owner, "destination pre-bound to owner chat");
    }

    let mut offset = 0i64;
    loop {
        let updates = match api.get_updates(offset, POLL_TIMEOUT_SECS).await {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(error = %e, "getUpdates failed, retrying");
                tokio::time::sleep(POLL_RETRY_PAUSE).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(msg) = update.message else { continue };
            let Some(text) = msg.text.as_deref() else { continue };
            let Some(cmd) = Command::parse(text) else { continue };

            let chat = msg.chat.id;
            let reply = handle_command(cmd, chat, &monitor);
            if let Err(e) = api.send_message(chat, &reply).await {
                tracing::warn!(error = %e, chat, "command reply failed");
            }
        }
    }
}

/// Apply one command against the monitor and produce the HTML reply.
pub fn handle_command(cmd: Command, chat: ChatId, monitor: &MonitorHandle) -> String {
    // Once bound, the destination chat owns the monitor.
    if let Some(bound) = monitor.destination() {
        if bound != chat {
            return "This monitor already reports to another chat.".to_string();
        }
    }

    match cmd {
        Command::Start => {
            match monitor.bind_destination(chat) {
                BindOutcome::OtherChat => {
                    return "This monitor already reports to another chat.".to_string()
                }
                BindOutcome::Bound | BindOutcome::AlreadyBound => {}
            }
            match monitor.start() {
                StartOutcome::AlreadyRunning => "Already running. /status, /stop.".to_string(),
                StartOutcome::Started => {
                    "Monitoring started. New job listings will arrive here.\n\
                     The first cycle reports everything currently on the page."
                        .to_string()
                }
            }
        }
        Command::Stop => match monitor.stop() {
            StopOutcome::NotRunning => "Monitor is not running. /start".to_string(),
            StopOutcome::Stopping => "Stopping at the next checkpoint.".to_string(),
        },
        Command::Status => format_status(&monitor.status()),
    }
}

fn fmt_bool(v: bool) -> &'static str {
    if v {
        "yes"
    } else {
        "no"
    }
}

/// Sectioned HTML status reply: monitor, cache, last cycle, errors.
pub fn format_status(report: &StatusReport) -> String {
    let running = report.state == MonitorState::Running;
    let bound = match report.destination {
        Some(_) => "yes",
        None => "no",
    };
    let last_at = report
        .last_cycle
        .at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "—".to_string());
    let last_error = report
        .last_cycle
        .last_error
        .as_deref()
        .map(|e| encode_text(e).to_string())
        .unwrap_or_else(|| "—".to_string());

    [
        "<b>jobwatch status</b>".to_string(),
        String::new(),
        "<b>Monitor</b>".to_string(),
        format!(
            "<blockquote>Running: {}\nDestination bound: {}\nSent: <code>{}</code>\nCycles: <code>{}</code></blockquote>",
            fmt_bool(running),
            bound,
            report.sent_total,
            report.cycles
        ),
        String::new(),
        "<b>Cache</b>".to_string(),
        format!(
            "<blockquote>Seen: <code>{}/{}</code></blockquote>",
            report.seen, report.seen_cap
        ),
        String::new(),
        "<b>Last cycle</b>".to_string(),
        format!(
            "<blockquote>At: <code>{}</code>\nFound: <code>{}</code>\nNew: <code>{}</code>\nDispatched: <code>{}</code></blockquote>",
            last_at, report.last_cycle.found, report.last_cycle.fresh, report.last_cycle.dispatched
        ),
        String::new(),
        "<b>Errors</b>".to_string(),
        format!("<blockquote>Last error: <code>{last_error}</code></blockquote>"),
    ]
    .join("\n")
}
