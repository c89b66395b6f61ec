//! Command dispatch for chat messages
//!
//! Every incoming message is first offered to the confirmation gate, then
//! parsed as `{prefix}{command}`. Anything else is ignored.

use crate::BotState;
use crate::error::BotResult;
use async_trait::async_trait;
use lab_gate::{Initiator, Offer};
use tracing::{debug, error, info};

/// Where a handler's replies go: a Discord channel, stdout in `exec` mode.
#[async_trait]
pub trait Replier: Send + Sync {
    async fn send(&self, text: &str) -> BotResult<()>;
}

/// One chat message, stripped of transport details.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub author: Initiator,
    pub content: String,
    pub is_bot: bool,
}

impl IncomingMessage {
    pub fn new(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author: Initiator::new(author),
            content: content.into(),
            is_bot: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Wake,
    Status,
    Shutdown,
    NotNow,
    ShutdownStatus,
    Banned,
    NcBans,
    Help,
}

impl Command {
    pub const ALL: [Command; 8] = [
        Command::Wake,
        Command::Status,
        Command::Shutdown,
        Command::NotNow,
        Command::ShutdownStatus,
        Command::Banned,
        Command::NcBans,
        Command::Help,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Wake => "wake",
            Self::Status => "status",
            Self::Shutdown => "shutdown",
            Self::NotNow => "notnow",
            Self::ShutdownStatus => "shutdown_status",
            Self::Banned => "banned",
            Self::NcBans => "ncbans",
            Self::Help => "help",
        }
    }

    pub fn summary(&self) -> &'static str {
        match self {
            Self::Wake => "Wake Proxmox via Wake-on-LAN",
            Self::Status => "Check status of all services",
            Self::Shutdown => "Shut down Proxmox (asks for confirmation)",
            Self::NotNow => "Skip tonight's scheduled shutdown",
            Self::ShutdownStatus => "Show whether tonight's shutdown is active or skipped",
            Self::Banned => "List IPs banned at Cloudflare",
            Self::NcBans => "List Nextcloud brute-force bans",
            Self::Help => "Show this list",
        }
    }
}

/// `!wake extra words` → `Some(Wake)`. Unknown names and unprefixed text
/// give `None`.
pub fn parse_command(prefix: &str, content: &str) -> Option<Command> {
    let rest = content.trim_start().strip_prefix(prefix)?;
    let name = rest.split_whitespace().next()?;
    // `! wake` is not a command.
    if !rest.starts_with(name) {
        return None;
    }
    Command::from_name(name)
}

/// Handle one message end to end. Never returns an error: failures are
/// logged and reported to the user.
pub async fn handle_message(state: &BotState, msg: &IncomingMessage, replier: &dyn Replier) {
    if msg.is_bot {
        return;
    }

    if state.gate.offer(&msg.author, &msg.content) == Offer::Confirmed {
        return;
    }

    let Some(command) = parse_command(&state.config.prefix, &msg.content) else {
        if msg.content.starts_with(&state.config.prefix) {
            debug!(content = %msg.content, "ignoring unknown command");
        }
        return;
    };

    info!(command = command.name(), author = %msg.author, "handling command");

    if let Err(e) = dispatch(state, command, msg, replier).await {
        error!(command = command.name(), error = %e, "command failed");
        if let Err(e) = replier.send(&format!("⚠️ Error: {e}")).await {
            error!(error = %e, "failed to report command error");
        }
    }
}

async fn dispatch(
    state: &BotState,
    command: Command,
    msg: &IncomingMessage,
    replier: &dyn Replier,
) -> BotResult<()> {
    match command {
        // ── Power ──────────────────────────────────────────────────────────
        Command::Wake => crate::power_cmd::handle_wake(state, replier).await,
        Command::Shutdown => crate::power_cmd::handle_shutdown(state, &msg.author, replier).await,
        Command::NotNow => crate::power_cmd::handle_not_now(state, replier).await,
        Command::ShutdownStatus => crate::power_cmd::handle_shutdown_status(state, replier).await,

        // ── Health ─────────────────────────────────────────────────────────
        Command::Status => crate::status_cmd::handle_status(state, replier).await,

        // ── Firewall ───────────────────────────────────────────────────────
        Command::Banned => crate::firewall_cmd::handle_banned(state, replier).await,
        Command::NcBans => crate::firewall_cmd::handle_nc_bans(state, replier).await,

        Command::Help => replier.send(&help_text(&state.config.prefix)).await,
    }
}

pub fn help_text(prefix: &str) -> String {
    let mut lines = vec!["🤖 **Commands**".to_string()];
    lines.extend(
        Command::ALL
            .iter()
            .map(|c| format!("`{prefix}{}` - {}", c.name(), c.summary())),
    );
    lines.join("\n")
}
