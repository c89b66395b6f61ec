//! Discord transport
//!
//! Bridges serenity gateway events to [`handle_message`]. Each event runs on
//! its own serenity task, so a pending shutdown confirmation never blocks
//! other commands.

use crate::SharedState;
use crate::commands::{IncomingMessage, Replier, handle_message};
use crate::error::{BotError, BotResult};
use async_trait::async_trait;
use lab_gate::Initiator;
use lab_secrets::Credential;
use serenity::all::{ChannelId, Client, Context, EventHandler, GatewayIntents, Http, Message, Ready};
use std::sync::Arc;
use tracing::info;

/// Discord rejects messages longer than this many characters.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

const FENCE: &str = "```";
const FENCE_CLOSE: &str = "\n```\n";

fn has_open_fence(text: &str) -> bool {
    text.matches(FENCE).count() % 2 == 1
}

/// Cut `text` to the message limit, marking the cut with `…`. A code block
/// left open by the cut is closed first.
pub fn truncate_for_discord(text: &str) -> String {
    if text.chars().count() <= DISCORD_MESSAGE_LIMIT {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(DISCORD_MESSAGE_LIMIT - 1).collect();
    if has_open_fence(&cut) {
        let keep = DISCORD_MESSAGE_LIMIT - 1 - FENCE_CLOSE.chars().count();
        cut = text.chars().take(keep).collect();
        // Shortening can drop the fence that was open.
        if has_open_fence(&cut) {
            cut.push_str(FENCE_CLOSE);
        }
    }
    cut.push('…');
    cut
}

/// Replies into the channel the command came from.
pub struct DiscordReplier {
    http: Arc<Http>,
    channel: ChannelId,
}

#[async_trait]
impl Replier for DiscordReplier {
    async fn send(&self, text: &str) -> BotResult<()> {
        self.channel
            .say(&self.http, truncate_for_discord(text))
            .await
            .map(|_| ())
            .map_err(|e| BotError::Reply(e.to_string()))
    }
}

pub struct Handler {
    state: SharedState,
}

impl Handler {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            user = %ready.user.name,
            id = %ready.user.id,
            guilds = ready.guilds.len(),
            "logged in to Discord"
        );
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let incoming = IncomingMessage {
            author: Initiator::new(msg.author.id.to_string()),
            content: msg.content.clone(),
            is_bot: msg.author.bot,
        };
        let replier = DiscordReplier {
            http: Arc::clone(&ctx.http),
            channel: msg.channel_id,
        };
        handle_message(&self.state, &incoming, &replier).await;
    }
}

pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
}

/// Connect and serve until the gateway connection ends.
pub async fn run(state: SharedState, token: &Credential) -> BotResult<()> {
    let mut client = Client::builder(token.expose(), intents())
        .event_handler(Handler::new(state))
        .await
        .map_err(|e| BotError::Discord(e.to_string()))?;

    info!("connecting to Discord gateway");
    client
        .start()
        .await
        .map_err(|e| BotError::Discord(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(truncate_for_discord("✅ ok"), "✅ ok");
        let exact = "x".repeat(DISCORD_MESSAGE_LIMIT);
        assert_eq!(truncate_for_discord(&exact), exact);
    }

    #[test]
    fn test_long_text_cut_on_char_boundary() {
        let long = "🛡️".repeat(DISCORD_MESSAGE_LIMIT);
        let cut = truncate_for_discord(&long);
        assert_eq!(cut.chars().count(), DISCORD_MESSAGE_LIMIT);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn test_cut_inside_code_block_closes_the_fence() {
        let rows: String = (0..400).map(|i| format!("203.0.113.{i}  admin\n")).collect();
        let report = format!("```\n{rows}```");
        let cut = truncate_for_discord(&report);

        assert!(cut.chars().count() <= DISCORD_MESSAGE_LIMIT);
        assert_eq!(cut.matches("```").count() % 2, 0);
        assert!(cut.ends_with("\n```\n…"));
    }

    #[test]
    fn test_cut_after_closed_block_adds_no_fence() {
        let text = format!("```\nshort\n```\n{}", "x".repeat(DISCORD_MESSAGE_LIMIT));
        let cut = truncate_for_discord(&text);
        assert_eq!(cut.chars().count(), DISCORD_MESSAGE_LIMIT);
        assert_eq!(cut.matches("```").count(), 2);
        assert!(cut.ends_with("x…"));
    }

    #[test]
    fn test_intents_include_message_content() {
        assert!(intents().contains(GatewayIntents::MESSAGE_CONTENT));
    }
}
