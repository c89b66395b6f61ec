//! Firewall command handlers
//!
//! Implements: banned, ncbans

use crate::BotState;
use crate::cloudflare::{BanList, FirewallError};
use crate::commands::Replier;
use crate::error::BotResult;
use crate::power_cmd::NO_HOST_REPLY;
use lab_exec::{ExecError, ExecOutput};

/// Rows shown in the `banned` table.
pub const MAX_LISTED_BANS: usize = 20;

// ─── banned ───────────────────────────────────────────────────────────────────

pub async fn handle_banned(state: &BotState, replier: &dyn Replier) -> BotResult<()> {
    let Some(cloudflare) = &state.cloudflare else {
        return replier.send("⚠️ Cloudflare is not configured.").await;
    };
    let result = cloudflare.list_bans().await;
    replier.send(&render_bans(&result)).await
}

pub fn render_bans(result: &Result<BanList, FirewallError>) -> String {
    let bans = match result {
        Ok(bans) => bans,
        Err(FirewallError::Rejected(_)) => return "❌ Failed to fetch banned IPs.".to_string(),
        Err(FirewallError::Outbound(e)) => return format!("⚠️ Error: {e}"),
    };
    if bans.entries.is_empty() {
        return "🎉 No IPs currently banned.".to_string();
    }

    let mut lines = vec!["🛡️ **Banned IPs**".to_string(), "```".to_string()];
    for ban in bans.entries.iter().take(MAX_LISTED_BANS) {
        let date: String = ban.created_on.chars().take(10).collect();
        lines.push(format!("{:<20} | {date}", ban.ip));
    }
    lines.push(format!("```\nTotal: {} blocked", bans.total));
    lines.join("\n")
}

// ─── ncbans ───────────────────────────────────────────────────────────────────

pub async fn handle_nc_bans(state: &BotState, replier: &dyn Replier) -> BotResult<()> {
    let Some(target) = state.config.proxmox_target() else {
        return replier.send(NO_HOST_REPLY).await;
    };
    replier.send("🔍 Checking Nextcloud bans...").await?;
    let result = state
        .executor
        .run(
            &target,
            &state.config.nc_bans_script,
            state.config.nc_bans_timeout(),
        )
        .await;
    replier.send(&render_nc_bans(&result)).await
}

/// The script formats its own output for chat; it is passed through as is.
pub fn render_nc_bans(result: &Result<ExecOutput, ExecError>) -> String {
    match result {
        Ok(out) if out.stdout.trim().is_empty() => "✅ No Nextcloud bans reported.".to_string(),
        Ok(out) => out.stdout.clone(),
        Err(e) if e.is_command_failure() => {
            format!("⚠️ Failed to check bans: {}", e.user_detail())
        }
        Err(e) => format!("⚠️ Error: {e}"),
    }
}
