//! Server configuration

use clap::Parser;
use lab_exec::wol::DEFAULT_BROADCAST;
use lab_secrets::Credential;
use std::net::SocketAddr;

pub const DEFAULT_BIND: &str = "0.0.0.0:5000";
pub const DEFAULT_BOT_PATTERN: &str = "gogu-bot";

#[derive(Debug, Clone, Parser)]
#[command(name = "pi-server")]
#[command(about = "Raspberry Pi status and Wake-on-LAN service")]
#[command(version)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "PI_SERVER_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// MAC address of the Proxmox host, e.g. AA:BB:CC:DD:EE:FF
    #[arg(long, env = "PROXMOX_MAC")]
    pub proxmox_mac: Option<String>,

    /// Discord webhook notified after every wake
    #[arg(long, env = "DISCORD_WEBHOOK_URL", hide_env_values = true)]
    pub discord_webhook_url: Option<Credential>,

    /// Where magic packets are sent
    #[arg(long, env = "WOL_BROADCAST", default_value = DEFAULT_BROADCAST)]
    pub wol_broadcast: SocketAddr,

    /// Process name or command-line fragment identifying the bot
    #[arg(long, env = "BOT_PROCESS_PATTERN", default_value = DEFAULT_BOT_PATTERN)]
    pub bot_process_pattern: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::parse_from(["pi-server"]);
        assert_eq!(config.bind, "0.0.0.0:5000".parse::<SocketAddr>().expect("addr"));
        assert_eq!(
            config.wol_broadcast,
            "255.255.255.255:9".parse::<SocketAddr>().expect("addr")
        );
        assert_eq!(config.bot_process_pattern, "gogu-bot");
    }

    #[test]
    fn test_webhook_url_is_redacted() {
        let config = ServerConfig::parse_from([
            "pi-server",
            "--discord-webhook-url",
            "https://discord.com/api/webhooks/1/secret-part",
        ]);
        assert!(!format!("{config:?}").contains("secret-part"));
    }
}
