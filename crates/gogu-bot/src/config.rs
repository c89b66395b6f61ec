//! Bot configuration
//!
//! Read once at startup from flags or the environment (a `.env` file is
//! loaded first when present) and shared read-only afterwards.

use clap::Args;
use lab_exec::Target;
use lab_secrets::{Credential, VaultKvSource};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_PREFIX: &str = "!";
pub const DEFAULT_VAULT_MOUNT: &str = "homelab";
pub const DEFAULT_VAULT_SECRET_PATH: &str = "apis/discord-bot";
pub const DEFAULT_VAULT_SECRET_FIELD: &str = "token";
pub const DEFAULT_PROXMOX_USER: &str = "root";
pub const DEFAULT_CF_API_BASE: &str = "https://api.cloudflare.com/client/v4";
pub const DEFAULT_WAKE_COMMAND: &str = "/usr/local/bin/arise";
pub const DEFAULT_NOT_NOW_COMMAND: &str = "not-now";
pub const DEFAULT_SKIP_FLAG: &str = "/var/run/skip_shutdown_today";
pub const DEFAULT_NC_BANS_SCRIPT: &str = "/usr/local/bin/check_nc_bans.sh";

#[derive(Debug, Clone, Args)]
pub struct BotConfig {
    /// Vault server address, e.g. http://vault.lan:8200
    #[arg(long, env = "VAULT_ADDR")]
    pub vault_addr: Option<String>,

    #[arg(long, env = "VAULT_TOKEN", hide_env_values = true)]
    pub vault_token: Option<Credential>,

    #[arg(long, env = "VAULT_MOUNT", default_value = DEFAULT_VAULT_MOUNT)]
    pub vault_mount: String,

    #[arg(long, env = "VAULT_SECRET_PATH", default_value = DEFAULT_VAULT_SECRET_PATH)]
    pub vault_secret_path: String,

    #[arg(long, env = "VAULT_SECRET_FIELD", default_value = DEFAULT_VAULT_SECRET_FIELD)]
    pub vault_secret_field: String,

    /// Used when Vault is unset or unreachable
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub discord_token: Option<Credential>,

    #[arg(long, env = "BOT_PREFIX", default_value = DEFAULT_PREFIX)]
    pub prefix: String,

    /// Proxmox host reached over ssh and the HTTPS API
    #[arg(long, env = "PROXMOX_HOST")]
    pub proxmox_host: Option<String>,

    #[arg(long, env = "PROXMOX_USER", default_value = DEFAULT_PROXMOX_USER)]
    pub proxmox_user: String,

    /// API token id, e.g. root@pam!gogu
    #[arg(long, env = "PROXMOX_TOKEN_ID")]
    pub proxmox_token_id: Option<String>,

    #[arg(long, env = "PROXMOX_TOKEN_SECRET", hide_env_values = true)]
    pub proxmox_token_secret: Option<Credential>,

    #[arg(long, env = "TAUTULLI_URL")]
    pub tautulli_url: Option<String>,

    #[arg(long, env = "TAUTULLI_API_KEY", hide_env_values = true)]
    pub tautulli_api_key: Option<Credential>,

    #[arg(long, env = "CF_ZONE_ID")]
    pub cf_zone_id: Option<String>,

    #[arg(long, env = "CF_API_TOKEN", hide_env_values = true)]
    pub cf_api_token: Option<Credential>,

    #[arg(long, env = "CF_API_BASE", default_value = DEFAULT_CF_API_BASE)]
    pub cf_api_base: String,

    /// Local command that wakes the Proxmox host
    #[arg(long, env = "WAKE_COMMAND", default_value = DEFAULT_WAKE_COMMAND)]
    pub wake_command: String,

    /// Remote command that skips tonight's scheduled shutdown
    #[arg(long, env = "NOT_NOW_COMMAND", default_value = DEFAULT_NOT_NOW_COMMAND)]
    pub not_now_command: String,

    /// Remote flag file whose presence means tonight's shutdown is skipped
    #[arg(long, env = "SKIP_FLAG", default_value = DEFAULT_SKIP_FLAG)]
    pub skip_flag: String,

    /// Remote script reporting Nextcloud brute-force bans
    #[arg(long, env = "NC_BANS_SCRIPT", default_value = DEFAULT_NC_BANS_SCRIPT)]
    pub nc_bans_script: String,

    #[arg(long, env = "CONFIRM_WINDOW_SECS", default_value_t = 30)]
    pub confirm_window_secs: u64,

    #[arg(long, env = "SSH_TIMEOUT_SECS", default_value_t = 10)]
    pub ssh_timeout_secs: u64,

    #[arg(long, env = "NC_BANS_TIMEOUT_SECS", default_value_t = 15)]
    pub nc_bans_timeout_secs: u64,

    #[arg(long, env = "PROBE_TIMEOUT_SECS", default_value_t = 5)]
    pub probe_timeout_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            vault_addr: None,
            vault_token: None,
            vault_mount: DEFAULT_VAULT_MOUNT.to_string(),
            vault_secret_path: DEFAULT_VAULT_SECRET_PATH.to_string(),
            vault_secret_field: DEFAULT_VAULT_SECRET_FIELD.to_string(),
            discord_token: None,
            prefix: DEFAULT_PREFIX.to_string(),
            proxmox_host: None,
            proxmox_user: DEFAULT_PROXMOX_USER.to_string(),
            proxmox_token_id: None,
            proxmox_token_secret: None,
            tautulli_url: None,
            tautulli_api_key: None,
            cf_zone_id: None,
            cf_api_token: None,
            cf_api_base: DEFAULT_CF_API_BASE.to_string(),
            wake_command: DEFAULT_WAKE_COMMAND.to_string(),
            not_now_command: DEFAULT_NOT_NOW_COMMAND.to_string(),
            skip_flag: DEFAULT_SKIP_FLAG.to_string(),
            nc_bans_script: DEFAULT_NC_BANS_SCRIPT.to_string(),
            confirm_window_secs: 30,
            ssh_timeout_secs: 10,
            nc_bans_timeout_secs: 15,
            probe_timeout_secs: 5,
        }
    }
}

impl BotConfig {
    /// The exact text that confirms a pending shutdown.
    pub fn confirm_token(&self) -> String {
        format!("{}confirm_shutdown", self.prefix)
    }

    pub fn confirm_window(&self) -> Duration {
        Duration::from_secs(self.confirm_window_secs)
    }

    pub fn ssh_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh_timeout_secs)
    }

    pub fn nc_bans_timeout(&self) -> Duration {
        Duration::from_secs(self.nc_bans_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// `None` when no Proxmox host is configured.
    pub fn proxmox_target(&self) -> Option<Target> {
        self.proxmox_host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(|host| Target::ssh(&self.proxmox_user, host))
    }

    /// Vault source for the Discord token, when both address and token are set.
    pub fn vault_source(&self) -> Option<VaultKvSource> {
        let addr = self.vault_addr.as_deref().filter(|a| !a.trim().is_empty())?;
        let token = self.vault_token.clone().filter(|t| !t.is_empty())?;
        match VaultKvSource::new(addr, token) {
            Ok(source) => Some(source.with_secret(
                &self.vault_mount,
                &self.vault_secret_path,
                &self.vault_secret_field,
            )),
            Err(e) => {
                warn!(error = %e, "ignoring unusable Vault address");
                None
            }
        }
    }
}
