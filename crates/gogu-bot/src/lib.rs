//! gogu-bot: home-lab control bot
//!
//! Listens for prefixed chat commands and routes them to handlers that wake,
//! inspect and (behind a confirmation window) shut down the Proxmox host.
//! The Discord adapter lives in [`discord`]; everything else is
//! transport-independent and driven through the [`commands::Replier`] seam.

#![forbid(unsafe_code)]

pub mod cloudflare;
pub mod commands;
pub mod config;
pub mod discord;
pub mod error;
pub mod firewall_cmd;
pub mod power_cmd;
pub mod status_cmd;

use cloudflare::CloudflareClient;
use lab_exec::{Executor, ProcessExecutor};
use lab_gate::ConfirmationGate;
use lab_health::{
    HealthAggregator, LocalProbe, Probe, ProxmoxProbe, TautulliProbe, UnconfiguredProbe,
    VaultProbe,
};
use lab_secrets::{Credential, SecretSource};
use std::sync::Arc;

pub use commands::{Command, IncomingMessage, Replier, handle_message};
pub use config::BotConfig;
pub use error::{BotError, BotResult};

// ─── Bot state ────────────────────────────────────────────────────────────────

/// Everything a command handler needs. Built once, shared behind an `Arc`.
pub struct BotState {
    pub config: Arc<BotConfig>,
    pub executor: Arc<dyn Executor>,
    pub aggregator: HealthAggregator,
    pub probes: Vec<Arc<dyn Probe>>,
    pub cloudflare: Option<CloudflareClient>,
    pub gate: ConfirmationGate,
}

impl BotState {
    pub fn new(config: BotConfig) -> BotResult<Self> {
        let probes = build_probes(&config)?;
        let cloudflare = CloudflareClient::from_config(&config);
        Ok(Self {
            aggregator: HealthAggregator::new(config.probe_timeout()),
            gate: ConfirmationGate::new(config.confirm_token()),
            executor: Arc::new(ProcessExecutor::new()),
            probes,
            cloudflare,
            config: Arc::new(config),
        })
    }

    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_probes(mut self, probes: Vec<Arc<dyn Probe>>) -> Self {
        self.probes = probes;
        self
    }
}

pub type SharedState = Arc<BotState>;

/// The Discord token: Vault first, then `DISCORD_TOKEN`. No token from either
/// is a fatal startup error.
pub async fn resolve_token(config: &BotConfig) -> BotResult<Credential> {
    let vault = config.vault_source();
    let token = lab_secrets::require(
        vault.as_ref().map(|v| v as &dyn SecretSource),
        config.discord_token.clone(),
    )
    .await?;
    Ok(token)
}

/// Vault, Tautulli, Proxmox and the local Pi, in report order. A service
/// with missing settings still gets a line.
fn build_probes(config: &BotConfig) -> BotResult<Vec<Arc<dyn Probe>>> {
    let vault: Arc<dyn Probe> = match config.vault_addr.as_deref() {
        Some(addr) => Arc::new(VaultProbe::new(addr)),
        None => Arc::new(UnconfiguredProbe::new("Vault", "🔐", "VAULT_ADDR")),
    };

    let tautulli: Arc<dyn Probe> = match config.tautulli_url.as_deref() {
        Some(url) => Arc::new(TautulliProbe::new(url, config.tautulli_api_key.clone())),
        None => Arc::new(UnconfiguredProbe::new("Tautulli", "📺", "TAUTULLI_URL")),
    };

    let proxmox: Arc<dyn Probe> = match config.proxmox_host.as_deref() {
        Some(host) => Arc::new(ProxmoxProbe::for_host(
            host,
            config.proxmox_token_id.clone(),
            config.proxmox_token_secret.clone(),
        )?),
        None => Arc::new(UnconfiguredProbe::new("Proxmox", "🖥️", "PROXMOX_HOST")),
    };

    Ok(vec![vault, tautulli, proxmox, Arc::new(LocalProbe::default())])
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probes_cover_every_service_even_unconfigured() {
        let state = BotState::new(BotConfig::default()).expect("state");
        let names: Vec<&str> = state.probes.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["Vault", "Tautulli", "Proxmox", "Pi"]);
        assert!(state.cloudflare.is_none());
        assert_eq!(state.gate.token(), "!confirm_shutdown");
    }
}
