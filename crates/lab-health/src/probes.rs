//! Probes for the services the home-lab bot reports on.

use crate::{HealthError, Probe, ProbeFailure, ProbeResult};
use async_trait::async_trait;
use lab_proto::OutboundError;
use lab_secrets::Credential;
use serde::Deserialize;
use std::time::Duration;

async fn get(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<reqwest::Response, OutboundError> {
    request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| OutboundError::from_reqwest(e, timeout))
}

// ─── Vault ────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct VaultHealth {
    #[serde(default)]
    sealed: bool,
}

/// Reason for each non-200 code Vault's health endpoint uses by default.
fn vault_health_reason(status: u16) -> Option<&'static str> {
    match status {
        429 => Some("standby"),
        472 => Some("dr secondary"),
        473 => Some("performance standby"),
        501 => Some("uninitialized"),
        503 => Some("sealed"),
        _ => None,
    }
}

/// `GET /v1/sys/health`. Sealed, standby or uninitialized is a business-level
/// failure.
pub struct VaultProbe {
    addr: String,
    client: reqwest::Client,
}

impl VaultProbe {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Probe for VaultProbe {
    fn name(&self) -> &str {
        "Vault"
    }

    fn icon(&self) -> &str {
        "🔐"
    }

    async fn probe(&self, timeout: Duration) -> ProbeResult {
        let resp = get(
            self.client.get(format!("{}/v1/sys/health", self.addr)),
            timeout,
        )
        .await?;

        let status = resp.status();
        if let Some(reason) = vault_health_reason(status.as_u16()) {
            return Err(ProbeFailure::Unavailable(reason.to_string()));
        }
        if status != reqwest::StatusCode::OK {
            return Err(OutboundError::from_status(status).into());
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| OutboundError::from_reqwest(e, timeout))?;
        let health: VaultHealth = serde_json::from_slice(&body)
            .map_err(|e| OutboundError::MalformedResponse(e.to_string()))?;

        if health.sealed {
            Err(ProbeFailure::Unavailable("sealed".to_string()))
        } else {
            Ok(Some("unsealed".to_string()))
        }
    }
}

// ─── Tautulli ─────────────────────────────────────────────────────────────────

/// `GET /api/v2?cmd=status&apikey=…`.
pub struct TautulliProbe {
    url: String,
    api_key: Option<Credential>,
    client: reqwest::Client,
}

impl TautulliProbe {
    pub fn new(url: &str, api_key: Option<Credential>) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Probe for TautulliProbe {
    fn name(&self) -> &str {
        "Tautulli"
    }

    fn icon(&self) -> &str {
        "📺"
    }

    async fn probe(&self, timeout: Duration) -> ProbeResult {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| OutboundError::NotConfigured("Tautulli API key".to_string()))?;

        let request = self
            .client
            .get(format!("{}/api/v2", self.url))
            .query(&[("cmd", "status"), ("apikey", api_key.expose())]);
        let resp = get(request, timeout).await?;

        if resp.status() != reqwest::StatusCode::OK {
            return Err(OutboundError::from_status(resp.status()).into());
        }
        Ok(None)
    }
}

// ─── Proxmox ──────────────────────────────────────────────────────────────────

/// `GET /api2/json/nodes` with an API token. Accepts the host's self-signed
/// certificate.
pub struct ProxmoxProbe {
    base_url: String,
    token_id: Option<String>,
    token_secret: Option<Credential>,
    client: reqwest::Client,
}

impl ProxmoxProbe {
    /// Probe `https://{host}:8006`.
    pub fn for_host(
        host: &str,
        token_id: Option<String>,
        token_secret: Option<Credential>,
    ) -> Result<Self, HealthError> {
        Self::new(&format!("https://{host}:8006"), token_id, token_secret)
    }

    pub fn new(
        base_url: &str,
        token_id: Option<String>,
        token_secret: Option<Credential>,
    ) -> Result<Self, HealthError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token_id,
            token_secret,
            client,
        })
    }
}

#[async_trait]
impl Probe for ProxmoxProbe {
    fn name(&self) -> &str {
        "Proxmox"
    }

    fn icon(&self) -> &str {
        "🖥️"
    }

    async fn probe(&self, timeout: Duration) -> ProbeResult {
        let (Some(token_id), Some(secret)) = (&self.token_id, &self.token_secret) else {
            return Err(OutboundError::NotConfigured("Proxmox API token".to_string()).into());
        };

        let request = self
            .client
            .get(format!("{}/api2/json/nodes", self.base_url))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("PVEAPIToken={token_id}={}", secret.expose()),
            );
        let resp = get(request, timeout).await?;

        if resp.status() != reqwest::StatusCode::OK {
            return Err(OutboundError::from_status(resp.status()).into());
        }
        Ok(None)
    }
}

// ─── Local ────────────────────────────────────────────────────────────────────

/// The machine the bot runs on. Answering at all means it is up.
pub struct LocalProbe {
    name: String,
    icon: String,
}

impl LocalProbe {
    pub fn new(name: &str, icon: &str) -> Self {
        Self {
            name: name.to_string(),
            icon: icon.to_string(),
        }
    }
}

impl Default for LocalProbe {
    fn default() -> Self {
        Self::new("Pi", "🍓")
    }
}

#[async_trait]
impl Probe for LocalProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn icon(&self) -> &str {
        &self.icon
    }

    async fn probe(&self, _timeout: Duration) -> ProbeResult {
        Ok(None)
    }
}

// ─── Unconfigured ─────────────────────────────────────────────────────────────

/// Stands in for a service whose settings are missing, so it still gets a
/// line in the report.
pub struct UnconfiguredProbe {
    name: String,
    icon: String,
    missing: String,
}

impl UnconfiguredProbe {
    pub fn new(name: &str, icon: &str, missing: &str) -> Self {
        Self {
            name: name.to_string(),
            icon: icon.to_string(),
            missing: missing.to_string(),
        }
    }
}

#[async_trait]
impl Probe for UnconfiguredProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn icon(&self) -> &str {
        &self.icon
    }

    async fn probe(&self, _timeout: Duration) -> ProbeResult {
        Err(OutboundError::NotConfigured(self.missing.clone()).into())
    }
}
