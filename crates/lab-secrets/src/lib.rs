//! Startup credential fetching for labops processes.
//!
//! Provides [`Credential`], the [`SecretSource`] seam, a Vault KV v2 source
//! and [`fetch`], which tries the primary source once and falls back to a
//! locally configured value.
//!
//! # Security notes
//! - `Credential` implements `Debug` and `Display` as `[REDACTED]`.
//! - The credential bytes are zeroed on drop.
//! - Fetch failures are logged without the secret or the Vault token.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use lab_proto::OutboundError;
use serde::Deserialize;
use std::convert::Infallible;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use zeroize::Zeroize;

/// Vault request timeout used unless overridden.
pub const DEFAULT_VAULT_TIMEOUT: Duration = Duration::from_secs(5);

// ─────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// Neither the primary source nor the fallback produced a credential.
    #[error("no usable credential: {0}")]
    FatalInit(String),
    #[error("invalid secret store address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },
    #[error(transparent)]
    Outbound(#[from] OutboundError),
}

// ─────────────────────────────────────────────────────────────
// Credential
// ─────────────────────────────────────────────────────────────

/// An opaque bearer string held in process memory only.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Treats a missing or blank value as absent.
    pub fn from_optional(value: Option<String>) -> Option<Self> {
        value
            .filter(|v| !v.trim().is_empty())
            .map(|v| Self(v.trim().to_string()))
    }

    /// The raw secret. Call only at the point of use.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl FromStr for Credential {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

// ─────────────────────────────────────────────────────────────
// Sources
// ─────────────────────────────────────────────────────────────

/// Somewhere a credential can be fetched from over the network.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Human-readable description for logs (never includes the secret).
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<Credential, OutboundError>;
}

/// Reads one field of a Vault KV v2 secret.
pub struct VaultKvSource {
    client: reqwest::Client,
    addr: String,
    token: Credential,
    mount: String,
    path: String,
    field: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct KvEnvelope {
    data: KvData,
}

#[derive(Deserialize)]
struct KvData {
    data: serde_json::Map<String, serde_json::Value>,
}

impl VaultKvSource {
    /// Source for `homelab/apis/discord-bot`, field `token`.
    pub fn new(addr: &str, token: Credential) -> Result<Self, SecretError> {
        Url::parse(addr).map_err(|e| SecretError::InvalidAddress {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            addr: addr.trim_end_matches('/').to_string(),
            token,
            mount: "homelab".to_string(),
            path: "apis/discord-bot".to_string(),
            field: "token".to_string(),
            timeout: DEFAULT_VAULT_TIMEOUT,
        })
    }

    pub fn with_secret(mut self, mount: &str, path: &str, field: &str) -> Self {
        self.mount = mount.trim_matches('/').to_string();
        self.path = path.trim_matches('/').to_string();
        self.field = field.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn secret_url(&self) -> String {
        format!("{}/v1/{}/data/{}", self.addr, self.mount, self.path)
    }
}

#[async_trait]
impl SecretSource for VaultKvSource {
    fn describe(&self) -> String {
        format!("vault {}/{}#{}", self.mount, self.path, self.field)
    }

    async fn fetch(&self) -> Result<Credential, OutboundError> {
        let resp = self
            .client
            .get(self.secret_url())
            .header("X-Vault-Token", self.token.expose())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| OutboundError::from_reqwest(e, self.timeout))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(OutboundError::from_status(status));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| OutboundError::from_reqwest(e, self.timeout))?;
        let envelope: KvEnvelope = serde_json::from_slice(&body)
            .map_err(|e| OutboundError::MalformedResponse(e.to_string()))?;

        envelope
            .data
            .data
            .get(&self.field)
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .map(Credential::new)
            .ok_or_else(|| {
                OutboundError::MalformedResponse(format!("field '{}' missing", self.field))
            })
    }
}

// ─────────────────────────────────────────────────────────────
// Fetching
// ─────────────────────────────────────────────────────────────

/// Try `primary` once; on any failure return `fallback`.
///
/// No retries. Returns `None` when both are unavailable.
pub async fn fetch(
    primary: Option<&dyn SecretSource>,
    fallback: Option<Credential>,
) -> Option<Credential> {
    if let Some(source) = primary {
        match source.fetch().await {
            Ok(credential) => {
                info!(source = %source.describe(), "credential fetched from secret store");
                return Some(credential);
            }
            Err(e) => {
                warn!(
                    source = %source.describe(),
                    kind = ?e.kind(),
                    error = %e,
                    fallback = fallback.is_some(),
                    "failed to fetch credential from secret store"
                );
            }
        }
    } else {
        debug!("no secret store configured, using fallback credential");
    }
    fallback
}

/// Like [`fetch`] but an absent credential is a fatal initialization error.
pub async fn require(
    primary: Option<&dyn SecretSource>,
    fallback: Option<Credential>,
) -> Result<Credential, SecretError> {
    fetch(primary, fallback).await.ok_or_else(|| {
        SecretError::FatalInit("secret store unavailable and no fallback configured".to_string())
    })
}

// ─────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────
