//! Cloudflare firewall access rules (IP bans)

use crate::config::BotConfig;
use lab_proto::OutboundError;
use lab_secrets::Credential;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const CLOUDFLARE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum FirewallError {
    /// The API answered but reported `success: false`.
    #[error("cloudflare rejected the request: {0}")]
    Rejected(String),

    #[error(transparent)]
    Outbound(#[from] OutboundError),
}

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AccessRulesResponse {
    #[serde(default)]
    success: bool,
    /// `null` on errors.
    #[serde(default)]
    result: Option<Vec<AccessRule>>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct AccessRule {
    #[serde(default)]
    configuration: RuleConfiguration,
    #[serde(default)]
    created_on: String,
}

#[derive(Debug, Default, Deserialize)]
struct RuleConfiguration {
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    total_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
}

// ─── Domain types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanEntry {
    pub ip: String,
    /// `created_on` as sent by Cloudflare (RFC 3339).
    pub created_on: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanList {
    pub entries: Vec<BanEntry>,
    /// Rules across all pages; at least `entries.len()`.
    pub total: u64,
}

// ─── Client ───────────────────────────────────────────────────────────────────

pub struct CloudflareClient {
    client: reqwest::Client,
    api_base: String,
    zone_id: String,
    token: Credential,
    timeout: Duration,
}

impl CloudflareClient {
    pub fn new(api_base: &str, zone_id: &str, token: Credential) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            zone_id: zone_id.to_string(),
            token,
            timeout: CLOUDFLARE_TIMEOUT,
        }
    }

    /// `None` unless both the zone id and API token are set.
    pub fn from_config(config: &BotConfig) -> Option<Self> {
        let zone_id = config.cf_zone_id.as_deref().filter(|z| !z.trim().is_empty())?;
        let token = config.cf_api_token.clone().filter(|t| !t.is_empty())?;
        Some(Self::new(&config.cf_api_base, zone_id, token))
    }

    fn rules_url(&self) -> String {
        format!(
            "{}/zones/{}/firewall/access_rules/rules",
            self.api_base, self.zone_id
        )
    }

    pub async fn list_bans(&self) -> Result<BanList, FirewallError> {
        let resp = self
            .client
            .get(self.rules_url())
            .bearer_auth(self.token.expose())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| OutboundError::from_reqwest(e, self.timeout))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| OutboundError::from_reqwest(e, self.timeout))?;

        // Error responses carry the same envelope with `success: false`.
        let parsed: AccessRulesResponse = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => return Err(OutboundError::from_status(status).into()),
            Err(e) => return Err(OutboundError::MalformedResponse(e.to_string()).into()),
        };

        if !parsed.success {
            let reason = parsed
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .filter(|m| !m.is_empty())
                .collect::<Vec<_>>()
                .join("; ");
            warn!(status = status.as_u16(), %reason, "cloudflare access rules request failed");
            return Err(FirewallError::Rejected(reason));
        }

        let entries: Vec<BanEntry> = parsed
            .result
            .unwrap_or_default()
            .into_iter()
            .map(|rule| BanEntry {
                ip: rule.configuration.value.unwrap_or_else(|| "N/A".to_string()),
                created_on: rule.created_on,
            })
            .collect();
        let total = parsed
            .result_info
            .and_then(|info| info.total_count)
            .unwrap_or(entries.len() as u64)
            .max(entries.len() as u64);

        debug!(shown = entries.len(), total, "fetched cloudflare bans");
        Ok(BanList { entries, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> CloudflareClient {
        CloudflareClient::new(&server.base_url(), "zone-1", Credential::new("cf-token"))
    }

    #[tokio::test]
    async fn test_list_bans_parses_rules() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/zones/zone-1/firewall/access_rules/rules")
                    .header("authorization", "Bearer cf-token");
                then.status(200).json_body(json!({
                    "success": true,
                    "errors": [],
                    "result": [
                        {"configuration": {"target": "ip", "value": "203.0.113.7"},
                         "created_on": "2025-03-01T10:00:00Z"},
                        {"configuration": {"target": "ip"}, "created_on": "2025-03-02T11:00:00Z"}
                    ],
                    "result_info": {"page": 1, "per_page": 20, "total_count": 57}
                }));
            })
            .await;

        let bans = client(&server).list_bans().await.expect("bans");
        mock.assert_async().await;
        assert_eq!(bans.total, 57);
        assert_eq!(
            bans.entries,
            vec![
                BanEntry {
                    ip: "203.0.113.7".into(),
                    created_on: "2025-03-01T10:00:00Z".into()
                },
                BanEntry {
                    ip: "N/A".into(),
                    created_on: "2025-03-02T11:00:00Z".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_total_falls_back_to_entry_count() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(200).json_body(json!({
                    "success": true,
                    "result": [{"configuration": {"value": "198.51.100.1"}, "created_on": ""}]
                }));
            })
            .await;

        let bans = client(&server).list_bans().await.expect("bans");
        assert_eq!(bans.total, 1);
    }

    #[tokio::test]
    async fn test_unsuccessful_envelope_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(403).json_body(json!({
                    "success": false,
                    "errors": [{"code": 10000, "message": "Authentication error"}],
                    "result": null
                }));
            })
            .await;

        let err = client(&server).list_bans().await.expect_err("rejected");
        match err {
            FirewallError::Rejected(reason) => assert_eq!(reason, "Authentication error"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_error_is_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(502).body("bad gateway");
            })
            .await;

        let err = client(&server).list_bans().await.expect_err("status");
        assert!(matches!(
            err,
            FirewallError::Outbound(OutboundError::Status { status: 502 })
        ));
    }

    #[test]
    fn test_from_config_requires_zone_and_token() {
        let mut config = BotConfig {
            cf_zone_id: Some("zone".into()),
            ..BotConfig::default()
        };
        assert!(CloudflareClient::from_config(&config).is_none());
        config.cf_api_token = Some(Credential::new("t"));
        assert!(CloudflareClient::from_config(&config).is_some());
    }
}
