//! Wake notifications

use async_trait::async_trait;
use lab_exec::wol::MacAddress;
use lab_proto::{OutboundError, utc_timestamp};
use lab_secrets::Credential;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::info;

pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Discord embed colour (yellow).
pub const WAKE_EMBED_COLOR: u32 = 16_776_960;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_wake(&self, mac: &MacAddress) -> Result<(), OutboundError>;
}

pub fn wake_embed(mac: &MacAddress) -> Value {
    json!({
        "embeds": [{
            "title": "🔆 Wake-on-LAN Triggered",
            "description": format!("WOL packet sent to Proxmox ({mac})"),
            "color": WAKE_EMBED_COLOR,
            "timestamp": utc_timestamp(),
        }]
    })
}

/// Posts an embed to a Discord webhook. The URL embeds the webhook secret
/// and is never logged.
pub struct DiscordWebhook {
    client: reqwest::Client,
    url: Credential,
    timeout: Duration,
}

impl DiscordWebhook {
    pub fn new(url: Credential) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            timeout: WEBHOOK_TIMEOUT,
        }
    }
}

#[async_trait]
impl Notifier for DiscordWebhook {
    async fn notify_wake(&self, mac: &MacAddress) -> Result<(), OutboundError> {
        let resp = self
            .client
            .post(self.url.expose())
            .json(&wake_embed(mac))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| OutboundError::from_reqwest(e, self.timeout))?;

        if !resp.status().is_success() {
            return Err(OutboundError::from_status(resp.status()));
        }
        info!(%mac, "wake notification posted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn mac() -> MacAddress {
        "AA:BB:CC:DD:EE:FF".parse().expect("mac")
    }

    #[test]
    fn test_embed_shape() {
        let embed = wake_embed(&mac());
        let first = &embed["embeds"][0];
        assert_eq!(first["title"], "🔆 Wake-on-LAN Triggered");
        assert_eq!(first["description"], "WOL packet sent to Proxmox (AA:BB:CC:DD:EE:FF)");
        assert_eq!(first["color"], 16_776_960);
        let ts = first["timestamp"].as_str().expect("timestamp");
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[tokio::test]
    async fn test_posts_embed_to_webhook() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/webhooks/1/token")
                    .header("content-type", "application/json")
                    .body_includes("Wake-on-LAN Triggered");
                then.status(204);
            })
            .await;

        let hook = DiscordWebhook::new(Credential::new(server.url("/api/webhooks/1/token")));
        hook.notify_wake(&mac()).await.expect("notify");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_webhook_is_an_error_without_url() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(401);
            })
            .await;

        let url = server.url("/api/webhooks/1/hidden-token");
        let hook = DiscordWebhook::new(Credential::new(url));
        let err = hook.notify_wake(&mac()).await.expect_err("401");
        assert_eq!(err, OutboundError::Status { status: 401 });
        assert!(!err.to_string().contains("hidden-token"));
    }
}
