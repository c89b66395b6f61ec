//! Shared value types for labops.
//!
//! Holds the outbound-call error taxonomy consumed by every HTTP wrapper in
//! the workspace, the per-service health result and timestamp helpers shared
//! by the bot and the Pi status server.

#![forbid(unsafe_code)]

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ─── Error taxonomy ───────────────────────────────────────────────────────────

/// Coarse classification of an outbound failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network error, refused connection or non-success response.
    Unreachable,
    /// The dependency rejected our credential.
    AuthFailure,
    /// The call did not complete within its deadline.
    Timeout,
    /// The payload did not have the expected shape.
    MalformedResponse,
}

/// Error returned by every outbound HTTP wrapper.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutboundError {
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl OutboundError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreachable(_) | Self::NotConfigured(_) => ErrorKind::Unreachable,
            Self::Status { status: 401 | 403 } => ErrorKind::AuthFailure,
            Self::Status { .. } => ErrorKind::Unreachable,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
        }
    }

    /// Map a reqwest error, dropping the request URL so query-string keys
    /// never end up in a log line or a chat reply.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return Self::Timeout(timeout);
        }
        if err.is_decode() {
            return Self::MalformedResponse(err.without_url().to_string());
        }
        if let Some(status) = err.status() {
            return Self::Status {
                status: status.as_u16(),
            };
        }
        Self::Unreachable(err.without_url().to_string())
    }

    /// Build from a non-success HTTP status.
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        Self::Status {
            status: status.as_u16(),
        }
    }
}

// ─── Service health ───────────────────────────────────────────────────────────

/// Why a probed service was reported unreachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unreachable,
    Timeout,
    BadStatus(u16),
    Malformed,
    /// The service answered but flagged itself unusable (e.g. Vault sealed).
    Unavailable,
}

impl From<&OutboundError> for FailureKind {
    fn from(err: &OutboundError) -> Self {
        match err {
            OutboundError::Unreachable(_) | OutboundError::NotConfigured(_) => Self::Unreachable,
            OutboundError::Status { status } => Self::BadStatus(*status),
            OutboundError::Timeout(_) => Self::Timeout,
            OutboundError::MalformedResponse(_) => Self::Malformed,
        }
    }
}

/// Outcome of probing one service during a single poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCheckResult {
    pub service: String,
    pub icon: String,
    pub reachable: bool,
    /// Qualifier when reachable ("unsealed"), reason when not.
    pub detail: Option<String>,
    /// `None` iff `reachable`.
    pub failure: Option<FailureKind>,
}

impl ServiceCheckResult {
    pub fn online(service: &str, icon: &str, detail: Option<String>) -> Self {
        Self {
            service: service.to_string(),
            icon: icon.to_string(),
            reachable: true,
            detail,
            failure: None,
        }
    }

    pub fn offline(service: &str, icon: &str, failure: FailureKind, detail: String) -> Self {
        Self {
            service: service.to_string(),
            icon: icon.to_string(),
            reachable: false,
            detail: Some(detail),
            failure: Some(failure),
        }
    }

    /// One chat line, e.g. `🔐 Vault: ✅ Online (unsealed)`.
    pub fn render_line(&self) -> String {
        let state = match (&self.failure, &self.detail) {
            (None, Some(detail)) => format!("✅ Online ({detail})"),
            (None, None) => "✅ Online".to_string(),
            (Some(FailureKind::Unavailable), Some(detail)) => {
                format!("⚠️ {}", capitalize(detail))
            }
            (Some(FailureKind::Unavailable), None) => "⚠️ Unavailable".to_string(),
            (Some(_), _) => "❌ Offline".to_string(),
        };
        format!("{} {}: {}", self.icon, self.service, state)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ─── Timestamps ───────────────────────────────────────────────────────────────

/// Current UTC time as RFC 3339 with microseconds, e.g. `2026-10-14T09:30:00.123456Z`.
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_statuses_classify_as_auth_failure() {
        assert_eq!(
            OutboundError::Status { status: 403 }.kind(),
            ErrorKind::AuthFailure
        );
        assert_eq!(
            OutboundError::Status { status: 401 }.kind(),
            ErrorKind::AuthFailure
        );
        assert_eq!(
            OutboundError::Status { status: 502 }.kind(),
            ErrorKind::Unreachable
        );
    }

    #[test]
    fn test_failure_kind_from_outbound_error() {
        assert_eq!(
            FailureKind::from(&OutboundError::Timeout(Duration::from_secs(5))),
            FailureKind::Timeout
        );
        assert_eq!(
            FailureKind::from(&OutboundError::MalformedResponse("x".into())),
            FailureKind::Malformed
        );
        assert_eq!(
            FailureKind::from(&OutboundError::Status { status: 500 }),
            FailureKind::BadStatus(500)
        );
    }

    #[test]
    fn test_render_lines() {
        let vault = ServiceCheckResult::online("Vault", "🔐", Some("unsealed".into()));
        assert_eq!(vault.render_line(), "🔐 Vault: ✅ Online (unsealed)");

        let sealed =
            ServiceCheckResult::offline("Vault", "🔐", FailureKind::Unavailable, "sealed".into());
        assert_eq!(sealed.render_line(), "🔐 Vault: ⚠️ Sealed");

        let standby =
            ServiceCheckResult::offline("Vault", "🔐", FailureKind::Unavailable, "standby".into());
        assert_eq!(standby.render_line(), "🔐 Vault: ⚠️ Standby");

        let down = ServiceCheckResult::offline(
            "Proxmox",
            "🖥️",
            FailureKind::Timeout,
            "timed out".into(),
        );
        assert_eq!(down.render_line(), "🖥️ Proxmox: ❌ Offline");
    }

    #[test]
    fn test_timestamp_parses_back() {
        let ts = utc_timestamp();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
        assert!(ts.ends_with('Z'));
    }
}
