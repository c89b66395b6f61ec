//! pi-server: Raspberry Pi status and Wake-on-LAN service
//!
//! Three stateless handlers: `GET /health`, `GET /status` and `POST /wol`.

#![forbid(unsafe_code)]

pub mod config;
pub mod notify;
pub mod process;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use lab_exec::wol::{MacAddress, UdpWakeSender, WakeError, WakeSender};
use lab_proto::{OutboundError, utc_timestamp};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub use config::ServerConfig;
pub use notify::{DiscordWebhook, Notifier};
pub use process::{ProcessProbe, SysinfoProcessProbe};

// ─── State ────────────────────────────────────────────────────────────────────

pub struct AppState {
    /// Raw `PROXMOX_MAC`; parsed per request so a bad value only breaks `/wol`.
    pub proxmox_mac: Option<String>,
    pub waker: Arc<dyn WakeSender>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub process_probe: Arc<dyn ProcessProbe>,
    pub bot_pattern: String,
}

impl AppState {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            proxmox_mac: config.proxmox_mac.clone(),
            waker: Arc::new(UdpWakeSender::new(config.wol_broadcast)),
            notifier: config
                .discord_webhook_url
                .clone()
                .filter(|url| !url.is_empty())
                .map(|url| Arc::new(DiscordWebhook::new(url)) as Arc<dyn Notifier>),
            process_probe: Arc::new(SysinfoProcessProbe),
            bot_pattern: config.bot_process_pattern.clone(),
        }
    }
}

pub type SharedState = Arc<AppState>;

// ─── Responses ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub hostname: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub pi_status: &'static str,
    pub gogu_bot: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct WolResponse {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum WolError {
    #[error("PROXMOX_MAC is not configured")]
    MacNotConfigured,

    #[error(transparent)]
    Wake(#[from] WakeError),

    #[error("notification failed: {0}")]
    Notify(#[from] OutboundError),
}

impl IntoResponse for WolError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(WolResponse {
                status: "error",
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

// ─── Router ───────────────────────────────────────────────────────────────────

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/wol", post(handle_wol))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: SharedState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "online",
        hostname: local_hostname(),
        timestamp: utc_timestamp(),
    })
}

async fn handle_status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let probe = Arc::clone(&state.process_probe);
    let pattern = state.bot_pattern.clone();
    // Scanning the process table is blocking work.
    let running = tokio::task::spawn_blocking(move || probe.is_running(&pattern))
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "process scan failed");
            false
        });

    Json(StatusResponse {
        pi_status: "online",
        gogu_bot: if running { "running" } else { "stopped" },
        timestamp: utc_timestamp(),
    })
}

async fn handle_wol(State(state): State<SharedState>) -> Result<Json<WolResponse>, WolError> {
    let result = wake(&state).await;
    if let Err(e) = &result {
        error!(error = %e, "wake-on-lan request failed");
    }
    result?;
    Ok(Json(WolResponse {
        status: "success",
        message: "WOL packet sent".to_string(),
    }))
}

async fn wake(state: &AppState) -> Result<(), WolError> {
    let raw = state
        .proxmox_mac
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .ok_or(WolError::MacNotConfigured)?;
    let mac: MacAddress = raw.parse()?;

    state.waker.wake(&mac).await?;

    match &state.notifier {
        Some(notifier) => notifier.notify_wake(&mac).await?,
        None => warn!("no Discord webhook configured, skipping wake notification"),
    }
    info!(%mac, "wake-on-lan handled");
    Ok(())
}
