//! Home-lab health aggregation.
//!
//! [`HealthAggregator::check_all`] probes every service concurrently, each
//! under its own deadline, and returns one [`ServiceCheckResult`] per probe in
//! input order. A probe that errors, times out or panics is reported
//! unreachable without affecting the others.

#![forbid(unsafe_code)]

pub mod probes;

use async_trait::async_trait;
use futures_util::future::join_all;
use lab_proto::{FailureKind, OutboundError, ServiceCheckResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use probes::{LocalProbe, ProxmoxProbe, TautulliProbe, UnconfiguredProbe, VaultProbe};

/// Per-probe deadline used unless overridden.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Probe seam ───────────────────────────────────────────────────────────────

/// Why one probe did not report the service online.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeFailure {
    #[error(transparent)]
    Outbound(#[from] OutboundError),

    /// The service answered but flagged itself unusable.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// `Ok(Some(qualifier))` or `Ok(None)` when online.
pub type ProbeResult = Result<Option<String>, ProbeFailure>;

#[async_trait]
pub trait Probe: Send + Sync {
    fn name(&self) -> &str;

    fn icon(&self) -> &str;

    /// `timeout` bounds any single request the probe makes.
    async fn probe(&self, timeout: Duration) -> ProbeResult;
}

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

// ─── Aggregator ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HealthAggregator {
    timeout: Duration,
}

impl Default for HealthAggregator {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl HealthAggregator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Probe all services concurrently. Output order matches `probes`.
    pub async fn check_all(&self, probes: &[Arc<dyn Probe>]) -> Vec<ServiceCheckResult> {
        let checks = probes.iter().map(|probe| self.check_one(Arc::clone(probe)));
        let results = join_all(checks).await;

        let offline = results.iter().filter(|r| !r.reachable).count();
        debug!(total = results.len(), offline, "health poll complete");
        results
    }

    async fn check_one(&self, probe: Arc<dyn Probe>) -> ServiceCheckResult {
        let timeout = self.timeout;
        let task_probe = Arc::clone(&probe);
        // Own task per probe so a panicking probe cannot take the poll down.
        let task =
            tokio::spawn(async move { tokio::time::timeout(timeout, task_probe.probe(timeout)).await });

        let (name, icon) = (probe.name(), probe.icon());
        match task.await {
            Ok(Ok(Ok(detail))) => ServiceCheckResult::online(name, icon, detail),
            Ok(Ok(Err(ProbeFailure::Unavailable(reason)))) => {
                warn!(service = name, %reason, "service unavailable");
                ServiceCheckResult::offline(name, icon, FailureKind::Unavailable, reason)
            }
            Ok(Ok(Err(ProbeFailure::Outbound(e)))) => {
                warn!(service = name, kind = ?e.kind(), error = %e, "service unreachable");
                ServiceCheckResult::offline(name, icon, FailureKind::from(&e), e.to_string())
            }
            Ok(Err(_elapsed)) => {
                warn!(service = name, timeout_secs = timeout.as_secs(), "probe timed out");
                ServiceCheckResult::offline(
                    name,
                    icon,
                    FailureKind::Timeout,
                    format!("timed out after {}s", timeout.as_secs()),
                )
            }
            Err(join_err) => {
                warn!(service = name, error = %join_err, "probe task failed");
                ServiceCheckResult::offline(
                    name,
                    icon,
                    FailureKind::Unreachable,
                    "probe failed".to_string(),
                )
            }
        }
    }
}

/// One line per service, in result order.
pub fn render_report(results: &[ServiceCheckResult]) -> String {
    results
        .iter()
        .map(ServiceCheckResult::render_line)
        .collect::<Vec<_>>()
        .join("\n")
}
