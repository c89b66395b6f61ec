//! Confirmation gate for destructive remote actions.
//!
//! A caller registers a [`PendingConfirmation`] for one initiator with a
//! bounded window, prompts the initiator, then awaits the handle. Every
//! incoming message is passed to [`ConfirmationGate::offer`]; only the exact
//! confirmation token from the same initiator, strictly before the expiry,
//! confirms. Anything else leaves the window running.
//!
//! Lifecycle of one handle:
//!
//! ```text
//! PENDING(expiry) ─ token in time ──▶ CONFIRMED ─▶ action ─▶ SUCCEEDED | FAILED
//!        │
//!        └─ expiry elapses ─────────▶ CANCELLED (expired | mismatched)
//! ```
//!
//! Expiry is detected by the waiter's own deadline and by
//! [`ConfirmationGate::sweep`], so it never depends on another message
//! arriving. Resolution is one-shot: the guarded action runs at most once.

#![forbid(unsafe_code)]

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ─── Identity ─────────────────────────────────────────────────────────────────

/// Whoever asked for the guarded action (a chat user id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Initiator(String);

impl Initiator {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for Initiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Outcomes ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The window elapsed with no traffic from the initiator.
    Expired,
    /// The window elapsed and the initiator only sent non-matching text.
    Mismatched,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expired => write!(f, "expired"),
            Self::Mismatched => write!(f, "mismatched"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Cancelled(CancelReason),
}

/// Terminal state of a guarded action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<T, E> {
    Succeeded(T),
    Failed(E),
    Cancelled(CancelReason),
}

/// What [`ConfirmationGate::offer`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// The initiator's pending handle resolved as confirmed.
    Confirmed,
    /// Non-matching text from an initiator with a pending handle.
    Mismatched,
    /// The handle's window had already elapsed; it resolved as cancelled.
    Expired,
    /// The sender has nothing pending.
    NoPending,
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("a confirmation is already pending for {initiator} ({}s left)", .remaining.as_secs())]
    AlreadyPending {
        initiator: Initiator,
        remaining: Duration,
    },
}

// ─── Gate ─────────────────────────────────────────────────────────────────────

struct Entry {
    id: Uuid,
    expires_at: Instant,
    mismatches: u32,
    resolve: oneshot::Sender<Confirmation>,
}

impl Entry {
    fn cancel_reason(&self) -> CancelReason {
        if self.mismatches > 0 {
            CancelReason::Mismatched
        } else {
            CancelReason::Expired
        }
    }

    fn expire(self) {
        let reason = self.cancel_reason();
        // The waiter may already be gone; nothing to notify then.
        let _ = self.resolve.send(Confirmation::Cancelled(reason));
    }
}

struct Inner {
    token: String,
    pending: Mutex<HashMap<Initiator, Entry>>,
}

/// Registry of pending confirmations keyed by initiator.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct ConfirmationGate {
    inner: Arc<Inner>,
}

impl ConfirmationGate {
    /// `token` is the exact message that confirms, e.g. `!confirm_shutdown`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: token.into(),
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn token(&self) -> &str {
        &self.inner.token
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_pending(&self, initiator: &Initiator) -> bool {
        self.inner.pending.lock().contains_key(initiator)
    }

    /// Open a window for `initiator`. Rejects a second request while the
    /// first is still running; the existing window is left untouched.
    pub fn request_confirmation(
        &self,
        initiator: Initiator,
        window: Duration,
    ) -> Result<PendingConfirmation, GateError> {
        let now = Instant::now();
        let mut pending = self.inner.pending.lock();

        if let Some(existing) = pending.get(&initiator) {
            if existing.expires_at > now {
                return Err(GateError::AlreadyPending {
                    remaining: existing.expires_at - now,
                    initiator,
                });
            }
            // Elapsed but not yet swept.
            if let Some(stale) = pending.remove(&initiator) {
                stale.expire();
            }
        }

        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let expires_at = now + window;
        pending.insert(
            initiator.clone(),
            Entry {
                id,
                expires_at,
                mismatches: 0,
                resolve: tx,
            },
        );
        drop(pending);

        info!(%initiator, %id, window_secs = window.as_secs(), "confirmation requested");

        Ok(PendingConfirmation {
            id,
            initiator,
            expires_at,
            rx,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Feed one incoming message through the gate.
    pub fn offer(&self, initiator: &Initiator, text: &str) -> Offer {
        let now = Instant::now();
        let mut pending = self.inner.pending.lock();

        let Some(entry) = pending.get_mut(initiator) else {
            return Offer::NoPending;
        };

        if now >= entry.expires_at {
            if let Some(entry) = pending.remove(initiator) {
                debug!(%initiator, id = %entry.id, "late message, confirmation expired");
                entry.expire();
            }
            return Offer::Expired;
        }

        if text != self.inner.token {
            entry.mismatches += 1;
            debug!(%initiator, id = %entry.id, mismatches = entry.mismatches, "non-matching message");
            return Offer::Mismatched;
        }

        match pending.remove(initiator) {
            Some(entry) => {
                info!(%initiator, id = %entry.id, "confirmation received");
                if entry.resolve.send(Confirmation::Confirmed).is_err() {
                    warn!(%initiator, id = %entry.id, "confirmed handle was already dropped");
                }
                Offer::Confirmed
            }
            None => Offer::NoPending,
        }
    }

    /// Resolve every elapsed handle as cancelled. Returns how many expired.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut pending = self.inner.pending.lock();

        let elapsed: Vec<Initiator> = pending
            .iter()
            .filter(|(_, entry)| now >= entry.expires_at)
            .map(|(initiator, _)| initiator.clone())
            .collect();

        for initiator in &elapsed {
            if let Some(entry) = pending.remove(initiator) {
                info!(%initiator, id = %entry.id, reason = %entry.cancel_reason(), "confirmation expired");
                entry.expire();
            }
        }
        elapsed.len()
    }

    /// Sweep on a fixed period until the gate is dropped.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    debug!("confirmation gate dropped, sweeper exiting");
                    break;
                };
                ConfirmationGate { inner }.sweep();
            }
        })
    }
}

// ─── Handle ───────────────────────────────────────────────────────────────────

/// One open confirmation window. Dropping it withdraws the request.
pub struct PendingConfirmation {
    id: Uuid,
    initiator: Initiator,
    expires_at: Instant,
    rx: oneshot::Receiver<Confirmation>,
    inner: Arc<Inner>,
}

impl PendingConfirmation {
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Suspend until confirmed or the window elapses.
    pub async fn wait(mut self) -> Confirmation {
        let outcome = match tokio::time::timeout_at(self.expires_at, &mut self.rx).await {
            Ok(Ok(confirmation)) => confirmation,
            Ok(Err(_)) => Confirmation::Cancelled(CancelReason::Expired),
            Err(_) => self.expire_now(),
        };
        info!(initiator = %self.initiator, id = %self.id, ?outcome, "confirmation resolved");
        outcome
    }

    /// Await confirmation, then run `action` once. Never retries.
    pub async fn run_guarded<F, Fut, T, E>(self, action: F) -> GateOutcome<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.wait().await {
            Confirmation::Confirmed => match action().await {
                Ok(value) => GateOutcome::Succeeded(value),
                Err(e) => GateOutcome::Failed(e),
            },
            Confirmation::Cancelled(reason) => GateOutcome::Cancelled(reason),
        }
    }

    fn expire_now(&mut self) -> Confirmation {
        let mut pending = self.inner.pending.lock();
        if pending
            .get(&self.initiator)
            .is_some_and(|entry| entry.id == self.id)
        {
            if let Some(entry) = pending.remove(&self.initiator) {
                return Confirmation::Cancelled(entry.cancel_reason());
            }
        }
        drop(pending);
        // Someone else resolved us at the deadline; take their answer.
        self.rx
            .try_recv()
            .unwrap_or(Confirmation::Cancelled(CancelReason::Expired))
    }
}

impl Drop for PendingConfirmation {
    fn drop(&mut self) {
        let mut pending = self.inner.pending.lock();
        if pending
            .get(&self.initiator)
            .is_some_and(|entry| entry.id == self.id)
        {
            pending.remove(&self.initiator);
            debug!(initiator = %self.initiator, id = %self.id, "pending confirmation withdrawn");
        }
    }
}
