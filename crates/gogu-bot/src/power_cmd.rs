//! Power command handlers
//!
//! Implements: wake, shutdown, notnow, shutdown_status

use crate::BotState;
use crate::commands::Replier;
use crate::error::BotResult;
use lab_exec::{ExecError, ExecOutput, Target};
use lab_gate::{GateError, GateOutcome, Initiator};
use tracing::{info, warn};

pub const SHUTDOWN_COMMAND: &str = "shutdown -h now";
pub const CANCELLED_REPLY: &str = "❌ Shutdown cancelled (timeout or wrong command).";
pub const NO_HOST_REPLY: &str = "⚠️ Proxmox host is not configured.";

type ExecResult = Result<ExecOutput, ExecError>;

// ─── wake ─────────────────────────────────────────────────────────────────────

pub async fn handle_wake(state: &BotState, replier: &dyn Replier) -> BotResult<()> {
    let result = state
        .executor
        .run(&Target::Local, &state.config.wake_command, state.config.ssh_timeout())
        .await;
    replier.send(&render_wake(&result)).await
}

pub fn render_wake(result: &ExecResult) -> String {
    match result {
        Ok(_) => "✅ Sent Wake-on-LAN to Proxmox.".to_string(),
        Err(e) if e.is_command_failure() => format!("⚠️ WOL failed: {}", e.user_detail()),
        Err(e) => format!("⚠️ Error: {e}"),
    }
}

// ─── notnow ───────────────────────────────────────────────────────────────────

pub async fn handle_not_now(state: &BotState, replier: &dyn Replier) -> BotResult<()> {
    let Some(target) = state.config.proxmox_target() else {
        return replier.send(NO_HOST_REPLY).await;
    };
    let result = state
        .executor
        .run(&target, &state.config.not_now_command, state.config.ssh_timeout())
        .await;
    replier.send(&render_not_now(&result)).await
}

pub fn render_not_now(result: &ExecResult) -> String {
    match result {
        Ok(out) if out.stdout.trim().is_empty() => "✅ Shutdown skipped.".to_string(),
        Ok(out) => format!("✅ {}", out.stdout.trim()),
        Err(e) if e.is_command_failure() => format!("⚠️ Failed: {}", e.user_detail()),
        Err(e) => format!("⚠️ Error: {e}"),
    }
}

// ─── shutdown_status ──────────────────────────────────────────────────────────

pub fn skip_flag_probe(flag: &str) -> String {
    format!("test -f {flag} && echo SKIP || echo ACTIVE")
}

pub async fn handle_shutdown_status(state: &BotState, replier: &dyn Replier) -> BotResult<()> {
    let Some(target) = state.config.proxmox_target() else {
        return replier.send(NO_HOST_REPLY).await;
    };
    let result = state
        .executor
        .run(
            &target,
            &skip_flag_probe(&state.config.skip_flag),
            state.config.ssh_timeout(),
        )
        .await;
    replier.send(&render_shutdown_status(&result)).await
}

pub fn render_shutdown_status(result: &ExecResult) -> String {
    let stdout = match result {
        Ok(out) => out.stdout.as_str(),
        // Whatever the remote printed still decides the state.
        Err(ExecError::NonZero { stdout, .. }) => stdout.as_str(),
        Err(e) => return format!("⚠️ Error: {e}"),
    };
    match stdout.trim() {
        "SKIP" => "🟡 Tonight's shutdown is **SKIPPED**.".to_string(),
        "ACTIVE" => "🟢 Tonight's shutdown is **ACTIVE**.".to_string(),
        other => format!("⚠️ Unknown state: {other}"),
    }
}

// ─── shutdown ─────────────────────────────────────────────────────────────────

/// Ask for confirmation, then run the shutdown at most once.
pub async fn handle_shutdown(
    state: &BotState,
    initiator: &Initiator,
    replier: &dyn Replier,
) -> BotResult<()> {
    let Some(target) = state.config.proxmox_target() else {
        return replier.send(NO_HOST_REPLY).await;
    };

    let window = state.config.confirm_window();
    let pending = match state.gate.request_confirmation(initiator.clone(), window) {
        Ok(pending) => pending,
        Err(GateError::AlreadyPending { remaining, .. }) => {
            let secs = remaining.as_secs_f64().ceil() as u64;
            return replier
                .send(&format!(
                    "⏳ A shutdown confirmation is already pending ({secs}s left)."
                ))
                .await;
        }
    };

    // A failed prompt drops `pending`, which withdraws the window.
    replier
        .send(&format!(
            "⚠️ Are you sure? Reply `{}` within {} seconds.",
            state.gate.token(),
            window.as_secs()
        ))
        .await?;

    let outcome = pending
        .run_guarded(move || async move {
            if let Err(e) = replier.send("🛑 Shutting down Proxmox...").await {
                warn!(error = %e, "failed to announce shutdown");
            }
            info!(%target, %initiator, "running confirmed shutdown");
            state
                .executor
                .run(&target, SHUTDOWN_COMMAND, state.config.ssh_timeout())
                .await
        })
        .await;

    replier.send(&render_shutdown_outcome(&outcome)).await
}

pub fn render_shutdown_outcome(outcome: &GateOutcome<ExecOutput, ExecError>) -> String {
    match outcome {
        GateOutcome::Succeeded(_) => "✅ Proxmox accepted the shutdown command.".to_string(),
        GateOutcome::Failed(e) => format!("⚠️ Shutdown failed: {}", e.user_detail()),
        GateOutcome::Cancelled(reason) => {
            info!(%reason, "shutdown cancelled");
            CANCELLED_REPLY.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{IncomingMessage, handle_message};
    use crate::testing::{FakeExecutor, RecordingReplier, failed, ok};
    use crate::{BotConfig, SharedState};
    use lab_gate::CancelReason;
    use std::sync::Arc;
    use std::time::Duration;

    fn shared_state(executor: Arc<FakeExecutor>) -> SharedState {
        let config = BotConfig {
            proxmox_host: Some("pve.lan".into()),
            ..BotConfig::default()
        };
        Arc::new(
            BotState::new(config)
                .expect("state")
                .with_executor(executor)
                .with_probes(Vec::new()),
        )
    }

    /// Start `!shutdown` from `author` on its own task.
    fn spawn_shutdown(
        state: &SharedState,
        replier: &Arc<RecordingReplier>,
        author: &str,
    ) -> tokio::task::JoinHandle<()> {
        let (state, replier) = (Arc::clone(state), Arc::clone(replier));
        let msg = IncomingMessage::new(author, "!shutdown");
        tokio::spawn(async move { handle_message(&state, &msg, replier.as_ref()).await })
    }

    /// Let the spawned handler open its window.
    async fn until_pending(state: &SharedState, author: &str) {
        let initiator = Initiator::new(author);
        for _ in 0..100 {
            if state.gate.is_pending(&initiator) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("no confirmation window opened for {author}");
    }

    async fn send(state: &SharedState, replier: &RecordingReplier, author: &str, text: &str) {
        handle_message(state, &IncomingMessage::new(author, text), replier).await;
    }

    fn shutdown_calls(executor: &FakeExecutor) -> usize {
        executor
            .calls()
            .iter()
            .filter(|(_, cmd)| cmd == SHUTDOWN_COMMAND)
            .count()
    }

    // ── wake / notnow / shutdown_status rendering ─────────────────────────

    #[test]
    fn test_render_wake() {
        assert_eq!(render_wake(&Ok(ok(""))), "✅ Sent Wake-on-LAN to Proxmox.");
        assert_eq!(
            render_wake(&Err(failed("no route to host"))),
            "⚠️ WOL failed: no route to host"
        );
        assert_eq!(
            render_wake(&Err(ExecError::Timeout(Duration::from_secs(10)))),
            "⚠️ Error: timed out after 10s"
        );
    }

    #[test]
    fn test_render_not_now() {
        assert_eq!(render_not_now(&Ok(ok(""))), "✅ Shutdown skipped.");
        assert_eq!(
            render_not_now(&Ok(ok("Skipping shutdown tonight\n"))),
            "✅ Skipping shutdown tonight"
        );
        assert_eq!(render_not_now(&Err(failed("denied"))), "⚠️ Failed: denied");
    }

    #[test]
    fn test_render_shutdown_status() {
        assert_eq!(
            render_shutdown_status(&Ok(ok("SKIP\n"))),
            "🟡 Tonight's shutdown is **SKIPPED**."
        );
        assert_eq!(
            render_shutdown_status(&Ok(ok("ACTIVE\n"))),
            "🟢 Tonight's shutdown is **ACTIVE**."
        );
        assert_eq!(
            render_shutdown_status(&Ok(ok("maybe"))),
            "⚠️ Unknown state: maybe"
        );
        assert!(render_shutdown_status(&Err(ExecError::Timeout(Duration::from_secs(10))))
            .starts_with("⚠️ Error:"));
    }

    #[test]
    fn test_skip_flag_probe_command() {
        assert_eq!(
            skip_flag_probe("/var/run/skip_shutdown_today"),
            "test -f /var/run/skip_shutdown_today && echo SKIP || echo ACTIVE"
        );
    }

    #[tokio::test]
    async fn test_shutdown_status_runs_over_ssh() {
        let executor = Arc::new(FakeExecutor::stdout("ACTIVE\n"));
        let state = shared_state(Arc::clone(&executor));
        let replier = RecordingReplier::default();

        send(&state, &replier, "1", "!shutdown_status").await;
        assert_eq!(replier.sent(), ["🟢 Tonight's shutdown is **ACTIVE**."]);
        let calls = executor.calls();
        assert_eq!(calls[0].0, Target::ssh("root", "pve.lan"));
    }

    #[tokio::test]
    async fn test_remote_commands_need_a_host() {
        let executor = Arc::new(FakeExecutor::stdout(""));
        let state = Arc::new(
            BotState::new(BotConfig::default())
                .expect("state")
                .with_executor(Arc::clone(&executor) as Arc<dyn lab_exec::Executor>),
        );
        let replier = RecordingReplier::default();

        send(&state, &replier, "1", "!notnow").await;
        send(&state, &replier, "1", "!shutdown").await;
        assert_eq!(replier.sent(), [NO_HOST_REPLY, NO_HOST_REPLY]);
        assert!(executor.calls().is_empty());
        assert_eq!(state.gate.pending_count(), 0);
    }

    // ── shutdown confirmation flow ────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_shutdown_runs_once() {
        let executor = Arc::new(FakeExecutor::stdout(""));
        let state = shared_state(Arc::clone(&executor));
        let replier = Arc::new(RecordingReplier::default());

        let task = spawn_shutdown(&state, &replier, "alice");
        until_pending(&state, "alice").await;
        tokio::time::advance(Duration::from_secs(5)).await;
        send(&state, &replier, "alice", "!confirm_shutdown").await;
        task.await.expect("shutdown task");

        assert_eq!(shutdown_calls(&executor), 1);
        assert_eq!(
            replier.sent(),
            [
                "⚠️ Are you sure? Reply `!confirm_shutdown` within 30 seconds.",
                "🛑 Shutting down Proxmox...",
                "✅ Proxmox accepted the shutdown command.",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_cancels_without_running() {
        let executor = Arc::new(FakeExecutor::stdout(""));
        let state = shared_state(Arc::clone(&executor));
        let replier = Arc::new(RecordingReplier::default());

        let task = spawn_shutdown(&state, &replier, "alice");
        until_pending(&state, "alice").await;
        tokio::time::advance(Duration::from_secs(31)).await;
        task.await.expect("shutdown task");

        assert_eq!(shutdown_calls(&executor), 0);
        assert_eq!(replier.sent().last().map(String::as_str), Some(CANCELLED_REPLY));
        assert_eq!(state.gate.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_text_then_timeout_cancels() {
        let executor = Arc::new(FakeExecutor::stdout(""));
        let state = shared_state(Arc::clone(&executor));
        let replier = Arc::new(RecordingReplier::default());

        let task = spawn_shutdown(&state, &replier, "alice");
        until_pending(&state, "alice").await;
        send(&state, &replier, "alice", "yes do it").await;
        send(&state, &replier, "alice", "!CONFIRM_SHUTDOWN").await;
        tokio::time::advance(Duration::from_secs(31)).await;
        task.await.expect("shutdown task");

        assert_eq!(shutdown_calls(&executor), 0);
        assert_eq!(replier.sent().last().map(String::as_str), Some(CANCELLED_REPLY));
    }

    #[tokio::test(start_paused = true)]
    async fn test_padded_token_does_not_confirm() {
        let executor = Arc::new(FakeExecutor::stdout(""));
        let state = shared_state(Arc::clone(&executor));
        let replier = Arc::new(RecordingReplier::default());

        let task = spawn_shutdown(&state, &replier, "alice");
        until_pending(&state, "alice").await;
        send(&state, &replier, "alice", " !confirm_shutdown ").await;
        send(&state, &replier, "alice", "!confirm_shutdown\n").await;
        assert!(state.gate.is_pending(&Initiator::new("alice")));
        tokio::time::advance(Duration::from_secs(31)).await;
        task.await.expect("shutdown task");

        assert_eq!(shutdown_calls(&executor), 0);
        assert_eq!(replier.sent().last().map(String::as_str), Some(CANCELLED_REPLY));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_users_cannot_confirm() {
        let executor = Arc::new(FakeExecutor::stdout(""));
        let state = shared_state(Arc::clone(&executor));
        let replier = Arc::new(RecordingReplier::default());

        let task = spawn_shutdown(&state, &replier, "alice");
        until_pending(&state, "alice").await;
        send(&state, &replier, "mallory", "!confirm_shutdown").await;
        tokio::time::advance(Duration::from_secs(31)).await;
        task.await.expect("shutdown task");

        assert_eq!(shutdown_calls(&executor), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_while_pending_is_rejected() {
        let executor = Arc::new(FakeExecutor::stdout(""));
        let state = shared_state(Arc::clone(&executor));
        let replier = Arc::new(RecordingReplier::default());

        let task = spawn_shutdown(&state, &replier, "alice");
        until_pending(&state, "alice").await;
        tokio::time::advance(Duration::from_secs(10)).await;
        send(&state, &replier, "alice", "!shutdown").await;
        assert!(
            replier
                .sent()
                .contains(&"⏳ A shutdown confirmation is already pending (20s left).".to_string())
        );

        // The first window is still live.
        send(&state, &replier, "alice", "!confirm_shutdown").await;
        task.await.expect("shutdown task");
        assert_eq!(shutdown_calls(&executor), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_shutdown_reports_stderr() {
        let executor = Arc::new(FakeExecutor::new(|_, cmd| {
            if cmd == SHUTDOWN_COMMAND {
                Err(failed("Permission denied (publickey)."))
            } else {
                Ok(ok(""))
            }
        }));
        let state = shared_state(Arc::clone(&executor));
        let replier = Arc::new(RecordingReplier::default());

        let task = spawn_shutdown(&state, &replier, "alice");
        until_pending(&state, "alice").await;
        send(&state, &replier, "alice", "!confirm_shutdown").await;
        task.await.expect("shutdown task");

        assert_eq!(
            replier.sent().last().map(String::as_str),
            Some("⚠️ Shutdown failed: Permission denied (publickey).")
        );
    }

    #[test]
    fn test_cancel_reasons_share_one_reply() {
        for reason in [CancelReason::Expired, CancelReason::Mismatched] {
            assert_eq!(
                render_shutdown_outcome(&GateOutcome::Cancelled(reason)),
                CANCELLED_REPLY
            );
        }
    }
}
