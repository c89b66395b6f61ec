//! Shared fixtures for the cross-crate scenarios in `tests/`.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use gogu_bot::{BotResult, Replier};
use lab_exec::ProcessExecutor;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

// ─── Replies ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingReplier {
    sent: Mutex<Vec<String>>,
}

impl RecordingReplier {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Replier for RecordingReplier {
    async fn send(&self, text: &str) -> BotResult<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(text.to_string());
        }
        Ok(())
    }
}

// ─── Fake ssh ─────────────────────────────────────────────────────────────────

/// A stand-in `ssh` binary. Every invocation appends its arguments to a log
/// file; the remote command decides the output.
pub struct FakeSsh {
    dir: TempDir,
    program: PathBuf,
    log: PathBuf,
}

impl FakeSsh {
    /// `skip_flag_present` controls what `test -f …` reports.
    pub fn install(skip_flag_present: bool) -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let program = dir.path().join("ssh");
        let log = dir.path().join("ssh.log");
        let flag_answer = if skip_flag_present { "SKIP" } else { "ACTIVE" };

        let script = format!(
            r#"#!/bin/sh
echo "$@" >> '{log}'
for last; do :; done
case "$last" in
  "shutdown -h now") exit 0 ;;
  "test -f "*) echo {flag_answer} ;;
  *check_nc_bans*) printf '```\n203.0.113.4  admin\n```\n' ;;
  not-now) echo "Shutdown skipped for tonight" ;;
  *) echo "unknown remote command: $last" >&2; exit 127 ;;
esac
"#,
            log = log.display(),
        );
        std::fs::write(&program, script)?;
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755))?;

        Ok(Self { dir, program, log })
    }

    pub fn executor(&self) -> ProcessExecutor {
        ProcessExecutor::new().with_ssh_program(&self.program.to_string_lossy())
    }

    /// One line per invocation, in order.
    pub fn invocations(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}
