//! Command execution against home-lab hosts.
//!
//! [`Executor`] runs one command against a [`Target`] and returns the exit
//! status plus captured output. Every call carries an explicit timeout and is
//! attempted exactly once; a timeout abandons (and kills) the child process.
//!
//! The [`wol`] module sends Wake-on-LAN magic packets.

#![forbid(unsafe_code)]

pub mod wol;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

// ─── Target ───────────────────────────────────────────────────────────────────

/// Where a command runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// This machine, through `sh -c`.
    Local,
    /// A remote host through the system `ssh` client.
    Ssh { user: String, host: String },
}

impl Target {
    pub fn ssh(user: &str, host: &str) -> Self {
        Self::Ssh {
            user: user.to_string(),
            host: host.to_string(),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Ssh { user, host } => write!(f, "{user}@{host}"),
        }
    }
}

// ─── Output & errors ──────────────────────────────────────────────────────────

/// Captured result of a command that exited with status 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("empty command")]
    EmptyCommand,

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("exited with status {exit_code}: {}", .stderr.trim())]
    NonZero {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("terminated by signal: {}", .stderr.trim())]
    Terminated { stderr: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    /// Text to show a chat user: the captured stderr when the command ran and
    /// failed, otherwise the error itself.
    pub fn user_detail(&self) -> String {
        match self {
            Self::NonZero { stderr, .. } | Self::Terminated { stderr }
                if !stderr.trim().is_empty() =>
            {
                stderr.trim().to_string()
            }
            other => other.to_string(),
        }
    }

    /// True when the command was launched and reported failure itself.
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::NonZero { .. } | Self::Terminated { .. })
    }
}

// ─── Executor ─────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(
        &self,
        target: &Target,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecOutput, ExecError>;
}

/// Spawns real processes: `sh -c` locally, the `ssh` binary remotely.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    ssh_program: String,
    connect_timeout_secs: u64,
    extra_ssh_options: Vec<String>,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            connect_timeout_secs: 5,
            extra_ssh_options: Vec::new(),
        }
    }
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ssh_program(mut self, program: &str) -> Self {
        self.ssh_program = program.to_string();
        self
    }

    /// Extra `-o` options, e.g. `StrictHostKeyChecking=accept-new`.
    pub fn with_ssh_option(mut self, option: &str) -> Self {
        self.extra_ssh_options.push(option.to_string());
        self
    }

    /// Arguments passed to `ssh`. Never prompts: `BatchMode=yes`.
    pub fn ssh_args(&self, user: &str, host: &str, command: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
        ];
        for option in &self.extra_ssh_options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        args.push(format!("{user}@{host}"));
        args.push(command.to_string());
        args
    }

    fn build(&self, target: &Target, command: &str) -> (String, Command) {
        match target {
            Target::Local => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(command);
                ("sh".to_string(), cmd)
            }
            Target::Ssh { user, host } => {
                let mut cmd = Command::new(&self.ssh_program);
                cmd.args(self.ssh_args(user, host, command));
                (self.ssh_program.clone(), cmd)
            }
        }
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn run(
        &self,
        target: &Target,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecOutput, ExecError> {
        if command.trim().is_empty() {
            return Err(ExecError::EmptyCommand);
        }

        let (program, mut cmd) = self.build(target, command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(%target, command, "spawning command");
        let child = cmd
            .spawn()
            .map_err(|source| ExecError::Spawn { program, source })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(%target, timeout_secs = timeout.as_secs(), "command timed out");
                return Err(ExecError::Timeout(timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        match output.status.code() {
            Some(0) => {
                info!(%target, "command succeeded");
                Ok(ExecOutput {
                    exit_code: 0,
                    stdout,
                    stderr,
                })
            }
            Some(exit_code) => {
                warn!(%target, exit_code, "command failed");
                Err(ExecError::NonZero {
                    exit_code,
                    stdout,
                    stderr,
                })
            }
            None => {
                warn!(%target, "command terminated by signal");
                Err(ExecError::Terminated { stderr })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_local_success_captures_stdout() {
        let out = ProcessExecutor::new()
            .run(&Target::Local, "echo hello", T)
            .await
            .expect("run");
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        let err = ProcessExecutor::new()
            .run(&Target::Local, "echo broken >&2; exit 3", T)
            .await
            .expect_err("should fail");
        match &err {
            ExecError::NonZero {
                exit_code, stderr, ..
            } => {
                assert_eq!(*exit_code, 3);
                assert_eq!(stderr.trim(), "broken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.user_detail(), "broken");
        assert!(err.is_command_failure());
    }

    #[tokio::test]
    async fn test_timeout_abandons_command() {
        let started = std::time::Instant::now();
        let err = ProcessExecutor::new()
            .run(&Target::Local, "sleep 10", Duration::from_millis(200))
            .await
            .expect_err("should time out");
        assert!(matches!(err, ExecError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!err.is_command_failure());
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let exec = ProcessExecutor::new().with_ssh_program("/nonexistent/ssh-binary");
        let err = exec
            .run(&Target::ssh("root", "pve"), "uptime", T)
            .await
            .expect_err("spawn");
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let err = ProcessExecutor::new()
            .run(&Target::Local, "   ", T)
            .await
            .expect_err("empty");
        assert!(matches!(err, ExecError::EmptyCommand));
    }

    #[test]
    fn test_ssh_args_are_non_interactive() {
        let exec = ProcessExecutor::new().with_ssh_option("StrictHostKeyChecking=accept-new");
        let args = exec.ssh_args("root", "10.0.0.5", "shutdown -h now");
        assert_eq!(
            args,
            vec![
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=5",
                "-o",
                "StrictHostKeyChecking=accept-new",
                "root@10.0.0.5",
                "shutdown -h now",
            ]
        );
    }

    #[test]
    fn test_target_display() {
        assert_eq!(Target::ssh("root", "pve").to_string(), "root@pve");
        assert_eq!(Target::Local.to_string(), "local");
    }
}
