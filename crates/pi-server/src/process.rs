//! Is the bot process running?

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

pub trait ProcessProbe: Send + Sync {
    fn is_running(&self, pattern: &str) -> bool;
}

/// Scans the process table for a name or command line containing the
/// pattern. The server's own process (and its threads) never matches.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoProcessProbe;

impl ProcessProbe for SysinfoProcessProbe {
    fn is_running(&self, pattern: &str) -> bool {
        if pattern.is_empty() {
            return false;
        }
        let mut sys = System::new();
        // Command lines are not loaded by a plain refresh.
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new().with_cmd(UpdateKind::Always),
        );
        let own = sysinfo::get_current_pid().ok();
        // Threads are listed as tasks sharing our command line.
        let own_cmd = own
            .and_then(|pid| sys.process(pid))
            .map(|p| p.cmd().to_vec())
            .unwrap_or_default();

        sys.processes()
            .iter()
            .filter(|(pid, process)| {
                Some(**pid) != own && (own_cmd.is_empty() || process.cmd() != own_cmd.as_slice())
            })
            .any(|(_, process)| {
                process.name().to_string_lossy().contains(pattern)
                    || process
                        .cmd()
                        .iter()
                        .any(|arg| arg.to_string_lossy().contains(pattern))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_a_live_child_process() {
        let mut child = std::process::Command::new("sleep")
            .arg("30.5")
            .spawn()
            .expect("spawn sleep");
        let found = SysinfoProcessProbe.is_running("30.5");
        child.kill().expect("kill");
        let _ = child.wait();
        assert!(found);
    }

    #[test]
    fn test_missing_process_is_not_running() {
        assert!(!SysinfoProcessProbe.is_running("no-such-process-9f3c1e"));
        assert!(!SysinfoProcessProbe.is_running(""));
    }
}
