//! Finding and stopping other running copies of the bot (`/kill`).
//!
//! Uses `pgrep`/`kill` from the host instead of platform APIs; both are
//! present on the Linux and macOS hosts the bot runs on.

use tokio::process::Command;

use crate::{Error, Result};

const DEFAULT_PROCESS_NAME: &str = "apb";

/// `pgrep -f` pattern for copies of the running executable.
pub fn own_instance_pattern() -> String {
    let name = std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_PROCESS_NAME.to_string());
    instance_pattern(&name)
}

/// Extended regex matching command lines whose program (first word) is
/// `exe_name`, with or without a leading directory.
///
/// Anchored so that `tail -f apb.log` or `cargo run -p apb` never match.
pub fn instance_pattern(exe_name: &str) -> String {
    format!("^([^ ]*/)?{}( |$)", regex::escape(exe_name))
}

/// PIDs of processes whose full command line matches the extended regex
/// `pattern`, excluding `own_pid`.
pub async fn find_instances(pattern: &str, own_pid: u32) -> Result<Vec<u32>> {
    let out = Command::new("pgrep")
        .arg("-f")
        .arg(pattern)
        .output()
        .await
        .map_err(|e| Error::External(format!("failed to run pgrep: {e}")))?;

    // pgrep exits with 1 when nothing matched.
    match out.status.code() {
        Some(0) | Some(1) => {}
        _ => {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(Error::External(format!(
                "pgrep failed: {} {}",
                out.status,
                stderr.trim()
            )));
        }
    }

    Ok(parse_pgrep_output(
        &String::from_utf8_lossy(&out.stdout),
        own_pid,
    ))
}

/// Send SIGTERM to each pid. Returns the pids that were signalled.
pub async fn terminate(pids: &[u32]) -> Vec<u32> {
    let mut killed = Vec::new();
    for &pid in pids {
        match Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .status()
            .await
        {
            Ok(status) if status.success() => killed.push(pid),
            Ok(status) => tracing::warn!(pid, %status, "kill returned non-zero"),
            Err(e) => tracing::warn!(pid, error = %e, "failed to run kill"),
        }
    }
    killed
}

fn parse_pgrep_output(stdout: &str, own_pid: u32) -> Vec<u32> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .filter(|pid| *pid != own_pid)
        .collect()
}
