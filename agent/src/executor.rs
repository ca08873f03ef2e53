use std::path::PathBuf;
use std::time::Duration;

use gpuops_common::Action;
use tracing::{info, warn};

/// Dispatch one controller-issued action to this node. Mirrors
/// `ExecuteAction`'s switch in the original agent: each variant maps to
/// exactly one local side effect, and an unhandled variant is a
/// programmer error rather than something to degrade gracefully from
/// (the match is exhaustive over `Action`, so there is no `default` arm).
pub async fn execute(action: &Action) -> Result<(), ExecError> {
    match action {
        Action::Notify { username, message } => write_notice(username, message).await,
        Action::BlockUser { username, reason } => block_user(username, reason).await,
        Action::UnblockUser { username } => unblock_user(username).await,
        Action::KillProcess { username, pids, reason } => kill_processes(username, pids, reason).await,
        Action::SetCpuQuota {
            username,
            cpu_quota_percent,
            reason,
        } => set_user_cpu_quota(username, *cpu_quota_percent, reason).await,
    }
}

fn home_dir(username: &str) -> PathBuf {
    PathBuf::from("/home").join(username)
}

async fn write_notice(username: &str, message: &str) -> Result<(), ExecError> {
    let username = username.trim();
    let message = message.trim();
    if username.is_empty() || message.is_empty() {
        return Ok(());
    }
    let content = format!("{}\n{}\n", chrono::Utc::now().to_rfc3339(), message);
    tokio::fs::write(home_dir(username).join(".gpu_notice"), content)
        .await
        .map_err(|e| ExecError::Io(e.to_string()))
}

async fn block_user(username: &str, reason: &str) -> Result<(), ExecError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ExecError::BlankUsername);
    }
    let reason = if reason.trim().is_empty() {
        "Insufficient balance, new GPU jobs blocked"
    } else {
        reason.trim()
    };
    tokio::fs::write(home_dir(username).join(".gpu_blocked"), format!("{reason}\n"))
        .await
        .map_err(|e| ExecError::Io(e.to_string()))
}

async fn unblock_user(username: &str) -> Result<(), ExecError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ExecError::BlankUsername);
    }
    match tokio::fs::remove_file(home_dir(username).join(".gpu_blocked")).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ExecError::Io(e.to_string())),
    }
}

async fn kill_processes(username: &str, pids: &[i32], reason: &str) -> Result<(), ExecError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ExecError::BlankUsername);
    }
    if pids.is_empty() {
        return Ok(());
    }

    info!(username, ?pids, reason = reason.trim(), "executing kill_process");

    signal_owned_pids(username, pids, Signal::SIGTERM);

    // Give processes a window to exit cleanly before escalating, matching
    // the original agent's 5-second SIGTERM-then-SIGKILL grace window.
    tokio::time::sleep(Duration::from_secs(5)).await;

    signal_owned_pids(username, pids, Signal::SIGKILL);
    Ok(())
}

#[cfg(unix)]
#[derive(Clone, Copy)]
enum Signal {
    SIGTERM,
    SIGKILL,
}

#[cfg(unix)]
fn signal_owned_pids(username: &str, pids: &[i32], signal: Signal) {
    use nix::sys::signal::{kill, Signal as NixSignal};
    use nix::unistd::Pid as NixPid;

    let nix_signal = match signal {
        Signal::SIGTERM => NixSignal::SIGTERM,
        Signal::SIGKILL => NixSignal::SIGKILL,
    };

    for &pid in pids {
        if !pid_owned_by(pid, username) {
            continue;
        }
        if let Err(e) = kill(NixPid::from_raw(pid), nix_signal) {
            warn!(pid, signal = signal_name(signal), error = %e, "failed to signal process (may have already exited)");
        }
    }
}

#[cfg(not(unix))]
fn signal_owned_pids(_username: &str, _pids: &[i32], _signal: Signal) {}

#[cfg(unix)]
fn signal_name(signal: Signal) -> &'static str {
    match signal {
        Signal::SIGTERM => "SIGTERM",
        Signal::SIGKILL => "SIGKILL",
    }
}

/// Refuse to signal a pid unless it is still owned by the username the
/// action targets — a pid can be recycled by the kernel between the
/// controller's report and the agent acting on it.
#[cfg(unix)]
fn pid_owned_by(pid: i32, username: &str) -> bool {
    let path = format!("/proc/{pid}");
    let Ok(meta) = std::fs::metadata(&path) else { return false };
    use std::os::unix::fs::MetadataExt;
    let uid = meta.uid();
    nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid))
        .ok()
        .flatten()
        .map(|u| u.name == username)
        .unwrap_or(false)
}

async fn set_user_cpu_quota(username: &str, percent: f64, reason: &str) -> Result<(), ExecError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ExecError::BlankUsername);
    }
    if !(0.0..=100.0).contains(&percent) {
        return Err(ExecError::InvalidQuota(percent));
    }

    let uid = lookup_uid(username).await?;

    if is_systemd() && has_command("systemctl").await {
        if set_cpu_quota_by_systemd(uid, percent).await.is_ok() {
            return write_cpu_quota_state(username, percent, reason).await;
        }
        warn!(username, uid, "systemd CPUQuota failed, falling back to cgroup v2");
    }

    if set_cpu_quota_by_cgroup_v2(uid, percent).is_ok() {
        return write_cpu_quota_state(username, percent, reason).await;
    }
    warn!(username, uid, "cgroup v2 cpu.max unreachable, falling back to cgroup v1");

    set_cpu_quota_by_cgroup_v1(uid, percent)?;
    write_cpu_quota_state(username, percent, reason).await
}

async fn write_cpu_quota_state(username: &str, percent: f64, reason: &str) -> Result<(), ExecError> {
    let dir = home_dir(username);
    tokio::fs::create_dir_all(&dir).await.map_err(|e| ExecError::Io(e.to_string()))?;
    let content = format!("cpu_quota_percent={:.2}\nreason={}\n", percent, reason.trim());
    tokio::fs::write(dir.join(".cpu_quota"), content)
        .await
        .map_err(|e| ExecError::Io(e.to_string()))
}

async fn lookup_uid(username: &str) -> Result<u32, ExecError> {
    #[cfg(unix)]
    {
        nix::unistd::User::from_name(username)
            .ok()
            .flatten()
            .map(|u| u.uid.as_raw())
            .ok_or_else(|| ExecError::UnknownUser(username.to_string()))
    }
    #[cfg(not(unix))]
    {
        let _ = username;
        Err(ExecError::UnsupportedPlatform)
    }
}

fn is_systemd() -> bool {
    std::path::Path::new("/run/systemd/system").exists()
}

async fn has_command(name: &str) -> bool {
    tokio::process::Command::new("which")
        .arg(name)
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

async fn set_cpu_quota_by_systemd(uid: u32, percent: f64) -> Result<(), ExecError> {
    let slice = format!("user-{uid}.slice");
    let property = if percent <= 0.0 {
        "CPUQuota=".to_string()
    } else {
        format!("CPUQuota={percent:.2}%")
    };

    let output = tokio::process::Command::new("systemctl")
        .args(["set-property", "--runtime", &slice, &property])
        .output()
        .await
        .map_err(|e| ExecError::Io(e.to_string()))?;

    if !output.status.success() {
        return Err(ExecError::QuotaBackend(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(())
}

const CGROUP_V2_PERIOD_US: i64 = 100_000;

fn cpu_max_value(percent: f64) -> String {
    if percent <= 0.0 {
        format!("max {CGROUP_V2_PERIOD_US}")
    } else {
        let quota = ((CGROUP_V2_PERIOD_US as f64) * (percent / 100.0)) as i64;
        format!("{} {}", quota.max(1000), CGROUP_V2_PERIOD_US)
    }
}

fn set_cpu_quota_by_cgroup_v2(uid: u32, percent: f64) -> Result<(), ExecError> {
    let value = cpu_max_value(percent);
    let candidates = [
        PathBuf::from(format!("/sys/fs/cgroup/user.slice/user-{uid}.slice")),
        PathBuf::from(format!("/sys/fs/cgroup/user-{uid}.slice")),
    ];
    for dir in candidates {
        if std::fs::write(dir.join("cpu.max"), &value).is_ok() {
            move_uid_pids_into(&dir.join("cgroup.procs"), uid);
            return Ok(());
        }
    }
    Err(ExecError::QuotaBackend(format!(
        "no writable cgroup v2 cpu.max for uid {uid}"
    )))
}

/// Best-effort: move every process currently owned by `uid` into the
/// cgroup at `procs_path` (`cgroup.procs` for v2, `tasks` for v1). Spec
/// §4.5(b)/(c) calls this an "attempt" — a process that refuses to move
/// (already in a stricter cgroup, exited mid-scan) is skipped, not fatal.
fn move_uid_pids_into(procs_path: &std::path::Path, uid: u32) {
    let Ok(entries) = std::fs::read_dir("/proc") else { return };
    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };
        let Ok(meta) = std::fs::metadata(entry.path()) else { continue };
        use std::os::unix::fs::MetadataExt;
        if meta.uid() != uid {
            continue;
        }
        let _ = std::fs::write(procs_path, pid.to_string());
    }
}

/// Third fallback tier, not present in the agent this was ported from
/// (which stops at cgroup v2): discovers the legacy v1 `cpu` controller
/// mount by scanning `/proc/mounts`, then writes `cfs_quota_us`/
/// `cfs_period_us` under a dedicated `gpuops/user-<uid>/` subdirectory
/// instead of the unified `cpu.max`.
fn set_cpu_quota_by_cgroup_v1(uid: u32, percent: f64) -> Result<(), ExecError> {
    let mount = find_cgroup_v1_cpu_mount()
        .ok_or_else(|| ExecError::QuotaBackend("no cgroup v1 cpu controller mounted".to_string()))?;

    let dir = mount.join("gpuops").join(format!("user-{uid}"));
    std::fs::create_dir_all(&dir).map_err(|e| ExecError::Io(e.to_string()))?;

    let quota_us = if percent <= 0.0 {
        -1i64
    } else {
        (((CGROUP_V2_PERIOD_US as f64) * (percent / 100.0)) as i64).max(1000)
    };

    let period_ok = std::fs::write(dir.join("cpu.cfs_period_us"), CGROUP_V2_PERIOD_US.to_string()).is_ok();
    let quota_ok = std::fs::write(dir.join("cpu.cfs_quota_us"), quota_us.to_string()).is_ok();
    if period_ok && quota_ok {
        move_uid_pids_into(&dir.join("tasks"), uid);
        return Ok(());
    }

    Err(ExecError::QuotaBackend(format!(
        "no writable cgroup v1 cpu slice for uid {uid}"
    )))
}

fn find_cgroup_v1_cpu_mount() -> Option<PathBuf> {
    let mounts = std::fs::read_to_string("/proc/mounts").ok()?;
    for line in mounts.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[2] != "cgroup" {
            continue;
        }
        if fields[3].split(',').any(|opt| opt == "cpu") {
            return Some(PathBuf::from(fields[1]));
        }
    }
    None
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("username must not be blank")]
    BlankUsername,
    #[error("cpu_quota_percent must be in [0,100], got {0}")]
    InvalidQuota(f64),
    #[error("unknown local user: {0}")]
    UnknownUser(String),
    #[error("quota backend failed: {0}")]
    QuotaBackend(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[cfg(not(unix))]
    #[error("unsupported platform")]
    UnsupportedPlatform,
}
