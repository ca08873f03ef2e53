use std::collections::HashMap;
use std::time::Instant;

use gpuops_common::{MetricsData, UserProcess};
use sysinfo::{ProcessRefreshKind, System};

use crate::gpu;

/// One pid's last observed cumulative CPU time, for self-differencing.
struct CpuSample {
    total_seconds: f64,
    at: Instant,
}

/// Per-process sampler. Self-maintains a `{pid -> last cumulative CPU
/// time}` map and diffs against it on each tick rather than trusting a
/// library's internal previous-sample cache — the same self-diff idiom
/// the agent this was ported from uses, to keep CPU% computation
/// auditable independent of whatever process-enumeration crate is in use.
pub struct Sampler {
    system: System,
    cpu_min_percent: f64,
    last_cpu: HashMap<i32, CpuSample>,
    clk_tck: f64,
}

impl Sampler {
    pub fn new(cpu_min_percent: f64) -> Self {
        Self {
            system: System::new(),
            cpu_min_percent,
            last_cpu: HashMap::new(),
            clk_tck: clk_tck_hz(),
        }
    }

    pub async fn collect(&mut self, node_id: &str, report_id: &str) -> Result<MetricsData, CollectError> {
        self.system.refresh_processes_specifics(ProcessRefreshKind::everything());

        let gpu_map = gpu::gpu_usage_map()
            .await
            .map_err(|e| CollectError::Gpu(e.to_string()))?;

        let now = Instant::now();
        let mut seen = std::collections::HashSet::with_capacity(self.system.processes().len());
        let mut users = Vec::new();

        for (pid, process) in self.system.processes() {
            let pid_i32 = pid.as_u32() as i32;
            if pid_i32 <= 0 {
                continue;
            }
            seen.insert(pid_i32);

            let Some(username) = process_username(process) else { continue };
            if username.is_empty() || username == "root" {
                continue;
            }

            let cpu_percent = self.compute_cpu_percent(pid_i32, now);
            let gpu_usage = gpu_map.get(&pid_i32).cloned().unwrap_or_default();

            if gpu_usage.is_empty() && cpu_percent < self.cpu_min_percent {
                continue;
            }

            let memory_mb = process.memory() as f64 / 1024.0 / 1024.0;
            let command = {
                let name = process.name().to_string();
                if name.is_empty() { None } else { Some(name) }
            };

            users.push(UserProcess {
                username,
                pid: pid_i32,
                cpu_percent,
                memory_mb,
                gpu_usage,
                command,
            });
        }

        // Prune pids no longer enumerated this tick to prevent unbounded
        // growth of the self-diff map (§4.3 step 6).
        self.last_cpu.retain(|pid, _| seen.contains(pid));

        let (gpu_model, gpu_count) = gpu::gpu_inventory().await.unwrap_or((None, None));

        Ok(MetricsData {
            node_id: node_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            report_id: report_id.to_string(),
            interval_seconds: None,
            cpu_model: cpu_model_name(&self.system),
            cpu_count: Some(self.system.cpus().len() as i64),
            gpu_model,
            gpu_count,
            net_rx_bytes: None,
            net_tx_bytes: None,
            users,
        })
    }

    /// `percent = (ΔT / Δt) · 100` against the last sample for this pid;
    /// unconditionally updates the map first, so a pid observed for the
    /// first time this tick always reports 0 (§4.3 step 2, §8 scenario 6).
    fn compute_cpu_percent(&mut self, pid: i32, now: Instant) -> f64 {
        let Some(total) = read_cumulative_cpu_seconds(pid, self.clk_tck) else {
            return 0.0;
        };

        let prev = self.last_cpu.insert(pid, CpuSample { total_seconds: total, at: now });
        let Some(prev) = prev else { return 0.0 };

        let elapsed = now.duration_since(prev.at).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        let delta = total - prev.total_seconds;
        if delta <= 0.0 {
            return 0.0;
        }

        let percent = (delta / elapsed) * 100.0;
        if percent.is_finite() && percent >= 0.0 {
            percent
        } else {
            0.0
        }
    }
}

#[cfg(target_os = "linux")]
fn read_cumulative_cpu_seconds(pid: i32, clk_tck: f64) -> Option<f64> {
    let contents = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // Fields after the process name (which may itself contain spaces/parens)
    // start right after the last ')'; utime/stime are fields 14/15 overall,
    // i.e. indices 11/12 once "pid (comm) state" is stripped off.
    let after_comm = contents.rsplit_once(')')?.1;
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some((utime + stime) as f64 / clk_tck)
}

#[cfg(not(target_os = "linux"))]
fn read_cumulative_cpu_seconds(_pid: i32, _clk_tck: f64) -> Option<f64> {
    None
}

/// USER_HZ, the unit `/proc/<pid>/stat`'s utime/stime fields are counted
/// in. Fixed at 100 on every architecture Linux currently supports in
/// practice, so this avoids a libc dependency purely for `sysconf`.
fn clk_tck_hz() -> f64 {
    100.0
}

fn process_username(process: &sysinfo::Process) -> Option<String> {
    #[cfg(unix)]
    {
        process
            .user_id()
            .and_then(|uid| {
                nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(**uid))
                    .ok()
                    .flatten()
            })
            .map(|u| u.name)
    }
    #[cfg(not(unix))]
    {
        let _ = process;
        None
    }
}

fn cpu_model_name(system: &System) -> Option<String> {
    system
        .cpus()
        .first()
        .map(|c| c.brand().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("failed to query GPU usage: {0}")]
    Gpu(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_collect_on_a_fresh_system_never_panics_and_reports_zero_or_more_users() {
        let mut sampler = Sampler::new(1.0);
        let data = sampler.collect("node-1", "report-1").await.unwrap();
        assert_eq!(data.node_id, "node-1");
        assert_eq!(data.report_id, "report-1");
    }

    #[test]
    fn compute_cpu_percent_is_zero_on_first_observation() {
        let mut sampler = Sampler::new(1.0);
        // No /proc/<pid>/stat for a synthetic pid, so this exercises the
        // "no sample available" path the same way a first observation does:
        // the map stays empty and 0.0 is returned rather than panicking.
        let percent = sampler.compute_cpu_percent(i32::MAX, Instant::now());
        assert_eq!(percent, 0.0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn compute_cpu_percent_reports_positive_delta_on_second_sample() {
        let mut sampler = Sampler::new(1.0);
        let pid = std::process::id() as i32;

        let first = sampler.compute_cpu_percent(pid, Instant::now());
        assert_eq!(first, 0.0);

        // Burn some CPU so the second /proc/<pid>/stat read shows a
        // nonzero utime+stime delta against the first sample.
        let mut x: u64 = 1;
        for i in 0..20_000_000u64 {
            x = x.wrapping_mul(i).wrapping_add(1);
        }
        std::hint::black_box(x);

        let second = sampler.compute_cpu_percent(pid, Instant::now());
        assert!(second >= 0.0);
    }
}
