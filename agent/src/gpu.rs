use std::collections::HashMap;
use std::process::Stdio;

use gpuops_common::GpuUsage;
use tokio::process::Command;
use tracing::warn;

/// Per-pid GPU usage, keyed by pid, queried by shelling out to
/// `nvidia-smi`. Absence of the binary (no GPU/no driver on this node) is
/// not an error — it degrades to an empty map so CPU-only nodes still
/// report.
pub async fn gpu_usage_map() -> Result<HashMap<i32, Vec<GpuUsage>>, GpuQueryError> {
    let mut out: HashMap<i32, Vec<GpuUsage>> = HashMap::new();

    let lines = match run_nvidia_smi(&[
        "--query-compute-apps=pid,gpu_name,gpu_bus_id,used_memory",
        "--format=csv,noheader,nounits",
    ])
    .await
    {
        Ok(lines) => lines,
        Err(GpuQueryError::NoNvidiaSmi) => return Ok(out),
        Err(e) => return Err(e),
    };

    let bus_id_to_index = bus_id_to_index_map().await.unwrap_or_default();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts = split_csv_line(line);
        if parts.len() < 4 {
            continue;
        }

        let pid: i32 = match parts[0].parse() {
            Ok(v) if v > 0 => v,
            _ => continue,
        };
        let gpu_model = parts[1].to_string();
        let bus_id = parts[2].to_string();
        let memory_mb: f64 = parts[3].parse().unwrap_or(0.0);

        let gpu_id = bus_id_to_index
            .get(&normalize_bus_id(&bus_id))
            .copied()
            .unwrap_or(-1);

        out.entry(pid).or_default().push(GpuUsage {
            gpu_id,
            gpu_model,
            gpu_bus_id: Some(bus_id),
            memory_mb,
        });
    }

    Ok(out)
}

async fn bus_id_to_index_map() -> Result<HashMap<String, i32>, GpuQueryError> {
    let lines = match run_nvidia_smi(&["--query-gpu=index,pci.bus_id", "--format=csv,noheader"]).await {
        Ok(lines) => lines,
        Err(GpuQueryError::NoNvidiaSmi) => return Ok(HashMap::new()),
        Err(e) => return Err(e),
    };

    let mut out = HashMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts = split_csv_line(line);
        if parts.len() < 2 {
            continue;
        }
        let Ok(idx) = parts[0].parse::<i32>() else { continue };
        out.insert(normalize_bus_id(&parts[1]), idx);
    }
    Ok(out)
}

/// GPU model/count for the node heartbeat, same graceful-degradation rule.
pub async fn gpu_inventory() -> Result<(Option<String>, Option<i64>), GpuQueryError> {
    let lines = match run_nvidia_smi(&["--query-gpu=name", "--format=csv,noheader"]).await {
        Ok(lines) => lines,
        Err(GpuQueryError::NoNvidiaSmi) => return Ok((None, None)),
        Err(e) => return Err(e),
    };

    let mut count = 0i64;
    let mut model: Option<String> = None;
    for line in lines {
        let name = line.trim();
        if name.is_empty() {
            continue;
        }
        count += 1;
        if model.is_none() {
            model = Some(name.to_string());
        }
    }
    Ok((model, if count > 0 { Some(count) } else { None }))
}

async fn run_nvidia_smi(args: &[&str]) -> Result<Vec<String>, GpuQueryError> {
    let output = Command::new("nvidia-smi")
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GpuQueryError::NoNvidiaSmi
            } else {
                GpuQueryError::Io(e.to_string())
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(stderr = %stderr, "nvidia-smi exited with non-zero status");
        return Err(GpuQueryError::NonZeroExit(stderr));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    Ok(text.lines().map(|l| l.to_string()).collect())
}

fn split_csv_line(line: &str) -> Vec<String> {
    line.split(',').map(|p| p.trim().to_string()).collect()
}

fn normalize_bus_id(bus_id: &str) -> String {
    bus_id.trim().to_uppercase()
}

#[derive(Debug, thiserror::Error)]
pub enum GpuQueryError {
    #[error("nvidia-smi not found")]
    NoNvidiaSmi,
    #[error("failed to launch nvidia-smi: {0}")]
    Io(String),
    #[error("nvidia-smi exited non-zero: {0}")]
    NonZeroExit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_csv_line_trims_each_field() {
        let parts = split_csv_line(" 123 , NVIDIA A100 , 00:1E.0 , 512 ");
        assert_eq!(parts, vec!["123", "NVIDIA A100", "00:1E.0", "512"]);
    }

    #[test]
    fn normalize_bus_id_uppercases_and_trims() {
        assert_eq!(normalize_bus_id(" 00:1e.0 "), "00:1E.0");
    }
}
