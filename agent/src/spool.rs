use std::path::{Path, PathBuf};

use gpuops_common::MetricsData;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Cap on spooled reports kept on disk when the controller is
/// unreachable; oldest entries are dropped first once exceeded, so a
/// long outage loses history rather than the disk.
const MAX_SPOOLED: usize = 500;

pub struct Spool {
    path: PathBuf,
}

impl Spool {
    pub fn new(state_dir: &str) -> Self {
        Self {
            path: Path::new(state_dir).join("pending.jsonl"),
        }
    }

    /// Append one report that failed to submit. Creates the state
    /// directory if missing.
    pub async fn append(&self, metrics: &MetricsData) -> Result<(), SpoolError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(SpoolError::Io)?;
        }

        let mut line = serde_json::to_vec(metrics).map_err(SpoolError::Serde)?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(SpoolError::Io)?;
        file.write_all(&line).await.map_err(SpoolError::Io)?;
        Ok(())
    }

    /// Read every spooled report in file order. Malformed lines are
    /// dropped rather than blocking the whole queue.
    pub async fn read_all(&self) -> Result<Vec<MetricsData>, SpoolError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SpoolError::Io(e)),
        };

        Ok(contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str::<MetricsData>(l).ok())
            .collect())
    }

    /// Replace the spool with exactly `remaining`, capped to the most
    /// recent [`MAX_SPOOLED`] entries, via atomic tmp-then-rename so a
    /// crash mid-write never truncates the file to garbage. An empty
    /// `remaining` removes the spool file entirely.
    pub async fn replace(&self, remaining: &[MetricsData]) -> Result<(), SpoolError> {
        if remaining.is_empty() {
            match fs::remove_file(&self.path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(SpoolError::Io(e)),
            }
            return Ok(());
        }

        let start = remaining.len().saturating_sub(MAX_SPOOLED);
        let mut buf = Vec::new();
        for m in &remaining[start..] {
            serde_json::to_writer(&mut buf, m).map_err(SpoolError::Serde)?;
            buf.push(b'\n');
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        if let Some(parent) = tmp.parent() {
            fs::create_dir_all(parent).await.map_err(SpoolError::Io)?;
        }
        fs::write(&tmp, &buf).await.map_err(SpoolError::Io)?;
        fs::rename(&tmp, &self.path).await.map_err(SpoolError::Io)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SpoolError {
    #[error("spool I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("spool serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpuops_common::MetricsData;

    fn sample(report_id: &str) -> MetricsData {
        MetricsData {
            node_id: "node-1".into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
            report_id: report_id.into(),
            interval_seconds: Some(60),
            cpu_model: None,
            cpu_count: None,
            gpu_model: None,
            gpu_count: None,
            net_rx_bytes: None,
            net_tx_bytes: None,
            users: vec![],
        }
    }

    #[tokio::test]
    async fn append_then_read_all_round_trips() {
        let dir = tempdir();
        let spool = Spool::new(dir.to_str().unwrap());
        spool.append(&sample("a")).await.unwrap();
        spool.append(&sample("b")).await.unwrap();

        let all = spool.read_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].report_id, "a");
        assert_eq!(all[1].report_id, "b");

        cleanup(&dir);
    }

    #[tokio::test]
    async fn replace_with_empty_removes_the_file() {
        let dir = tempdir();
        let spool = Spool::new(dir.to_str().unwrap());
        spool.append(&sample("a")).await.unwrap();
        spool.replace(&[]).await.unwrap();

        assert!(spool.read_all().await.unwrap().is_empty());
        cleanup(&dir);
    }

    #[tokio::test]
    async fn replace_caps_to_most_recent_max_spooled_entries() {
        let dir = tempdir();
        let spool = Spool::new(dir.to_str().unwrap());
        let many: Vec<MetricsData> = (0..600).map(|i| sample(&format!("r{i}"))).collect();
        spool.replace(&many).await.unwrap();

        let all = spool.read_all().await.unwrap();
        assert_eq!(all.len(), 500);
        assert_eq!(all[0].report_id, "r100");
        assert_eq!(all[499].report_id, "r599");

        cleanup(&dir);
    }

    #[tokio::test]
    async fn read_all_skips_malformed_lines() {
        let dir = tempdir();
        let spool = Spool::new(dir.to_str().unwrap());
        fs::create_dir_all(&dir).await.unwrap();
        fs::write(dir.join("pending.jsonl"), b"not json\n{}\n").await.unwrap();

        // "{}" fails to deserialize into MetricsData (missing required
        // fields) just like a truncated line would, and is dropped too.
        let all = spool.read_all().await.unwrap();
        assert!(all.is_empty());

        cleanup(&dir);
    }

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gpuops-spool-test-{}", rand::random::<u64>()));
        dir
    }

    fn cleanup(dir: &Path) {
        let _ = std::fs::remove_dir_all(dir);
    }
}
