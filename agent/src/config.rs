use std::time::Duration;

/// Agent-side configuration, loaded once at startup and passed by
/// reference into the sampler/transport/executor rather than read as a
/// process-wide singleton.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub node_id: String,
    pub controller_url: String,
    pub agent_token: String,
    pub interval: Duration,
    pub state_dir: String,
    pub cpu_min_percent: f64,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        let mut node_id = std::env::var("NODE_ID").unwrap_or_default().trim().to_string();
        if node_id.is_empty() {
            node_id = hostname();
        }

        let interval_seconds = std::env::var("INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(60);

        let cpu_min_percent = std::env::var("CPU_MIN_PERCENT")
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| *v >= 0.0)
            .unwrap_or(1.0);

        let mut state_dir = std::env::var("STATE_DIR").unwrap_or_default().trim().to_string();
        if state_dir.is_empty() {
            state_dir = "/var/lib/gpu-node-agent".to_string();
        }

        Self {
            node_id,
            controller_url: std::env::var("CONTROLLER_URL").unwrap_or_default().trim().to_string(),
            agent_token: std::env::var("AGENT_TOKEN").unwrap_or_default().trim().to_string(),
            interval: Duration::from_secs(interval_seconds),
            state_dir,
            cpu_min_percent,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.node_id.is_empty() {
            return Err("node_id must not be empty".to_string());
        }
        if self.controller_url.is_empty() {
            return Err("controller_url must not be empty".to_string());
        }
        if self.agent_token.is_empty() {
            return Err("agent_token must not be empty".to_string());
        }
        Ok(())
    }
}

fn hostname() -> String {
    #[cfg(unix)]
    {
        nix::unistd::gethostname()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-node".to_string())
    }
    #[cfg(not(unix))]
    {
        "unknown-node".to_string()
    }
}
