use std::time::Duration;

use gpuops_common::{ControllerResponse, MetricsData};
use reqwest::Client;
use tracing::warn;

use crate::spool::Spool;

pub struct Transport {
    client: Client,
    controller_url: String,
    agent_token: String,
    spool: Spool,
}

impl Transport {
    pub fn new(controller_url: &str, agent_token: &str, state_dir: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(8))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            controller_url: controller_url.trim_end_matches('/').to_string(),
            agent_token: agent_token.to_string(),
            spool: Spool::new(state_dir),
        }
    }

    /// Flush any backlog, then submit this tick's report. A submission
    /// failure spools the current report too rather than dropping it.
    pub async fn report(&self, metrics: &MetricsData) -> Result<ControllerResponse, TransportError> {
        if let Err(e) = self.flush_pending().await {
            warn!(error = %e, "failed to flush spooled reports, will retry next tick");
        }

        match self.post_metrics(metrics).await {
            Ok(resp) => Ok(resp),
            Err(e) => {
                if let Err(spool_err) = self.spool.append(metrics).await {
                    warn!(error = %spool_err, "failed to spool report after submit failure");
                }
                Err(e)
            }
        }
    }

    async fn post_metrics(&self, metrics: &MetricsData) -> Result<ControllerResponse, TransportError> {
        let url = format!("{}/api/metrics", self.controller_url);
        let res = self
            .client
            .post(&url)
            .header("X-Agent-Token", &self.agent_token)
            .json(metrics)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(TransportError::NonSuccess {
                status: status.as_u16(),
                body: body.chars().take(1024).collect(),
            });
        }

        res.json::<ControllerResponse>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn flush_pending(&self) -> Result<(), TransportError> {
        let pending = self
            .spool
            .read_all()
            .await
            .map_err(|e| TransportError::Spool(e.to_string()))?;
        if pending.is_empty() {
            return Ok(());
        }

        let mut remaining = Vec::new();
        for metrics in pending {
            if self.post_metrics(&metrics).await.is_err() {
                remaining.push(metrics);
            }
        }

        self.spool
            .replace(&remaining)
            .await
            .map_err(|e| TransportError::Spool(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("controller returned non-2xx status {status}: {body}")]
    NonSuccess { status: u16, body: String },
    #[error("failed to decode controller response: {0}")]
    Decode(String),
    #[error("spool error: {0}")]
    Spool(String),
}
