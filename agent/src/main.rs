mod config;
mod executor;
mod gpu;
mod report_id;
mod sampler;
mod spool;
mod transport;

use std::time::Duration;

use config::AgentConfig;
use sampler::Sampler;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use transport::Transport;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AgentConfig::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        std::process::exit(1);
    }

    info!(
        node_id = %config.node_id,
        controller_url = %config.controller_url,
        interval_secs = config.interval.as_secs(),
        "starting node agent"
    );

    let transport = Transport::new(&config.controller_url, &config.agent_token, &config.state_dir);
    let mut sampler = Sampler::new(config.cpu_min_percent);

    let mut terminate = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut interrupt = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = tick(&config, &mut sampler, &transport).await {
                    warn!(error = %e, "tick failed");
                }
            }
            _ = terminate.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
            _ = interrupt.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
        }
    }
}

async fn tick(config: &AgentConfig, sampler: &mut Sampler, transport: &Transport) -> anyhow::Result<()> {
    let report_id = report_id::new_report_id();

    let mut metrics = tokio::time::timeout(Duration::from_secs(20), sampler.collect(&config.node_id, &report_id))
        .await
        .map_err(|_| anyhow::anyhow!("metrics collection timed out"))??;
    metrics.interval_seconds = Some(config.interval.as_secs() as i64);

    let resp = tokio::time::timeout(Duration::from_secs(15), transport.report(&metrics))
        .await
        .map_err(|_| anyhow::anyhow!("report submission timed out"))??;

    for action in &resp.actions {
        let result = tokio::time::timeout(Duration::from_secs(30), executor::execute(action)).await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(?action, error = %e, "action execution failed"),
            Err(_) => warn!(?action, "action execution timed out"),
        }
    }

    Ok(())
}
