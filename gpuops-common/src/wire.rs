use serde::{Deserialize, Serialize};

use crate::Action;

/// One node's report for one sampling interval. Submitted by the agent as
/// the body of `POST /api/metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsData {
    pub node_id: String,
    pub timestamp: String,
    pub report_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_rx_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_tx_bytes: Option<u64>,
    #[serde(default)]
    pub users: Vec<UserProcess>,
}

/// One sampled process, billed to `username` (rewritten by the controller
/// from local username to billing username before it's persisted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProcess {
    pub username: String,
    pub pid: i32,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    #[serde(default)]
    pub gpu_usage: Vec<GpuUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuUsage {
    pub gpu_id: i32,
    pub gpu_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_bus_id: Option<String>,
    pub memory_mb: f64,
}

/// The controller's reply to a metrics submission: the actions the agent
/// must now execute. Empty on a duplicate `report_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerResponse {
    pub actions: Vec<Action>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_data_round_trips_through_json() {
        let data = MetricsData {
            node_id: "node-1".into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
            report_id: "abc123".into(),
            interval_seconds: Some(60),
            cpu_model: None,
            cpu_count: None,
            gpu_model: None,
            gpu_count: None,
            net_rx_bytes: None,
            net_tx_bytes: None,
            users: vec![UserProcess {
                username: "alice".into(),
                pid: 1234,
                cpu_percent: 12.5,
                memory_mb: 256.0,
                gpu_usage: vec![GpuUsage {
                    gpu_id: 0,
                    gpu_model: "NVIDIA A100".into(),
                    gpu_bus_id: Some("0000:01:00.0".into()),
                    memory_mb: 1024.0,
                }],
                command: Some("python train.py".into()),
            }],
        };

        let json = serde_json::to_string(&data).unwrap();
        let back: MetricsData = serde_json::from_str(&json).unwrap();
        assert_eq!(back.node_id, "node-1");
        assert_eq!(back.users.len(), 1);
        assert_eq!(back.users[0].gpu_usage[0].gpu_model, "NVIDIA A100");
    }

    #[test]
    fn optional_fields_omitted_when_absent() {
        let data = MetricsData {
            node_id: "n".into(),
            timestamp: "t".into(),
            report_id: "r".into(),
            interval_seconds: None,
            cpu_model: None,
            cpu_count: None,
            gpu_model: None,
            gpu_count: None,
            net_rx_bytes: None,
            net_tx_bytes: None,
            users: vec![],
        };
        let json = serde_json::to_value(&data).unwrap();
        assert!(json.get("interval_seconds").is_none());
        assert!(json.get("cpu_model").is_none());
    }
}
