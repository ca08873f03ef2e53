use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A billing account row. `status` is derived from `balance` by
/// [`crate::billing::planner::status_for_balance`] on every write — it is
/// never written independently.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub username: String,
    pub balance: f64,
    pub status: String,
    pub blocked_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PriceRow {
    pub gpu_model_prefix: String,
    pub price_per_minute: f64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NodeUserMapping {
    pub node_id: String,
    pub local_username: String,
    pub billing_username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WhitelistEntry {
    pub node_id: String,
    pub local_username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BindRequest {
    pub id: String,
    pub node_id: String,
    pub local_username: String,
    pub requested_billing_username: String,
    pub status: String,
    pub created_at: String,
    pub decided_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageRecord {
    pub id: i64,
    pub node_id: String,
    pub report_id: String,
    pub username: String,
    pub ts: String,
    pub pid: i64,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub gpu_count: i64,
    pub command: Option<String>,
    pub gpu_usage: String,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NodeStatus {
    pub node_id: String,
    pub last_seen_at: String,
    pub last_report_id: String,
    pub last_report_ts: String,
    pub interval_seconds: i64,
    pub cpu_model: Option<String>,
    pub cpu_count: Option<i64>,
    pub gpu_model: Option<String>,
    pub gpu_count: Option<i64>,
    pub net_rx_total_mb: f64,
    pub net_tx_total_mb: f64,
    pub traffic_month: String,
    pub net_rx_month_mb: f64,
    pub net_tx_month_mb: f64,
    pub gpu_process_count: i64,
    pub cpu_process_count: i64,
    pub usage_records_count: i64,
    pub cost_total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RechargeRecord {
    pub id: String,
    pub username: String,
    pub amount: f64,
    pub note: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct AdminUser {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    #[allow(dead_code)]
    pub created_at: String,
}

/// The current UTC instant, formatted the way every timestamp column in
/// this schema is stored: RFC3339 with seconds precision.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Parse a stored timestamp column back into a `DateTime<Utc>`. Falls back
/// to the Unix epoch on malformed data rather than panicking — a corrupt
/// timestamp should degrade grace-period math toward "already elapsed",
/// never toward "never elapsed".
pub fn parse_stored_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::from_timestamp(0, 0).unwrap())
}
