use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use gpuops_common::{round4, Action, MetricsData, UserProcess};
use sqlx::Transaction;
use tracing::warn;

use crate::billing::identity::IdentityResolver;
use crate::billing::planner::{self, CpuControlConfig, Status, UserAfterDebit};
use crate::billing::pricing::PriceIndex;
use crate::config::AppConfig;
use crate::db::Database;

/// Max length a reported `command` string is truncated to before storage
/// (§4.1 pre-validation).
const MAX_COMMAND_LEN: usize = 256;

/// Error returned for malformed input that should be rejected before any
/// transaction is opened (HTTP 400, §7 `InvalidRequest`).
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("node_id must not be blank")]
    BlankNodeId,
    #[error("report_id must not be blank")]
    BlankReportId,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Per-billing-account accumulator built while pricing this report's
/// processes, keyed by billing username.
struct BillingAgg {
    total_cost: f64,
    // local_username -> pids observed for that local account this report.
    by_local: HashMap<String, Vec<i32>>,
}

/// Outcome of one ingest pipeline run, distinguishing a duplicate
/// `report_id` (no-op, not charged) from a freshly-accepted report so
/// callers can keep separate `accepted_reports`/`duplicate_reports`
/// counters (§6 `GET /metrics`) without re-deriving it from the action list.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub actions: Vec<Action>,
    pub duplicate: bool,
    pub usage_rows_written: u64,
}

/// Accept one agent report and run the full ingest pipeline (§4.1) inside
/// a single database transaction. Returns the actions to hand back to the
/// agent — empty for both a successfully-processed report with no status
/// changes and a duplicate `report_id`.
pub async fn process_metrics(
    db: &Database,
    config: &AppConfig,
    mut data: MetricsData,
) -> Result<IngestOutcome, IngestError> {
    data.node_id = data.node_id.trim().to_string();
    if data.node_id.is_empty() {
        return Err(IngestError::BlankNodeId);
    }
    data.report_id = data.report_id.trim().to_string();
    if data.report_id.is_empty() {
        return Err(IngestError::BlankReportId);
    }

    let report_ts: DateTime<Utc> = DateTime::parse_from_rfc3339(data.timestamp.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    let interval_seconds = config.normalize_interval_seconds(data.interval_seconds);
    let interval_minutes = (interval_seconds as f64 / 60.0).max(1.0 / 60.0);

    // Pre-validation: strip processes with empty username or pid <= 0,
    // truncate command to the configured max length.
    let users: Vec<UserProcess> = data
        .users
        .into_iter()
        .filter_map(|mut p| {
            p.username = p.username.trim().to_string();
            if p.username.is_empty() || p.pid <= 0 {
                return None;
            }
            if let Some(cmd) = &p.command {
                if cmd.len() > MAX_COMMAND_LEN {
                    p.command = Some(cmd.chars().take(MAX_COMMAND_LEN).collect());
                }
            }
            Some(p)
        })
        .collect();

    let now = Utc::now();
    let grace_seconds = config.kill_grace_period_seconds;

    // BEGIN IMMEDIATE takes SQLite's single write lock up front instead of
    // on the first write statement, so the read-then-write debit below
    // never races a concurrent ingest transaction's write (SQLite has no
    // row-level `SELECT ... FOR UPDATE`; this is the whole-database
    // equivalent).
    let mut tx = db
        .pool
        .begin_with("BEGIN IMMEDIATE")
        .await
        .context("Failed to begin ingest transaction")?;

    // Step 1: idempotency gate. The INSERT's primary-key constraint on
    // report_id is the linearization point (§5).
    let inserted = try_insert_report(&mut tx, &data.node_id, &data.report_id, report_ts, interval_seconds)
        .await?;
    if !inserted {
        tx.commit().await.context("Failed to commit duplicate-report no-op")?;
        return Ok(IngestOutcome {
            actions: Vec::new(),
            duplicate: true,
            usage_rows_written: 0,
        });
    }

    // Step 2: pricing snapshot, loaded inside the transaction.
    let price_rows = sqlx::query_as::<_, crate::db::models::PriceRow>(
        "SELECT gpu_model_prefix, price_per_minute, updated_at FROM prices",
    )
    .fetch_all(&mut *tx)
    .await
    .context("Failed to load price table")?;
    let prices = PriceIndex::build(price_rows);
    let cpu_price_per_core_minute = prices
        .cpu_core_price()
        .unwrap_or(config.default_cpu_price_per_core_minute);

    // Step 3/4/5: resolve identity, price, write usage records, aggregate.
    let mut resolver = IdentityResolver::new(&data.node_id);
    let mut agg: HashMap<String, BillingAgg> = HashMap::new();
    let mut usage_rows_written = 0u64;
    let mut gpu_process_count = 0i64;
    let mut cpu_process_count = 0i64;

    for proc in users {
        // Noise filter: no GPU usage and negligible CPU means no charge, no record.
        if proc.gpu_usage.is_empty() && proc.cpu_percent < 1.0 {
            continue;
        }

        let gpu_cost: f64 = proc
            .gpu_usage
            .iter()
            .map(|g| {
                prices
                    .match_gpu_price(&g.gpu_model)
                    .unwrap_or(config.default_gpu_price_per_minute)
            })
            .sum();
        let cpu_cost = (proc.cpu_percent / 100.0) * cpu_price_per_core_minute * interval_minutes;
        let cost = round4(gpu_cost + cpu_cost);

        let local_username = proc.username.clone();
        let billing_username = resolver.resolve(&mut tx, &local_username).await?;

        if !proc.gpu_usage.is_empty() {
            gpu_process_count += 1;
        } else {
            cpu_process_count += 1;
        }

        insert_usage_record(&mut tx, &data.node_id, &data.report_id, &billing_username, report_ts, &proc, cost)
            .await?;
        usage_rows_written += 1;

        let entry = agg.entry(billing_username).or_insert_with(|| BillingAgg {
            total_cost: 0.0,
            by_local: HashMap::new(),
        });
        entry.total_cost += cost;
        entry
            .by_local
            .entry(local_username)
            .or_default()
            .push(proc.pid);
    }

    // Step 7/8: debit each billing account once, plan actions per local
    // username under it. Ordering within a report: unblock/notify/block
    // first (via decide_actions), then set_cpu_quota, then kill_process —
    // decide_actions already emits them in that relative order per call.
    let cpu_control = config.enable_cpu_control.then_some(CpuControlConfig {
        limited_percent: config.cpu_limit_percent_limited,
        blocked_percent: config.cpu_limit_percent_blocked,
    });

    let mut actions = Vec::new();
    for (billing_username, entry) in agg.iter() {
        let (prev_status, user_after) =
            debit_user(&mut tx, billing_username, entry.total_cost, now, config).await?;

        for (local_username, pids) in &entry.by_local {
            actions.extend(planner::decide_actions(
                now,
                prev_status,
                &user_after,
                local_username,
                grace_seconds,
                pids,
                cpu_control,
            ));
        }
    }

    // Step 9: node heartbeat upsert.
    upsert_node_heartbeat(
        &mut tx,
        &data,
        report_ts,
        interval_seconds,
        usage_rows_written,
        gpu_process_count,
        cpu_process_count,
    )
    .await?;

    tx.commit().await.context("Failed to commit ingest transaction")?;

    Ok(IngestOutcome {
        actions,
        duplicate: false,
        usage_rows_written,
    })
}

/// Credit a billing account outside the report-ingest path (admin
/// recharge, §6 "Admin/user HTTP endpoints"). Reuses the same row-locked
/// debit routine with a negated amount so recharges and debits can never
/// observe or clobber each other's write.
pub async fn apply_recharge(
    db: &Database,
    config: &AppConfig,
    username: &str,
    amount: f64,
    note: Option<&str>,
) -> Result<UserAfterDebit> {
    let now = Utc::now();
    let mut tx = db
        .pool
        .begin_with("BEGIN IMMEDIATE")
        .await
        .context("Failed to begin recharge transaction")?;

    let (_, user_after) = debit_user(&mut tx, username, -amount, now, config)
        .await
        .map_err(anyhow::Error::from)?;

    sqlx::query("INSERT INTO recharge_records (id, username, amount, note) VALUES (?, ?, ?, ?)")
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(username)
        .bind(amount)
        .bind(note)
        .execute(&mut *tx)
        .await
        .context("Failed to record recharge")?;

    tx.commit().await.context("Failed to commit recharge transaction")?;
    Ok(user_after)
}

async fn try_insert_report(
    tx: &mut Transaction<'_, sqlx::Sqlite>,
    node_id: &str,
    report_id: &str,
    report_ts: DateTime<Utc>,
    interval_seconds: i64,
) -> Result<bool, IngestError> {
    let result = sqlx::query(
        "INSERT INTO reports (report_id, node_id, report_ts, interval_seconds) VALUES (?, ?, ?, ?) \
         ON CONFLICT (report_id) DO NOTHING",
    )
    .bind(report_id)
    .bind(node_id)
    .bind(report_ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    .bind(interval_seconds)
    .execute(&mut **tx)
    .await
    .context("Failed to insert idempotency row")?;

    Ok(result.rows_affected() == 1)
}

async fn insert_usage_record(
    tx: &mut Transaction<'_, sqlx::Sqlite>,
    node_id: &str,
    report_id: &str,
    billing_username: &str,
    ts: DateTime<Utc>,
    proc: &UserProcess,
    cost: f64,
) -> Result<(), IngestError> {
    let gpu_json =
        serde_json::to_string(&proc.gpu_usage).context("Failed to serialize gpu_usage")?;

    sqlx::query(
        "INSERT INTO usage_records (node_id, report_id, username, ts, pid, cpu_percent, memory_mb, gpu_count, command, gpu_usage, cost) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(node_id)
    .bind(report_id)
    .bind(billing_username)
    .bind(ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    .bind(proc.pid as i64)
    .bind(proc.cpu_percent)
    .bind(proc.memory_mb)
    .bind(proc.gpu_usage.len() as i64)
    .bind(&proc.command)
    .bind(gpu_json)
    .bind(cost)
    .execute(&mut **tx)
    .await
    .context("Failed to insert usage record")?;

    Ok(())
}

/// Ensure the billing account row exists, lock it, debit (skipped under
/// dry-run), recompute status, maintain `blocked_at`, write back. Returns
/// (prev_status, user-after-write).
async fn debit_user(
    tx: &mut Transaction<'_, sqlx::Sqlite>,
    username: &str,
    amount: f64,
    now: DateTime<Utc>,
    config: &AppConfig,
) -> Result<(Status, UserAfterDebit), IngestError> {
    sqlx::query("INSERT INTO users (username, balance, status) VALUES (?, ?, 'normal') ON CONFLICT (username) DO NOTHING")
        .bind(username)
        .bind(config.default_balance)
        .execute(&mut **tx)
        .await
        .context("Failed to lazily create billing account")?;

    // SQLite has no row-level SELECT ... FOR UPDATE; the surrounding write
    // transaction (opened in IMMEDIATE/default write mode by sqlx) already
    // serializes concurrent writers against this connection pool, so the
    // read-then-write below is equivalent in effect to the row lock called
    // for in §4.1 step 7.
    let row: (f64, String, Option<String>) =
        sqlx::query_as("SELECT balance, status, blocked_at FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&mut **tx)
            .await
            .context("Failed to read billing account row")?;

    let (balance, prev_status_str, blocked_at_str) = row;
    let prev_status = Status::parse(&prev_status_str);

    let new_balance = if config.dry_run { balance } else { balance - amount };
    let new_status = planner::status_for_balance(
        new_balance,
        config.warning_threshold,
        config.limited_threshold,
    );

    let prev_blocked_at = blocked_at_str
        .as_deref()
        .map(crate::db::models::parse_stored_ts);

    let new_blocked_at = if new_status == Status::Blocked {
        Some(prev_blocked_at.unwrap_or(now))
    } else {
        None
    };

    sqlx::query("UPDATE users SET balance = ?, status = ?, blocked_at = ? WHERE username = ?")
        .bind(new_balance)
        .bind(new_status.as_str())
        .bind(new_blocked_at.map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)))
        .bind(username)
        .execute(&mut **tx)
        .await
        .context("Failed to write back billing account")?;

    Ok((
        prev_status,
        UserAfterDebit {
            username: username.to_string(),
            balance: new_balance,
            status: new_status,
            blocked_at: new_blocked_at,
        },
    ))
}

/// Upsert the per-node heartbeat row. Monthly RX/TX counters reset when
/// `traffic_month` changes; deltas against the stored absolute counters
/// are only added when the new value is >= the previous one, so a counter
/// reset on the node (reboot, interface reset) is ignored rather than
/// read as a huge negative delta (§3).
async fn upsert_node_heartbeat(
    tx: &mut Transaction<'_, sqlx::Sqlite>,
    data: &MetricsData,
    report_ts: DateTime<Utc>,
    interval_seconds: i64,
    usage_rows_written: u64,
    gpu_process_count: i64,
    cpu_process_count: i64,
) -> Result<(), IngestError> {
    let current_month = report_ts.format("%Y-%m").to_string();
    let ts_str = report_ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    let existing: Option<(f64, f64, String, f64, f64)> = sqlx::query_as(
        "SELECT net_rx_total_mb, net_tx_total_mb, traffic_month, net_rx_month_mb, net_tx_month_mb FROM nodes WHERE node_id = ?",
    )
    .bind(&data.node_id)
    .fetch_optional(&mut **tx)
    .await
    .context("Failed to read node heartbeat row")?;

    let rx_mb = data.net_rx_bytes.map(|b| b as f64 / 1024.0 / 1024.0).unwrap_or(0.0);
    let tx_mb = data.net_tx_bytes.map(|b| b as f64 / 1024.0 / 1024.0).unwrap_or(0.0);

    let (net_rx_total_mb, net_tx_total_mb, traffic_month, net_rx_month_mb, net_tx_month_mb) =
        match existing {
            None => (rx_mb, tx_mb, current_month.clone(), rx_mb, tx_mb),
            Some((prev_rx, prev_tx, prev_month, prev_rx_month, prev_tx_month)) => {
                let rx_delta = if rx_mb >= prev_rx { rx_mb - prev_rx } else { 0.0 };
                let tx_delta = if tx_mb >= prev_tx { tx_mb - prev_tx } else { 0.0 };

                if prev_month == current_month {
                    (rx_mb, tx_mb, current_month.clone(), prev_rx_month + rx_delta, prev_tx_month + tx_delta)
                } else {
                    (rx_mb, tx_mb, current_month.clone(), rx_delta, tx_delta)
                }
            }
        };

    sqlx::query(
        "INSERT INTO nodes (node_id, last_seen_at, last_report_id, last_report_ts, interval_seconds, \
         cpu_model, cpu_count, gpu_model, gpu_count, net_rx_total_mb, net_tx_total_mb, \
         traffic_month, net_rx_month_mb, net_tx_month_mb, gpu_process_count, cpu_process_count, \
         usage_records_count, cost_total) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0) \
         ON CONFLICT (node_id) DO UPDATE SET \
         last_seen_at = excluded.last_seen_at, \
         last_report_id = excluded.last_report_id, \
         last_report_ts = excluded.last_report_ts, \
         interval_seconds = excluded.interval_seconds, \
         cpu_model = COALESCE(excluded.cpu_model, nodes.cpu_model), \
         cpu_count = COALESCE(excluded.cpu_count, nodes.cpu_count), \
         gpu_model = COALESCE(excluded.gpu_model, nodes.gpu_model), \
         gpu_count = COALESCE(excluded.gpu_count, nodes.gpu_count), \
         net_rx_total_mb = excluded.net_rx_total_mb, \
         net_tx_total_mb = excluded.net_tx_total_mb, \
         traffic_month = excluded.traffic_month, \
         net_rx_month_mb = excluded.net_rx_month_mb, \
         net_tx_month_mb = excluded.net_tx_month_mb, \
         gpu_process_count = excluded.gpu_process_count, \
         cpu_process_count = excluded.cpu_process_count, \
         usage_records_count = nodes.usage_records_count + excluded.usage_records_count",
    )
    .bind(&data.node_id)
    .bind(&ts_str)
    .bind(&data.report_id)
    .bind(&ts_str)
    .bind(interval_seconds)
    .bind(&data.cpu_model)
    .bind(data.cpu_count)
    .bind(&data.gpu_model)
    .bind(data.gpu_count)
    .bind(net_rx_total_mb)
    .bind(net_tx_total_mb)
    .bind(&traffic_month)
    .bind(net_rx_month_mb)
    .bind(net_tx_month_mb)
    .bind(gpu_process_count)
    .bind(cpu_process_count)
    .bind(usage_rows_written as i64)
    .execute(&mut **tx)
    .await
    .context("Failed to upsert node heartbeat")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpuops_common::GpuUsage;

    fn test_config() -> AppConfig {
        AppConfig {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: "sqlite::memory:".into(),
            agent_token: "secret".into(),
            admin_token: None,
            warning_threshold: 50.0,
            limited_threshold: 10.0,
            default_cpu_price_per_core_minute: 0.01,
            default_gpu_price_per_minute: 0.1,
            default_interval_seconds: 60,
            default_balance: 100.0,
            kill_grace_period_seconds: 600,
            dry_run: false,
            enable_cpu_control: true,
            cpu_limit_percent_limited: 50.0,
            cpu_limit_percent_blocked: 10.0,
            session_hours: 24,
            cookie_secure: true,
            bootstrap_admin_username: None,
            bootstrap_admin_password: None,
        }
    }

    fn sample_report(report_id: &str) -> MetricsData {
        MetricsData {
            node_id: "node-1".into(),
            timestamp: Utc::now().to_rfc3339(),
            report_id: report_id.into(),
            interval_seconds: Some(60),
            cpu_model: None,
            cpu_count: None,
            gpu_model: None,
            gpu_count: None,
            net_rx_bytes: None,
            net_tx_bytes: None,
            users: vec![UserProcess {
                username: "alice".into(),
                pid: 111,
                cpu_percent: 0.0,
                memory_mb: 256.0,
                gpu_usage: vec![GpuUsage {
                    gpu_id: 0,
                    gpu_model: "NVIDIA A100-SXM4-80GB".into(),
                    gpu_bus_id: None,
                    memory_mb: 1024.0,
                }],
                command: Some("python train.py".into()),
            }],
        }
    }

    #[tokio::test]
    async fn gpu_cost_matches_longest_prefix_with_fallback_for_unmatched() {
        let db = Database::test_db().await;
        sqlx::query("INSERT INTO prices (gpu_model_prefix, price_per_minute) VALUES ('A100', 0.5), ('RTX 3090', 0.2)")
            .execute(&db.pool)
            .await
            .unwrap();

        let config = test_config();
        let mut data = sample_report("r1");
        data.users[0].gpu_usage.push(GpuUsage {
            gpu_id: 1,
            gpu_model: "UnknownCard".into(),
            gpu_bus_id: None,
            memory_mb: 512.0,
        });

        process_metrics(&db, &config, data).await.unwrap();

        let (cost,): (f64,) = sqlx::query_as("SELECT cost FROM usage_records WHERE pid = 111")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(cost, 0.6);
    }

    #[tokio::test]
    async fn duplicate_report_id_is_a_no_op() {
        let db = Database::test_db().await;
        let config = test_config();

        let first = process_metrics(&db, &config, sample_report("dup-1")).await.unwrap();
        let second = process_metrics(&db, &config, sample_report("dup-1")).await.unwrap();

        assert!(second.actions.is_empty());
        assert!(second.duplicate);
        assert!(!first.duplicate);
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM usage_records")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn noise_filter_drops_process_with_no_gpu_and_low_cpu() {
        let db = Database::test_db().await;
        let config = test_config();
        let mut data = sample_report("r-noise");
        data.users[0].gpu_usage.clear();
        data.users[0].cpu_percent = 0.5;

        process_metrics(&db, &config, data).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM usage_records")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn identity_remap_debits_billing_account_and_addresses_local_user() {
        let db = Database::test_db().await;
        sqlx::query(
            "INSERT INTO node_user_mappings (node_id, local_username, billing_username) VALUES ('node-1', 'alice_local', 'alice_bill')",
        )
        .execute(&db.pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO prices (gpu_model_prefix, price_per_minute) VALUES ('A100', 0.5)")
            .execute(&db.pool)
            .await
            .unwrap();

        let config = test_config();
        let mut data = sample_report("r-remap");
        data.users[0].username = "alice_local".into();

        process_metrics(&db, &config, data).await.unwrap();

        let (username, balance): (String, f64) =
            sqlx::query_as("SELECT username, balance FROM users WHERE username = 'alice_bill'")
                .fetch_one(&db.pool)
                .await
                .unwrap();
        assert_eq!(username, "alice_bill");
        assert_eq!(balance, 99.5);

        let (recorded_username,): (String,) =
            sqlx::query_as("SELECT username FROM usage_records WHERE pid = 111")
                .fetch_one(&db.pool)
                .await
                .unwrap();
        assert_eq!(recorded_username, "alice_bill");
    }

    #[tokio::test]
    async fn de_escalation_emits_unblock_and_clear_cpu_quota() {
        let db = Database::test_db().await;
        sqlx::query(
            "INSERT INTO users (username, balance, status, blocked_at) VALUES ('alice', -5.0, 'blocked', datetime('now'))",
        )
        .execute(&db.pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO prices (gpu_model_prefix, price_per_minute) VALUES ('A100', -200.0)")
            .execute(&db.pool)
            .await
            .unwrap();

        let config = test_config();
        let actions = process_metrics(&db, &config, sample_report("r-deescalate"))
            .await
            .unwrap()
            .actions;

        assert!(actions.iter().any(|a| matches!(a, Action::UnblockUser { .. })));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SetCpuQuota { cpu_quota_percent, .. } if *cpu_quota_percent == 0.0
        )));
    }

    #[tokio::test]
    async fn dry_run_prices_without_debiting_balance() {
        let db = Database::test_db().await;
        sqlx::query("INSERT INTO prices (gpu_model_prefix, price_per_minute) VALUES ('A100', 0.5)")
            .execute(&db.pool)
            .await
            .unwrap();

        let mut config = test_config();
        config.dry_run = true;

        process_metrics(&db, &config, sample_report("r-dry")).await.unwrap();

        let (balance,): (f64,) =
            sqlx::query_as("SELECT balance FROM users WHERE username = 'alice'")
                .fetch_one(&db.pool)
                .await
                .unwrap();
        assert_eq!(balance, config.default_balance);
    }

    #[tokio::test]
    async fn blank_node_id_is_rejected() {
        let db = Database::test_db().await;
        let config = test_config();
        let mut data = sample_report("r-blank");
        data.node_id = "   ".into();

        let err = process_metrics(&db, &config, data).await.unwrap_err();
        assert!(matches!(err, IngestError::BlankNodeId));
    }
}
