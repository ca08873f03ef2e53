use anyhow::{Context, Result};
use uuid::Uuid;

use crate::auth::tokens::hash_password;
use crate::config::AppConfig;
use crate::db::Database;

/// Create the first admin account from `ADMIN_BOOTSTRAP_USER` /
/// `ADMIN_BOOTSTRAP_PASSWORD` if the `admin_users` table is still empty.
/// A no-op once any admin account exists, so it is safe to call on every
/// startup. Without these set, the operator has no way in except directly
/// against the database — acceptable for a single-writer internal tool.
pub async fn ensure_bootstrap_admin(config: &AppConfig, db: &Database) -> Result<()> {
    let (username, password) = match (
        &config.bootstrap_admin_username,
        &config.bootstrap_admin_password,
    ) {
        (Some(u), Some(p)) => (u, p),
        _ => return Ok(()),
    };

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM admin_users")
        .fetch_one(&db.pool)
        .await
        .context("Failed to count admin_users")?;

    if count > 0 {
        return Ok(());
    }

    let id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO admin_users (id, username, password_hash) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(username)
        .bind(hash_password(password))
        .execute(&db.pool)
        .await
        .context("Failed to create bootstrap admin user")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(user: Option<&str>, pass: Option<&str>) -> AppConfig {
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
            default_balance: 10.0,
            kill_grace_period_seconds: 600,
            dry_run: false,
            enable_cpu_control: true,
            cpu_limit_percent_limited: 50.0,
            cpu_limit_percent_blocked: 10.0,
            session_hours: 24,
            cookie_secure: true,
            bootstrap_admin_username: user.map(String::from),
            bootstrap_admin_password: pass.map(String::from),
        }
    }

    #[tokio::test]
    async fn creates_admin_when_table_empty_and_creds_configured() {
        let db = Database::test_db().await;
        let config = config_with(Some("root"), Some("hunter2"));
        ensure_bootstrap_admin(&config, &db).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM admin_users")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn no_op_without_configured_creds() {
        let db = Database::test_db().await;
        let config = config_with(None, None);
        ensure_bootstrap_admin(&config, &db).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM admin_users")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn no_op_when_admin_already_exists() {
        let db = Database::test_db().await;
        sqlx::query(
            "INSERT INTO admin_users (id, username, password_hash) VALUES ('existing', 'alice', 'x')",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let config = config_with(Some("root"), Some("hunter2"));
        ensure_bootstrap_admin(&config, &db).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM admin_users")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
