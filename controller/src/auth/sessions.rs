use anyhow::{bail, Context, Result};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::db::Database;

const SESSION_COOKIE_NAME: &str = "gpuops_admin_session";

/// An admin session, backed by the `sessions` table. The plaintext token
/// lives only in the cookie; the DB stores its hash plus a separate CSRF
/// token handed back to the client out-of-band (§6 "auth model").
pub struct AdminSession {
    pub admin_user_id: String,
    pub csrf_token: String,
}

fn random_hex(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Create a new session for an admin user. Returns the plaintext session
/// token (goes in the cookie) and the CSRF token (goes in the response
/// body, echoed back by the client as `X-CSRF-Token` on non-GET requests).
pub async fn create_session(
    db: &Database,
    admin_user_id: &str,
    ttl_hours: i64,
) -> Result<(String, String)> {
    let token = random_hex(32);
    let csrf_token = random_hex(16);
    let id = uuid::Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO sessions (id, admin_user_id, token_hash, csrf_token, expires_at) \
         VALUES (?, ?, ?, ?, datetime('now', '+' || ? || ' hours'))",
    )
    .bind(&id)
    .bind(admin_user_id)
    .bind(hash_token(&token))
    .bind(&csrf_token)
    .bind(ttl_hours)
    .execute(&db.pool)
    .await
    .context("Failed to create admin session")?;

    Ok((token, csrf_token))
}

/// Validate a session cookie token, returning the session row if live.
pub async fn validate_session(db: &Database, token: &str) -> Result<AdminSession> {
    let row: Option<(String, String)> = sqlx::query_as(
        "SELECT admin_user_id, csrf_token FROM sessions \
         WHERE token_hash = ? AND expires_at > datetime('now')",
    )
    .bind(hash_token(token))
    .fetch_optional(&db.pool)
    .await
    .context("Failed to query session")?;

    match row {
        Some((admin_user_id, csrf_token)) => Ok(AdminSession {
            admin_user_id,
            csrf_token,
        }),
        None => bail!("Invalid or expired session"),
    }
}

/// Delete a session (logout).
pub async fn delete_session(db: &Database, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(hash_token(token))
        .execute(&db.pool)
        .await
        .context("Failed to delete session")?;
    Ok(())
}

/// Delete sessions past their expiry. Run on an hourly timer from `main`.
pub async fn cleanup_expired(db: &Database) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at < datetime('now')")
        .execute(&db.pool)
        .await
        .context("Failed to clean up expired sessions")?;
    Ok(result.rows_affected())
}

pub fn cookie_name() -> &'static str {
    SESSION_COOKIE_NAME
}

pub fn build_cookie(token: &str, max_age_hours: i64, secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        SESSION_COOKIE_NAME,
        token,
        max_age_hours * 3600,
        secure_flag
    )
}

pub fn clear_cookie(secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}",
        SESSION_COOKIE_NAME, secure_flag
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_round_trips_and_expires_on_delete() {
        let db = Database::test_db().await;
        sqlx::query(
            "INSERT INTO admin_users (id, username, password_hash) VALUES ('u1', 'root', 'x')",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let (token, csrf) = create_session(&db, "u1", 24).await.unwrap();
        let session = validate_session(&db, &token).await.unwrap();
        assert_eq!(session.admin_user_id, "u1");
        assert_eq!(session.csrf_token, csrf);

        delete_session(&db, &token).await.unwrap();
        assert!(validate_session(&db, &token).await.is_err());
    }

    #[tokio::test]
    async fn garbage_token_does_not_validate() {
        let db = Database::test_db().await;
        assert!(validate_session(&db, "not-a-real-token").await.is_err());
    }
}
