use std::collections::HashMap;

use anyhow::{Context, Result};
use sqlx::Transaction;
use sqlx::Sqlite;

/// Per-report cache of (node_id, local_username) -> billing_username
/// resolutions. One lookup per distinct local user per report (§4.1 step
/// 3, §4.6): absence of a mapping row means the billing account is the
/// local username itself.
pub struct IdentityResolver<'a> {
    node_id: &'a str,
    cache: HashMap<String, String>,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(node_id: &'a str) -> Self {
        Self {
            node_id,
            cache: HashMap::new(),
        }
    }

    /// Resolve `local_username` to its billing account, querying the
    /// `node_user_mappings` table at most once per distinct local user for
    /// the lifetime of this resolver.
    pub async fn resolve(
        &mut self,
        tx: &mut Transaction<'_, Sqlite>,
        local_username: &str,
    ) -> Result<String> {
        if let Some(billing) = self.cache.get(local_username) {
            return Ok(billing.clone());
        }

        let row: Option<(String,)> = sqlx::query_as(
            "SELECT billing_username FROM node_user_mappings WHERE node_id = ? AND local_username = ?",
        )
        .bind(self.node_id)
        .bind(local_username)
        .fetch_optional(&mut **tx)
        .await
        .context("Failed to resolve node-user mapping")?;

        let billing = row
            .map(|(b,)| b)
            .unwrap_or_else(|| local_username.to_string());

        self.cache.insert(local_username.to_string(), billing.clone());
        Ok(billing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn unmapped_local_user_resolves_to_itself() {
        let db = Database::test_db().await;
        let mut tx = db.pool.begin().await.unwrap();
        let mut resolver = IdentityResolver::new("node-1");
        let billing = resolver.resolve(&mut tx, "alice").await.unwrap();
        assert_eq!(billing, "alice");
    }

    #[tokio::test]
    async fn mapped_local_user_resolves_to_billing_account() {
        let db = Database::test_db().await;
        sqlx::query(
            "INSERT INTO node_user_mappings (node_id, local_username, billing_username) VALUES ('node-1', 'alice_local', 'alice_bill')",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let mut tx = db.pool.begin().await.unwrap();
        let mut resolver = IdentityResolver::new("node-1");
        let billing = resolver.resolve(&mut tx, "alice_local").await.unwrap();
        assert_eq!(billing, "alice_bill");
    }

    #[tokio::test]
    async fn mapping_is_scoped_to_node() {
        let db = Database::test_db().await;
        sqlx::query(
            "INSERT INTO node_user_mappings (node_id, local_username, billing_username) VALUES ('node-1', 'alice', 'alice_bill')",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let mut tx = db.pool.begin().await.unwrap();
        let mut resolver = IdentityResolver::new("node-2");
        let billing = resolver.resolve(&mut tx, "alice").await.unwrap();
        assert_eq!(billing, "alice");
    }

    #[tokio::test]
    async fn second_lookup_of_same_user_uses_cache() {
        let db = Database::test_db().await;
        sqlx::query(
            "INSERT INTO node_user_mappings (node_id, local_username, billing_username) VALUES ('node-1', 'alice', 'alice_bill')",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let mut tx = db.pool.begin().await.unwrap();
        let mut resolver = IdentityResolver::new("node-1");
        assert_eq!(resolver.resolve(&mut tx, "alice").await.unwrap(), "alice_bill");

        // Delete the mapping row mid-transaction; the cached result must
        // still be returned without a second query.
        sqlx::query("DELETE FROM node_user_mappings WHERE node_id = 'node-1'")
            .execute(&mut *tx)
            .await
            .unwrap();
        assert_eq!(resolver.resolve(&mut tx, "alice").await.unwrap(), "alice_bill");
    }
}
