//! PostgreSQL adapter for the store traits.
//!
//! The clamp in `subtract` runs inside the upsert statement itself
//! (`GREATEST(credits - delta, 0)`), so concurrent mutations for the
//! same user serialize at the row and can never observe or produce a
//! negative balance.

use crate::error::{StewardError, StewardResult};
use crate::ledger::{require_non_negative, require_positive, CreditLedger, GrantStore};
use crate::types::{LeaderboardEntry, StoredRole};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::collections::BTreeSet;

/// PostgreSQL-backed store for balances and role grants.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and initialize the required schema.
    pub async fn connect(database_url: &str, max_connections: u32) -> StewardResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| StewardError::Storage(format!("postgres connect failed: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create the adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StewardResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StewardResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS steward_credits (
                user_id BIGINT PRIMARY KEY,
                credits BIGINT NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS steward_role_grants (
                user_id BIGINT NOT NULL,
                role TEXT NOT NULL,
                PRIMARY KEY (user_id, role)
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StewardError::Storage(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl CreditLedger for PostgresStore {
    async fn get(&self, user_id: i64) -> StewardResult<i64> {
        let row = sqlx::query("SELECT credits FROM steward_credits WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StewardError::Storage(e.to_string()))?;

        match row {
            Some(row) => row
                .try_get("credits")
                .map_err(|e| StewardError::Storage(e.to_string())),
            None => Ok(0),
        }
    }

    async fn set(&self, user_id: i64, amount: i64) -> StewardResult<i64> {
        require_non_negative(amount)?;
        let row = sqlx::query(
            r#"
            INSERT INTO steward_credits (user_id, credits)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET credits = EXCLUDED.credits
            RETURNING credits
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StewardError::Storage(e.to_string()))?;

        row.try_get("credits")
            .map_err(|e| StewardError::Storage(e.to_string()))
    }

    async fn add(&self, user_id: i64, delta: i64) -> StewardResult<i64> {
        require_positive(delta)?;
        let row = sqlx::query(
            r#"
            INSERT INTO steward_credits (user_id, credits)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET credits = steward_credits.credits + EXCLUDED.credits
            RETURNING credits
            "#,
        )
        .bind(user_id)
        .bind(delta)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StewardError::Storage(e.to_string()))?;

        row.try_get("credits")
            .map_err(|e| StewardError::Storage(e.to_string()))
    }

    async fn subtract(&self, user_id: i64, delta: i64) -> StewardResult<i64> {
        require_positive(delta)?;
        let row = sqlx::query(
            r#"
            INSERT INTO steward_credits (user_id, credits)
            VALUES ($1, 0)
            ON CONFLICT (user_id) DO UPDATE
            SET credits = GREATEST(steward_credits.credits - $2, 0)
            RETURNING credits
            "#,
        )
        .bind(user_id)
        .bind(delta)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StewardError::Storage(e.to_string()))?;

        row.try_get("credits")
            .map_err(|e| StewardError::Storage(e.to_string()))
    }

    async fn leaderboard(&self) -> StewardResult<Vec<LeaderboardEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, credits
            FROM steward_credits
            WHERE credits > 0
            ORDER BY credits DESC, user_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StewardError::Storage(e.to_string()))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(LeaderboardEntry {
                user_id: row
                    .try_get("user_id")
                    .map_err(|e| StewardError::Storage(e.to_string()))?,
                credits: row
                    .try_get("credits")
                    .map_err(|e| StewardError::Storage(e.to_string()))?,
            });
        }
        Ok(entries)
    }

    async fn wipe_all(&self) -> StewardResult<()> {
        sqlx::query("DELETE FROM steward_credits")
            .execute(&self.pool)
            .await
            .map_err(|e| StewardError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl GrantStore for PostgresStore {
    async fn grant(&self, user_id: i64, role: StoredRole) -> StewardResult<()> {
        sqlx::query(
            r#"
            INSERT INTO steward_role_grants (user_id, role)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StewardError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn revoke_all(&self, user_id: i64) -> StewardResult<u64> {
        let result = sqlx::query("DELETE FROM steward_role_grants WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StewardError::Storage(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn grants_for(&self, user_id: i64) -> StewardResult<BTreeSet<StoredRole>> {
        let rows = sqlx::query("SELECT role FROM steward_role_grants WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StewardError::Storage(e.to_string()))?;

        let mut grants = BTreeSet::new();
        for row in rows {
            let raw: String = row
                .try_get("role")
                .map_err(|e| StewardError::Storage(e.to_string()))?;
            let role = StoredRole::parse(&raw).ok_or_else(|| {
                StewardError::Storage(format!("unknown stored role '{raw}' in postgres"))
            })?;
            grants.insert(role);
        }
        Ok(grants)
    }
}
