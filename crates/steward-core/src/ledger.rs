//! Store contracts for credit balances and stored role grants.
//!
//! Two backends satisfy these traits: [`crate::memory::MemoryStore`], a
//! deterministic reference implementation, and
//! [`crate::storage::PostgresStore`], the transactional source of truth.
//! Both enforce the same contract: `subtract` clamps at zero inside a
//! single atomic step, never as a separate read-then-write.

use crate::error::{StewardError, StewardResult};
use crate::memory::MemoryStore;
use crate::storage::PostgresStore;
use crate::types::{LeaderboardEntry, StoredRole};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Per-user credit balance operations.
///
/// A missing row reads as zero everywhere; rows are created on first
/// write and removed only by [`CreditLedger::wipe_all`].
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Current balance, zero when the user has no row.
    async fn get(&self, user_id: i64) -> StewardResult<i64>;

    /// Upsert an exact balance. Rejects negative amounts.
    async fn set(&self, user_id: i64, amount: i64) -> StewardResult<i64>;

    /// Atomically add a positive delta, creating the row when absent.
    async fn add(&self, user_id: i64, delta: i64) -> StewardResult<i64>;

    /// Atomically subtract a positive delta, clamping the result at zero.
    async fn subtract(&self, user_id: i64, delta: i64) -> StewardResult<i64>;

    /// All users with credits > 0, ordered (credits DESC, user_id ASC).
    async fn leaderboard(&self) -> StewardResult<Vec<LeaderboardEntry>>;

    /// Remove every balance row. Irreversible.
    async fn wipe_all(&self) -> StewardResult<()>;
}

/// Stored role-grant operations backing the access resolver.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Idempotent grant; duplicates are ignored.
    async fn grant(&self, user_id: i64, role: StoredRole) -> StewardResult<()>;

    /// Remove all grants for the user, returning how many were removed.
    async fn revoke_all(&self, user_id: i64) -> StewardResult<u64>;

    /// The set of roles currently granted to the user.
    async fn grants_for(&self, user_id: i64) -> StewardResult<BTreeSet<StoredRole>>;
}

pub(crate) fn require_non_negative(amount: i64) -> StewardResult<()> {
    if amount < 0 {
        return Err(StewardError::invalid("amount cannot be negative"));
    }
    Ok(())
}

pub(crate) fn require_positive(delta: i64) -> StewardResult<()> {
    if delta <= 0 {
        return Err(StewardError::invalid("amount must be greater than 0"));
    }
    Ok(())
}

/// Store backend configuration.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    /// Keep balances and grants in process memory only.
    Memory,
    /// Persist balances and grants in PostgreSQL.
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }

    /// Connect the configured backend and hand out its trait objects.
    pub async fn bootstrap(self) -> StewardResult<StoreHandles> {
        match self {
            Self::Memory => {
                let store = Arc::new(MemoryStore::new());
                Ok(StoreHandles {
                    ledger: store.clone(),
                    grants: store,
                })
            }
            Self::Postgres {
                database_url,
                max_connections,
            } => {
                let store = Arc::new(PostgresStore::connect(&database_url, max_connections).await?);
                Ok(StoreHandles {
                    ledger: store.clone(),
                    grants: store,
                })
            }
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Bootstrapped store trait objects, shared across the engine.
#[derive(Clone)]
pub struct StoreHandles {
    pub ledger: Arc<dyn CreditLedger>,
    pub grants: Arc<dyn GrantStore>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_labels() {
        assert_eq!(StoreConfig::memory().label(), "memory");
        assert_eq!(
            StoreConfig::postgres("postgres://localhost/steward", 5).label(),
            "postgres"
        );
    }

    #[tokio::test]
    async fn memory_bootstrap_shares_one_backend() {
        let handles = StoreConfig::memory().bootstrap().await.unwrap();
        handles.grants.grant(7, StoredRole::Staff).await.unwrap();
        let grants = handles.grants.grants_for(7).await.unwrap();
        assert!(grants.contains(&StoredRole::Staff));
        assert_eq!(handles.ledger.get(7).await.unwrap(), 0);
    }
}
