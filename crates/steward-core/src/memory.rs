//! In-memory reference implementation of the store traits.
//!
//! Deterministic and test-friendly. Every operation takes the single
//! state lock once, so add/subtract keep the same atomic-clamp contract
//! the PostgreSQL backend enforces in one statement. Production
//! deployments should use [`crate::storage::PostgresStore`].

use crate::error::{StewardError, StewardResult};
use crate::ledger::{require_non_negative, require_positive, CreditLedger, GrantStore};
use crate::types::{LeaderboardEntry, StoredRole};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct MemoryState {
    credits: BTreeMap<i64, i64>,
    grants: BTreeMap<i64, BTreeSet<StoredRole>>,
}

/// In-memory store for balances and role grants.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StewardResult<MutexGuard<'_, MemoryState>> {
        self.inner
            .lock()
            .map_err(|_| StewardError::Storage("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CreditLedger for MemoryStore {
    async fn get(&self, user_id: i64) -> StewardResult<i64> {
        let state = self.lock()?;
        Ok(state.credits.get(&user_id).copied().unwrap_or(0))
    }

    async fn set(&self, user_id: i64, amount: i64) -> StewardResult<i64> {
        require_non_negative(amount)?;
        let mut state = self.lock()?;
        state.credits.insert(user_id, amount);
        Ok(amount)
    }

    async fn add(&self, user_id: i64, delta: i64) -> StewardResult<i64> {
        require_positive(delta)?;
        let mut state = self.lock()?;
        let entry = state.credits.entry(user_id).or_insert(0);
        *entry = entry.saturating_add(delta);
        Ok(*entry)
    }

    async fn subtract(&self, user_id: i64, delta: i64) -> StewardResult<i64> {
        require_positive(delta)?;
        let mut state = self.lock()?;
        let entry = state.credits.entry(user_id).or_insert(0);
        *entry = (*entry - delta).max(0);
        Ok(*entry)
    }

    async fn leaderboard(&self) -> StewardResult<Vec<LeaderboardEntry>> {
        let state = self.lock()?;
        let mut entries: Vec<LeaderboardEntry> = state
            .credits
            .iter()
            .filter(|(_, credits)| **credits > 0)
            .map(|(user_id, credits)| LeaderboardEntry {
                user_id: *user_id,
                credits: *credits,
            })
            .collect();
        entries.sort_by(|a, b| b.credits.cmp(&a.credits).then(a.user_id.cmp(&b.user_id)));
        Ok(entries)
    }

    async fn wipe_all(&self) -> StewardResult<()> {
        let mut state = self.lock()?;
        state.credits.clear();
        Ok(())
    }
}

#[async_trait]
impl GrantStore for MemoryStore {
    async fn grant(&self, user_id: i64, role: StoredRole) -> StewardResult<()> {
        let mut state = self.lock()?;
        state.grants.entry(user_id).or_default().insert(role);
        Ok(())
    }

    async fn revoke_all(&self, user_id: i64) -> StewardResult<u64> {
        let mut state = self.lock()?;
        let removed = state
            .grants
            .remove(&user_id)
            .map(|roles| roles.len() as u64)
            .unwrap_or(0);
        Ok(removed)
    }

    async fn grants_for(&self, user_id: i64) -> StewardResult<BTreeSet<StoredRole>> {
        let state = self.lock()?;
        Ok(state.grants.get(&user_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn missing_row_reads_as_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.get(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn subtract_clamps_at_each_step_not_at_the_end() {
        let store = MemoryStore::new();
        assert_eq!(store.add(1, 10).await.unwrap(), 10);
        assert_eq!(store.subtract(1, 15).await.unwrap(), 0);
        assert_eq!(store.add(1, 3).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn subtract_creates_the_row_at_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.subtract(1, 5).await.unwrap(), 0);
        assert_eq!(store.get(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn set_rejects_negative_and_add_rejects_non_positive() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.set(1, -1).await,
            Err(StewardError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.add(1, 0).await,
            Err(StewardError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.subtract(1, -3).await,
            Err(StewardError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn leaderboard_skips_zero_and_orders_ties_by_user_id() {
        let store = MemoryStore::new();
        store.set(3, 500).await.unwrap();
        store.set(1, 500).await.unwrap();
        store.set(2, 900).await.unwrap();
        store.set(4, 0).await.unwrap();

        let entries = store.leaderboard().await.unwrap();
        let order: Vec<(i64, i64)> = entries
            .iter()
            .map(|entry| (entry.user_id, entry.credits))
            .collect();
        assert_eq!(order, vec![(2, 900), (1, 500), (3, 500)]);
    }

    #[tokio::test]
    async fn wipe_removes_every_row() {
        let store = MemoryStore::new();
        store.set(1, 10).await.unwrap();
        store.set(2, 20).await.unwrap();
        store.wipe_all().await.unwrap();
        assert_eq!(store.get(1).await.unwrap(), 0);
        assert!(store.leaderboard().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_grants_are_ignored() {
        let store = MemoryStore::new();
        store.grant(1, StoredRole::Staff).await.unwrap();
        store.grant(1, StoredRole::Staff).await.unwrap();
        store.grant(1, StoredRole::Manager).await.unwrap();
        assert_eq!(store.grants_for(1).await.unwrap().len(), 2);
        assert_eq!(store.revoke_all(1).await.unwrap(), 2);
        assert!(store.grants_for(1).await.unwrap().is_empty());
    }

    proptest! {
        /// The balance after any add/subtract sequence equals the running
        /// clamp-at-each-step fold of the same sequence.
        #[test]
        fn balance_matches_running_clamp(ops in proptest::collection::vec(
            (any::<bool>(), 1_i64..1_000),
            0..32,
        )) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            runtime.block_on(async {
                let store = MemoryStore::new();
                let mut expected = 0_i64;
                for (is_add, delta) in ops {
                    let got = if is_add {
                        expected += delta;
                        store.add(7, delta).await.unwrap()
                    } else {
                        expected = (expected - delta).max(0);
                        store.subtract(7, delta).await.unwrap()
                    };
                    prop_assert_eq!(got, expected);
                    prop_assert!(got >= 0);
                }
                Ok(())
            })?;
        }
    }
}
