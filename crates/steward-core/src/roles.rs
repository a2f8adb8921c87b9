//! Process-wide cache of the external group's role catalog.

use crate::directory::GroupDirectory;
use crate::error::{StewardError, StewardResult};
use crate::types::GroupRole;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Name the external service gives its built-in non-member role.
/// Entries carrying it (or rank 0) are never assignable.
pub const GUEST_ROLE_NAME: &str = "Guest";

#[derive(Debug, Clone)]
struct Catalog {
    roles: Vec<GroupRole>,
    lowest_assignable: Option<GroupRole>,
}

/// Lazily-populated, explicitly-invalidated role catalog cache.
///
/// Two states: empty until the first successful load, then loaded for
/// the process lifetime unless a forced reload replaces the snapshot.
/// A failed fetch leaves the previous snapshot untouched. Concurrent
/// forced reloads race; the last successful load wins.
pub struct RoleCache {
    directory: Arc<dyn GroupDirectory>,
    state: RwLock<Option<Catalog>>,
}

impl RoleCache {
    pub fn new(directory: Arc<dyn GroupDirectory>) -> Self {
        Self {
            directory,
            state: RwLock::new(None),
        }
    }

    /// Populate the cache, refetching only when forced or still empty.
    pub async fn load(&self, force: bool) -> StewardResult<()> {
        if !force && self.state.read().await.is_some() {
            return Ok(());
        }

        let roles = self
            .directory
            .list_roles()
            .await
            .map_err(|e| StewardError::UpstreamUnavailable(e.to_string()))?;
        let lowest_assignable = lowest_assignable(&roles);
        tracing::info!(
            roles = roles.len(),
            lowest = lowest_assignable.as_ref().map(|role| role.rank),
            forced = force,
            "role catalog loaded"
        );
        *self.state.write().await = Some(Catalog {
            roles,
            lowest_assignable,
        });
        Ok(())
    }

    pub async fn is_loaded(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// Pure lookup against the last successful load; never fetches.
    pub async fn lookup(&self, role_id: u64) -> Option<(String, u32)> {
        let state = self.state.read().await;
        state.as_ref().and_then(|catalog| {
            catalog
                .roles
                .iter()
                .find(|role| role.id == role_id)
                .map(|role| (role.name.clone(), role.rank))
        })
    }

    /// The minimum-rank assignable role from the last successful load.
    pub async fn lowest_assignable(&self) -> Option<GroupRole> {
        let state = self.state.read().await;
        state
            .as_ref()
            .and_then(|catalog| catalog.lowest_assignable.clone())
    }

    /// The full catalog from the last successful load, rank ascending.
    pub async fn roles(&self) -> Vec<GroupRole> {
        let state = self.state.read().await;
        let mut roles = state
            .as_ref()
            .map(|catalog| catalog.roles.clone())
            .unwrap_or_default();
        roles.sort_by_key(|role| role.rank);
        roles
    }
}

fn is_assignable(role: &GroupRole) -> bool {
    role.rank > 0 && !role.name.eq_ignore_ascii_case(GUEST_ROLE_NAME)
}

fn lowest_assignable(roles: &[GroupRole]) -> Option<GroupRole> {
    roles
        .iter()
        .filter(|role| is_assignable(role))
        .min_by_key(|role| role.rank)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;

    fn directory_with_catalog() -> Arc<InMemoryDirectory> {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.push_role(1, "Guest", 0);
        directory.push_role(2, "Member", 1);
        directory.push_role(3, "Officer", 5);
        directory
    }

    #[tokio::test]
    async fn lowest_assignable_excludes_guest_and_rank_zero() {
        let cache = RoleCache::new(directory_with_catalog());
        cache.load(false).await.unwrap();

        let lowest = cache.lowest_assignable().await.unwrap();
        assert_eq!(lowest.id, 2);
        assert_eq!(lowest.rank, 1);
    }

    #[tokio::test]
    async fn guest_named_roles_are_excluded_at_any_rank() {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.push_role(1, "guest", 3);
        directory.push_role(2, "Recruit", 4);
        let cache = RoleCache::new(directory);
        cache.load(false).await.unwrap();
        assert_eq!(cache.lowest_assignable().await.unwrap().id, 2);
    }

    #[tokio::test]
    async fn unforced_load_reuses_the_snapshot() {
        let directory = directory_with_catalog();
        let cache = RoleCache::new(directory.clone());
        cache.load(false).await.unwrap();

        directory.push_role(4, "General", 200);
        cache.load(false).await.unwrap();
        assert_eq!(cache.roles().await.len(), 3);

        cache.load(true).await.unwrap();
        assert_eq!(cache.roles().await.len(), 4);
    }

    #[tokio::test]
    async fn failed_reload_keeps_the_previous_snapshot() {
        let directory = directory_with_catalog();
        let cache = RoleCache::new(directory.clone());
        cache.load(false).await.unwrap();

        directory.set_roles_unavailable(true);
        let err = cache.load(true).await.unwrap_err();
        assert!(matches!(err, StewardError::UpstreamUnavailable(_)));

        // Prior contents survive the failed fetch.
        assert!(cache.is_loaded().await);
        assert_eq!(cache.lookup(3).await, Some(("Officer".to_string(), 5)));
    }

    #[tokio::test]
    async fn lookup_never_fetches_on_an_empty_cache() {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.set_roles_unavailable(true);
        let cache = RoleCache::new(directory);
        assert_eq!(cache.lookup(2).await, None);
        assert!(!cache.is_loaded().await);
    }
}
