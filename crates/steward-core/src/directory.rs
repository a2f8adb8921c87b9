//! The group-directory seam: everything the core needs from the
//! external group-management service.
//!
//! Production deployments plug in the HTTP adapter crate; tests and
//! offline runs use [`InMemoryDirectory`].

use crate::error::{StewardError, StewardResult};
use crate::types::{GroupRole, Membership, MembershipPage};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Pluggable view of the external group service.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// The full role catalog of the configured group.
    async fn list_roles(&self) -> StewardResult<Vec<GroupRole>>;

    /// One page of the membership listing, optionally filtered to a
    /// single user. The continuation token is opaque to callers.
    async fn memberships_page(
        &self,
        filter_user: Option<u64>,
        page_size: u32,
        page_token: Option<&str>,
    ) -> StewardResult<MembershipPage>;

    /// Idempotent role reassignment for one membership.
    async fn update_membership_role(&self, membership_id: &str, role_id: u64)
        -> StewardResult<()>;

    /// Display-name to user-id resolution; `None` when unknown.
    async fn resolve_username(&self, username: &str) -> StewardResult<Option<u64>>;
}

#[derive(Default)]
struct DirectoryState {
    roles: Vec<GroupRole>,
    members: Vec<Membership>,
    usernames: HashMap<String, u64>,
    roles_unavailable: bool,
    failing_updates: BTreeSet<String>,
    fail_page_fetch_after: Option<u64>,
    pages_served: u64,
}

/// Deterministic in-memory directory with injectable failures.
///
/// Updates mutate the stored memberships, so a sweep observes its own
/// writes the way the real service would.
#[derive(Default)]
pub struct InMemoryDirectory {
    inner: Mutex<DirectoryState>,
    update_calls: AtomicU64,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_role(&self, id: u64, name: &str, rank: u32) {
        self.lock().roles.push(GroupRole {
            id,
            name: name.to_string(),
            rank,
        });
    }

    pub fn push_member(&self, membership_id: &str, user_id: u64, role_id: u64) {
        self.lock().members.push(Membership {
            id: membership_id.to_string(),
            user_id,
            role_id,
        });
    }

    pub fn set_username(&self, username: &str, user_id: u64) {
        self.lock().usernames.insert(username.to_string(), user_id);
    }

    pub fn set_roles_unavailable(&self, unavailable: bool) {
        self.lock().roles_unavailable = unavailable;
    }

    /// Make every update for this membership fail with an upstream error.
    pub fn fail_update(&self, membership_id: &str) {
        self.lock()
            .failing_updates
            .insert(membership_id.to_string());
    }

    /// Fail every unfiltered page fetch after `pages` successful pages.
    pub fn fail_page_fetch_after(&self, pages: u64) {
        let mut state = self.lock();
        state.fail_page_fetch_after = Some(pages);
        state.pages_served = 0;
    }

    /// Number of role-update calls issued so far.
    pub fn update_calls(&self) -> u64 {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn member_role(&self, membership_id: &str) -> Option<u64> {
        self.lock()
            .members
            .iter()
            .find(|member| member.id == membership_id)
            .map(|member| member.role_id)
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryState> {
        // A poisoned test fixture has no sensible recovery.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl GroupDirectory for InMemoryDirectory {
    async fn list_roles(&self) -> StewardResult<Vec<GroupRole>> {
        let state = self.lock();
        if state.roles_unavailable {
            return Err(StewardError::UpstreamUnavailable(
                "role catalog unreachable".to_string(),
            ));
        }
        Ok(state.roles.clone())
    }

    async fn memberships_page(
        &self,
        filter_user: Option<u64>,
        page_size: u32,
        page_token: Option<&str>,
    ) -> StewardResult<MembershipPage> {
        let mut state = self.lock();

        if let Some(user_id) = filter_user {
            let memberships = state
                .members
                .iter()
                .filter(|member| member.user_id == user_id)
                .cloned()
                .collect();
            return Ok(MembershipPage {
                memberships,
                next_page_token: None,
            });
        }

        if let Some(after) = state.fail_page_fetch_after {
            if state.pages_served >= after {
                return Err(StewardError::Upstream {
                    status: 503,
                    body: "injected page failure".to_string(),
                });
            }
        }
        state.pages_served += 1;

        let offset: usize = match page_token {
            Some(token) => token.parse().map_err(|_| {
                StewardError::Upstream {
                    status: 400,
                    body: format!("bad page token '{token}'"),
                }
            })?,
            None => 0,
        };
        let size = page_size.max(1) as usize;
        let end = (offset + size).min(state.members.len());
        let memberships = state.members[offset.min(end)..end].to_vec();
        let next_page_token = if end < state.members.len() {
            Some(end.to_string())
        } else {
            None
        };
        Ok(MembershipPage {
            memberships,
            next_page_token,
        })
    }

    async fn update_membership_role(
        &self,
        membership_id: &str,
        role_id: u64,
    ) -> StewardResult<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if state.failing_updates.contains(membership_id) {
            return Err(StewardError::Upstream {
                status: 500,
                body: format!("injected update failure for {membership_id}"),
            });
        }
        match state
            .members
            .iter_mut()
            .find(|member| member.id == membership_id)
        {
            Some(member) => {
                member.role_id = role_id;
                Ok(())
            }
            None => Err(StewardError::Upstream {
                status: 404,
                body: format!("membership {membership_id} not found"),
            }),
        }
    }

    async fn resolve_username(&self, username: &str) -> StewardResult<Option<u64>> {
        Ok(self.lock().usernames.get(username).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unfiltered_listing_pages_through_all_members() {
        let directory = InMemoryDirectory::new();
        for n in 0..5 {
            directory.push_member(&format!("m{n}"), n, 1);
        }

        let first = directory.memberships_page(None, 2, None).await.unwrap();
        assert_eq!(first.memberships.len(), 2);
        let token = first.next_page_token.unwrap();

        let second = directory
            .memberships_page(None, 2, Some(&token))
            .await
            .unwrap();
        assert_eq!(second.memberships.len(), 2);

        let token = second.next_page_token.unwrap();
        let last = directory
            .memberships_page(None, 2, Some(&token))
            .await
            .unwrap();
        assert_eq!(last.memberships.len(), 1);
        assert!(last.next_page_token.is_none());
    }

    #[tokio::test]
    async fn filtered_listing_returns_only_the_user() {
        let directory = InMemoryDirectory::new();
        directory.push_member("m1", 10, 1);
        directory.push_member("m2", 11, 2);

        let page = directory
            .memberships_page(Some(11), 50, None)
            .await
            .unwrap();
        assert_eq!(page.memberships.len(), 1);
        assert_eq!(page.memberships[0].id, "m2");
    }

    #[tokio::test]
    async fn updates_are_visible_to_later_reads() {
        let directory = InMemoryDirectory::new();
        directory.push_member("m1", 10, 1);
        directory.update_membership_role("m1", 9).await.unwrap();
        assert_eq!(directory.member_role("m1"), Some(9));
        assert_eq!(directory.update_calls(), 1);
    }
}
