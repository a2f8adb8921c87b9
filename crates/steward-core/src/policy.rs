//! Access-tier resolution and the fixed command-permission matrix.
//!
//! This logic is intentionally rule-based: the same caller state always
//! yields the same tier, and the matrix is evaluated in one place so no
//! call site re-derives it.

use crate::error::StewardResult;
use crate::ledger::GrantStore;
use crate::types::{AccessTier, CommandKind, StoredRole};
use std::collections::BTreeSet;

/// Caller-identity configuration, injected at construction.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    owner_ids: BTreeSet<i64>,
}

impl AccessPolicy {
    pub fn new(owner_ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            owner_ids: owner_ids.into_iter().collect(),
        }
    }

    /// Static owner-set membership. Checked before any store read.
    pub fn is_owner(&self, user_id: i64) -> bool {
        self.owner_ids.contains(&user_id)
    }

    /// Highest-precedence tier among the stored grants.
    ///
    /// Multiple simultaneous grants are legal; precedence resolves them.
    pub fn tier_from_grants(grants: &BTreeSet<StoredRole>) -> AccessTier {
        if grants.contains(&StoredRole::Owners) {
            AccessTier::Owners
        } else if grants.contains(&StoredRole::TagManager) {
            AccessTier::TagManager
        } else if grants.contains(&StoredRole::Manager) {
            AccessTier::Manager
        } else if grants.contains(&StoredRole::Staff) {
            AccessTier::Staff
        } else {
            AccessTier::None
        }
    }

    /// Resolve the caller's tier: static owners short-circuit without a
    /// store lookup, everyone else is derived from stored grants.
    pub async fn resolve_tier(
        &self,
        grants: &dyn GrantStore,
        user_id: i64,
    ) -> StewardResult<AccessTier> {
        if self.is_owner(user_id) {
            return Ok(AccessTier::Owners);
        }
        let granted = grants.grants_for(user_id).await?;
        Ok(Self::tier_from_grants(&granted))
    }
}

/// The fixed (tier, command) permission matrix.
pub fn can_use(tier: AccessTier, command: CommandKind) -> bool {
    // Balance queries are open to everyone, whatever their tier.
    if matches!(
        command,
        CommandKind::Credits | CommandKind::CreditsLeaderboard
    ) {
        return true;
    }

    match tier {
        AccessTier::Owners => true,
        // Tag managers hold the manager row plus rank management.
        AccessTier::TagManager => !matches!(
            command,
            CommandKind::Whitelist | CommandKind::Unwhitelist | CommandKind::WipeCredits
        ),
        AccessTier::Manager => {
            !command.is_rank_management()
                && !matches!(
                    command,
                    CommandKind::Whitelist | CommandKind::Unwhitelist | CommandKind::WipeCredits
                )
        }
        AccessTier::Staff => {
            !command.is_rank_management()
                && !matches!(
                    command,
                    CommandKind::SetCredits
                        | CommandKind::Whitelist
                        | CommandKind::Unwhitelist
                        | CommandKind::WipeCredits
                )
        }
        AccessTier::None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StewardError;
    use async_trait::async_trait;

    /// Grant store that fails every read; proves the owner short-circuit
    /// never touches the store.
    struct UnreachableGrants;

    #[async_trait]
    impl GrantStore for UnreachableGrants {
        async fn grant(&self, _user_id: i64, _role: StoredRole) -> StewardResult<()> {
            Err(StewardError::Storage("unreachable".to_string()))
        }

        async fn revoke_all(&self, _user_id: i64) -> StewardResult<u64> {
            Err(StewardError::Storage("unreachable".to_string()))
        }

        async fn grants_for(&self, _user_id: i64) -> StewardResult<BTreeSet<StoredRole>> {
            Err(StewardError::Storage("unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn static_owner_resolves_without_store_read() {
        let policy = AccessPolicy::new([99]);
        let tier = policy.resolve_tier(&UnreachableGrants, 99).await.unwrap();
        assert_eq!(tier, AccessTier::Owners);

        // Everyone else does hit the store.
        assert!(policy.resolve_tier(&UnreachableGrants, 100).await.is_err());
    }

    #[test]
    fn grant_precedence_picks_highest_role() {
        let grants: BTreeSet<StoredRole> = [StoredRole::Staff, StoredRole::Manager].into();
        assert_eq!(AccessPolicy::tier_from_grants(&grants), AccessTier::Manager);

        let grants: BTreeSet<StoredRole> =
            [StoredRole::Staff, StoredRole::TagManager, StoredRole::Manager].into();
        assert_eq!(
            AccessPolicy::tier_from_grants(&grants),
            AccessTier::TagManager
        );

        assert_eq!(
            AccessPolicy::tier_from_grants(&BTreeSet::new()),
            AccessTier::None
        );
    }

    #[test]
    fn everyone_may_query_balances() {
        for tier in [
            AccessTier::None,
            AccessTier::Staff,
            AccessTier::Manager,
            AccessTier::TagManager,
            AccessTier::Owners,
        ] {
            assert!(can_use(tier, CommandKind::Credits));
            assert!(can_use(tier, CommandKind::CreditsLeaderboard));
        }
    }

    #[test]
    fn staff_row_of_the_matrix() {
        assert!(can_use(AccessTier::Staff, CommandKind::AddCredits));
        assert!(can_use(AccessTier::Staff, CommandKind::SubCredits));
        assert!(!can_use(AccessTier::Staff, CommandKind::SetCredits));
        assert!(!can_use(AccessTier::Staff, CommandKind::Whitelist));
        assert!(!can_use(AccessTier::Staff, CommandKind::SetRank));
    }

    #[test]
    fn manager_row_of_the_matrix() {
        assert!(can_use(AccessTier::Manager, CommandKind::SetCredits));
        assert!(!can_use(AccessTier::Manager, CommandKind::Whitelist));
        assert!(!can_use(AccessTier::Manager, CommandKind::Unwhitelist));
        assert!(!can_use(AccessTier::Manager, CommandKind::WipeCredits));
        assert!(!can_use(AccessTier::Manager, CommandKind::BulkResetRanks));
    }

    #[test]
    fn rank_management_is_owners_and_tag_managers_only() {
        for command in [
            CommandKind::RankRoles,
            CommandKind::RankInspect,
            CommandKind::SetRank,
            CommandKind::ClearRank,
            CommandKind::BulkResetRanks,
        ] {
            assert!(can_use(AccessTier::Owners, command));
            assert!(can_use(AccessTier::TagManager, command));
            assert!(!can_use(AccessTier::Manager, command));
            assert!(!can_use(AccessTier::Staff, command));
            assert!(!can_use(AccessTier::None, command));
        }
        // The tag-manager tier still carries the manager restrictions.
        assert!(!can_use(AccessTier::TagManager, CommandKind::Whitelist));
        assert!(!can_use(AccessTier::TagManager, CommandKind::WipeCredits));
    }

    #[test]
    fn none_tier_gets_only_the_open_commands() {
        for command in [
            CommandKind::AddCredits,
            CommandKind::SubCredits,
            CommandKind::SetCredits,
            CommandKind::WipeCredits,
            CommandKind::Whitelist,
            CommandKind::Unwhitelist,
            CommandKind::RankRoles,
            CommandKind::RankInspect,
            CommandKind::SetRank,
            CommandKind::ClearRank,
            CommandKind::BulkResetRanks,
        ] {
            assert!(!can_use(AccessTier::None, command));
        }
    }
}
