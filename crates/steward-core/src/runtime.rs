//! The single orchestration entrypoint behind the command layer.

use crate::audit::AuditSink;
use crate::directory::GroupDirectory;
use crate::error::{StewardError, StewardResult};
use crate::ledger::{CreditLedger, GrantStore, StoreHandles};
use crate::membership::MembershipLocator;
use crate::policy::{can_use, AccessPolicy};
use crate::roles::RoleCache;
use crate::sync::RoleSynchronizer;
use crate::types::{Command, CommandReply, CommandRequest};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Immutable engine configuration, injected at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Static owner identities; always resolve to the owners tier.
    pub owner_ids: BTreeSet<i64>,
    /// Page size used for membership listing and sweeps.
    pub page_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            owner_ids: BTreeSet::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn with_owners(owner_ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            owner_ids: owner_ids.into_iter().collect(),
            ..Self::default()
        }
    }
}

/// Steward command engine.
///
/// Every dispatch resolves the caller's tier and passes the permission
/// gate before anything side-effecting runs. Replies carry typed data;
/// rendering and visibility policy stay with the command layer.
pub struct StewardEngine {
    policy: AccessPolicy,
    ledger: Arc<dyn CreditLedger>,
    grants: Arc<dyn GrantStore>,
    cache: Arc<RoleCache>,
    locator: MembershipLocator,
    sync: RoleSynchronizer,
}

impl StewardEngine {
    pub fn new(
        config: EngineConfig,
        stores: StoreHandles,
        directory: Arc<dyn GroupDirectory>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let cache = Arc::new(RoleCache::new(directory.clone()));
        let locator = MembershipLocator::new(directory.clone(), config.page_size);
        let sync = RoleSynchronizer::new(directory, cache.clone(), locator.clone(), audit);
        Self {
            policy: AccessPolicy::new(config.owner_ids),
            ledger: stores.ledger,
            grants: stores.grants,
            cache,
            locator,
            sync,
        }
    }

    /// The synchronizer, for sweep-progress visibility.
    pub fn synchronizer(&self) -> &RoleSynchronizer {
        &self.sync
    }

    /// Handle one command dispatch from the command layer.
    pub async fn handle(&self, request: CommandRequest) -> StewardResult<CommandReply> {
        let tier = self
            .policy
            .resolve_tier(self.grants.as_ref(), request.caller)
            .await?;
        let kind = request.command.kind();
        if !can_use(tier, kind) {
            tracing::debug!(caller = request.caller, command = ?kind, "command denied");
            return Err(StewardError::PermissionDenied);
        }

        match request.command {
            Command::Credits { target } => {
                let user_id = target.unwrap_or(request.caller);
                let credits = self.ledger.get(user_id).await?;
                Ok(CommandReply::Balance { user_id, credits })
            }
            Command::CreditsLeaderboard => {
                let entries = self.ledger.leaderboard().await?;
                Ok(CommandReply::Leaderboard { entries })
            }
            Command::AddCredits { target, amount } => {
                let user_id = target.unwrap_or(request.caller);
                let credits = self.ledger.add(user_id, amount).await?;
                Ok(CommandReply::NewBalance { user_id, credits })
            }
            Command::SubCredits { target, amount } => {
                let user_id = target.unwrap_or(request.caller);
                let credits = self.ledger.subtract(user_id, amount).await?;
                Ok(CommandReply::NewBalance { user_id, credits })
            }
            Command::SetCredits { target, amount } => {
                let credits = self.ledger.set(target, amount).await?;
                Ok(CommandReply::NewBalance {
                    user_id: target,
                    credits,
                })
            }
            Command::WipeCredits { confirm } => {
                if !confirm {
                    return Err(StewardError::invalid(
                        "wiping every balance requires confirmation",
                    ));
                }
                self.ledger.wipe_all().await?;
                tracing::info!(caller = request.caller, "all balances wiped");
                Ok(CommandReply::Wiped)
            }
            Command::Whitelist { target, role } => {
                self.grants.grant(target, role).await?;
                Ok(CommandReply::Granted {
                    user_id: target,
                    role,
                })
            }
            Command::Unwhitelist { target } => {
                let removed = self.grants.revoke_all(target).await?;
                Ok(CommandReply::Revoked {
                    user_id: target,
                    removed,
                })
            }
            Command::RankRoles { refresh } => {
                self.cache.load(refresh).await?;
                Ok(CommandReply::Roles {
                    roles: self.cache.roles().await,
                })
            }
            Command::RankInspect { identifier } => {
                self.cache.load(false).await?;
                let user_id = self
                    .locator
                    .resolve_user_id(&identifier)
                    .await
                    .ok_or_else(|| StewardError::NotInGroup(identifier.clone()))?;
                let membership = self
                    .locator
                    .find_membership(user_id)
                    .await?
                    .ok_or_else(|| StewardError::NotInGroup(identifier))?;
                let role_label = self
                    .cache
                    .lookup(membership.role_id)
                    .await
                    .map(|(name, _)| name)
                    .unwrap_or_else(|| "unknown".to_string());
                Ok(CommandReply::MemberRank {
                    user_id,
                    membership_id: membership.id,
                    role_id: membership.role_id,
                    role_label,
                })
            }
            Command::SetRank {
                identifier,
                role_id,
            } => {
                let change = self.sync.assign_rank(&identifier, role_id).await?;
                Ok(CommandReply::RankChanged(change))
            }
            Command::ClearRank { identifier } => {
                let change = self.sync.clear_rank(&identifier).await?;
                Ok(CommandReply::RankChanged(change))
            }
            Command::BulkResetRanks { target_role_id } => {
                let report = self.sync.bulk_reset_all(target_role_id).await?;
                Ok(CommandReply::SweepFinished(report))
            }
        }
    }
}
