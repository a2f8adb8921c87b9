//! Applying rank changes to the external group, one membership or all
//! of them.

use crate::audit::AuditSink;
use crate::directory::GroupDirectory;
use crate::error::{StewardError, StewardResult};
use crate::membership::MembershipLocator;
use crate::roles::RoleCache;
use crate::types::{RankChange, SweepReport};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

const UNKNOWN_ROLE_LABEL: &str = "unknown";

/// Live counters for a running sweep, readable from other tasks.
#[derive(Debug, Default)]
struct SweepProgress {
    scanned: AtomicU64,
    changed: AtomicU64,
    failed: AtomicU64,
}

impl SweepProgress {
    fn reset(&self) {
        self.scanned.store(0, Ordering::SeqCst);
        self.changed.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
    }

    fn snapshot(&self) -> SweepReport {
        SweepReport {
            scanned: self.scanned.load(Ordering::SeqCst),
            changed: self.changed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            abort_reason: None,
        }
    }
}

/// Drives single and bulk role reassignment against the group service.
pub struct RoleSynchronizer {
    directory: Arc<dyn GroupDirectory>,
    cache: Arc<RoleCache>,
    locator: MembershipLocator,
    audit: Arc<dyn AuditSink>,
    sweep_active: AtomicBool,
    progress: SweepProgress,
}

impl RoleSynchronizer {
    pub fn new(
        directory: Arc<dyn GroupDirectory>,
        cache: Arc<RoleCache>,
        locator: MembershipLocator,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            directory,
            cache,
            locator,
            audit,
            sweep_active: AtomicBool::new(false),
            progress: SweepProgress::default(),
        }
    }

    /// Single-attempt role update. No local retry; upstream failures
    /// bubble to the caller with whatever diagnostics the service gave.
    pub async fn set_role(&self, membership_id: &str, role_id: u64) -> StewardResult<()> {
        self.directory
            .update_membership_role(membership_id, role_id)
            .await
    }

    /// Resolve, locate, reassign, and report one member's rank change.
    ///
    /// Re-ranking a member who already holds a non-lowest role is
    /// allowed and reported as a change.
    pub async fn assign_rank(&self, identifier: &str, role_id: u64) -> StewardResult<RankChange> {
        self.cache.load(false).await?;

        let user_id = self
            .locator
            .resolve_user_id(identifier)
            .await
            .ok_or_else(|| StewardError::NotInGroup(identifier.to_string()))?;
        let membership = self
            .locator
            .find_membership(user_id)
            .await?
            .ok_or_else(|| StewardError::NotInGroup(identifier.to_string()))?;

        let prior = self.cache.lookup(membership.role_id).await;
        self.set_role(&membership.id, role_id).await?;

        let new_label = self
            .cache
            .lookup(role_id)
            .await
            .map(|(name, _)| name)
            .unwrap_or_else(|| UNKNOWN_ROLE_LABEL.to_string());

        let lowest = self.cache.lowest_assignable().await;
        let change = if lowest.map(|role| role.id) == Some(membership.role_id) {
            RankChange::NewlyRanked {
                user_id,
                role: new_label,
            }
        } else {
            RankChange::Changed {
                user_id,
                from: prior
                    .map(|(name, _)| name)
                    .unwrap_or_else(|| UNKNOWN_ROLE_LABEL.to_string()),
                to: new_label,
            }
        };
        self.audit.record(&change.audit_line());
        Ok(change)
    }

    /// Drop a member back to the lowest assignable role.
    pub async fn clear_rank(&self, identifier: &str) -> StewardResult<RankChange> {
        self.cache.load(false).await?;
        let lowest = self
            .cache
            .lowest_assignable()
            .await
            .ok_or(StewardError::NoAssignableRole)?;
        self.assign_rank(identifier, lowest.id).await
    }

    /// Reconcile every membership to the target role.
    ///
    /// Continue-on-error: one member's failure never aborts the sweep.
    /// Only a page fetch failure does, and even then the report carries
    /// the counts accumulated so far plus the abort reason.
    pub async fn bulk_reset_all(&self, target_role_id: u64) -> StewardResult<SweepReport> {
        self.sweep_active.store(true, Ordering::SeqCst);
        self.progress.reset();

        let mut pages = self.locator.pages();
        let mut report = SweepReport::default();

        loop {
            match pages.next_page().await {
                Ok(Some(memberships)) => {
                    for membership in memberships {
                        report.scanned += 1;
                        self.progress.scanned.fetch_add(1, Ordering::SeqCst);

                        if membership.role_id == target_role_id {
                            continue;
                        }
                        match self.set_role(&membership.id, target_role_id).await {
                            Ok(()) => {
                                report.changed += 1;
                                self.progress.changed.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(err) => {
                                report.failed += 1;
                                self.progress.failed.fetch_add(1, Ordering::SeqCst);
                                tracing::warn!(
                                    membership = %membership.id,
                                    user = membership.user_id,
                                    error = %err,
                                    "bulk reset: member update failed"
                                );
                            }
                        }
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    report.abort_reason = Some(err.to_string());
                    break;
                }
            }
        }

        self.audit.record(&sweep_audit_line(target_role_id, &report));
        tracing::info!(
            target_role = target_role_id,
            scanned = report.scanned,
            changed = report.changed,
            failed = report.failed,
            aborted = report.abort_reason.is_some(),
            "bulk reset finished"
        );
        self.sweep_active.store(false, Ordering::SeqCst);
        Ok(report)
    }

    /// Whether a bulk sweep is currently running.
    pub fn sweep_in_progress(&self) -> bool {
        self.sweep_active.load(Ordering::SeqCst)
    }

    /// Counters of the running (or most recent) sweep.
    pub fn sweep_counts(&self) -> SweepReport {
        self.progress.snapshot()
    }
}

fn sweep_audit_line(target_role_id: u64, report: &SweepReport) -> String {
    match &report.abort_reason {
        Some(reason) => format!(
            "bulk reset to role {target_role_id} aborted after scanning {} (changed {}, failed {}): {reason}",
            report.scanned, report.changed, report.failed
        ),
        None => format!(
            "bulk reset to role {target_role_id}: scanned {}, changed {}, failed {}",
            report.scanned, report.changed, report.failed
        ),
    }
}
