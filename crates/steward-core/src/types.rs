use serde::{Deserialize, Serialize};

/// Derived caller access tier, ordered from least to most privileged.
///
/// Never persisted; recomputed per request from the static owner set and
/// the stored grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    None,
    Staff,
    Manager,
    TagManager,
    Owners,
}

/// Role names that may be granted in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredRole {
    Staff,
    Manager,
    TagManager,
    Owners,
}

impl StoredRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::Manager => "manager",
            Self::TagManager => "tag_manager",
            Self::Owners => "owners",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "staff" => Some(Self::Staff),
            "manager" => Some(Self::Manager),
            "tag_manager" => Some(Self::TagManager),
            "owners" => Some(Self::Owners),
            _ => None,
        }
    }
}

/// One role from the external group's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRole {
    pub id: u64,
    pub name: String,
    pub rank: u32,
}

/// One membership record in the external group.
///
/// Always fetched fresh from the service; never persisted locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: String,
    pub user_id: u64,
    pub role_id: u64,
}

/// One page of the external membership listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipPage {
    pub memberships: Vec<Membership>,
    /// Opaque continuation token; absent on the final page.
    pub next_page_token: Option<String>,
}

/// One leaderboard row, ordered (credits DESC, user_id ASC) by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: i64,
    pub credits: i64,
}

/// Outcome of a single rank assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RankChange {
    /// The member previously held the lowest assignable role.
    NewlyRanked { user_id: u64, role: String },
    /// The member moved between two non-trivial roles.
    Changed {
        user_id: u64,
        from: String,
        to: String,
    },
}

impl RankChange {
    /// Audit-log wording for this change.
    pub fn audit_line(&self) -> String {
        match self {
            Self::NewlyRanked { user_id, role } => {
                format!("user {user_id} newly ranked to {role}")
            }
            Self::Changed { user_id, from, to } => {
                format!("user {user_id} rank changed from {from} to {to}")
            }
        }
    }
}

/// Accounting for a bulk reset sweep.
///
/// Partial failure is a normal outcome here: the sweep completes with a
/// nonzero `failed` count rather than failing outright. `abort_reason`
/// is set only when a page fetch itself failed mid-sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub scanned: u64,
    pub changed: u64,
    pub failed: u64,
    pub abort_reason: Option<String>,
}

/// Strip the chat platform's `<@id>` / `<@!id>` wrappers from a raw
/// user reference, leaving the inner token untouched otherwise.
pub fn strip_user_wrapper(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed
        .strip_prefix("<@!")
        .or_else(|| trimmed.strip_prefix("<@"))
    {
        Some(inner) => inner.strip_suffix('>').unwrap_or(inner),
        None => trimmed,
    }
}

/// Parse a chat-layer user reference (`123`, `<@123>`, `<@!123>`).
pub fn parse_user_reference(raw: &str) -> Option<i64> {
    let token = strip_user_wrapper(raw);
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// Command names used by the permission matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Credits,
    CreditsLeaderboard,
    AddCredits,
    SubCredits,
    SetCredits,
    WipeCredits,
    Whitelist,
    Unwhitelist,
    RankRoles,
    RankInspect,
    SetRank,
    ClearRank,
    BulkResetRanks,
}

impl CommandKind {
    /// Commands that touch the external group's ranks.
    pub fn is_rank_management(self) -> bool {
        matches!(
            self,
            Self::RankRoles
                | Self::RankInspect
                | Self::SetRank
                | Self::ClearRank
                | Self::BulkResetRanks
        )
    }
}

/// Typed command entering the engine, one variant per chat command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum Command {
    Credits { target: Option<i64> },
    CreditsLeaderboard,
    AddCredits { target: Option<i64>, amount: i64 },
    SubCredits { target: Option<i64>, amount: i64 },
    SetCredits { target: i64, amount: i64 },
    WipeCredits { confirm: bool },
    Whitelist { target: i64, role: StoredRole },
    Unwhitelist { target: i64 },
    RankRoles { refresh: bool },
    RankInspect { identifier: String },
    SetRank { identifier: String, role_id: u64 },
    ClearRank { identifier: String },
    BulkResetRanks { target_role_id: u64 },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Credits { .. } => CommandKind::Credits,
            Self::CreditsLeaderboard => CommandKind::CreditsLeaderboard,
            Self::AddCredits { .. } => CommandKind::AddCredits,
            Self::SubCredits { .. } => CommandKind::SubCredits,
            Self::SetCredits { .. } => CommandKind::SetCredits,
            Self::WipeCredits { .. } => CommandKind::WipeCredits,
            Self::Whitelist { .. } => CommandKind::Whitelist,
            Self::Unwhitelist { .. } => CommandKind::Unwhitelist,
            Self::RankRoles { .. } => CommandKind::RankRoles,
            Self::RankInspect { .. } => CommandKind::RankInspect,
            Self::SetRank { .. } => CommandKind::SetRank,
            Self::ClearRank { .. } => CommandKind::ClearRank,
            Self::BulkResetRanks { .. } => CommandKind::BulkResetRanks,
        }
    }
}

/// One dispatch from the command layer: who is calling, and what.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub caller: i64,
    #[serde(flatten)]
    pub command: Command,
}

impl CommandRequest {
    pub fn new(caller: i64, command: Command) -> Self {
        Self { caller, command }
    }
}

/// Typed result data returned to the command layer.
///
/// Message formatting and visibility policy belong to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reply")]
pub enum CommandReply {
    Balance { user_id: i64, credits: i64 },
    Leaderboard { entries: Vec<LeaderboardEntry> },
    NewBalance { user_id: i64, credits: i64 },
    Wiped,
    Granted { user_id: i64, role: StoredRole },
    Revoked { user_id: i64, removed: u64 },
    Roles { roles: Vec<GroupRole> },
    MemberRank {
        user_id: u64,
        membership_id: String,
        role_id: u64,
        role_label: String,
    },
    RankChanged(RankChange),
    SweepFinished(SweepReport),
}
