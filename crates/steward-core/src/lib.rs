//! Steward core: credit ledger, access tiers, and external rank
//! synchronization behind a single command entrypoint.
//!
//! The chat platform's command layer dispatches typed commands into
//! [`runtime::StewardEngine`]; everything user-facing (message text,
//! visibility) stays outside this crate. Balances and stored role
//! grants live in PostgreSQL (or the in-memory reference store), the
//! external group service is reached through the [`directory`] seam.

#![deny(unsafe_code)]

pub mod audit;
pub mod directory;
pub mod error;
pub mod ledger;
pub mod membership;
pub mod memory;
pub mod policy;
pub mod roles;
pub mod runtime;
pub mod storage;
pub mod sync;
pub mod types;

pub use audit::{AuditSink, NullAuditSink, RecordingAuditSink, TracingAuditSink};
pub use directory::{GroupDirectory, InMemoryDirectory};
pub use error::{StewardError, StewardResult};
pub use ledger::{CreditLedger, GrantStore, StoreConfig, StoreHandles};
pub use membership::{MembershipLocator, MembershipPages};
pub use memory::MemoryStore;
pub use policy::{can_use, AccessPolicy};
pub use roles::{RoleCache, GUEST_ROLE_NAME};
pub use runtime::{EngineConfig, StewardEngine, DEFAULT_PAGE_SIZE};
pub use storage::PostgresStore;
pub use sync::RoleSynchronizer;
pub use types::{
    parse_user_reference, AccessTier, Command, CommandKind, CommandReply, CommandRequest,
    GroupRole, LeaderboardEntry, Membership, MembershipPage, RankChange, StoredRole, SweepReport,
};
