use thiserror::Error;

/// Result type for steward operations.
pub type StewardResult<T> = Result<T, StewardError>;

/// Steward runtime errors.
///
/// Everything here is recovered at the command boundary into a
/// user-visible message; nothing in the core panics on these paths.
#[derive(Debug, Error)]
pub enum StewardError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The display string intentionally carries no tier information.
    #[error("you do not have permission to use this command")]
    PermissionDenied,

    #[error("user '{0}' is not a member of the group")]
    NotInGroup(String),

    #[error("the group has no assignable role")]
    NoAssignableRole,

    #[error("group service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("group service responded with status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl StewardError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
