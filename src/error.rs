//! Error taxonomy for coordinator operations.

use thiserror::Error;

use crate::api::RemoteError;

pub type Result<T> = std::result::Result<T, Error>;

/// Which side of a copy relationship an account lookup was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountSide {
    Lead,
    Follower,
}

impl std::fmt::Display for AccountSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountSide::Lead => f.write_str("lead"),
            AccountSide::Follower => f.write_str("follower"),
        }
    }
}

/// Failures surfaced by coordinator operations.
///
/// Local validation failures are returned before any remote call is made.
/// `Remote` carries how many loop steps completed before the provider
/// failed; those steps are not rolled back.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{side} account {account_id} not found")]
    AccountNotFound { side: AccountSide, account_id: String },

    #[error("lead and follower are the same account")]
    SelfCopy,

    #[error("account {lead_account_id} already leads group {group_id}; add followers to that group instead")]
    DuplicateLead { lead_account_id: String, group_id: String },

    #[error("copy group {group_id} not found")]
    GroupNotFound { group_id: String },

    #[error("group {group_id} has no membership for account {follower_account_id}")]
    MembershipNotFound { group_id: String, follower_account_id: String },

    #[error("account {account_id} still copies in group {group_id}")]
    StillCopied { account_id: String, group_id: String },

    #[error("account {account_id} already follows group {group_id}")]
    AlreadyFollowing { account_id: String, group_id: String },

    #[error("group {group_id} was modified concurrently")]
    ConcurrencyConflict { group_id: String },

    #[error("remote provider error ({completed} steps completed): {error}")]
    Remote { error: RemoteError, completed: usize },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored record could not be decoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a provider failure that struck after `completed` loop steps.
    pub fn remote(error: RemoteError, completed: usize) -> Self {
        Error::Remote { error, completed }
    }
}
