//! User ledger seam.
//!
//! The ledger is the durable store of experience and level state. The batch
//! consumer is its only writer for experience; implementations must make
//! `apply_delta` atomic per user id so concurrent writers never lose a delta.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::user::{ProfileMetadata, User, UserId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger persistence failure: {0}")]
    Persistence(String),
    #[error("ledger write for `{user_id}` kept conflicting after {attempts} attempts")]
    Contention { user_id: UserId, attempts: u32 },
}

/// Result of merging one experience delta into a user record.
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerUpdate {
    pub user: User,
    pub leveled_up: bool,
}

#[async_trait]
pub trait UserLedger: Send + Sync {
    async fn find(&self, id: &UserId) -> Result<Option<User>, LedgerError>;

    /// Copies profile metadata onto the record, creating it on first sight.
    async fn sync_profile(
        &self,
        id: &UserId,
        profile: &ProfileMetadata,
    ) -> Result<User, LedgerError>;

    /// Adds `delta` to the user's experience and applies the leveling rule.
    /// Creates the record when it does not exist yet.
    async fn apply_delta(&self, id: &UserId, delta: i64) -> Result<LedgerUpdate, LedgerError>;

    /// Users ordered by experience, highest first.
    async fn leaderboard(&self, limit: u32) -> Result<Vec<User>, LedgerError>;
}
