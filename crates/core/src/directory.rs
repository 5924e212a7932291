use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::user::{ProfileMetadata, UserId};

/// Slack's built-in bot user; never a community member.
pub const SLACKBOT_USER_ID: &str = "USLACKBOT";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackProfile {
    pub user_id: UserId,
    pub is_bot: bool,
    pub deleted: bool,
    pub metadata: ProfileMetadata,
}

impl SlackProfile {
    pub fn is_service_account(&self) -> bool {
        self.is_bot || self.user_id.as_str() == SLACKBOT_USER_ID
    }

    /// Whether this account may earn experience.
    pub fn is_member(&self) -> bool {
        !self.is_service_account() && !self.deleted
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProfileLookupError {
    #[error("profile lookup transport failure: {0}")]
    Transport(String),
    #[error("profile lookup rejected by slack: {0}")]
    Api(String),
}

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// `Ok(None)` means the platform does not know this user.
    async fn lookup(&self, user_id: &UserId) -> Result<Option<SlackProfile>, ProfileLookupError>;
}
