use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use wexu_core::domain::user::UserId;
use wexu_core::errors::ApplicationError;
use wexu_core::ledger::{LedgerError, UserLedger};

use crate::blocks::{self, MessageTemplate};

/// Number of members listed by `$top`.
pub const LEADERBOARD_SIZE: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommunityCommand {
    Profile,
    Top,
    Register,
    Drop,
}

impl CommunityCommand {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Profile => "$profile",
            Self::Top => "$top",
            Self::Register => "$register",
            Self::Drop => "$drop",
        }
    }
}

/// A message is a command only when its whole text is the keyword.
pub fn parse_command(text: &str) -> Option<CommunityCommand> {
    match text.trim() {
        "$profile" => Some(CommunityCommand::Profile),
        "$top" => Some(CommunityCommand::Top),
        "$register" => Some(CommunityCommand::Register),
        "$drop" => Some(CommunityCommand::Drop),
        _ => None,
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl CommandRouteError {
    /// Reply shown in chat; details stay in the logs.
    pub fn reply(&self, correlation_id: &str) -> MessageTemplate {
        let interface = match self {
            Self::Ledger(error) => {
                ApplicationError::from(error.clone()).into_interface(correlation_id)
            }
        };
        blocks::error_message(interface.user_message(), interface.correlation_id())
    }
}

pub struct CommandRouter {
    ledger: Arc<dyn UserLedger>,
}

impl CommandRouter {
    pub fn new(ledger: Arc<dyn UserLedger>) -> Self {
        Self { ledger }
    }

    pub async fn route(
        &self,
        command: CommunityCommand,
        user_id: &UserId,
    ) -> Result<MessageTemplate, CommandRouteError> {
        debug!(
            event_name = "slack.command.received",
            command = command.keyword(),
            user_id = %user_id,
            "routing community command"
        );

        match command {
            CommunityCommand::Profile => match self.ledger.find(user_id).await? {
                Some(user) => Ok(blocks::profile_message(&user)),
                None => Ok(blocks::no_experience_message()),
            },
            CommunityCommand::Top => {
                let users = self.ledger.leaderboard(LEADERBOARD_SIZE).await?;
                Ok(blocks::leaderboard_message(&users))
            }
            CommunityCommand::Register | CommunityCommand::Drop => {
                warn!(
                    event_name = "slack.command.unavailable",
                    command = command.keyword(),
                    user_id = %user_id,
                    "command recognized but not served by this bot"
                );
                Ok(blocks::command_unavailable_message(command.keyword()))
            }
        }
    }
}
