use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::user::{ChannelId, UserId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    Channel(ChannelId),
    DirectMessage(UserId),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(channel) => write!(f, "channel:{channel}"),
            Self::DirectMessage(user) => write!(f, "dm:{user}"),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification transport failure: {0}")]
    Transport(String),
    #[error("notification rejected by slack: {0}")]
    Api(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, destination: &Destination, message: &str) -> Result<(), NotifyError>;
}

#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _destination: &Destination, _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}
