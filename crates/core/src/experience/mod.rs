//! Experience pipeline
//!
//! Chat activity is turned into experience deltas by the reward policy
//! (`rewards`), buffered in the in-memory `queue`, and periodically merged into
//! the user ledger by the batch consumer (`drain`), which applies the
//! `leveling` rule and announces level-ups.
//!
//! ```text
//! chat signal → RewardPolicy → ExperienceQueue → DrainJob (timer) → UserLedger
//!                                                      ↓
//!                                            Notifier (level-up)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::{ChannelId, UserId};

pub mod drain;
pub mod leveling;
pub mod queue;
pub mod rewards;

pub use drain::{DrainJob, DrainReport, DrainSettings};
pub use leveling::{LevelOutcome, LevelingRule};
pub use queue::{DrainGuard, ExperienceQueue};
pub use rewards::{ChatSignal, RewardPolicy};

/// Which chat signal produced an entry. Carried for logging only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardSource {
    Message,
    ReactionAdded,
    ReactionRemoved,
}

impl RewardSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::ReactionAdded => "reaction_added",
            Self::ReactionRemoved => "reaction_removed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpDelta {
    pub user_id: UserId,
    pub delta: i64,
    pub channel_id: Option<ChannelId>,
    pub enqueued_at: DateTime<Utc>,
    pub source: RewardSource,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueEntry {
    UserExpDelta(ExpDelta),
}

impl QueueEntry {
    pub fn user_id(&self) -> &UserId {
        match self {
            Self::UserExpDelta(delta) => &delta.user_id,
        }
    }
}

impl From<ExpDelta> for QueueEntry {
    fn from(value: ExpDelta) -> Self {
        Self::UserExpDelta(value)
    }
}
