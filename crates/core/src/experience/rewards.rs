use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::{ChannelId, UserId};
use crate::experience::{ExpDelta, RewardSource};

/// Inbound chat activity, already authenticated and decoded by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatSignal {
    Message { author: UserId, from_bot: bool, channel_id: ChannelId, text: String },
    ReactionAdded { actor: UserId, item_owner: Option<UserId> },
    ReactionRemoved { actor: UserId, item_owner: Option<UserId> },
}

/// How much experience each kind of chat activity is worth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardPolicy {
    pub message_base: i64,
    pub long_message_bonus: i64,
    /// Messages strictly longer than this many characters earn the bonus.
    pub long_message_chars: usize,
    pub reaction_added: i64,
    pub reaction_removed_penalty: i64,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            message_base: 1,
            long_message_bonus: 1,
            long_message_chars: 50,
            reaction_added: 1,
            reaction_removed_penalty: -1,
        }
    }
}

impl RewardPolicy {
    pub fn message_delta(&self, text: &str) -> i64 {
        if text.chars().count() > self.long_message_chars {
            self.message_base.saturating_add(self.long_message_bonus)
        } else {
            self.message_base
        }
    }

    /// Maps one chat signal to the deltas it earns. Bot messages, self
    /// reactions and reactions on content without a known owner earn nothing.
    pub fn classify(&self, signal: &ChatSignal, now: DateTime<Utc>) -> Vec<ExpDelta> {
        match signal {
            ChatSignal::Message { author, from_bot, channel_id, text } => {
                if *from_bot {
                    return Vec::new();
                }
                vec![ExpDelta {
                    user_id: author.clone(),
                    delta: self.message_delta(text),
                    channel_id: Some(channel_id.clone()),
                    enqueued_at: now,
                    source: RewardSource::Message,
                }]
            }
            ChatSignal::ReactionAdded { actor, item_owner } => reaction_pair(
                actor,
                item_owner.as_ref(),
                self.reaction_added,
                RewardSource::ReactionAdded,
                now,
            ),
            ChatSignal::ReactionRemoved { actor, item_owner } => reaction_pair(
                actor,
                item_owner.as_ref(),
                self.reaction_removed_penalty,
                RewardSource::ReactionRemoved,
                now,
            ),
        }
    }
}

fn reaction_pair(
    actor: &UserId,
    item_owner: Option<&UserId>,
    delta: i64,
    source: RewardSource,
    now: DateTime<Utc>,
) -> Vec<ExpDelta> {
    let Some(owner) = item_owner else {
        return Vec::new();
    };
    if owner == actor {
        return Vec::new();
    }

    [owner, actor]
        .into_iter()
        .map(|user_id| ExpDelta {
            user_id: user_id.clone(),
            delta,
            channel_id: None,
            enqueued_at: now,
            source,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{ChatSignal, RewardPolicy};
    use crate::domain::user::{ChannelId, UserId};
    use crate::experience::RewardSource;

    fn message(text: &str, from_bot: bool) -> ChatSignal {
        ChatSignal::Message {
            author: UserId::from("U1"),
            from_bot,
            channel_id: ChannelId::from("C1"),
            text: text.to_owned(),
        }
    }

    #[test]
    fn long_message_bonus_starts_above_fifty_characters() {
        let policy = RewardPolicy::default();

        let at_limit = policy.classify(&message(&"a".repeat(50), false), Utc::now());
        let over_limit = policy.classify(&message(&"a".repeat(51), false), Utc::now());

        assert_eq!(at_limit.len(), 1);
        assert_eq!(at_limit[0].delta, 1);
        assert_eq!(over_limit[0].delta, 2);
    }

    #[test]
    fn message_length_counts_characters_not_bytes() {
        let policy = RewardPolicy::default();

        assert_eq!(policy.message_delta(&"é".repeat(50)), 1);
        assert_eq!(policy.message_delta(&"é".repeat(51)), 2);
    }

    #[test]
    fn oversized_configured_rewards_saturate() {
        let policy = RewardPolicy {
            message_base: i64::MAX - 1,
            long_message_bonus: 10,
            ..RewardPolicy::default()
        };

        assert_eq!(policy.message_delta(&"x".repeat(51)), i64::MAX);
        assert_eq!(policy.message_delta("short"), i64::MAX - 1);
    }

    #[test]
    fn message_entry_carries_author_and_channel() {
        let entries = RewardPolicy::default().classify(&message("hello", false), Utc::now());

        assert_eq!(entries[0].user_id, UserId::from("U1"));
        assert_eq!(entries[0].channel_id, Some(ChannelId::from("C1")));
        assert_eq!(entries[0].source, RewardSource::Message);
    }

    #[test]
    fn bot_messages_earn_nothing() {
        let entries = RewardPolicy::default().classify(&message("beep", true), Utc::now());
        assert!(entries.is_empty());
    }

    #[test]
    fn reaction_between_two_users_rewards_both_equally() {
        let signal = ChatSignal::ReactionAdded {
            actor: UserId::from("UA"),
            item_owner: Some(UserId::from("UB")),
        };

        let entries = RewardPolicy::default().classify(&signal, Utc::now());

        assert_eq!(entries.len(), 2);
        let users: Vec<&str> = entries.iter().map(|entry| entry.user_id.as_str()).collect();
        assert_eq!(users, vec!["UB", "UA"]);
        assert!(entries.iter().all(|entry| entry.delta == 1 && entry.channel_id.is_none()));
    }

    #[test]
    fn reaction_removal_penalizes_both_users() {
        let signal = ChatSignal::ReactionRemoved {
            actor: UserId::from("UA"),
            item_owner: Some(UserId::from("UB")),
        };

        let entries = RewardPolicy::default().classify(&signal, Utc::now());

        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|entry| entry.delta == -1));
        assert!(entries.iter().all(|entry| entry.source == RewardSource::ReactionRemoved));
    }

    #[test]
    fn self_reactions_earn_nothing() {
        let policy = RewardPolicy::default();
        let added = ChatSignal::ReactionAdded {
            actor: UserId::from("UA"),
            item_owner: Some(UserId::from("UA")),
        };
        let removed = ChatSignal::ReactionRemoved {
            actor: UserId::from("UA"),
            item_owner: Some(UserId::from("UA")),
        };

        assert!(policy.classify(&added, Utc::now()).is_empty());
        assert!(policy.classify(&removed, Utc::now()).is_empty());
    }

    #[test]
    fn reaction_without_known_owner_is_dropped() {
        let signal = ChatSignal::ReactionAdded { actor: UserId::from("UA"), item_owner: None };
        assert!(RewardPolicy::default().classify(&signal, Utc::now()).is_empty());
    }
}
