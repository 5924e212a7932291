use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use wexu_core::domain::user::{ChannelId, UserId};
use wexu_core::experience::{ChatSignal, ExperienceQueue, RewardPolicy};
use wexu_core::ledger::UserLedger;

use crate::{
    blocks::MessageTemplate,
    commands::{parse_command, CommandRouter},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    ReactionAdded(ReactionEvent),
    ReactionRemoved(ReactionEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::ReactionAdded(_) => SlackEventType::ReactionAdded,
            Self::ReactionRemoved(_) => SlackEventType::ReactionRemoved,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    /// Decodes the inner `event` object of an Events API callback. Anything the
    /// bot does not reward becomes `Unsupported`.
    pub fn from_event_json(event: &Value) -> Self {
        let event_type = string_field(event, "type").unwrap_or_default();
        let decoded = match event_type.as_str() {
            "message" => decode_message(event).map(Self::Message),
            "reaction_added" => decode_reaction(event).map(Self::ReactionAdded),
            "reaction_removed" => decode_reaction(event).map(Self::ReactionRemoved),
            _ => None,
        };

        decoded.unwrap_or(Self::Unsupported { event_type })
    }

    /// Channel a command reply should go to, when the event has one.
    pub fn reply_channel(&self) -> Option<&str> {
        match self {
            Self::Message(event) => Some(event.channel_id.as_str()),
            Self::ReactionAdded(event) | Self::ReactionRemoved(event) => {
                event.channel_id.as_deref()
            }
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    ReactionAdded,
    ReactionRemoved,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    pub user_id: String,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
    pub text: String,
    pub ts: String,
}

impl MessageEvent {
    pub fn is_from_bot(&self) -> bool {
        self.bot_id.is_some() || self.subtype.as_deref() == Some("bot_message")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionEvent {
    pub user_id: String,
    pub item_user: Option<String>,
    pub reaction: String,
    pub channel_id: Option<String>,
    pub item_ts: Option<String>,
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn decode_message(event: &Value) -> Option<MessageEvent> {
    // Edits, deletions and joins carry no top-level author.
    Some(MessageEvent {
        channel_id: string_field(event, "channel")?,
        user_id: string_field(event, "user")?,
        bot_id: string_field(event, "bot_id"),
        subtype: string_field(event, "subtype"),
        text: string_field(event, "text").unwrap_or_default(),
        ts: string_field(event, "ts").unwrap_or_default(),
    })
}

fn decode_reaction(event: &Value) -> Option<ReactionEvent> {
    let item = event.get("item");
    Some(ReactionEvent {
        user_id: string_field(event, "user")?,
        item_user: string_field(event, "item_user"),
        reaction: string_field(event, "reaction").unwrap_or_default(),
        channel_id: item.and_then(|item| string_field(item, "channel")),
        item_ts: item.and_then(|item| string_field(item, "ts")),
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("message handler failure: {0}")]
    Message(String),
    #[error("reaction handler failure: {0}")]
    Reaction(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Message, reaction-added and reaction-removed handlers feeding `queue`.
pub fn default_dispatcher(
    queue: Arc<ExperienceQueue>,
    policy: RewardPolicy,
    ledger: Arc<dyn UserLedger>,
) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageHandler::new(Arc::clone(&queue), policy, CommandRouter::new(ledger)));
    dispatcher.register(ReactionHandler::added(Arc::clone(&queue), policy));
    dispatcher.register(ReactionHandler::removed(queue, policy));
    dispatcher
}

fn enqueue_signal(
    queue: &ExperienceQueue,
    policy: &RewardPolicy,
    signal: &ChatSignal,
    ctx: &EventContext,
) -> usize {
    let entries = policy.classify(signal, Utc::now());
    let count = entries.len();
    for entry in entries {
        debug!(
            event_name = "experience.queue.enqueued",
            correlation_id = %ctx.correlation_id,
            user_id = %entry.user_id,
            delta = entry.delta,
            source = entry.source.as_str(),
            "queued experience delta"
        );
        queue.enqueue(entry);
    }
    count
}

pub struct MessageHandler {
    queue: Arc<ExperienceQueue>,
    policy: RewardPolicy,
    commands: CommandRouter,
}

impl MessageHandler {
    pub fn new(queue: Arc<ExperienceQueue>, policy: RewardPolicy, commands: CommandRouter) -> Self {
        Self { queue, policy, commands }
    }
}

#[async_trait]
impl EventHandler for MessageHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.is_from_bot() {
            return Ok(HandlerResult::Ignored);
        }

        if let Some(command) = parse_command(&event.text) {
            let user_id = UserId(event.user_id.clone());
            return match self.commands.route(command, &user_id).await {
                Ok(reply) => Ok(HandlerResult::Responded(reply)),
                Err(error) => {
                    warn!(
                        event_name = "slack.command.failed",
                        correlation_id = %ctx.correlation_id,
                        command = command.keyword(),
                        user_id = %user_id,
                        error = %error,
                        "community command failed"
                    );
                    Ok(HandlerResult::Responded(error.reply(&ctx.correlation_id)))
                }
            };
        }

        let signal = ChatSignal::Message {
            author: UserId(event.user_id.clone()),
            from_bot: false,
            channel_id: ChannelId(event.channel_id.clone()),
            text: event.text.clone(),
        };
        enqueue_signal(&self.queue, &self.policy, &signal, ctx);
        Ok(HandlerResult::Processed)
    }
}

/// Rewards (or penalizes) both sides of a reaction. One instance per direction.
pub struct ReactionHandler {
    queue: Arc<ExperienceQueue>,
    policy: RewardPolicy,
    event_type: SlackEventType,
}

impl ReactionHandler {
    pub fn added(queue: Arc<ExperienceQueue>, policy: RewardPolicy) -> Self {
        Self { queue, policy, event_type: SlackEventType::ReactionAdded }
    }

    pub fn removed(queue: Arc<ExperienceQueue>, policy: RewardPolicy) -> Self {
        Self { queue, policy, event_type: SlackEventType::ReactionRemoved }
    }
}

#[async_trait]
impl EventHandler for ReactionHandler {
    fn event_type(&self) -> SlackEventType {
        self.event_type.clone()
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let signal = match &envelope.event {
            SlackEvent::ReactionAdded(event) => ChatSignal::ReactionAdded {
                actor: UserId(event.user_id.clone()),
                item_owner: event.item_user.clone().map(UserId),
            },
            SlackEvent::ReactionRemoved(event) => ChatSignal::ReactionRemoved {
                actor: UserId(event.user_id.clone()),
                item_owner: event.item_user.clone().map(UserId),
            },
            _ => return Ok(HandlerResult::Ignored),
        };

        if enqueue_signal(&self.queue, &self.policy, &signal, ctx) == 0 {
            return Ok(HandlerResult::Ignored);
        }
        Ok(HandlerResult::Processed)
    }
}
