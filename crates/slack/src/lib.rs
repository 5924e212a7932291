//! Slack interface for the WeXu community bot
//!
//! - **Socket Mode** (`socket`, `transport`) - websocket event loop, no public URL needed
//! - **Events** (`events`) - messages and reactions turned into experience deltas
//! - **Commands** (`commands`) - `$profile` and `$top` replies
//! - **Block Kit** (`blocks`) - reply builders
//! - **Web API** (`web`) - profile lookups, level-up notifications, command replies
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Socket Mode and subscribe to `message.channels`, `reaction_added`
//!    and `reaction_removed`
//! 3. Grant the bot `chat:write`, `im:write`, `users:read` and `users:read.email`
//! 4. Set env vars: `WEXU_SLACK_APP_TOKEN`, `WEXU_SLACK_BOT_TOKEN`
//!
//! # Architecture
//!
//! ```text
//! Socket Mode → EventDispatcher → MessageHandler / ReactionHandler → ExperienceQueue
//!                     ↓
//!              CommandRouter → Block Kit reply → chat.postMessage
//! ```

pub mod blocks;
pub mod commands;
pub mod events;
pub mod socket;
pub mod transport;
pub mod web;

pub use events::{default_dispatcher, EventDispatcher, SlackEnvelope, SlackEvent};
pub use socket::{ReconnectPolicy, SocketModeRunner, SocketTransport, TransportError};
pub use transport::SlackSocketTransport;
pub use web::{ResponseSink, SlackApiError, SlackWebClient};
