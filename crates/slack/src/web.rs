//! Slack Web API client.
//!
//! One `SlackWebClient` backs three seams: the profile directory used by the
//! drain (`users.info`), level-up notifications (`chat.postMessage`, opening a
//! DM with `conversations.open` when no channel is known) and command replies.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use wexu_core::directory::{ProfileDirectory, ProfileLookupError, SlackProfile};
use wexu_core::domain::user::{ProfileMetadata, UserId};
use wexu_core::notify::{Destination, NotifyError, Notifier};

use crate::blocks::MessageTemplate;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SlackApiError {
    #[error("slack request failed: {0}")]
    Transport(String),
    #[error("slack returned HTTP {0}")]
    Status(u16),
    #[error("slack api error: {0}")]
    Api(String),
    #[error("slack response could not be decoded: {0}")]
    Decode(String),
}

impl From<SlackApiError> for ProfileLookupError {
    fn from(value: SlackApiError) -> Self {
        match value {
            SlackApiError::Api(code) => Self::Api(code),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<SlackApiError> for NotifyError {
    fn from(value: SlackApiError) -> Self {
        match value {
            SlackApiError::Api(code) => Self::Api(code),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Where command replies go.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn respond(&self, channel_id: &str, message: &MessageTemplate)
        -> Result<(), SlackApiError>;
}

#[derive(Default)]
pub struct NoopResponseSink;

#[async_trait]
impl ResponseSink for NoopResponseSink {
    async fn respond(
        &self,
        _channel_id: &str,
        _message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        Ok(())
    }
}

/// Checks the `ok` flag every Web API response carries.
pub fn decode_api_response(body: Value) -> Result<Value, SlackApiError> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(body);
    }
    let code = body.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
    Err(SlackApiError::Api(code.to_owned()))
}

fn optional_string(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

/// Maps the `user` object of a `users.info` response.
pub fn decode_profile(user: &Value) -> Result<SlackProfile, SlackApiError> {
    let id = user
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| SlackApiError::Decode("user object has no `id`".to_owned()))?;
    let profile = user.get("profile").cloned().unwrap_or(Value::Null);

    Ok(SlackProfile {
        user_id: UserId::from(id),
        is_bot: user.get("is_bot").and_then(Value::as_bool).unwrap_or(false),
        deleted: user.get("deleted").and_then(Value::as_bool).unwrap_or(false),
        metadata: ProfileMetadata {
            first_name: optional_string(&profile, "first_name"),
            last_name: optional_string(&profile, "last_name"),
            real_name: optional_string(&profile, "real_name")
                .or_else(|| optional_string(user, "real_name")),
            display_name: optional_string(&profile, "display_name"),
            tz: optional_string(user, "tz"),
            image_original: optional_string(&profile, "image_original"),
            slack_email: optional_string(&profile, "email"),
        },
    })
}

pub struct SlackWebClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
}

impl SlackWebClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, bot_token: SecretString) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { http, base_url, bot_token }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn read_response(response: reqwest::Response) -> Result<Value, SlackApiError> {
        if !response.status().is_success() {
            return Err(SlackApiError::Status(response.status().as_u16()));
        }
        let body: Value =
            response.json().await.map_err(|error| SlackApiError::Decode(error.to_string()))?;
        decode_api_response(body)
    }

    async fn post_json(&self, method: &str, payload: &Value) -> Result<Value, SlackApiError> {
        let response = self
            .http
            .post(self.endpoint(method))
            .bearer_auth(self.bot_token.expose_secret())
            .json(payload)
            .send()
            .await
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;
        Self::read_response(response).await
    }

    pub async fn user_info(&self, user_id: &UserId) -> Result<SlackProfile, SlackApiError> {
        let response = self
            .http
            .post(self.endpoint("users.info"))
            .bearer_auth(self.bot_token.expose_secret())
            .form(&[("user", user_id.as_str())])
            .send()
            .await
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;
        let body = Self::read_response(response).await?;
        let user = body
            .get("user")
            .ok_or_else(|| SlackApiError::Decode("users.info response has no `user`".to_owned()))?;
        decode_profile(user)
    }

    /// Returns the id of the DM channel with `user_id`.
    pub async fn open_direct_message(&self, user_id: &UserId) -> Result<String, SlackApiError> {
        let body = self.post_json("conversations.open", &json!({ "users": user_id.as_str() })).await?;
        body.get("channel")
            .and_then(|channel| channel.get("id"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| SlackApiError::Decode("conversations.open returned no channel".to_owned()))
    }

    pub async fn post_text(&self, channel_id: &str, text: &str) -> Result<(), SlackApiError> {
        self.post_json("chat.postMessage", &json!({ "channel": channel_id, "text": text })).await?;
        Ok(())
    }

    pub async fn post_template(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        let payload = json!({
            "channel": channel_id,
            "text": message.fallback_text,
            "blocks": message.blocks,
        });
        self.post_json("chat.postMessage", &payload).await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileDirectory for SlackWebClient {
    async fn lookup(&self, user_id: &UserId) -> Result<Option<SlackProfile>, ProfileLookupError> {
        match self.user_info(user_id).await {
            Ok(profile) => Ok(Some(profile)),
            Err(SlackApiError::Api(code)) if code == "user_not_found" => {
                debug!(user_id = %user_id, "slack does not know this user");
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }
}

#[async_trait]
impl Notifier for SlackWebClient {
    async fn notify(&self, destination: &Destination, message: &str) -> Result<(), NotifyError> {
        let channel_id = match destination {
            Destination::Channel(channel) => channel.as_str().to_owned(),
            Destination::DirectMessage(user_id) => self.open_direct_message(user_id).await?,
        };
        self.post_text(&channel_id, message).await?;
        Ok(())
    }
}

#[async_trait]
impl ResponseSink for SlackWebClient {
    async fn respond(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        self.post_template(channel_id, message).await
    }
}
