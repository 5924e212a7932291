//! Socket Mode transport over a live websocket.
//!
//! `apps.connections.open` (app-level token) hands out a single-use `wss://`
//! URL. Every envelope that carries an `envelope_id` must be acknowledged on
//! the same socket. Slack rotates connections by sending a `disconnect` frame;
//! that surfaces as a receive error so the runner reconnects.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::events::{SlackEnvelope, SlackEvent};
use crate::socket::{SocketTransport, TransportError};
use crate::web::decode_api_response;

type SocketStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Envelope(SlackEnvelope),
    Disconnect { reason: String },
    Control { frame_type: String },
}

/// Decodes one text frame received from Slack.
pub fn decode_socket_frame(text: &str) -> Result<SocketFrame, TransportError> {
    let frame: Value = serde_json::from_str(text)
        .map_err(|error| TransportError::Receive(format!("malformed socket frame: {error}")))?;
    let frame_type = frame.get("type").and_then(Value::as_str).unwrap_or_default().to_owned();

    if frame_type == "disconnect" {
        let reason = frame.get("reason").and_then(Value::as_str).unwrap_or("unspecified");
        return Ok(SocketFrame::Disconnect { reason: reason.to_owned() });
    }

    let Some(envelope_id) = frame.get("envelope_id").and_then(Value::as_str) else {
        return Ok(SocketFrame::Control { frame_type });
    };

    let event = match (frame_type.as_str(), frame.pointer("/payload/event")) {
        ("events_api", Some(event)) => SlackEvent::from_event_json(event),
        _ => SlackEvent::Unsupported { event_type: frame_type },
    };

    Ok(SocketFrame::Envelope(SlackEnvelope { envelope_id: envelope_id.to_owned(), event }))
}

pub struct SlackSocketTransport {
    http: reqwest::Client,
    base_url: String,
    app_token: SecretString,
    stream: Mutex<Option<SocketStream>>,
}

impl SlackSocketTransport {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, app_token: SecretString) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { http, base_url, app_token, stream: Mutex::new(None) }
    }

    async fn open_connection_url(&self) -> Result<String, TransportError> {
        let response = self
            .http
            .post(format!("{}/apps.connections.open", self.base_url))
            .bearer_auth(self.app_token.expose_secret())
            .send()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::Connect(format!(
                "apps.connections.open returned HTTP {}",
                response.status().as_u16()
            )));
        }
        let body: Value =
            response.json().await.map_err(|error| TransportError::Connect(error.to_string()))?;
        let body = decode_api_response(body).map_err(|error| TransportError::Connect(error.to_string()))?;

        body.get("url")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| TransportError::Connect("apps.connections.open returned no url".to_owned()))
    }
}

#[async_trait]
impl SocketTransport for SlackSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self.open_connection_url().await?;
        let (stream, _response) =
            connect_async(url).await.map_err(|error| TransportError::Connect(error.to_string()))?;
        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| TransportError::Receive("socket is not connected".to_owned()))?;

        loop {
            let message = match stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(error)) => return Err(TransportError::Receive(error.to_string())),
                None => return Err(TransportError::Receive("socket stream ended".to_owned())),
            };

            match message {
                Message::Text(text) => match decode_socket_frame(text.as_str())? {
                    SocketFrame::Envelope(envelope) => return Ok(Some(envelope)),
                    SocketFrame::Disconnect { reason } => {
                        return Err(TransportError::Receive(format!(
                            "slack requested reconnect: {reason}"
                        )));
                    }
                    SocketFrame::Control { frame_type } => {
                        debug!(frame_type = %frame_type, "socket mode control frame");
                    }
                },
                Message::Close(_) => {
                    return Err(TransportError::Receive("socket closed by slack".to_owned()));
                }
                _ => {}
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| TransportError::Acknowledge("socket is not connected".to_owned()))?;
        let ack = json!({ "envelope_id": envelope_id }).to_string();
        stream
            .send(Message::text(ack))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(mut stream) = self.stream.lock().await.take() else {
            return Ok(());
        };
        stream.close(None).await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}
