use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{
    DispatchError, EventContext, EventDispatcher, HandlerResult, SlackEnvelope, SlackEvent,
};
use crate::web::{NoopResponseSink, ResponseSink};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// `Ok(None)` means the stream ended cleanly and the runner should stop.
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopSocketTransport;

#[async_trait]
impl SocketTransport for NoopSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _envelope_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// How a single connection ended.
struct PumpFailure {
    error: TransportError,
    established: bool,
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    responder: Arc<dyn ResponseSink>,
    reconnect_policy: ReconnectPolicy,
}

impl Default for SocketModeRunner {
    fn default() -> Self {
        Self {
            transport: Arc::new(NoopSocketTransport),
            dispatcher: EventDispatcher::default(),
            responder: Arc::new(NoopResponseSink),
            reconnect_policy: ReconnectPolicy::default(),
        }
    }
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, responder: Arc::new(NoopResponseSink), reconnect_policy }
    }

    pub fn with_responder(mut self, responder: Arc<dyn ResponseSink>) -> Self {
        self.responder = responder;
        self
    }

    /// Pumps envelopes until the stream ends or reconnects are exhausted.
    /// A connection that was established resets the retry budget.
    pub async fn start(&self) -> Result<()> {
        let mut attempt = 0_u32;
        loop {
            let failure = match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(failure) => failure,
            };
            if failure.established {
                attempt = 0;
            }

            warn!(
                attempt,
                max_retries = self.reconnect_policy.max_retries,
                error = %failure.error,
                "socket mode transport failed"
            );

            if attempt >= self.reconnect_policy.max_retries {
                warn!(
                    max_retries = self.reconnect_policy.max_retries,
                    "socket mode retries exhausted; continuing process without crash"
                );
                return Ok(());
            }

            let delay = self.reconnect_policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), PumpFailure> {
        info!(attempt, "opening socket mode transport connection");
        self.transport
            .connect()
            .await
            .map_err(|error| PumpFailure { error, established: false })?;
        info!(attempt, "socket mode transport connected");

        loop {
            let next = self
                .transport
                .next_envelope()
                .await
                .map_err(|error| PumpFailure { error, established: true })?;
            let Some(envelope) = next else {
                info!(attempt, "socket mode transport stream closed");
                return self
                    .transport
                    .disconnect()
                    .await
                    .map_err(|error| PumpFailure { error, established: true });
            };

            self.process(&envelope).await;
        }
    }

    async fn process(&self, envelope: &SlackEnvelope) {
        let (user_id, channel_id) = correlation_fields(envelope);

        info!(
            event_name = "ingress.slack.envelope_received",
            envelope_id = %envelope.envelope_id,
            event_type = ?envelope.event.event_type(),
            correlation_id = %envelope.envelope_id,
            user_id = user_id.unwrap_or("unknown"),
            channel_id = channel_id.unwrap_or("unknown"),
            "received slack envelope"
        );

        if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
            warn!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                error = %error,
                "failed to acknowledge slack envelope"
            );
        } else {
            debug!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                "acknowledged slack envelope"
            );
        }

        let context = EventContext { correlation_id: envelope.envelope_id.clone() };
        match self.dispatcher.dispatch(envelope, &context).await {
            Ok(HandlerResult::Responded(message)) => {
                let Some(channel_id) = envelope.event.reply_channel() else {
                    debug!(
                        correlation_id = %envelope.envelope_id,
                        "handler replied to an event without a channel; reply dropped"
                    );
                    return;
                };
                if let Err(error) = self.responder.respond(channel_id, &message).await {
                    warn!(
                        event_name = "egress.slack.reply_failed",
                        correlation_id = %envelope.envelope_id,
                        channel_id,
                        error = %error,
                        "failed to post command reply"
                    );
                }
            }
            Ok(HandlerResult::Processed | HandlerResult::Ignored) => {}
            Err(error) => {
                warn!(
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    error = %error,
                    "event dispatch failed; continuing socket loop"
                );
            }
        }
    }
}

fn correlation_fields(envelope: &SlackEnvelope) -> (Option<&str>, Option<&str>) {
    match &envelope.event {
        SlackEvent::Message(event) => (Some(event.user_id.as_str()), Some(event.channel_id.as_str())),
        SlackEvent::ReactionAdded(event) | SlackEvent::ReactionRemoved(event) => {
            (Some(event.user_id.as_str()), event.channel_id.as_deref())
        }
        SlackEvent::Unsupported { .. } => (None, None),
    }
}
