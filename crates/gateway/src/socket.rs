use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::blocks::{Reply, INTERACTION_FAILED};
use crate::events::{
    EventContext, EventDispatcher, GatewayEnvelope, HandlerResult, InteractionRef,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("gateway asked for a new session: {0}")]
    Reconnect(String),
    #[error("interaction response failed: {0}")]
    Respond(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
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

/// Source of inbound envelopes. `Ok(None)` means the stream ended cleanly and
/// the runner should stop.
#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait InteractionResponder: Send + Sync {
    async fn respond(
        &self,
        interaction: &InteractionRef,
        reply: &Reply,
    ) -> Result<(), TransportError>;
}

pub struct GatewayRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: Arc<EventDispatcher>,
    responder: Arc<dyn InteractionResponder>,
    reconnect_policy: ReconnectPolicy,
}

impl GatewayRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        responder: Arc<dyn InteractionResponder>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher: Arc::new(dispatcher), responder, reconnect_policy }
    }

    /// Runs sessions until the stream closes cleanly or retries run out. A
    /// session that delivered events resets the retry budget.
    pub async fn start(&self) -> Result<()> {
        let mut attempt = 0;
        loop {
            let mut received = 0_usize;
            let Err(transport_error) = self.connect_and_pump(attempt, &mut received).await else {
                return Ok(());
            };
            if received > 0 {
                attempt = 0;
            }

            warn!(
                event_name = "ingress.gateway.session_failed",
                attempt,
                max_retries = self.reconnect_policy.max_retries,
                received,
                error = %transport_error,
                "gateway session failed"
            );

            if attempt >= self.reconnect_policy.max_retries {
                warn!(
                    max_retries = self.reconnect_policy.max_retries,
                    "gateway retries exhausted; continuing process without crash"
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

    async fn connect_and_pump(
        &self,
        attempt: u32,
        received: &mut usize,
    ) -> Result<(), TransportError> {
        info!(attempt, "opening gateway connection");
        self.transport.connect().await?;
        info!(attempt, "gateway connected");

        let mut in_flight = JoinSet::new();
        let outcome = loop {
            let envelope = match self.transport.next_envelope().await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => break Ok(()),
                Err(error) => break Err(error),
            };
            *received += 1;

            let user_id =
                envelope.event.actor().map_or("unknown", |actor| actor.user_id.0.as_str());
            info!(
                event_name = "ingress.gateway.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                user_id,
                "received gateway envelope"
            );

            in_flight.spawn(handle_envelope(
                self.dispatcher.clone(),
                self.responder.clone(),
                envelope,
            ));

            while in_flight.try_join_next().is_some() {}
        };

        while in_flight.join_next().await.is_some() {}

        match outcome {
            Ok(()) => {
                info!(attempt, "gateway stream closed");
                self.transport.disconnect().await
            }
            Err(error) => {
                if let Err(disconnect_error) = self.transport.disconnect().await {
                    debug!(error = %disconnect_error, "disconnect after failed session");
                }
                Err(error)
            }
        }
    }
}

async fn handle_envelope(
    dispatcher: Arc<EventDispatcher>,
    responder: Arc<dyn InteractionResponder>,
    envelope: GatewayEnvelope,
) {
    let context = EventContext { correlation_id: envelope.envelope_id.clone() };
    let reply = match dispatcher.dispatch(&envelope, &context).await {
        Ok(HandlerResult::Responded(reply)) => Some(reply),
        Ok(HandlerResult::Processed | HandlerResult::Ignored) => None,
        Err(error) => {
            warn!(
                event_name = "ingress.gateway.dispatch_failed",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                error = %error,
                "event dispatch failed; continuing gateway loop"
            );
            Some(Reply::ephemeral_text(INTERACTION_FAILED))
        }
    };

    let (Some(reply), Some(interaction)) = (reply, envelope.event.interaction()) else {
        return;
    };
    match responder.respond(interaction, &reply).await {
        Ok(()) => debug!(
            event_name = "egress.gateway.interaction_answered",
            envelope_id = %envelope.envelope_id,
            correlation_id = %envelope.envelope_id,
            "answered interaction"
        ),
        Err(error) => warn!(
            event_name = "egress.gateway.interaction_answered",
            envelope_id = %envelope.envelope_id,
            correlation_id = %envelope.envelope_id,
            error = %error,
            "failed to answer interaction"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use deskbot_core::domain::platform::{ChannelId, UserId};

    use super::{
        GatewayRunner, InteractionResponder, ReconnectPolicy, SocketTransport, TransportError,
    };
    use crate::blocks::{Reply, INTERACTION_FAILED};
    use crate::events::{
        Actor, ButtonEvent, EventContext, EventDispatcher, EventHandler, EventHandlerError,
        GatewayEnvelope, GatewayEvent, GatewayEventType, HandlerResult, InteractionRef,
    };

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<GatewayEnvelope>, TransportError>>,
        connect_attempts: usize,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<GatewayEnvelope>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    ..ScriptedState::default()
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn disconnect_calls(&self) -> usize {
            self.state.lock().await.disconnect_calls
        }
    }

    #[async_trait]
    impl SocketTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            self.state.lock().await.disconnect_calls += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingResponder {
        replies: Mutex<Vec<(String, Reply)>>,
    }

    #[async_trait]
    impl InteractionResponder for RecordingResponder {
        async fn respond(
            &self,
            interaction: &InteractionRef,
            reply: &Reply,
        ) -> Result<(), TransportError> {
            self.replies.lock().await.push((interaction.id.clone(), reply.clone()));
            Ok(())
        }
    }

    struct EchoButtons;

    #[async_trait]
    impl EventHandler for EchoButtons {
        fn event_type(&self) -> GatewayEventType {
            GatewayEventType::ButtonPressed
        }

        async fn handle(
            &self,
            envelope: &GatewayEnvelope,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            let GatewayEvent::ButtonPressed(event) = &envelope.event else {
                return Ok(HandlerResult::Ignored);
            };
            if event.custom_id == "broken" {
                return Err(EventHandlerError::Desk("store offline".to_owned()));
            }
            Ok(HandlerResult::Responded(Reply::ephemeral_text(event.custom_id.clone())))
        }
    }

    fn button(envelope_id: &str, custom_id: &str) -> GatewayEnvelope {
        GatewayEnvelope {
            envelope_id: envelope_id.to_owned(),
            event: GatewayEvent::ButtonPressed(ButtonEvent {
                interaction: InteractionRef {
                    id: format!("I-{envelope_id}"),
                    token: "tok".to_owned(),
                },
                guild_id: None,
                channel_id: ChannelId("C-1".to_owned()),
                actor: Actor {
                    user_id: UserId("U-1".to_owned()),
                    username: "alice".to_owned(),
                    nickname: None,
                    is_bot: false,
                },
                custom_id: custom_id.to_owned(),
            }),
        }
    }

    fn no_delay(max_retries: u32) -> ReconnectPolicy {
        ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![
                Ok(Some(GatewayEnvelope {
                    envelope_id: "env-1".to_owned(),
                    event: GatewayEvent::Unsupported { event_type: "TYPING_START".to_owned() },
                })),
                Ok(None),
            ],
        ));
        let responder = Arc::new(RecordingResponder::default());

        let runner = GatewayRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            responder.clone(),
            no_delay(2),
        );
        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert!(responder.replies.lock().await.is_empty());
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
        ));

        let runner = GatewayRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            Arc::new(RecordingResponder::default()),
            no_delay(2),
        );

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn interactions_are_answered_and_failures_get_a_generic_reply() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![],
            vec![
                Ok(Some(button("env-1", "support_open_ticket"))),
                Ok(Some(button("env-2", "broken"))),
            ],
        ));
        let responder = Arc::new(RecordingResponder::default());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(EchoButtons);

        let runner =
            GatewayRunner::new(transport.clone(), dispatcher, responder.clone(), no_delay(0));
        runner.start().await.expect("runner");

        let mut replies = responder.replies.lock().await.clone();
        replies.sort_by(|left, right| left.0.cmp(&right.0));
        assert_eq!(
            replies,
            vec![
                ("I-env-1".to_owned(), Reply::ephemeral_text("support_open_ticket")),
                ("I-env-2".to_owned(), Reply::ephemeral_text(INTERACTION_FAILED)),
            ]
        );
        assert_eq!(transport.disconnect_calls().await, 1);
    }

    #[tokio::test]
    async fn session_that_received_events_resets_retry_budget() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(()), Ok(()), Ok(())],
            vec![
                Ok(Some(button("env-1", "a"))),
                Err(TransportError::Reconnect("op 7".to_owned())),
                Ok(Some(button("env-2", "b"))),
                Err(TransportError::Reconnect("op 7".to_owned())),
                Ok(None),
            ],
        ));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(EchoButtons);

        let runner = GatewayRunner::new(
            transport.clone(),
            dispatcher,
            Arc::new(RecordingResponder::default()),
            no_delay(1),
        );
        runner.start().await.expect("runner");

        assert_eq!(transport.connect_attempts().await, 3);
    }
}
