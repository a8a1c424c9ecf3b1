use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use deskbot_core::config::GatewayConfig;

use crate::events::{GatewayEnvelope, GatewayEvent};
use crate::socket::{SocketTransport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = Arc<Mutex<SplitSink<WsStream, Message>>>;

const INTENT_GUILDS: u64 = 1 << 0;
const INTENT_GUILD_MEMBERS: u64 = 1 << 1;
const INTENT_GUILD_MESSAGES: u64 = 1 << 9;
const INTENT_DIRECT_MESSAGES: u64 = 1 << 12;
const INTENT_MESSAGE_CONTENT: u64 = 1 << 15;

/// Guild structure, member lookups, guild and direct messages with content.
pub const DESK_INTENTS: u64 = INTENT_GUILDS
    | INTENT_GUILD_MEMBERS
    | INTENT_GUILD_MESSAGES
    | INTENT_DIRECT_MESSAGES
    | INTENT_MESSAGE_CONTENT;

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

#[derive(Deserialize)]
struct RawFrame {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
enum Frame {
    Hello { heartbeat_interval: Duration },
    Dispatch { sequence: Option<u64>, kind: String, data: Value },
    HeartbeatRequested,
    HeartbeatAck,
    Reconnect(&'static str),
    Other(u8),
}

fn decode_frame(text: &str) -> Result<Frame, TransportError> {
    let raw: RawFrame = serde_json::from_str(text)
        .map_err(|error| TransportError::Receive(format!("undecodable frame: {error}")))?;

    Ok(match raw.op {
        OP_DISPATCH => Frame::Dispatch {
            sequence: raw.s,
            kind: raw.t.unwrap_or_default(),
            data: raw.d,
        },
        OP_HEARTBEAT => Frame::HeartbeatRequested,
        OP_HEARTBEAT_ACK => Frame::HeartbeatAck,
        OP_RECONNECT => Frame::Reconnect("gateway requested reconnect"),
        OP_INVALID_SESSION => Frame::Reconnect("session invalidated"),
        OP_HELLO => {
            let millis = raw.d.get("heartbeat_interval").and_then(Value::as_u64).ok_or_else(
                || TransportError::Receive("hello without heartbeat_interval".to_owned()),
            )?;
            Frame::Hello { heartbeat_interval: Duration::from_millis(millis) }
        }
        other => Frame::Other(other),
    })
}

fn identify_payload(token: &str, intents: u64) -> Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": intents,
            "properties": { "os": std::env::consts::OS, "browser": "deskbot", "device": "deskbot" },
        },
    })
}

/// Sequence 0 means no dispatch has been seen yet.
fn heartbeat_payload(sequence: u64) -> Value {
    let last = if sequence == 0 { Value::Null } else { json!(sequence) };
    json!({ "op": OP_HEARTBEAT, "d": last })
}

struct Session {
    source: SplitStream<WsStream>,
    sink: WsSink,
    sequence: Arc<AtomicU64>,
    heartbeat: JoinHandle<()>,
}

/// Live websocket session against the chat platform gateway. One session is
/// open at a time; the runner reconnects through `connect` after failures.
pub struct WebSocketGatewayTransport {
    url: String,
    token: SecretString,
    intents: u64,
    session: Mutex<Option<Session>>,
}

impl WebSocketGatewayTransport {
    pub fn new(url: impl Into<String>, token: SecretString, intents: u64) -> Self {
        Self { url: url.into(), token, intents, session: Mutex::new(None) }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.gateway_url.clone(), config.bot_token.clone(), DESK_INTENTS)
    }
}

#[async_trait]
impl SocketTransport for WebSocketGatewayTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (sink, mut source) = stream.split();
        let sink: WsSink = Arc::new(Mutex::new(sink));

        let heartbeat_interval = loop {
            match read_frame(&mut source).await? {
                Frame::Hello { heartbeat_interval } => break heartbeat_interval,
                other => debug!(frame = ?other, "skipping frame before hello"),
            }
        };

        let sequence = Arc::new(AtomicU64::new(0));
        let heartbeat =
            tokio::spawn(heartbeat_loop(sink.clone(), sequence.clone(), heartbeat_interval));
        if let Err(error) =
            send(&sink, identify_payload(self.token.expose_secret(), self.intents)).await
        {
            heartbeat.abort();
            return Err(TransportError::Connect(error.to_string()));
        }

        info!(
            event_name = "ingress.gateway.identified",
            heartbeat_interval_ms = heartbeat_interval.as_millis() as u64,
            intents = self.intents,
            "gateway session identified"
        );
        *self.session.lock().await = Some(Session { source, sink, sequence, heartbeat });
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError> {
        let mut guard = self.session.lock().await;
        let session =
            guard.as_mut().ok_or_else(|| TransportError::Receive("not connected".to_owned()))?;

        loop {
            match read_frame(&mut session.source).await? {
                Frame::Dispatch { sequence, kind, data } => {
                    if let Some(sequence) = sequence {
                        session.sequence.store(sequence, Ordering::Relaxed);
                    }
                    if kind == "READY" {
                        info!(event_name = "ingress.gateway.ready", "gateway session ready");
                        continue;
                    }
                    match GatewayEvent::from_dispatch(&kind, &data) {
                        Ok(GatewayEvent::Unsupported { event_type }) => {
                            debug!(event_type = %event_type, "skipping unsupported dispatch");
                        }
                        Ok(event) => {
                            let envelope_id = Uuid::new_v4().to_string();
                            return Ok(Some(GatewayEnvelope { envelope_id, event }));
                        }
                        Err(error) => warn!(
                            event_name = "ingress.gateway.dispatch_malformed",
                            error = %error,
                            "dropping malformed dispatch"
                        ),
                    }
                }
                Frame::HeartbeatRequested => {
                    let sequence = session.sequence.load(Ordering::Relaxed);
                    send(&session.sink, heartbeat_payload(sequence)).await?;
                }
                Frame::Reconnect(reason) => {
                    return Err(TransportError::Reconnect(reason.to_owned()));
                }
                Frame::Hello { .. } | Frame::HeartbeatAck | Frame::Other(_) => {}
            }
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };
        session.heartbeat.abort();
        let mut sink = session.sink.lock().await;
        sink.close().await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}

async fn read_frame(source: &mut SplitStream<WsStream>) -> Result<Frame, TransportError> {
    loop {
        let message = source
            .next()
            .await
            .ok_or_else(|| TransportError::Receive("gateway stream ended".to_owned()))?
            .map_err(|error| TransportError::Receive(error.to_string()))?;

        match message {
            Message::Text(text) => return decode_frame(text.as_str()),
            Message::Binary(bytes) => {
                let text = std::str::from_utf8(&bytes)
                    .map_err(|error| TransportError::Receive(error.to_string()))?;
                return decode_frame(text);
            }
            Message::Close(frame) => {
                let reason = frame.map_or_else(
                    || "no close frame".to_owned(),
                    |frame| format!("{} {}", u16::from(frame.code), frame.reason.as_str()),
                );
                return Err(TransportError::Reconnect(format!("closed by gateway: {reason}")));
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }
}

async fn send(sink: &WsSink, payload: Value) -> Result<(), TransportError> {
    sink.lock()
        .await
        .send(Message::text(payload.to_string()))
        .await
        .map_err(|error| TransportError::Receive(format!("send failed: {error}")))
}

async fn heartbeat_loop(sink: WsSink, sequence: Arc<AtomicU64>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let payload = heartbeat_payload(sequence.load(Ordering::Relaxed));
        if let Err(error) = send(&sink, payload).await {
            warn!(
                event_name = "ingress.gateway.heartbeat_failed",
                error = %error,
                "heartbeat failed; waiting for the session to be replaced"
            );
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Value};

    use super::{decode_frame, heartbeat_payload, identify_payload, Frame, DESK_INTENTS};
    use crate::socket::TransportError;

    #[test]
    fn hello_and_dispatch_frames_decode() {
        let hello = decode_frame(r#"{"op":10,"d":{"heartbeat_interval":41250}}"#);
        assert_eq!(
            hello,
            Ok(Frame::Hello { heartbeat_interval: Duration::from_millis(41_250) })
        );

        let dispatch = decode_frame(
            r#"{"op":0,"s":42,"t":"MESSAGE_CREATE","d":{"id":"M-1","content":"hi"}}"#,
        );
        assert_eq!(
            dispatch,
            Ok(Frame::Dispatch {
                sequence: Some(42),
                kind: "MESSAGE_CREATE".to_owned(),
                data: json!({ "id": "M-1", "content": "hi" }),
            })
        );
    }

    #[test]
    fn session_control_frames_map_to_reconnects() {
        assert_eq!(decode_frame(r#"{"op":1,"d":null}"#), Ok(Frame::HeartbeatRequested));
        assert_eq!(decode_frame(r#"{"op":11}"#), Ok(Frame::HeartbeatAck));
        assert!(matches!(decode_frame(r#"{"op":7,"d":null}"#), Ok(Frame::Reconnect(_))));
        assert!(matches!(decode_frame(r#"{"op":9,"d":false}"#), Ok(Frame::Reconnect(_))));
        assert_eq!(decode_frame(r#"{"op":3}"#), Ok(Frame::Other(3)));
    }

    #[test]
    fn malformed_frames_are_receive_errors() {
        assert!(matches!(decode_frame("not json"), Err(TransportError::Receive(_))));
        assert!(matches!(
            decode_frame(r#"{"op":10,"d":{}}"#),
            Err(TransportError::Receive(message)) if message.contains("heartbeat_interval")
        ));
    }

    #[test]
    fn identify_carries_token_and_intents() {
        let payload = identify_payload("bot-token", DESK_INTENTS);
        assert_eq!(payload["op"], 2);
        assert_eq!(payload["d"]["token"], "bot-token");
        assert_eq!(payload["d"]["intents"], 37_379);
        assert_eq!(payload["d"]["properties"]["browser"], "deskbot");
    }

    #[test]
    fn heartbeat_reports_last_sequence_or_null() {
        assert_eq!(heartbeat_payload(0)["d"], Value::Null);
        assert_eq!(heartbeat_payload(17), json!({ "op": 1, "d": 17 }));
    }
}
