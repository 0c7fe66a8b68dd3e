//! The Gateway Client: a single long-running session state machine.
//!
//! Owns the WebSocket, the sequence number, the session id, the resume URL,
//! and the heartbeat scheduler. Produces a stream of [`DispatchEvent`]s for
//! the Router over an internal channel.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge_model::Intents;
use flume::{Receiver, Sender};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use rand::Rng;
use tokio::net::TcpStream;
use tokio::time::{sleep, sleep_until, timeout};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{is_fatal_close_code, GatewayError};
use crate::event::DispatchEvent;
use crate::heartbeat::HeartbeatHandler;
use crate::opcode::OpCode;
use crate::payload::{
    create_heartbeat_payload, GatewayPayload, HelloPayload, IdentifyPayload, RawGatewayPayload,
    ReadySessionData, ResumePayload,
};
use crate::ratelimit::{full_jitter_backoff, IdentifyRateLimiter};
use crate::{DEFAULT_GATEWAY_URL, GATEWAY_VERSION};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = futures_util::stream::SplitSink<WsStream, WsMessage>;

const HELLO_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(60);

/// The session machine's current phase, per the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    Hello,
    Identifying,
    Resuming,
    Ready,
    Closing,
}

/// Static configuration for a Gateway Client. Supplied once at construction
/// and never mutated.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bot token, with the `Bot ` prefix already applied.
    pub token: String,

    /// Gateway intents to declare in Identify.
    pub intents: Intents,

    /// Gateway URL used for the first connection of the process (subsequent
    /// reconnects prefer `resume_gateway_url` once a session exists).
    pub gateway_url: String,
}

impl GatewayConfig {
    pub fn new(token: impl Into<String>, intents: Intents) -> Self {
        Self {
            token: token.into(),
            intents,
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
        }
    }
}

/// Internal outcome of parsing one inbound frame.
enum GatewayAction {
    Dispatch(DispatchEvent),
    Heartbeat,
    Reconnect,
    InvalidSession(bool),
    None,
}

/// The Gateway Client: maintains one Discord Gateway session for the
/// lifetime of the process, reconnecting and resuming as needed.
pub struct GatewayClient {
    config: GatewayConfig,
    rate_limiter: Arc<IdentifyRateLimiter>,

    phase: RwLock<Phase>,
    session_id: RwLock<Option<String>>,
    resume_gateway_url: RwLock<Option<String>>,
    sequence: AtomicU64,
    reconnect_attempts: AtomicU32,
    heartbeat: HeartbeatHandler,

    event_tx: Sender<DispatchEvent>,
}

impl GatewayClient {
    /// Construct a new client and the receiving half of its dispatch
    /// channel. The Router should drain the returned receiver.
    pub fn new(config: GatewayConfig) -> (Self, Receiver<DispatchEvent>) {
        Self::with_rate_limiter(config, Arc::new(IdentifyRateLimiter::default()))
    }

    pub fn with_rate_limiter(
        config: GatewayConfig,
        rate_limiter: Arc<IdentifyRateLimiter>,
    ) -> (Self, Receiver<DispatchEvent>) {
        let (tx, rx) = flume::unbounded();
        let client = Self {
            config,
            rate_limiter,
            phase: RwLock::new(Phase::Disconnected),
            session_id: RwLock::new(None),
            resume_gateway_url: RwLock::new(None),
            sequence: AtomicU64::new(0),
            reconnect_attempts: AtomicU32::new(0),
            heartbeat: HeartbeatHandler::new(Duration::from_millis(45_000)),
            event_tx: tx,
        };
        (client, rx)
    }

    pub fn phase(&self) -> Phase {
        *self.phase.read()
    }

    pub fn sequence(&self) -> Option<u64> {
        match self.sequence.load(Ordering::SeqCst) {
            0 => None,
            seq => Some(seq),
        }
    }

    pub fn latency(&self) -> Option<Duration> {
        self.heartbeat.latency()
    }

    /// Run the session state machine until `cancel` is signalled or an
    /// unrecoverable error occurs.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), GatewayError> {
        loop {
            if cancel.is_cancelled() {
                *self.phase.write() = Phase::Disconnected;
                return Ok(());
            }

            match self.connect_and_run(&cancel).await {
                Ok(()) => {
                    *self.phase.write() = Phase::Disconnected;
                    return Ok(());
                }
                Err(GatewayError::InvalidSession { resumable }) => {
                    if !resumable {
                        *self.session_id.write() = None;
                        *self.resume_gateway_url.write() = None;
                        self.sequence.store(0, Ordering::SeqCst);
                    }
                    warn!(resumable, "session invalidated, reconnecting");

                    let wait = Duration::from_millis(rand::rng().random_range(1000..=5000));
                    if wait_or_cancel(wait, &cancel).await.is_err() {
                        return Ok(());
                    }
                    continue;
                }
                Err(GatewayError::Closed { code, reason }) => {
                    if is_fatal_close_code(code) {
                        error!(code, reason = %reason, "fatal close code, terminating");
                        return Err(GatewayError::Closed { code, reason });
                    }
                    warn!(code, reason = %reason, "connection closed, reconnecting");
                    self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
                }
                Err(GatewayError::HeartbeatTimeout) => {
                    warn!("heartbeat acknowledgment timed out, reconnecting");
                    self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => {
                    error!(error = %e, "gateway error, reconnecting");
                    self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
                }
            }

            let attempt = self.reconnect_attempts.load(Ordering::SeqCst).saturating_sub(1);
            let delay = full_jitter_backoff(attempt, RECONNECT_BASE_DELAY, RECONNECT_MAX_DELAY);
            info!(attempt, delay_ms = delay.as_millis(), "waiting before reconnect");

            *self.phase.write() = Phase::Connecting;
            if wait_or_cancel(delay, &cancel).await.is_err() {
                return Ok(());
            }
        }
    }

    async fn connect_and_run(&self, cancel: &CancellationToken) -> Result<(), GatewayError> {
        let url = self.build_gateway_url()?;

        info!(url = %url, "connecting to gateway");
        *self.phase.write() = Phase::Connecting;

        let (ws_stream, _response) = connect_async(url.as_str()).await?;
        let (mut sink, mut stream) = ws_stream.split();

        *self.phase.write() = Phase::Hello;
        let hello = self.wait_for_hello(&mut stream).await?;
        let heartbeat_interval = Duration::from_millis(hello.heartbeat_interval);
        self.heartbeat.set_interval(heartbeat_interval);
        debug!(interval_ms = hello.heartbeat_interval, "received hello");

        self.rate_limiter.acquire().await?;

        let session_id = self.session_id.read().clone();
        if let Some(session_id) = session_id {
            *self.phase.write() = Phase::Resuming;
            info!(session_id = %session_id, "resuming session");
            self.send_resume(&mut sink, &session_id).await?;
        } else {
            *self.phase.write() = Phase::Identifying;
            info!("sending identify");
            self.send_identify(&mut sink).await?;
        }

        self.heartbeat.reset();

        // First heartbeat fires at a random delay within the interval; every
        // subsequent one fires exactly one interval later.
        let first_delay = Duration::from_millis(
            rand::rng().random_range(0..heartbeat_interval.as_millis().max(1) as u64),
        );
        let mut next_heartbeat = Instant::now() + first_delay;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    *self.phase.write() = Phase::Closing;
                    let _ = sink
                        .send(WsMessage::Close(Some(CloseFrame {
                            code: WsCloseCode::Normal,
                            reason: "shutting down".into(),
                        })))
                        .await;
                    return Ok(());
                }

                message = stream.next() => {
                    match message {
                        Some(Ok(msg)) => self.handle_message(msg, &mut sink).await?,
                        Some(Err(e)) => return Err(GatewayError::WebSocket(e)),
                        None => {
                            return Err(GatewayError::Closed {
                                code: 0,
                                reason: "websocket stream ended".to_string(),
                            });
                        }
                    }
                }

                _ = sleep_until(next_heartbeat.into()) => {
                    if !self.heartbeat.is_acked() {
                        error!("no heartbeat ack received, connection is zombied");
                        let _ = sink
                            .send(WsMessage::Close(Some(CloseFrame {
                                code: WsCloseCode::Library(4000),
                                reason: "heartbeat ack not received".into(),
                            })))
                            .await;
                        return Err(GatewayError::HeartbeatTimeout);
                    }

                    self.send_heartbeat(&mut sink).await?;
                    self.heartbeat.mark_sent();
                    next_heartbeat = Instant::now() + self.heartbeat.interval();
                }
            }
        }
    }

    fn build_gateway_url(&self) -> Result<Url, GatewayError> {
        let base = self
            .resume_gateway_url
            .read()
            .clone()
            .unwrap_or_else(|| self.config.gateway_url.clone());

        let mut url = Url::parse(&base)?;
        url.query_pairs_mut()
            .append_pair("v", &GATEWAY_VERSION.to_string())
            .append_pair("encoding", "json");
        Ok(url)
    }

    async fn wait_for_hello(
        &self,
        stream: &mut futures_util::stream::SplitStream<WsStream>,
    ) -> Result<HelloPayload, GatewayError> {
        let message = timeout(HELLO_TIMEOUT, stream.next())
            .await
            .map_err(|_| GatewayError::Closed {
                code: 0,
                reason: "timeout waiting for hello".to_string(),
            })?
            .ok_or_else(|| GatewayError::Closed {
                code: 0,
                reason: "connection closed before hello".to_string(),
            })??;

        if let WsMessage::Text(text) = message {
            let payload: RawGatewayPayload = serde_json::from_str(&text)?;
            if payload.op == OpCode::Hello {
                if let Some(data) = payload.d {
                    let hello: HelloPayload = serde_json::from_value(data)?;
                    return Ok(hello);
                }
            }
        }

        Err(GatewayError::Closed {
            code: 0,
            reason: "expected hello payload".to_string(),
        })
    }

    async fn send_identify(&self, sink: &mut WsSink) -> Result<(), GatewayError> {
        let identify = IdentifyPayload::new(self.config.token.as_str(), self.config.intents);
        let payload = GatewayPayload::new(OpCode::Identify, identify);
        let json = serde_json::to_string(&payload)?;
        trace!("sending identify payload");
        sink.send(WsMessage::Text(json.into())).await?;
        Ok(())
    }

    async fn send_resume(&self, sink: &mut WsSink, session_id: &str) -> Result<(), GatewayError> {
        let resume = ResumePayload {
            token: std::borrow::Cow::Borrowed(self.config.token.as_str()),
            session_id: std::borrow::Cow::Borrowed(session_id),
            seq: self.sequence.load(Ordering::SeqCst),
        };
        let payload = GatewayPayload::new(OpCode::Resume, resume);
        let json = serde_json::to_string(&payload)?;
        trace!("sending resume payload");
        sink.send(WsMessage::Text(json.into())).await?;
        Ok(())
    }

    async fn send_heartbeat(&self, sink: &mut WsSink) -> Result<(), GatewayError> {
        let json = create_heartbeat_payload(self.sequence());
        trace!(seq = ?self.sequence(), "sending heartbeat");
        sink.send(WsMessage::Text(json.into())).await?;
        Ok(())
    }

    async fn handle_message(
        &self,
        message: WsMessage,
        sink: &mut WsSink,
    ) -> Result<(), GatewayError> {
        let action = match message {
            WsMessage::Text(text) => self.process_frame(&text)?,
            WsMessage::Close(frame) => {
                let (code, reason) = frame
                    .map(|f: CloseFrame| (u16::from(f.code), f.reason.to_string()))
                    .unwrap_or((0, String::new()));
                return Err(GatewayError::Closed { code, reason });
            }
            WsMessage::Ping(data) => {
                sink.send(WsMessage::Pong(data)).await?;
                return Ok(());
            }
            WsMessage::Pong(_) | WsMessage::Frame(_) | WsMessage::Binary(_) => return Ok(()),
        };

        match action {
            GatewayAction::Dispatch(event) => {
                if event.name == "READY" {
                    if let Ok(ready) = serde_json::from_value::<ReadySessionData>(event.data.clone())
                    {
                        self.handle_ready(ready);
                    }
                } else if event.name == "RESUMED" {
                    *self.phase.write() = Phase::Ready;
                    self.reconnect_attempts.store(0, Ordering::SeqCst);
                    info!("session resumed");
                }
                self.event_tx.send_async(event).await?;
            }
            GatewayAction::Heartbeat => {
                debug!("received server-requested heartbeat");
                self.send_heartbeat(sink).await?;
            }
            GatewayAction::Reconnect => {
                info!("received reconnect request");
                let _ = sink
                    .send(WsMessage::Close(Some(CloseFrame {
                        code: WsCloseCode::Normal,
                        reason: "server requested reconnect".into(),
                    })))
                    .await;
                return Err(GatewayError::Closed {
                    code: 1000,
                    reason: "server requested reconnect".to_string(),
                });
            }
            GatewayAction::InvalidSession(resumable) => {
                warn!(resumable, "session invalidated");
                return Err(GatewayError::InvalidSession { resumable });
            }
            GatewayAction::None => {}
        }

        Ok(())
    }

    fn process_frame(&self, text: &str) -> Result<GatewayAction, GatewayError> {
        let payload: RawGatewayPayload = serde_json::from_str(text)?;

        if let Some(seq) = payload.s {
            self.sequence.store(seq, Ordering::SeqCst);
        }

        match payload.op {
            OpCode::Dispatch => {
                if let (Some(name), Some(data)) = (payload.t, payload.d) {
                    return Ok(GatewayAction::Dispatch(DispatchEvent {
                        name,
                        sequence: payload.s.unwrap_or(0),
                        data,
                    }));
                }
                Ok(GatewayAction::None)
            }
            OpCode::Heartbeat => Ok(GatewayAction::Heartbeat),
            OpCode::Reconnect => Ok(GatewayAction::Reconnect),
            OpCode::InvalidSession => {
                let resumable = payload.d.and_then(|d| d.as_bool()).unwrap_or(false);
                Ok(GatewayAction::InvalidSession(resumable))
            }
            OpCode::HeartbeatAck => {
                self.heartbeat.mark_acked();
                trace!(rtt_ms = ?self.heartbeat.latency().map(|d| d.as_millis()), "heartbeat ack received");
                Ok(GatewayAction::None)
            }
            OpCode::Hello | OpCode::Identify | OpCode::Resume => Ok(GatewayAction::None),
        }
    }

    fn handle_ready(&self, ready: ReadySessionData) {
        *self.session_id.write() = Some(ready.session_id.clone());
        *self.resume_gateway_url.write() = Some(ready.resume_gateway_url);
        *self.phase.write() = Phase::Ready;
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        info!(session_id = %ready.session_id, "session ready");
    }
}

/// Sleep for `duration`, or return `Err(())` early if `cancel` fires first.
async fn wait_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<(), ()> {
    tokio::select! {
        _ = sleep(duration) => Ok(()),
        _ = cancel.cancelled() => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_config_defaults() {
        let config = GatewayConfig::new("Bot test_token", Intents::default());
        assert_eq!(config.token, "Bot test_token");
        assert_eq!(config.gateway_url, DEFAULT_GATEWAY_URL);
    }

    #[test]
    fn test_client_initial_state() {
        let config = GatewayConfig::new("Bot test_token", Intents::default());
        let (client, _rx) = GatewayClient::new(config);
        assert_eq!(client.phase(), Phase::Disconnected);
        assert_eq!(client.sequence(), None);
        assert_eq!(client.latency(), None);
    }

    #[test]
    fn test_gateway_url_building() {
        let config = GatewayConfig::new("Bot test_token", Intents::default());
        let (client, _rx) = GatewayClient::new(config);
        let url = client.build_gateway_url().expect("valid url");
        assert!(url.as_str().contains("v=10"));
        assert!(url.as_str().contains("encoding=json"));
    }

    #[test]
    fn test_process_frame_dispatch_advances_sequence() {
        let config = GatewayConfig::new("Bot test_token", Intents::default());
        let (client, _rx) = GatewayClient::new(config);

        let frame = r#"{"op":0,"d":{"id":"42"},"s":1,"t":"MESSAGE_CREATE"}"#;
        let action = client.process_frame(frame).expect("parses");
        assert!(matches!(action, GatewayAction::Dispatch(_)));
        assert_eq!(client.sequence(), Some(1));
    }

    #[test]
    fn test_process_frame_invalid_session() {
        let config = GatewayConfig::new("Bot test_token", Intents::default());
        let (client, _rx) = GatewayClient::new(config);

        let frame = r#"{"op":9,"d":false}"#;
        let action = client.process_frame(frame).expect("parses");
        assert!(matches!(action, GatewayAction::InvalidSession(false)));
    }

    #[test]
    fn test_process_frame_heartbeat_ack() {
        let config = GatewayConfig::new("Bot test_token", Intents::default());
        let (client, _rx) = GatewayClient::new(config);

        client.heartbeat.mark_sent();
        assert!(!client.heartbeat.is_acked());

        let frame = r#"{"op":11,"d":null}"#;
        client.process_frame(frame).expect("parses");
        assert!(client.heartbeat.is_acked());
    }

    #[test]
    fn test_handle_ready_stores_session() {
        let config = GatewayConfig::new("Bot test_token", Intents::default());
        let (client, _rx) = GatewayClient::new(config);

        client.handle_ready(ReadySessionData {
            session_id: "S1".to_string(),
            resume_gateway_url: "wss://r".to_string(),
        });

        assert_eq!(client.phase(), Phase::Ready);
        assert_eq!(client.session_id.read().as_deref(), Some("S1"));
        assert_eq!(client.resume_gateway_url.read().as_deref(), Some("wss://r"));
    }
}
