//! WebSocket connection to the optimization service, with auto-reconnect.
//!
//! One supervisor task owns at most one live socket at a time. Inbound frames
//! are decoded and forwarded over an event channel; callers observe the
//! connection through `watch` channels instead of callbacks, and teardown is
//! driven by a cancellation token checked at every suspension point.

use std::sync::Arc;
use std::time::Duration;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{watch, Notify};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use greenwave_shared::{decode_frame, ClientFrame, ServerMessage};

/// Close code for a caller-initiated shutdown. Never retried.
pub const CLEAN_CLOSE_CODE: u16 = 1000;
/// Close code used when the transport drops without a close frame.
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;

/// Lifecycle phase of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionPhase {
    /// True while a connect attempt is in flight or a socket is live.
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionPhase::Connecting | ConnectionPhase::Open)
    }
}

/// Exponential backoff policy for reconnect attempts.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt `attempt` (0-indexed): `min(base * 2^attempt, max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(31);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Whether a close with `code` after `attempt` prior retries should be
    /// retried. A clean close is never retried; exhaustion stops retrying
    /// until the caller reconnects explicitly.
    pub fn should_retry(&self, code: u16, attempt: u32) -> bool {
        code != CLEAN_CLOSE_CODE && attempt < self.max_attempts
    }
}

/// Connection lifecycle events, delivered in transport order.
#[derive(Debug, Clone, PartialEq)]
pub enum WsEvent {
    Opened,
    Message(ServerMessage),
    Closed { code: u16 },
    Error { message: String },
}

/// Cloneable handle for sending frames through the connection.
#[derive(Debug, Clone)]
pub struct WsHandle {
    sender: UnboundedSender<ClientFrame>,
}

impl WsHandle {
    /// Queue a frame for sending. Fails once the connection is torn down.
    pub fn send(&self, frame: ClientFrame) -> Result<(), String> {
        self.sender
            .unbounded_send(frame)
            .map_err(|e| format!("failed to queue frame: {e}"))
    }
}

/// A managed WebSocket connection to the optimization service.
pub struct WsConnection {
    url: String,
    phase: Arc<watch::Sender<ConnectionPhase>>,
    connected: Arc<watch::Sender<bool>>,
    sender: UnboundedSender<ClientFrame>,
    cancel: CancellationToken,
    connect_signal: Arc<Notify>,
}

impl WsConnection {
    /// Create the connection machinery without dialing. Events are delivered
    /// on `events`; call [`connect`](Self::connect) to start dialing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        url: impl Into<String>,
        policy: ReconnectPolicy,
        events: UnboundedSender<WsEvent>,
    ) -> Self {
        let url = url.into();
        let (sender, outbound) = unbounded();
        let phase = Arc::new(watch::Sender::new(ConnectionPhase::Idle));
        let connected = Arc::new(watch::Sender::new(false));
        let cancel = CancellationToken::new();
        let connect_signal = Arc::new(Notify::new());

        tokio::spawn(run_supervisor(
            url.clone(),
            policy,
            phase.clone(),
            connected.clone(),
            events,
            outbound,
            cancel.clone(),
            connect_signal.clone(),
        ));

        Self {
            url,
            phase,
            connected,
            sender,
            cancel,
            connect_signal,
        }
    }

    /// Start (or restart) dialing. A no-op while an attempt is in flight, a
    /// socket is open, or after [`disconnect`](Self::disconnect).
    pub fn connect(&self) {
        if self.cancel.is_cancelled() {
            debug!(url = %self.url, "connect ignored, connection disposed");
            return;
        }
        if self.phase.borrow().is_active() {
            debug!(url = %self.url, "connect ignored, already connecting or open");
            return;
        }
        self.connect_signal.notify_one();
    }

    /// Permanently stop the machine: cancel any pending reconnect, clean-close
    /// a live socket, and drop into `Closed`. No event fired after this call
    /// is observed by consumers. There is no resurrection; build a new
    /// connection to dial again.
    pub fn disconnect(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        if self.phase.borrow().is_active() {
            self.phase.send_replace(ConnectionPhase::Closing);
        }
        info!(url = %self.url, "disconnecting stream");
        self.cancel.cancel();
    }

    /// Handle for sending outbound frames.
    pub fn handle(&self) -> WsHandle {
        WsHandle {
            sender: self.sender.clone(),
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Observe the connected flag across reconnects.
    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    pub fn watch_phase(&self) -> watch::Receiver<ConnectionPhase> {
        self.phase.subscribe()
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Supervisor: waits for a connect request, then runs dial/retry cycles until
/// the policy gives up or the token is cancelled.
#[allow(clippy::too_many_arguments)]
async fn run_supervisor(
    url: String,
    policy: ReconnectPolicy,
    phase: Arc<watch::Sender<ConnectionPhase>>,
    connected: Arc<watch::Sender<bool>>,
    events: UnboundedSender<WsEvent>,
    mut outbound: UnboundedReceiver<ClientFrame>,
    cancel: CancellationToken,
    connect_signal: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = connect_signal.notified() => {}
        }
        let ended_clean = run_connect_cycle(
            &url,
            &policy,
            &phase,
            &connected,
            &events,
            &mut outbound,
            &cancel,
        )
        .await;
        if cancel.is_cancelled() {
            break;
        }
        if ended_clean {
            // A connect() queued while the cycle ran must not redial a
            // stream that has since closed cleanly.
            let _ = connect_signal.notified().now_or_never();
        }
    }
    connected.send_replace(false);
    phase.send_replace(ConnectionPhase::Closed);
}

/// One dial cycle: connect, drive the session, and retry per policy until a
/// clean close, exhaustion, or cancellation. Returns true when the cycle
/// ended in a clean close.
async fn run_connect_cycle(
    url: &str,
    policy: &ReconnectPolicy,
    phase: &watch::Sender<ConnectionPhase>,
    connected: &watch::Sender<bool>,
    events: &UnboundedSender<WsEvent>,
    outbound: &mut UnboundedReceiver<ClientFrame>,
    cancel: &CancellationToken,
) -> bool {
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return false;
        }
        phase.send_replace(ConnectionPhase::Connecting);
        info!(url, attempt, "connecting to stream");

        let dialed = tokio::select! {
            _ = cancel.cancelled() => return false,
            result = connect_async(url) => result,
        };

        let close_code = match dialed {
            Ok((stream, _response)) => {
                phase.send_replace(ConnectionPhase::Open);
                connected.send_replace(true);
                attempt = 0;
                let _ = events.unbounded_send(WsEvent::Opened);
                info!(url, "stream connected");

                let code = drive_session(stream, events, outbound, cancel).await;

                connected.send_replace(false);
                phase.send_replace(ConnectionPhase::Closed);
                let _ = events.unbounded_send(WsEvent::Closed { code });
                info!(url, code, "stream closed");
                code
            }
            Err(e) => {
                warn!(url, error = %e, "stream connect failed");
                phase.send_replace(ConnectionPhase::Closed);
                let _ = events.unbounded_send(WsEvent::Error {
                    message: e.to_string(),
                });
                ABNORMAL_CLOSE_CODE
            }
        };

        if cancel.is_cancelled() || !policy.should_retry(close_code, attempt) {
            if close_code != CLEAN_CLOSE_CODE {
                warn!(url, attempt, "not retrying, waiting for explicit connect");
            }
            return close_code == CLEAN_CLOSE_CODE;
        }

        let delay = policy.delay_for_attempt(attempt);
        attempt += 1;
        info!(url, delay_ms = delay.as_millis() as u64, attempt, "reconnect scheduled");
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Pump one live socket until it closes. Returns the close code.
async fn drive_session(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    events: &UnboundedSender<WsEvent>,
    outbound: &mut UnboundedReceiver<ClientFrame>,
    cancel: &CancellationToken,
) -> u16 {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client disconnect".into(),
                    })))
                    .await;
                return CLEAN_CLOSE_CODE;
            }
            frame = outbound.next() => match frame {
                Some(frame) => match serde_json::to_string(&frame) {
                    Ok(json) => {
                        debug!(kind = %frame.kind, "sending frame");
                        if let Err(e) = write.send(Message::text(json)).await {
                            warn!(error = %e, "stream send failed");
                            return ABNORMAL_CLOSE_CODE;
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to encode outbound frame"),
                },
                // Every send handle is gone; treat as client shutdown.
                None => return CLEAN_CLOSE_CODE,
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => match decode_frame(text.as_str()) {
                    Ok(Some(msg)) => {
                        let _ = events.unbounded_send(WsEvent::Message(msg));
                    }
                    Ok(None) => debug!("ignoring frame with unknown type tag"),
                    Err(e) => warn!(error = %e, "dropping malformed frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    return frame
                        .map(|f| u16::from(f.code))
                        .unwrap_or(ABNORMAL_CLOSE_CODE);
                }
                // Pong replies are handled by tungstenite itself.
                Some(Ok(Message::Ping(_))) => {}
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.unbounded_send(WsEvent::Error {
                        message: e.to_string(),
                    });
                    return ABNORMAL_CLOSE_CODE;
                }
                None => return ABNORMAL_CLOSE_CODE,
            }
        }
    }
}
