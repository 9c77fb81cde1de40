// SPDX-License-Identifier: MIT OR Apache-2.0
//! The websocket session driver.
//!
//! One driver task owns the socket for the lifetime of a session,
//! including reconnects. Outbound frames arrive over a command
//! channel and are written strictly one at a time; inbound text
//! frames are handed to the engine for dispatch.

use crate::config::SessionConfig;
use crate::engine::EngineInner;
use futures::{SinkExt, StreamExt};
use srl_data::Notice;
use srl_protocol::{SessionUrl, SessionUrlError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, client_async_tls};
use tracing::{debug, info, warn};

/// Lifecycle states of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No socket; either never connected or torn down.
    Disconnected,
    /// Resolving the host name.
    Resolving,
    /// Opening the TCP connection.
    Connecting,
    /// Running the TLS handshake (`wss` only).
    TlsHandshake,
    /// Running the websocket upgrade.
    WsHandshake,
    /// Fully connected.
    Connected,
    /// Graceful close in progress.
    Closing,
}

/// Errors surfaced by session setup and teardown.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session URL did not parse.
    #[error("invalid session url: {0}")]
    Url(#[from] SessionUrlError),
    /// Name resolution, connect or socket I/O failed.
    #[error("transport error: {0}")]
    Transport(String),
    /// Resolve + connect + handshake exceeded the configured budget.
    #[error("handshake timed out")]
    HandshakeTimeout,
    /// The engine's I/O runtime could not be used.
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Commands accepted by the driver task.
#[derive(Debug)]
pub(crate) enum Command {
    /// Send one text frame; writes happen strictly in order.
    Frame(String),
    /// Close the socket and end the session.
    Close,
}

/// State shared between the engine handle and the driver task.
#[derive(Debug)]
pub(crate) struct SessionShared {
    state: Mutex<SessionState>,
    desired: AtomicBool,
}

impl SessionShared {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Disconnected),
            desired: AtomicBool::new(true),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SessionState) {
        *self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub(crate) fn desired(&self) -> bool {
        self.desired.load(Ordering::SeqCst)
    }

    pub(crate) fn shut_down(&self) {
        self.desired.store(false, Ordering::SeqCst);
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Drive the session: connect, pump frames, reconnect with back-off
/// until told to stop or the attempt budget runs out.
pub(crate) async fn run(
    engine: Arc<EngineInner>,
    url: SessionUrl,
    config: SessionConfig,
    mut outbound: mpsc::UnboundedReceiver<Command>,
    shared: Arc<SessionShared>,
) {
    let mut attempts = 0u32;

    while shared.desired() {
        match establish(&url, &config, &shared).await {
            Ok(stream) => {
                attempts = 0;
                info!(host = url.host(), channel = url.channel(), "session connected");
                let reason = pump(&engine, stream, &mut outbound, &config, &shared).await;
                shared.set_state(SessionState::Disconnected);
                info!(reason = %reason, "session dropped");
                engine.publish(Notice::LiveConnectionChanged(false));
            }
            Err(err) => {
                shared.set_state(SessionState::Disconnected);
                warn!(error = %err, host = url.host(), "session setup failed");
            }
        }

        if !shared.desired() {
            break;
        }

        attempts += 1;
        if attempts > config.max_reconnect_attempts {
            warn!(
                attempts = config.max_reconnect_attempts,
                "giving up on reconnecting"
            );
            break;
        }
        debug!(attempt = attempts, "waiting before reconnect");
        tokio::time::sleep(config.reconnect_delay).await;
    }

    shared.set_state(SessionState::Disconnected);
}

/// Resolve, connect and hand-shake under one timeout.
async fn establish(
    url: &SessionUrl,
    config: &SessionConfig,
    shared: &SessionShared,
) -> Result<WsStream, SessionError> {
    let setup = async {
        shared.set_state(SessionState::Resolving);
        let mut addresses = tokio::net::lookup_host(url.authority())
            .await
            .map_err(|err| SessionError::Transport(err.to_string()))?;
        let address = addresses
            .next()
            .ok_or_else(|| SessionError::Transport("host resolved to no addresses".into()))?;

        shared.set_state(SessionState::Connecting);
        let tcp = TcpStream::connect(address)
            .await
            .map_err(|err| SessionError::Transport(err.to_string()))?;

        shared.set_state(if url.is_secure() {
            SessionState::TlsHandshake
        } else {
            SessionState::WsHandshake
        });
        let (stream, _response) = client_async_tls(url.to_string(), tcp)
            .await
            .map_err(|err| SessionError::Transport(err.to_string()))?;

        shared.set_state(SessionState::Connected);
        Ok(stream)
    };

    match timeout(config.handshake_timeout, setup).await {
        Ok(result) => result,
        Err(_) => Err(SessionError::HandshakeTimeout),
    }
}

/// The connected read/write loop. Returns the reason the connection
/// ended.
async fn pump(
    engine: &Arc<EngineInner>,
    mut stream: WsStream,
    outbound: &mut mpsc::UnboundedReceiver<Command>,
    config: &SessionConfig,
    shared: &SessionShared,
) -> String {
    let mut ping = interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut missed_pings = 0u32;

    loop {
        tokio::select! {
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => engine.on_frame(text.as_str()),
                    Some(Ok(Message::Pong(_))) => missed_pings = 0,
                    Some(Ok(Message::Close(_))) | None => return "closed by peer".into(),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return err.to_string(),
                }
            }
            command = outbound.recv() => {
                match command {
                    Some(Command::Frame(frame)) => {
                        if let Err(err) = stream.send(Message::Text(frame.into())).await {
                            return err.to_string();
                        }
                    }
                    Some(Command::Close) | None => {
                        shared.set_state(SessionState::Closing);
                        let _ = stream.close(None).await;
                        return "closed locally".into();
                    }
                }
            }
            _ = ping.tick() => {
                if missed_pings >= 2 {
                    return "keepalive timed out".into();
                }
                missed_pings += 1;
                if let Err(err) = stream.send(Message::Ping(Bytes::new())).await {
                    return err.to_string();
                }
            }
        }
    }
}
