use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::message::{parse_message, subscribe_request, ChainMessage, TxEvent};
use super::ChainError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection settings for the chain subscription
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// WebSocket endpoint
    pub url: String,
    /// Address whose incoming transactions are wanted
    pub merchant: String,
    /// Interval between keep-alive pings
    ///
    /// A session with no inbound frame for twice this long is dropped.
    pub keep_alive: Duration,
    /// Deadline for the TCP, TLS and WebSocket handshake
    pub connect_timeout: Duration,
    /// Wait between reconnection attempts
    pub reconnect_interval: Duration,
    /// Consecutive failed connection attempts tolerated before giving up
    pub max_reconnect_attempts: u32,
}

/// How a connected session ended
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Server closed or the socket failed; reconnect
    Disconnected,
    /// Nobody is listening for events any more
    ReceiverGone,
}

/// Subscribes to mined transactions and forwards them over a channel
pub struct ChainWatcher {
    config: WatcherConfig,
}

impl ChainWatcher {
    /// Creates a watcher
    pub const fn new(config: WatcherConfig) -> Self {
        Self { config }
    }

    /// Runs until the receiver is dropped or reconnection gives up
    ///
    /// A successful connection resets the attempt counter.
    ///
    /// # Errors
    /// Returns [`ChainError::ReconnectExhausted`] after
    /// `max_reconnect_attempts` consecutive connection failures
    pub async fn run(self, events: mpsc::Sender<TxEvent>) -> Result<(), ChainError> {
        let mut failed_attempts: u32 = 0;

        loop {
            match self.connect().await {
                Ok(stream) => {
                    failed_attempts = 0;
                    match self.session(stream, &events).await {
                        SessionEnd::ReceiverGone => {
                            info!("event receiver dropped, watcher stopping");
                            return Ok(());
                        }
                        SessionEnd::Disconnected => {
                            warn!("chain subscription disconnected");
                        }
                    }
                }
                Err(e) => {
                    failed_attempts += 1;
                    warn!(
                        attempt = failed_attempts,
                        max = self.config.max_reconnect_attempts,
                        error = %e,
                        "connection attempt failed"
                    );
                    if failed_attempts >= self.config.max_reconnect_attempts {
                        error!("max reconnection attempts reached");
                        return Err(ChainError::ReconnectExhausted(failed_attempts));
                    }
                }
            }

            if events.is_closed() {
                return Ok(());
            }
            tokio::time::sleep(self.config.reconnect_interval).await;
        }
    }

    async fn connect(&self) -> Result<WsStream, ChainError> {
        info!(url = %self.config.url, "connecting to chain stream");
        let handshake = connect_async(self.config.url.as_str());
        let (mut stream, response) = match timeout(self.config.connect_timeout, handshake).await {
            Ok(result) => result?,
            Err(_) => return Err(ChainError::Timeout(self.config.connect_timeout.as_secs())),
        };
        debug!(status = ?response.status(), "WebSocket handshake complete");

        stream
            .send(WsMessage::Text(subscribe_request(&self.config.merchant).into()))
            .await?;
        info!(merchant = %self.config.merchant, "subscription requested");

        Ok(stream)
    }

    async fn session(&self, stream: WsStream, events: &mpsc::Sender<TxEvent>) -> SessionEnd {
        let (mut write, mut read) = stream.split();

        let mut ping_interval = tokio::time::interval(self.config.keep_alive);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        ping_interval.tick().await;

        let idle_limit = self.config.keep_alive * 2;
        let mut last_inbound = Instant::now();

        loop {
            tokio::select! {
                frame = read.next() => {
                    let Some(frame) = frame else {
                        return SessionEnd::Disconnected;
                    };
                    last_inbound = Instant::now();
                    match frame {
                        Ok(WsMessage::Text(text)) => {
                            if let Some(event) = decode(text.as_str()) {
                                if events.send(event).await.is_err() {
                                    return SessionEnd::ReceiverGone;
                                }
                            }
                        }
                        Ok(WsMessage::Ping(data)) => {
                            if let Err(e) = write.send(WsMessage::Pong(data)).await {
                                warn!(error = %e, "failed to answer ping");
                                return SessionEnd::Disconnected;
                            }
                        }
                        Ok(WsMessage::Pong(_)) => {
                            debug!("received pong");
                        }
                        Ok(WsMessage::Close(frame)) => {
                            info!(?frame, "received close frame");
                            return SessionEnd::Disconnected;
                        }
                        Ok(WsMessage::Binary(_) | WsMessage::Frame(_)) => {
                            debug!("ignoring non-text frame");
                        }
                        Err(e) => {
                            warn!(error = %e, "WebSocket error");
                            return SessionEnd::Disconnected;
                        }
                    }
                }

                _ = ping_interval.tick() => {
                    let silent_for = last_inbound.elapsed();
                    if silent_for >= idle_limit {
                        warn!(silent_ms = silent_for.as_millis(), "no frames from server, dropping session");
                        return SessionEnd::Disconnected;
                    }
                    if let Err(e) = write.send(WsMessage::Ping(Vec::new().into())).await {
                        warn!(error = %e, "keep-alive ping failed");
                        return SessionEnd::Disconnected;
                    }
                    debug!("sent ping");
                }

                () = events.closed() => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return SessionEnd::ReceiverGone;
                }
            }
        }
    }
}

/// Turns a text frame into a transaction event, logging everything else
fn decode(text: &str) -> Option<TxEvent> {
    match parse_message(text) {
        Ok(ChainMessage::Subscribed(id)) => {
            info!(subscription = %id, "subscription confirmed");
            None
        }
        Ok(ChainMessage::Transaction(event)) => {
            debug!(hash = %event.hash, removed = event.removed, "transaction notification");
            Some(event)
        }
        Ok(ChainMessage::Other) => {
            debug!("ignoring unrelated message");
            None
        }
        Err(e) => {
            warn!(error = %e, "failed to parse chain message");
            None
        }
    }
}
