//! Transport connectors: how a `TransportLink` is obtained.

use std::time::Duration;

use async_trait::async_trait;
use copresence_common::TransportError;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use super::types::{ConnectionConfig, TransportLink};

/// Inbound frames buffered between the socket reader and the dispatcher.
const INBOUND_BUFFER: usize = 256;

/// `interval_at` rejects a zero period.
const MIN_HEARTBEAT: Duration = Duration::from_millis(100);

/// Opens one transport session per call.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self) -> Result<TransportLink, TransportError>;
}

// ---------------------------------------------------------------------------
// WebSocket connector
// ---------------------------------------------------------------------------

/// Connects to the relay over WebSocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
    heartbeat_interval: Duration,
    outbound_buffer: usize,
}

impl WsConnector {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            url: config.url.clone(),
            connect_timeout: config.connect_timeout,
            heartbeat_interval: config.heartbeat_interval,
            outbound_buffer: config.outbound_buffer.max(1),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self) -> Result<TransportLink, TransportError> {
        let (ws_stream, _) = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(self.url.as_str()),
        )
        .await
        .map_err(|_| TransportError::Timeout(self.connect_timeout))?
        .map_err(|e| TransportError::Connect(e.to_string()))?;

        info!(url = %self.url, "WebSocket connected");

        let (mut ws_write, mut ws_read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(self.outbound_buffer);
        let (in_tx, in_rx) = mpsc::channel::<String>(INBOUND_BUFFER);

        // Writer: outbound frames plus heartbeat pings. Ends when the
        // connection layer drops its sender or the socket rejects a write.
        let heartbeat_interval = self.heartbeat_interval.max(MIN_HEARTBEAT);
        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval_at(
                tokio::time::Instant::now() + heartbeat_interval,
                heartbeat_interval,
            );
            loop {
                tokio::select! {
                    frame = out_rx.recv() => {
                        let Some(frame) = frame else {
                            let _ = ws_write.send(WsMessage::Close(None)).await;
                            break;
                        };
                        if let Err(e) = ws_write.send(WsMessage::Text(frame.into())).await {
                            debug!(error = %e, "WebSocket write failed");
                            break;
                        }
                    }
                    _ = heartbeat.tick() => {
                        if ws_write.send(WsMessage::Ping(Default::default())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        // Reader: text frames go to the connection layer. Dropping `in_tx`
        // on exit is what signals the session ended.
        tokio::spawn(async move {
            while let Some(msg) = ws_read.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        if in_tx.send(text.as_str().to_owned()).await.is_err() {
                            break;
                        }
                    }
                    Ok(WsMessage::Close(_)) => {
                        info!("Relay closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
