//! Per-connection handler: register, route frames, clean up.

use std::net::SocketAddr;

use copresence_common::{ConnectionId, Frame};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::hub::Hub;
use crate::presence::{departure, route_event};

/// Frames buffered per connection before broadcasts to it are dropped.
const PEER_BUFFER: usize = 256;

/// Handle a single WebSocket connection until it closes.
pub async fn handle_connection<S>(ws: WebSocketStream<S>, addr: SocketAddr, hub: Hub)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    let id = ConnectionId::new();
    let (tx, mut rx) = mpsc::channel::<String>(PEER_BUFFER);
    hub.register(id.clone(), tx).await;

    tracing::info!(peer = %addr, conn = %id, "Client connected");

    loop {
        tokio::select! {
            // Broadcasts from peers → this client's WebSocket
            Some(msg) = rx.recv() => {
                if sink.send(Message::Text(msg.into())).await.is_err() {
                    break;
                }
            }

            // Frames from this client
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if handle_frame(&hub, &id, text.as_str(), &mut sink).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    tracing::info!(peer = %addr, conn = %id, "Client disconnected");

    // Tell the rooms it was in, unless it already said goodbye.
    if let Some(peer) = hub.unregister(&id).await {
        if let Some(frame) = peer.presence.as_ref().and_then(departure) {
            if let Ok(json) = frame.to_json() {
                hub.broadcast_to(&peer.channels, &id, &json).await;
            }
        }
    }
}

/// Apply one text frame. Errors only when the reply could not be written.
async fn handle_frame<S>(
    hub: &Hub,
    id: &ConnectionId,
    text: &str,
    sink: &mut SplitSink<WebSocketStream<S>, Message>,
) -> Result<(), tokio_tungstenite::tungstenite::Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = match Frame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(conn = %id, error = %e, "Malformed frame");
            return Ok(());
        }
    };

    match frame {
        Frame::Join { channel } => hub.join(id, &channel).await,
        Frame::Leave { channel } => hub.leave(id, &channel).await,
        Frame::Event { event, payload } => {
            let routing = route_event(hub, id, &event, payload).await;
            if let Some(reply) = routing.reply {
                match reply.to_json() {
                    Ok(json) => sink.send(Message::Text(json.into())).await?,
                    Err(e) => tracing::warn!(conn = %id, error = %e, "Failed to encode reply"),
                }
            }
            if let Some(broadcast) = routing.broadcast {
                match broadcast.to_json() {
                    Ok(json) => {
                        let delivered = hub.broadcast(id, &json).await;
                        tracing::trace!(conn = %id, event = %event, delivered, "Broadcast");
                    }
                    Err(e) => tracing::warn!(conn = %id, error = %e, "Failed to encode broadcast"),
                }
            }
        }
    }
    Ok(())
}
