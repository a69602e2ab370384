//! copresence-relay: rendezvous service for presence clients.
//!
//! Accepts WebSocket connections, tracks channel membership per
//! connection, and fans events out to every other connection sharing a
//! channel. Presence events are translated into the inbound forms clients
//! expect (`presence:join` becomes `presence:user_joined`, and so on);
//! anything else is forwarded untouched.

pub mod connection;
pub mod hub;
pub mod presence;

use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

pub use connection::handle_connection;
pub use hub::Hub;

/// Accept connections on `listener` forever.
pub async fn serve(listener: TcpListener, hub: Hub) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let hub = hub.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, hub).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
