//! Connection layer: one resilient logical connection to the relay.
//!
//! Provides named-channel membership, event pub/sub multiplexed over a
//! single transport, bounded reconnection with backoff, and replay of
//! channel memberships after every reconnect. Listeners live here rather
//! than on the transport session, so a reconnect never loses them.

mod client;
mod connector;
mod pending;
mod types;


pub use client::{RealtimeClient, WeakRealtimeClient};
pub use connector::{Connector, WsConnector};
pub use types::{ConnectionConfig, ConnectionStatus, TransportLink};
