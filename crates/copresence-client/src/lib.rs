//! Real-time presence for a shared workspace.
//!
//! Three layers, leaf first:
//!
//! - [`realtime`]: one resilient connection to the relay with channel
//!   membership, event pub/sub, and reconnect.
//! - [`registry`]: the per-process record of every participant, with cursor
//!   throttling and idle detection.
//! - [`session`]: binds one local participant to both for the time they
//!   spend in a workspace location.

pub mod color;
pub mod identity;
mod listeners;
pub mod realtime;
pub mod registry;
pub mod session;
pub mod throttle;

#[cfg(test)]
pub(crate) mod testing;

pub use color::{color_for, PALETTE};
pub use identity::Identity;
pub use listeners::Subscription;
pub use realtime::{ConnectionConfig, ConnectionStatus, Connector, RealtimeClient, WsConnector};
pub use registry::{PeerPresence, PresenceRegistry, RegistryConfig, RegistryEvent, RegistryEventKind};
pub use session::{PresenceSession, SessionState};

pub use copresence_common::{Cursor, Location, Page};
