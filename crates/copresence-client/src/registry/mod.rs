//! Presence registry: the per-process record of every known participant.
//!
//! Driven purely by method calls; it knows nothing about the transport.
//! The session layer feeds it from local input and from relay events.

mod store;
mod types;


pub use store::PresenceRegistry;
pub use types::{
    PeerPresence, RegistryConfig, RegistryEvent, RegistryEventKind, UNKNOWN_DISPLAY_NAME,
};
