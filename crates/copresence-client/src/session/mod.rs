//! Binding layer: one local participant in one workspace location.
//!
//! Turns local input into throttled relay events and relay events into
//! registry mutations, and owns the join / leave lifecycle.

mod binding;
mod inbound;
mod types;

#[cfg(test)]
mod tests;

pub use binding::PresenceSession;
pub use types::SessionState;
