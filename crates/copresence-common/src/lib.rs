pub mod errors;
pub mod id;
pub mod protocol;

pub use errors::{ConfigError, ConnectError, CopresenceError, SessionError, TransportError};
pub use id::{new_id, ConnectionId};
pub use protocol::{events, Cursor, Frame, Location, Page, PresenceRecord};
