//! Wire protocol shared by the presence client and the relay.
//!
//! Two layers: the transport envelope (`Frame`), which the relay uses to
//! scope broadcasts by channel, and the presence payloads that ride
//! inside `Frame::Event`.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Event names carried in `Frame::Event`.
pub mod events {
    // Outbound (client -> relay).
    pub const JOIN: &str = "presence:join";
    pub const LEAVE: &str = "presence:leave";
    pub const CURSOR_MOVE: &str = "presence:cursor_move";
    pub const EDITING: &str = "presence:editing";
    pub const PAGE_CHANGE: &str = "presence:page_change";
    pub const IDLE: &str = "presence:idle";

    // Inbound (relay -> client).
    pub const USER_JOINED: &str = "presence:user_joined";
    pub const USER_LEFT: &str = "presence:user_left";
    pub const CURSOR_MOVED: &str = "presence:cursor_moved";
    pub const EDITING_CHANGED: &str = "presence:editing_changed";
    pub const USERS_LIST: &str = "presence:users_list";
    pub const USER_IDLE: &str = "presence:user_idle";

    // Local lifecycle notifications, never sent on the wire.
    pub const CONNECTED: &str = "connection:connected";
    pub const DISCONNECTED: &str = "connection:disconnected";
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One JSON text frame on the relay connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Advisory channel membership.
    Join { channel: String },
    Leave { channel: String },
    /// A named event with an arbitrary JSON payload.
    Event {
        event: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

impl Frame {
    pub fn event(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::Event {
            event: event.into(),
            payload,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

// ---------------------------------------------------------------------------
// Shared types
// ---------------------------------------------------------------------------

/// Top-level area of the shared workspace a participant is looking at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    #[default]
    Workspace,
    Project,
    Delivery,
    Service,
}

impl Page {
    pub fn as_str(self) -> &'static str {
        match self {
            Page::Workspace => "workspace",
            Page::Project => "project",
            Page::Delivery => "delivery",
            Page::Service => "service",
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in the shared application a participant currently is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub page: Page,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
}

impl Location {
    pub fn new(page: Page, page_id: Option<String>) -> Self {
        Self { page, page_id }
    }

    pub fn workspace() -> Self {
        Self::default()
    }

    pub fn project(id: impl Into<String>) -> Self {
        Self::new(Page::Project, Some(id.into()))
    }

    pub fn delivery(id: impl Into<String>) -> Self {
        Self::new(Page::Delivery, Some(id.into()))
    }

    pub fn service(id: impl Into<String>) -> Self {
        Self::new(Page::Service, Some(id.into()))
    }

    /// Relay channel scoping this location, e.g. `delivery:42`.
    pub fn channel_name(&self) -> String {
        match &self.page_id {
            Some(id) => format!("{}:{id}", self.page),
            None => self.page.to_string(),
        }
    }
}

/// Pointer position in viewport coordinates, plus the viewport it was
/// captured in so receivers can rescale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub x: f64,
    pub y: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
}

impl Cursor {
    /// A zeroed pointer inside a viewport of the given size.
    pub fn origin(viewport_width: f64, viewport_height: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            viewport_width,
            viewport_height,
        }
    }
}

/// A presence record as it travels over the wire.
///
/// Every field except `user_id` is optional: inbound records are partial
/// upserts, and missing fields keep whatever the receiver already knows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<Page>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editing_item: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_idle: Option<bool>,
}

impl PresenceRecord {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// The record's location, if it carries one.
    pub fn location(&self) -> Option<Location> {
        self.page.map(|page| Location::new(page, self.page_id.clone()))
    }

    pub fn with_location(mut self, location: &Location) -> Self {
        self.page = Some(location.page);
        self.page_id = location.page_id.clone();
        self
    }
}

// ---------------------------------------------------------------------------
// Outbound payloads
// ---------------------------------------------------------------------------

/// Payload of `presence:join`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPayload {
    pub user_id: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_avatar: Option<String>,
    #[serde(flatten)]
    pub location: Location,
    pub cursor: Cursor,
    /// Channel to join when it differs from the location's own, as after
    /// navigating within a session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// Payload of `presence:leave`, `presence:page_change` and `presence:idle`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPayload {
    pub user_id: String,
    #[serde(flatten)]
    pub location: Location,
}

/// Payload of `presence:cursor_move`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorMovePayload {
    pub user_id: String,
    #[serde(flatten)]
    pub location: Location,
    #[serde(flatten)]
    pub cursor: Cursor,
}

/// Payload of `presence:editing`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditingPayload {
    pub user_id: String,
    #[serde(flatten)]
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub is_editing: bool,
}

// ---------------------------------------------------------------------------
// Inbound payloads
// ---------------------------------------------------------------------------

/// Payload of `presence:user_left` and `presence:user_idle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRefPayload {
    pub user_id: String,
}

/// Payload of `presence:editing_changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditingChangedPayload {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub is_editing: bool,
}

/// Payload of `presence:users_list`, the snapshot sent after a join.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsersListPayload {
    #[serde(default)]
    pub users: Vec<PresenceRecord>,
}
