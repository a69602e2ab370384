//! Configuration, record, and event types for the presence registry.

use std::time::Duration;

use chrono::{DateTime, Utc};
use copresence_common::{Cursor, Location, PresenceRecord};
use copresence_config::CopresenceConfig;
use serde::Serialize;

use crate::color::color_for;

/// Display name used for peers first seen without one.
pub const UNKNOWN_DISPLAY_NAME: &str = "Anonymous";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Minimum spacing between accepted cursor updates per user.
    pub cursor_throttle: Duration,
    /// Inactivity after which the local user is marked idle.
    pub idle_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cursor_throttle: Duration::from_millis(50),
            idle_timeout: Duration::from_millis(30_000),
        }
    }
}

impl From<&CopresenceConfig> for RegistryConfig {
    fn from(config: &CopresenceConfig) -> Self {
        Self {
            cursor_throttle: config.presence.cursor_throttle(),
            idle_timeout: config.presence.idle_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Everything known about one participant, including the local one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerPresence {
    pub user_id: String,
    pub display_name: String,
    pub avatar_ref: Option<String>,
    /// Derived from `user_id`; identical in every process.
    pub color: String,
    pub location: Location,
    pub cursor: Cursor,
    pub editing_item: Option<String>,
    pub is_idle: bool,
    pub last_seen: DateTime<Utc>,
}

impl PeerPresence {
    /// A fresh record with every field at its default.
    pub fn new(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            color: color_for(&user_id).to_string(),
            user_id,
            display_name: UNKNOWN_DISPLAY_NAME.to_string(),
            avatar_ref: None,
            location: Location::default(),
            cursor: Cursor::default(),
            editing_item: None,
            is_idle: false,
            last_seen: Utc::now(),
        }
    }

    /// Overlay the fields present in `record`. `color` on the wire is
    /// ignored; it is always derived locally.
    pub(crate) fn merge(&mut self, record: &PresenceRecord) {
        if let Some(name) = &record.user_name {
            self.display_name = name.clone();
        }
        if let Some(avatar) = &record.user_avatar {
            self.avatar_ref = Some(avatar.clone());
        }
        if let Some(page) = record.page {
            self.location = Location::new(page, record.page_id.clone());
        }
        if let Some(cursor) = record.cursor {
            self.cursor = cursor;
        }
        if record.editing_item.is_some() {
            self.editing_item = record.editing_item.clone();
        }
        if let Some(idle) = record.is_idle {
            self.is_idle = idle;
        }
        self.last_seen = Utc::now();
    }

    /// Wire form of this record.
    pub fn to_record(&self) -> PresenceRecord {
        PresenceRecord {
            user_id: self.user_id.clone(),
            user_name: Some(self.display_name.clone()),
            user_avatar: self.avatar_ref.clone(),
            color: Some(self.color.clone()),
            page: Some(self.location.page),
            page_id: self.location.page_id.clone(),
            cursor: Some(self.cursor),
            editing_item: self.editing_item.clone(),
            is_idle: Some(self.is_idle),
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// State changes published by the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    UserJoined(PeerPresence),
    UserLeft { user_id: String },
    CursorMoved(PeerPresence),
    EditingStarted { user_id: String, item_id: String },
    EditingStopped { user_id: String, item_id: String },
    UserIdle(PeerPresence),
}

/// Subscription key for [`RegistryEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryEventKind {
    UserJoined,
    UserLeft,
    CursorMoved,
    EditingStarted,
    EditingStopped,
    UserIdle,
}

impl RegistryEvent {
    pub fn kind(&self) -> RegistryEventKind {
        match self {
            Self::UserJoined(_) => RegistryEventKind::UserJoined,
            Self::UserLeft { .. } => RegistryEventKind::UserLeft,
            Self::CursorMoved(_) => RegistryEventKind::CursorMoved,
            Self::EditingStarted { .. } => RegistryEventKind::EditingStarted,
            Self::EditingStopped { .. } => RegistryEventKind::EditingStopped,
            Self::UserIdle(_) => RegistryEventKind::UserIdle,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Self::UserJoined(peer) | Self::CursorMoved(peer) | Self::UserIdle(peer) => {
                &peer.user_id
            }
            Self::UserLeft { user_id }
            | Self::EditingStarted { user_id, .. }
            | Self::EditingStopped { user_id, .. } => user_id,
        }
    }
}
