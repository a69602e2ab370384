//! Translation of client presence events into what peers receive.

use copresence_common::protocol::{
    CursorMovePayload, EditingChangedPayload, EditingPayload, JoinPayload, LocationPayload,
    UserRefPayload, UsersListPayload,
};
use copresence_common::{events, ConnectionId, Frame, PresenceRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::hub::Hub;

/// Frames produced by one client event.
#[derive(Debug, Default, PartialEq)]
pub struct Routing {
    /// Sent back to the originating connection.
    pub reply: Option<Frame>,
    /// Sent to every other connection sharing a channel with the origin.
    pub broadcast: Option<Frame>,
}

impl Routing {
    fn broadcast(frame: Frame) -> Self {
        Self {
            reply: None,
            broadcast: Some(frame),
        }
    }
}

/// Apply one client event to the hub and decide who hears about it.
pub async fn route_event(
    hub: &Hub,
    id: &ConnectionId,
    event: &str,
    payload: serde_json::Value,
) -> Routing {
    match event {
        events::JOIN => on_join(hub, id, &payload).await,
        events::CURSOR_MOVE => on_cursor_move(hub, id, &payload).await,
        events::EDITING => on_editing(hub, id, &payload).await,
        events::PAGE_CHANGE => on_page_change(hub, id, &payload).await,
        events::IDLE => on_idle(hub, id, &payload).await,
        events::LEAVE => on_leave(hub, id, &payload).await,
        _ => {
            debug!(conn = %id, event = %event, "Forwarding event verbatim");
            Routing::broadcast(Frame::event(event, payload))
        }
    }
}

/// `presence:user_left` for a record, if the connection had announced one.
pub fn departure(record: &PresenceRecord) -> Option<Frame> {
    frame(
        events::USER_LEFT,
        &UserRefPayload {
            user_id: record.user_id.clone(),
        },
    )
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn on_join(hub: &Hub, id: &ConnectionId, payload: &serde_json::Value) -> Routing {
    let Some(join) = parse::<JoinPayload>(events::JOIN, payload) else {
        return Routing::default();
    };
    let channel = join
        .channel
        .clone()
        .unwrap_or_else(|| join.location.channel_name());
    hub.join(id, &channel).await;

    let Some(record) = hub
        .update_presence(id, &join.user_id, |record| {
            *record = PresenceRecord {
                user_id: join.user_id.clone(),
                user_name: Some(join.user_name.clone()),
                user_avatar: join.user_avatar.clone(),
                cursor: Some(join.cursor),
                is_idle: Some(false),
                ..PresenceRecord::default()
            }
            .with_location(&join.location);
        })
        .await
    else {
        return Routing::default();
    };

    let users = hub.snapshot_for(id).await;
    debug!(conn = %id, user_id = %record.user_id, peers = users.len(), "Presence join");
    Routing {
        reply: frame(events::USERS_LIST, &UsersListPayload { users }),
        broadcast: frame(events::USER_JOINED, &record),
    }
}

async fn on_cursor_move(hub: &Hub, id: &ConnectionId, payload: &serde_json::Value) -> Routing {
    let Some(moved) = parse::<CursorMovePayload>(events::CURSOR_MOVE, payload) else {
        return Routing::default();
    };
    let record = hub
        .update_presence(id, &moved.user_id, |record| {
            record.cursor = Some(moved.cursor);
            record.is_idle = Some(false);
            record.page = Some(moved.location.page);
            record.page_id = moved.location.page_id.clone();
        })
        .await;
    Routing {
        reply: None,
        broadcast: record.and_then(|record| frame(events::CURSOR_MOVED, &record)),
    }
}

async fn on_editing(hub: &Hub, id: &ConnectionId, payload: &serde_json::Value) -> Routing {
    let Some(editing) = parse::<EditingPayload>(events::EDITING, payload) else {
        return Routing::default();
    };
    hub.update_presence(id, &editing.user_id, |record| {
        record.editing_item = if editing.is_editing {
            editing.item_id.clone()
        } else {
            None
        };
    })
    .await;
    Routing {
        reply: None,
        broadcast: frame(
            events::EDITING_CHANGED,
            &EditingChangedPayload {
                user_id: editing.user_id,
                item_id: editing.item_id,
                is_editing: editing.is_editing,
            },
        ),
    }
}

async fn on_page_change(hub: &Hub, id: &ConnectionId, payload: &serde_json::Value) -> Routing {
    let Some(change) = parse::<LocationPayload>(events::PAGE_CHANGE, payload) else {
        return Routing::default();
    };
    let record = hub
        .update_presence(id, &change.user_id, |record| {
            record.page = Some(change.location.page);
            record.page_id = change.location.page_id.clone();
        })
        .await;
    // Receivers treat `user_joined` as an upsert.
    Routing {
        reply: None,
        broadcast: record.and_then(|record| frame(events::USER_JOINED, &record)),
    }
}

async fn on_idle(hub: &Hub, id: &ConnectionId, payload: &serde_json::Value) -> Routing {
    let Some(idle) = parse::<LocationPayload>(events::IDLE, payload) else {
        return Routing::default();
    };
    hub.update_presence(id, &idle.user_id, |record| record.is_idle = Some(true))
        .await;
    Routing {
        reply: None,
        broadcast: frame(
            events::USER_IDLE,
            &UserRefPayload {
                user_id: idle.user_id,
            },
        ),
    }
}

async fn on_leave(hub: &Hub, id: &ConnectionId, payload: &serde_json::Value) -> Routing {
    let Some(leave) = parse::<LocationPayload>(events::LEAVE, payload) else {
        return Routing::default();
    };
    hub.clear_presence(id).await;
    debug!(conn = %id, user_id = %leave.user_id, "Presence leave");
    Routing {
        reply: None,
        broadcast: frame(
            events::USER_LEFT,
            &UserRefPayload {
                user_id: leave.user_id,
            },
        ),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse<T: DeserializeOwned>(event: &str, payload: &serde_json::Value) -> Option<T> {
    match serde_json::from_value(payload.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(event = %event, error = %e, "Malformed presence payload");
            None
        }
    }
}

fn frame(event: &str, payload: &impl Serialize) -> Option<Frame> {
    match serde_json::to_value(payload) {
        Ok(value) => Some(Frame::event(event, value)),
        Err(e) => {
            warn!(event = %event, error = %e, "Failed to encode presence payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    async fn joined(hub: &Hub, user_id: &str) -> ConnectionId {
        let id = ConnectionId::new();
        let (tx, _rx) = mpsc::channel(8);
        hub.register(id.clone(), tx).await;
        route_event(
            hub,
            &id,
            events::JOIN,
            json!({
                "user_id": user_id,
                "user_name": user_id.to_uppercase(),
                "page": "delivery",
                "page_id": "42",
                "cursor": { "x": 0.0, "y": 0.0, "viewport_width": 800.0, "viewport_height": 600.0 }
            }),
        )
        .await;
        id
    }

    fn event_of(frame: &Option<Frame>) -> (&str, &serde_json::Value) {
        match frame {
            Some(Frame::Event { event, payload }) => (event.as_str(), payload),
            other => panic!("expected an event frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn join_replies_with_snapshot_and_announces() {
        let hub = Hub::new();
        let _a = joined(&hub, "u1").await;

        let b = ConnectionId::new();
        let (tx, _rx) = mpsc::channel(8);
        hub.register(b.clone(), tx).await;
        let routing = route_event(
            &hub,
            &b,
            events::JOIN,
            json!({
                "user_id": "u2",
                "user_name": "Bob",
                "page": "delivery",
                "page_id": "42",
                "cursor": { "x": 0.0, "y": 0.0, "viewport_width": 1.0, "viewport_height": 1.0 }
            }),
        )
        .await;

        let (event, payload) = event_of(&routing.reply);
        assert_eq!(event, events::USERS_LIST);
        assert_eq!(payload["users"][0]["user_id"], "u1");
        assert_eq!(payload["users"].as_array().unwrap().len(), 1);

        let (event, payload) = event_of(&routing.broadcast);
        assert_eq!(event, events::USER_JOINED);
        assert_eq!(payload["user_name"], "Bob");
        assert_eq!(payload["page_id"], "42");
    }

    #[tokio::test]
    async fn join_with_explicit_channel_joins_that_channel() {
        let hub = Hub::new();
        let a = ConnectionId::new();
        let (tx, _rx) = mpsc::channel(8);
        hub.register(a.clone(), tx).await;
        route_event(
            &hub,
            &a,
            events::JOIN,
            json!({
                "user_id": "u1",
                "user_name": "Ada",
                "page": "service",
                "page_id": "billing",
                "channel": "delivery:42",
                "cursor": { "x": 0.0, "y": 0.0, "viewport_width": 1.0, "viewport_height": 1.0 }
            }),
        )
        .await;

        let peer = hub.unregister(&a).await.unwrap();
        assert_eq!(peer.channels.len(), 1);
        assert!(peer.channels.contains("delivery:42"));
        assert_eq!(peer.presence.unwrap().page_id.as_deref(), Some("billing"));
    }

    #[tokio::test]
    async fn cursor_move_broadcasts_full_record() {
        let hub = Hub::new();
        let a = joined(&hub, "u1").await;
        let routing = route_event(
            &hub,
            &a,
            events::CURSOR_MOVE,
            json!({
                "user_id": "u1", "page": "delivery", "page_id": "42",
                "x": 120.0, "y": 340.0, "viewport_width": 800.0, "viewport_height": 600.0
            }),
        )
        .await;

        assert!(routing.reply.is_none());
        let (event, payload) = event_of(&routing.broadcast);
        assert_eq!(event, events::CURSOR_MOVED);
        assert_eq!(payload["user_name"], "U1");
        assert_eq!(payload["cursor"]["x"], 120.0);
        assert_eq!(payload["cursor"]["y"], 340.0);
    }

    #[tokio::test]
    async fn editing_becomes_editing_changed() {
        let hub = Hub::new();
        let a = joined(&hub, "u1").await;
        let routing = route_event(
            &hub,
            &a,
            events::EDITING,
            json!({ "user_id": "u1", "page": "delivery", "page_id": "42", "item_id": "c1", "is_editing": true }),
        )
        .await;
        let (event, payload) = event_of(&routing.broadcast);
        assert_eq!(event, events::EDITING_CHANGED);
        assert_eq!(payload, &json!({ "user_id": "u1", "item_id": "c1", "is_editing": true }));

        let snapshot = hub.unregister(&a).await.unwrap().presence.unwrap();
        assert_eq!(snapshot.editing_item.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn idle_and_leave_translate_to_user_refs() {
        let hub = Hub::new();
        let a = joined(&hub, "u1").await;
        let location = json!({ "user_id": "u1", "page": "delivery", "page_id": "42" });

        let idle = route_event(&hub, &a, events::IDLE, location.clone()).await;
        assert_eq!(event_of(&idle.broadcast), (events::USER_IDLE, &json!({ "user_id": "u1" })));

        let leave = route_event(&hub, &a, events::LEAVE, location).await;
        assert_eq!(event_of(&leave.broadcast), (events::USER_LEFT, &json!({ "user_id": "u1" })));
        assert!(hub.clear_presence(&a).await.is_none());
    }

    #[tokio::test]
    async fn page_change_is_announced_as_upsert() {
        let hub = Hub::new();
        let a = joined(&hub, "u1").await;
        let routing = route_event(
            &hub,
            &a,
            events::PAGE_CHANGE,
            json!({ "user_id": "u1", "page": "service", "page_id": "s" }),
        )
        .await;
        let (event, payload) = event_of(&routing.broadcast);
        assert_eq!(event, events::USER_JOINED);
        assert_eq!(payload["page"], "service");
        assert_eq!(payload["user_name"], "U1");
    }

    #[tokio::test]
    async fn unknown_events_pass_through() {
        let hub = Hub::new();
        let a = joined(&hub, "u1").await;
        let routing = route_event(&hub, &a, "board:node_moved", json!({ "id": 3 })).await;
        assert_eq!(
            routing,
            Routing {
                reply: None,
                broadcast: Some(Frame::event("board:node_moved", json!({ "id": 3 }))),
            }
        );
    }

    #[tokio::test]
    async fn malformed_presence_payload_routes_nowhere() {
        let hub = Hub::new();
        let a = joined(&hub, "u1").await;
        let routing = route_event(&hub, &a, events::CURSOR_MOVE, json!({ "x": "left" })).await;
        assert_eq!(routing, Routing::default());
    }
}
