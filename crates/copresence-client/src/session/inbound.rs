//! Relay events to registry mutations.

use std::sync::Arc;

use copresence_common::protocol::{EditingChangedPayload, UserRefPayload, UsersListPayload};
use copresence_common::{events, PresenceRecord};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::listeners::Subscription;
use crate::realtime::RealtimeClient;
use crate::registry::PresenceRegistry;

/// Register every inbound presence handler on `client`. Events about
/// `local_user_id` are ignored; the local record is only ever written
/// from local input.
pub(super) fn register(
    client: &RealtimeClient,
    registry: &PresenceRegistry,
    local_user_id: &str,
) -> Vec<Subscription> {
    let local: Arc<str> = Arc::from(local_user_id);
    let mut subscriptions = Vec::with_capacity(6);

    let handle = |event: &'static str, apply: fn(&PresenceRegistry, &str, &serde_json::Value)| {
        let registry = registry.clone();
        let local = Arc::clone(&local);
        client.on(event, move |payload| apply(&registry, &local, payload))
    };

    subscriptions.push(handle(events::USER_JOINED, on_user_joined));
    subscriptions.push(handle(events::USER_LEFT, on_user_left));
    subscriptions.push(handle(events::CURSOR_MOVED, on_cursor_moved));
    subscriptions.push(handle(events::EDITING_CHANGED, on_editing_changed));
    subscriptions.push(handle(events::USERS_LIST, on_users_list));
    subscriptions.push(handle(events::USER_IDLE, on_user_idle));
    subscriptions
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn on_user_joined(registry: &PresenceRegistry, local: &str, payload: &serde_json::Value) {
    let Some(record) = parse::<PresenceRecord>(events::USER_JOINED, payload) else {
        return;
    };
    if is_self(local, &record.user_id, events::USER_JOINED) {
        return;
    }
    registry.set_user(&record);
}

fn on_user_left(registry: &PresenceRegistry, local: &str, payload: &serde_json::Value) {
    let Some(user) = parse::<UserRefPayload>(events::USER_LEFT, payload) else {
        return;
    };
    if is_self(local, &user.user_id, events::USER_LEFT) {
        return;
    }
    registry.remove_user(&user.user_id);
}

fn on_cursor_moved(registry: &PresenceRegistry, local: &str, payload: &serde_json::Value) {
    let Some(record) = parse::<PresenceRecord>(events::CURSOR_MOVED, payload) else {
        return;
    };
    if is_self(local, &record.user_id, events::CURSOR_MOVED) {
        return;
    }
    let Some(cursor) = record.cursor else {
        warn!(user_id = %record.user_id, "Cursor event without cursor");
        return;
    };
    // First sighting through a cursor event: take the descriptive fields too.
    if registry.user(&record.user_id).is_none() {
        registry.set_user(&PresenceRecord {
            cursor: None,
            ..record.clone()
        });
    }
    registry.update_cursor_with_viewport(&record.user_id, cursor);
}

fn on_editing_changed(registry: &PresenceRegistry, local: &str, payload: &serde_json::Value) {
    let Some(change) = parse::<EditingChangedPayload>(events::EDITING_CHANGED, payload) else {
        return;
    };
    if is_self(local, &change.user_id, events::EDITING_CHANGED) {
        return;
    }
    match (change.is_editing, change.item_id) {
        (true, Some(item_id)) => registry.start_editing(&change.user_id, &item_id),
        (true, None) => warn!(user_id = %change.user_id, "Editing started without item id"),
        (false, _) => registry.stop_editing(&change.user_id),
    }
}

fn on_users_list(registry: &PresenceRegistry, local: &str, payload: &serde_json::Value) {
    let Some(list) = parse::<UsersListPayload>(events::USERS_LIST, payload) else {
        return;
    };
    debug!(count = list.users.len(), "Received presence snapshot");
    for record in list.users.iter().filter(|record| record.user_id != local) {
        registry.set_user(record);
    }
}

fn on_user_idle(registry: &PresenceRegistry, local: &str, payload: &serde_json::Value) {
    let Some(user) = parse::<UserRefPayload>(events::USER_IDLE, payload) else {
        return;
    };
    if is_self(local, &user.user_id, events::USER_IDLE) {
        return;
    }
    registry.mark_idle(&user.user_id);
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse<T: DeserializeOwned>(event: &str, payload: &serde_json::Value) -> Option<T> {
    match T::deserialize(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(event = %event, error = %e, "Malformed presence payload");
            None
        }
    }
}

fn is_self(local: &str, user_id: &str, event: &str) -> bool {
    let own = local == user_id;
    if own {
        debug!(event = %event, "Ignoring relay event about the local user");
    }
    own
}
