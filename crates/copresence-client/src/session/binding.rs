//! `PresenceSession`: wires one participant to the client and registry.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use copresence_common::protocol::{
    CursorMovePayload, EditingPayload, JoinPayload, LocationPayload,
};
use copresence_common::{events, Cursor, Location, SessionError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::identity::Identity;
use crate::listeners::Subscription;
use crate::realtime::{RealtimeClient, WeakRealtimeClient};
use crate::registry::{PresenceRegistry, RegistryEvent, RegistryEventKind};

use super::inbound;
use super::types::SessionState;

/// Outbound presence events that may sit in the client's deferred slots.
const OUTBOUND_EVENTS: [&str; 6] = [
    events::JOIN,
    events::LEAVE,
    events::CURSOR_MOVE,
    events::EDITING,
    events::PAGE_CHANGE,
    events::IDLE,
];

/// One local participant present in one workspace location.
///
/// `inactive → joining → active → leaving → inactive`. Dropping an
/// active session leaves it.
pub struct PresenceSession {
    client: RealtimeClient,
    registry: PresenceRegistry,
    identity: Identity,
    shared: Arc<Mutex<SessionShared>>,
}

#[derive(Default)]
struct SessionShared {
    state: SessionState,
    location: Location,
    /// Channel joined on `enter()`; `navigate()` does not change it.
    channel: String,
    /// Set when the transport drops; the next connect re-announces us.
    needs_rejoin: bool,
    subscriptions: Vec<Subscription>,
}

/// What the session's own callbacks need, without owning the session.
#[derive(Clone)]
struct Announcer {
    client: WeakRealtimeClient,
    registry: PresenceRegistry,
    user_id: String,
    shared: Weak<Mutex<SessionShared>>,
}

impl PresenceSession {
    pub fn new(client: RealtimeClient, registry: PresenceRegistry, identity: Identity) -> Self {
        Self {
            client,
            registry,
            identity,
            shared: Arc::new(Mutex::new(SessionShared::default())),
        }
    }

    pub fn state(&self) -> SessionState {
        self.lock_shared().state
    }

    pub fn location(&self) -> Location {
        self.lock_shared().location.clone()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    pub fn client(&self) -> &RealtimeClient {
        &self.client
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Enter `location`: initialize the local record, subscribe to relay
    /// events, join the location's channel, announce ourselves, and wait
    /// for the connection.
    ///
    /// On connect failure everything done here is undone and the session
    /// is `Inactive` again.
    pub async fn enter(
        &self,
        location: Location,
        viewport_width: f64,
        viewport_height: f64,
    ) -> Result<(), SessionError> {
        {
            let mut shared = self.lock_shared();
            if shared.state != SessionState::Inactive {
                return Err(SessionError::AlreadyActive);
            }
            shared.state = SessionState::Joining;
            shared.location = location.clone();
            shared.channel = location.channel_name();
            shared.needs_rejoin = false;
        }

        let channel = location.channel_name();
        info!(user_id = %self.identity.user_id, channel = %channel, "Entering presence session");

        self.registry
            .set_local_user(&self.identity, location.clone(), viewport_width, viewport_height);

        let mut subscriptions = inbound::register(&self.client, &self.registry, &self.identity.user_id);
        subscriptions.extend(self.register_lifecycle());
        self.lock_shared().subscriptions = subscriptions;

        self.client.join_channel(&channel);
        self.announcer().announce();

        match self.client.connect().await {
            Ok(()) => {
                let mut shared = self.lock_shared();
                if shared.state == SessionState::Joining {
                    shared.state = SessionState::Active;
                }
                Ok(())
            }
            Err(e) => {
                warn!(channel = %channel, error = %e, "Presence session failed to connect");
                self.client.discard_pending(events::JOIN);
                self.teardown();
                Err(SessionError::Connect(e))
            }
        }
    }

    /// Leave the current location: tell peers, drop every subscription,
    /// leave the channel, clear the registry. A no-op when inactive.
    pub fn leave(&self) {
        let (location, channel, subscriptions) = {
            let mut shared = self.lock_shared();
            if shared.state == SessionState::Inactive {
                return;
            }
            shared.state = SessionState::Leaving;
            (
                shared.location.clone(),
                std::mem::take(&mut shared.channel),
                std::mem::take(&mut shared.subscriptions),
            )
        };
        info!(user_id = %self.identity.user_id, channel = %channel, "Leaving presence session");

        if self.client.is_connected() {
            emit(
                &self.client,
                events::LEAVE,
                &LocationPayload {
                    user_id: self.identity.user_id.clone(),
                    location,
                },
            );
        }
        for event in OUTBOUND_EVENTS {
            self.client.discard_pending(event);
        }
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        self.client.leave_channel(&channel);
        self.registry.clear();
        self.lock_shared().state = SessionState::Inactive;
    }

    fn teardown(&self) {
        let (channel, subscriptions) = {
            let mut shared = self.lock_shared();
            shared.state = SessionState::Leaving;
            (
                std::mem::take(&mut shared.channel),
                std::mem::take(&mut shared.subscriptions),
            )
        };
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        self.client.leave_channel(&channel);
        self.registry.clear();
        self.lock_shared().state = SessionState::Inactive;
    }

    // -- Local input --------------------------------------------------------

    /// Forward a local pointer move. Returns true when it passed the
    /// throttle and was sent.
    pub fn pointer_moved(&self, x: f64, y: f64) -> bool {
        let Some(location) = self.active_location() else {
            return false;
        };
        let user_id = &self.identity.user_id;
        if !self.registry.update_cursor(user_id, x, y) {
            return false;
        }
        let cursor = self
            .registry
            .user(user_id)
            .map_or(Cursor { x, y, ..Cursor::default() }, |me| me.cursor);
        emit(
            &self.client,
            events::CURSOR_MOVE,
            &CursorMovePayload {
                user_id: user_id.clone(),
                location,
                cursor,
            },
        );
        true
    }

    /// Record a viewport resize; sent with the next pointer move.
    pub fn resize_viewport(&self, viewport_width: f64, viewport_height: f64) {
        self.registry
            .set_viewport(&self.identity.user_id, viewport_width, viewport_height);
    }

    /// Declare intent to edit `item_id`. Any previous claim is released.
    pub fn start_editing(&self, item_id: &str) -> Result<(), SessionError> {
        let location = self.active_location().ok_or(SessionError::NotActive)?;
        self.registry.start_editing(&self.identity.user_id, item_id);
        emit(
            &self.client,
            events::EDITING,
            &EditingPayload {
                user_id: self.identity.user_id.clone(),
                location,
                item_id: Some(item_id.to_string()),
                is_editing: true,
            },
        );
        Ok(())
    }

    /// Release the current edit claim, if any.
    pub fn stop_editing(&self) -> Result<(), SessionError> {
        let location = self.active_location().ok_or(SessionError::NotActive)?;
        let user_id = &self.identity.user_id;
        let Some(item_id) = self.registry.user(user_id).and_then(|me| me.editing_item) else {
            debug!(user_id = %user_id, "stop_editing without a claim");
            return Ok(());
        };
        self.registry.stop_editing(user_id);
        emit(
            &self.client,
            events::EDITING,
            &EditingPayload {
                user_id: user_id.clone(),
                location,
                item_id: Some(item_id),
                is_editing: false,
            },
        );
        Ok(())
    }

    /// Move to another page of the same workspace. The channel joined on
    /// `enter()` is kept.
    pub fn navigate(&self, location: Location) -> Result<(), SessionError> {
        {
            let mut shared = self.lock_shared();
            if shared.state != SessionState::Active {
                return Err(SessionError::NotActive);
            }
            shared.location = location.clone();
        }
        self.registry
            .update_page(&self.identity.user_id, location.clone());
        emit(
            &self.client,
            events::PAGE_CHANGE,
            &LocationPayload {
                user_id: self.identity.user_id.clone(),
                location,
            },
        );
        Ok(())
    }

    // -- Internals ----------------------------------------------------------

    fn lock_shared(&self) -> MutexGuard<'_, SessionShared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active_location(&self) -> Option<Location> {
        let shared = self.lock_shared();
        (shared.state == SessionState::Active).then(|| shared.location.clone())
    }

    fn announcer(&self) -> Announcer {
        Announcer {
            client: self.client.downgrade(),
            registry: self.registry.clone(),
            user_id: self.identity.user_id.clone(),
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Reconnect handling and idle propagation.
    fn register_lifecycle(&self) -> Vec<Subscription> {
        let on_disconnected = {
            let announcer = self.announcer();
            self.client.on(events::DISCONNECTED, move |_| {
                announcer.registry.clear_remote();
                if let Some(shared) = announcer.shared.upgrade() {
                    shared
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .needs_rejoin = true;
                }
            })
        };

        let on_connected = {
            let announcer = self.announcer();
            self.client.on(events::CONNECTED, move |_| {
                let rejoin = announcer.shared.upgrade().is_some_and(|shared| {
                    std::mem::take(
                        &mut shared
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .needs_rejoin,
                    )
                });
                if rejoin {
                    debug!(user_id = %announcer.user_id, "Re-announcing after reconnect");
                    announcer.announce();
                }
            })
        };

        let on_idle = {
            let announcer = self.announcer();
            self.registry
                .on(RegistryEventKind::UserIdle, move |event: &RegistryEvent| {
                    if event.user_id() == announcer.user_id {
                        announcer.announce_idle();
                    }
                })
        };

        vec![on_disconnected, on_connected, on_idle]
    }
}

impl Drop for PresenceSession {
    fn drop(&mut self) {
        self.leave();
    }
}

impl Announcer {
    /// Current location and the channel joined on `enter()`.
    fn position(&self) -> Option<(Location, String)> {
        let shared = self.shared.upgrade()?;
        let shared = shared.lock().unwrap_or_else(PoisonError::into_inner);
        Some((shared.location.clone(), shared.channel.clone()))
    }

    /// Send `presence:join` with our current record. The relay joins us to
    /// the entered channel even when we have navigated since.
    fn announce(&self) {
        let (Some(client), Some((location, channel))) = (self.client.upgrade(), self.position())
        else {
            return;
        };
        let Some(me) = self.registry.user(&self.user_id) else {
            debug!(user_id = %self.user_id, "No local record to announce");
            return;
        };
        emit(
            &client,
            events::JOIN,
            &JoinPayload {
                user_id: me.user_id,
                user_name: me.display_name,
                user_avatar: me.avatar_ref,
                channel: (channel != location.channel_name()).then_some(channel),
                location,
                cursor: me.cursor,
            },
        );
    }

    fn announce_idle(&self) {
        let (Some(client), Some((location, _))) = (self.client.upgrade(), self.position()) else {
            return;
        };
        emit(
            &client,
            events::IDLE,
            &LocationPayload {
                user_id: self.user_id.clone(),
                location,
            },
        );
    }
}

fn emit(client: &RealtimeClient, event: &str, payload: &impl Serialize) {
    match serde_json::to_value(payload) {
        Ok(value) => client.emit(event, value),
        Err(e) => warn!(event = %event, error = %e, "Failed to encode presence payload"),
    }
}
