//! The registry itself: records, throttling, idle timer, notifications.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use chrono::Utc;
use copresence_common::{Cursor, Location, PresenceRecord};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::identity::Identity;
use crate::listeners::{ListenerSet, Subscription};
use crate::throttle::Throttle;

use super::types::{PeerPresence, RegistryConfig, RegistryEvent, RegistryEventKind};

/// Per-process view of who is here.
///
/// Cheap to clone; clones share state. All mutation is serialized behind
/// one lock, and listeners are invoked after it is released, so a
/// listener may call back into the registry.
#[derive(Clone)]
pub struct PresenceRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    config: RegistryConfig,
    state: Mutex<RegistryState>,
    listeners: Arc<ListenerSet<RegistryEventKind, RegistryEvent>>,
}

struct RegistryState {
    users: BTreeMap<String, PeerPresence>,
    local_user_id: Option<String>,
    throttle: Throttle,
    idle: IdleTimer,
}

/// Idle timer for the local user. `generation` is bumped on every re-arm
/// so an expiry from an older arm is ignored.
#[derive(Default)]
struct IdleTimer {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl IdleTimer {
    fn disarm(&mut self) {
        self.generation += 1;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl RegistryState {
    /// Existing record for `user_id`, or a new default one. Creation is
    /// reported as `UserJoined`.
    fn entry(&mut self, user_id: &str, events: &mut Vec<RegistryEvent>) -> &mut PeerPresence {
        let peer = match self.users.entry(user_id.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let peer = PeerPresence::new(user_id);
                events.push(RegistryEvent::UserJoined(peer.clone()));
                entry.insert(peer)
            }
        };
        peer.last_seen = Utc::now();
        peer
    }

    fn is_local(&self, user_id: &str) -> bool {
        self.local_user_id.as_deref() == Some(user_id)
    }
}

impl PresenceRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(RegistryState {
                    users: BTreeMap::new(),
                    local_user_id: None,
                    throttle: Throttle::new(config.cursor_throttle),
                    idle: IdleTimer::default(),
                }),
                listeners: ListenerSet::new(),
            }),
        }
    }

    pub fn config(&self) -> RegistryConfig {
        self.inner.config
    }

    /// Subscribe to one kind of registry event.
    pub fn on(
        &self,
        kind: RegistryEventKind,
        callback: impl Fn(&RegistryEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.listeners.add(kind, Arc::new(callback))
    }

    // -- Mutations ----------------------------------------------------------

    /// Declare the local participant and reset its record: zeroed cursor in
    /// a viewport of the given size, not idle, not editing. Arms the idle
    /// timer.
    pub fn set_local_user(
        &self,
        identity: &Identity,
        location: Location,
        viewport_width: f64,
        viewport_height: f64,
    ) {
        let events = {
            let mut state = self.inner.lock_state();
            let mut events = Vec::new();

            if let Some(previous) = state.local_user_id.take() {
                if previous != identity.user_id {
                    state.users.remove(&previous);
                    state.throttle.forget(&previous);
                }
            }

            let mut peer = PeerPresence::new(identity.user_id.as_str());
            peer.display_name = identity.display_name.clone();
            peer.avatar_ref = identity.avatar_ref.clone();
            peer.location = location;
            peer.cursor = Cursor::origin(viewport_width, viewport_height);

            if !state.users.contains_key(&identity.user_id) {
                events.push(RegistryEvent::UserJoined(peer.clone()));
            }
            state.users.insert(identity.user_id.clone(), peer);
            state.local_user_id = Some(identity.user_id.clone());
            state.throttle.forget(&identity.user_id);
            self.inner.arm_idle(&mut state);
            events
        };
        info!(user_id = %identity.user_id, "Local presence initialized");
        self.inner.dispatch(events);
    }

    /// Upsert a peer from a (possibly partial) wire record. Emits
    /// `UserJoined` only the first time `user_id` is seen.
    pub fn set_user(&self, record: &PresenceRecord) {
        let events = {
            let mut state = self.inner.lock_state();
            let mut events = Vec::new();
            state.entry(&record.user_id, &mut events).merge(record);
            events
        };
        self.inner.dispatch(events);
    }

    /// Remove a peer. Unknown ids are a silent no-op.
    pub fn remove_user(&self, user_id: &str) {
        let removed = {
            let mut state = self.inner.lock_state();
            let removed = state.users.remove(user_id).is_some();
            if removed {
                state.throttle.forget(user_id);
                if state.is_local(user_id) {
                    state.local_user_id = None;
                    state.idle.disarm();
                }
            }
            removed
        };
        if removed {
            self.inner.dispatch(vec![RegistryEvent::UserLeft {
                user_id: user_id.to_string(),
            }]);
        }
    }

    /// Move `user_id`'s pointer, keeping its last known viewport.
    ///
    /// Returns false when the update arrived within the throttle interval
    /// of the previously accepted one and was dropped.
    pub fn update_cursor(&self, user_id: &str, x: f64, y: f64) -> bool {
        self.update_cursor_at(user_id, x, y, None, Instant::now())
    }

    /// Like [`Self::update_cursor`], also replacing the viewport size.
    pub fn update_cursor_with_viewport(&self, user_id: &str, cursor: Cursor) -> bool {
        self.update_cursor_at(
            user_id,
            cursor.x,
            cursor.y,
            Some((cursor.viewport_width, cursor.viewport_height)),
            Instant::now(),
        )
    }

    pub(crate) fn update_cursor_at(
        &self,
        user_id: &str,
        x: f64,
        y: f64,
        viewport: Option<(f64, f64)>,
        now: Instant,
    ) -> bool {
        let events = {
            let mut state = self.inner.lock_state();
            if !state.throttle.allow(user_id, now) {
                debug!(user_id = %user_id, "Cursor update throttled");
                return false;
            }

            let mut events = Vec::new();
            let peer = state.entry(user_id, &mut events);
            peer.cursor.x = x;
            peer.cursor.y = y;
            if let Some((width, height)) = viewport {
                peer.cursor.viewport_width = width;
                peer.cursor.viewport_height = height;
            }
            peer.is_idle = false;
            events.push(RegistryEvent::CursorMoved(peer.clone()));

            if state.is_local(user_id) {
                self.inner.arm_idle(&mut state);
            }
            events
        };
        self.inner.dispatch(events);
        true
    }

    /// Record a viewport resize without moving the pointer.
    pub fn set_viewport(&self, user_id: &str, viewport_width: f64, viewport_height: f64) {
        let mut state = self.inner.lock_state();
        if let Some(peer) = state.users.get_mut(user_id) {
            peer.cursor.viewport_width = viewport_width;
            peer.cursor.viewport_height = viewport_height;
            peer.last_seen = Utc::now();
        }
    }

    /// Claim `item_id` for `user_id`. A claim on a different item first
    /// releases the previous one; repeating the current claim is a no-op.
    pub fn start_editing(&self, user_id: &str, item_id: &str) {
        let events = {
            let mut state = self.inner.lock_state();
            let mut events = Vec::new();
            let peer = state.entry(user_id, &mut events);
            if peer.editing_item.as_deref() == Some(item_id) {
                return;
            }
            if let Some(previous) = peer.editing_item.take() {
                events.push(RegistryEvent::EditingStopped {
                    user_id: user_id.to_string(),
                    item_id: previous,
                });
            }
            peer.editing_item = Some(item_id.to_string());
            events.push(RegistryEvent::EditingStarted {
                user_id: user_id.to_string(),
                item_id: item_id.to_string(),
            });
            events
        };
        self.inner.dispatch(events);
    }

    /// Release `user_id`'s claim, if any.
    pub fn stop_editing(&self, user_id: &str) {
        let event = {
            let mut state = self.inner.lock_state();
            let Some(peer) = state.users.get_mut(user_id) else {
                return;
            };
            peer.last_seen = Utc::now();
            peer.editing_item
                .take()
                .map(|item_id| RegistryEvent::EditingStopped {
                    user_id: user_id.to_string(),
                    item_id,
                })
        };
        if let Some(event) = event {
            self.inner.dispatch(vec![event]);
        }
    }

    /// Move `user_id` to another location. Cursor and edit state are kept.
    pub fn update_page(&self, user_id: &str, location: Location) {
        let events = {
            let mut state = self.inner.lock_state();
            let mut events = Vec::new();
            state.entry(user_id, &mut events).location = location;
            events
        };
        self.inner.dispatch(events);
    }

    /// Apply an idle state declared by the peer itself. Emits `UserIdle`
    /// once per transition; returns whether the state changed.
    pub fn mark_idle(&self, user_id: &str) -> bool {
        let event = {
            let mut state = self.inner.lock_state();
            match state.users.get_mut(user_id) {
                Some(peer) if !peer.is_idle => {
                    peer.is_idle = true;
                    peer.last_seen = Utc::now();
                    RegistryEvent::UserIdle(peer.clone())
                }
                Some(_) => return false,
                None => {
                    debug!(user_id = %user_id, "Idle notice for unknown user");
                    return false;
                }
            }
        };
        self.inner.dispatch(vec![event]);
        true
    }

    /// Drop every record, the local user included. Silent.
    pub fn clear(&self) {
        let mut state = self.inner.lock_state();
        state.users.clear();
        state.local_user_id = None;
        state.throttle.clear();
        state.idle.disarm();
    }

    /// Drop every record except the local user's, emitting `UserLeft` for
    /// each.
    pub fn clear_remote(&self) {
        let events: Vec<RegistryEvent> = {
            let mut state = self.inner.lock_state();
            let local = state.local_user_id.clone();
            let removed: Vec<String> = state
                .users
                .keys()
                .filter(|id| Some(id.as_str()) != local.as_deref())
                .cloned()
                .collect();
            for user_id in &removed {
                state.users.remove(user_id);
            }
            state
                .throttle
                .retain(|id| Some(id) == local.as_deref());
            removed
                .into_iter()
                .map(|user_id| RegistryEvent::UserLeft { user_id })
                .collect()
        };
        if !events.is_empty() {
            debug!(count = events.len(), "Cleared remote presence");
        }
        self.inner.dispatch(events);
    }

    // -- Queries ------------------------------------------------------------

    /// The first claimant of `item_id` in `user_id` order. Claims are
    /// advisory, so several users may hold the same item; see
    /// [`Self::editors_of`].
    pub fn is_item_being_edited(&self, item_id: &str) -> Option<PeerPresence> {
        self.inner
            .lock_state()
            .users
            .values()
            .find(|peer| peer.editing_item.as_deref() == Some(item_id))
            .cloned()
    }

    /// Every current claimant of `item_id`.
    pub fn editors_of(&self, item_id: &str) -> Vec<PeerPresence> {
        self.inner
            .lock_state()
            .users
            .values()
            .filter(|peer| peer.editing_item.as_deref() == Some(item_id))
            .cloned()
            .collect()
    }

    pub fn user(&self, user_id: &str) -> Option<PeerPresence> {
        self.inner.lock_state().users.get(user_id).cloned()
    }

    pub fn current_user(&self) -> Option<PeerPresence> {
        let state = self.inner.lock_state();
        let local = state.local_user_id.as_deref()?;
        state.users.get(local).cloned()
    }

    pub fn local_user_id(&self) -> Option<String> {
        self.inner.lock_state().local_user_id.clone()
    }

    pub fn all_users(&self) -> Vec<PeerPresence> {
        self.inner.lock_state().users.values().cloned().collect()
    }

    /// Everyone except the local user.
    pub fn other_users(&self) -> Vec<PeerPresence> {
        let state = self.inner.lock_state();
        state
            .users
            .values()
            .filter(|peer| !state.is_local(&peer.user_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock_state().users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, events: Vec<RegistryEvent>) {
        for event in &events {
            self.listeners.emit(&event.kind(), event);
        }
    }

    /// (Re)start the local user's idle countdown.
    fn arm_idle(self: &Arc<Self>, state: &mut RegistryState) {
        state.idle.disarm();
        let generation = state.idle.generation;

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime; idle detection disabled");
            return;
        };
        let weak: Weak<Inner> = Arc::downgrade(self);
        let timeout = self.config.idle_timeout;
        state.idle.task = Some(runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.idle_expired(generation);
            }
        }));
    }

    fn idle_expired(&self, generation: u64) {
        let event = {
            let mut state = self.lock_state();
            if state.idle.generation != generation {
                return;
            }
            state.idle.task = None;
            let Some(local) = state.local_user_id.clone() else {
                return;
            };
            match state.users.get_mut(&local) {
                Some(peer) if !peer.is_idle => {
                    peer.is_idle = true;
                    RegistryEvent::UserIdle(peer.clone())
                }
                _ => return,
            }
        };
        info!(user_id = %event.user_id(), "Local user idle");
        self.dispatch(vec![event]);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .idle
            .disarm();
    }
}
