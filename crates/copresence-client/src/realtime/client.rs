//! Public handle for the relay connection.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use copresence_common::{events, ConnectError, Frame};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::listeners::{ListenerSet, Subscription};

use super::connector::{Connector, WsConnector};
use super::pending::PendingSends;
use super::types::{ConnectionConfig, ConnectionStatus, TransportLink};

type ConnectAttempt = Shared<BoxFuture<'static, Result<(), ConnectError>>>;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Handle for interacting with the relay connection.
///
/// Cheap to clone; all clones share one connection. Every method except
/// [`RealtimeClient::connect`] is synchronous and never blocks on the
/// network.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

/// Non-owning handle, for callbacks registered on the client itself.
#[derive(Clone)]
pub struct WeakRealtimeClient {
    inner: Weak<Inner>,
}

impl WeakRealtimeClient {
    pub fn upgrade(&self) -> Option<RealtimeClient> {
        self.inner.upgrade().map(|inner| RealtimeClient { inner })
    }
}

struct Inner {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    listeners: Arc<ListenerSet<String, serde_json::Value>>,
    state: Mutex<ConnState>,
    status_tx: watch::Sender<ConnectionStatus>,
}

#[derive(Default)]
struct ConnState {
    /// Sender of the live transport session, if any.
    outbound: Option<mpsc::Sender<String>>,
    /// Bumped when a session is installed and on `disconnect()`. Tasks
    /// tagged with an older epoch are stale and must not touch state.
    epoch: u64,
    /// Connect cycle in flight, shared by all concurrent callers.
    attempt: Option<ConnectAttempt>,
    /// Remembered memberships, replayed after every reconnect.
    channels: BTreeSet<String>,
    pending: PendingSends,
}

impl RealtimeClient {
    /// Create a client over a custom connector. Nothing happens on the
    /// network until `connect()` or `emit()`.
    pub fn new(config: ConnectionConfig, connector: impl Connector) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                connector: Arc::new(connector),
                listeners: ListenerSet::new(),
                state: Mutex::new(ConnState::default()),
                status_tx,
            }),
        }
    }

    /// Create a client that talks WebSocket to `config.url`.
    pub fn websocket(config: ConnectionConfig) -> Self {
        let connector = WsConnector::new(&config);
        Self::new(config, connector)
    }

    pub fn downgrade(&self) -> WeakRealtimeClient {
        WeakRealtimeClient {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Connect to the relay.
    ///
    /// Idempotent: returns immediately when connected, and concurrent
    /// callers share one in-flight cycle. Fails only once the cycle has
    /// used up `max_reconnect_attempts`; a later call starts a fresh cycle.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let attempt = {
            let mut state = self.inner.lock_state();
            if state.outbound.is_some() {
                return Ok(());
            }
            match &state.attempt {
                Some(attempt) => attempt.clone(),
                None => {
                    let handle = tokio::spawn(Inner::run_connect_cycle(
                        Arc::clone(&self.inner),
                        state.epoch,
                    ));
                    let attempt = async move {
                        handle.await.unwrap_or_else(|e| {
                            Err(ConnectError::AttemptsExhausted {
                                attempts: 0,
                                last_error: format!("connect task failed: {e}"),
                            })
                        })
                    }
                    .boxed()
                    .shared();
                    state.attempt = Some(attempt.clone());
                    attempt
                }
            }
        };
        attempt.await
    }

    /// Tear down the transport and forget every listener, channel
    /// membership, and deferred send. A later `connect()` starts clean.
    pub fn disconnect(&self) {
        let outbound = {
            let mut state = self.inner.lock_state();
            state.epoch += 1;
            state.attempt = None;
            state.channels.clear();
            state.pending.clear();
            state.outbound.take()
        };
        self.inner.listeners.clear();
        self.inner.set_status(ConnectionStatus::Disconnected);
        if outbound.is_some() {
            info!(url = %self.inner.config.url, "Disconnected from relay");
        }
    }

    /// Register interest in `event`. Every registration for the same name
    /// is invoked on each occurrence.
    ///
    /// Besides relay events, `connection:connected` and
    /// `connection:disconnected` are delivered locally with a `null`
    /// payload.
    pub fn on(
        &self,
        event: &str,
        callback: impl Fn(&serde_json::Value) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.listeners.add(event.to_string(), Arc::new(callback))
    }

    /// Send one event. While disconnected, the event is parked (latest per
    /// event name wins) and a connect cycle is started.
    pub fn emit(&self, event: &str, payload: serde_json::Value) {
        let frame = match Frame::event(event, payload).to_json() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event = %event, error = %e, "Failed to serialize outbound event");
                return;
            }
        };

        let needs_connect = {
            let mut state = self.inner.lock_state();
            match &state.outbound {
                Some(tx) => match tx.try_send(frame) {
                    Ok(()) => false,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(event = %event, "Outbound queue full, dropping event");
                        false
                    }
                    Err(mpsc::error::TrySendError::Closed(frame)) => {
                        state.pending.put(event, frame);
                        false
                    }
                },
                None => {
                    state.pending.put(event, frame);
                    true
                }
            }
        };

        if needs_connect {
            self.spawn_connect();
        }
    }

    /// Drop a parked event that has not been sent yet.
    pub fn discard_pending(&self, event: &str) {
        self.inner.lock_state().pending.discard(event);
    }

    /// Join a channel. Membership is remembered and re-sent after every
    /// reconnect.
    pub fn join_channel(&self, name: &str) {
        let mut state = self.inner.lock_state();
        state.channels.insert(name.to_string());
        if let Some(tx) = &state.outbound {
            send_frame(
                tx,
                &Frame::Join {
                    channel: name.to_string(),
                },
            );
        }
        debug!(channel = %name, "Joined channel");
    }

    /// Leave a channel and stop replaying it.
    pub fn leave_channel(&self, name: &str) {
        let mut state = self.inner.lock_state();
        if !state.channels.remove(name) {
            return;
        }
        if let Some(tx) = &state.outbound {
            send_frame(
                tx,
                &Frame::Leave {
                    channel: name.to_string(),
                },
            );
        }
        debug!(channel = %name, "Left channel");
    }

    pub fn channels(&self) -> Vec<String> {
        self.inner.lock_state().channels.iter().cloned().collect()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock_state().outbound.is_some()
    }

    /// Watch connection status changes.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.inner.lock_state().pending.len()
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self, event: &str) -> usize {
        self.inner.listeners.count(event)
    }

    fn spawn_connect(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let client = self.clone();
                runtime.spawn(async move {
                    if let Err(e) = client.connect().await {
                        warn!(error = %e, "Deferred connect failed");
                    }
                });
            }
            Err(_) => debug!("No async runtime; deferred events wait for connect()"),
        }
    }
}

// ---------------------------------------------------------------------------
// Connect cycle
// ---------------------------------------------------------------------------

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, ConnState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status_tx.send_replace(status);
    }

    fn epoch(&self) -> u64 {
        self.lock_state().epoch
    }

    async fn run_connect_cycle(self: Arc<Self>, epoch: u64) -> Result<(), ConnectError> {
        let max_attempts = self.config.max_reconnect_attempts.max(1);
        let mut last_error = String::new();
        self.set_status(ConnectionStatus::Connecting);

        for attempt in 0..max_attempts {
            if self.epoch() != epoch {
                return Err(ConnectError::Disconnected);
            }

            info!(
                url = %self.config.url,
                attempt = attempt + 1,
                max_attempts,
                "Connecting to relay"
            );
            match self.connector.open().await {
                Ok(link) => {
                    return if self.install(link, epoch) {
                        Ok(())
                    } else {
                        Err(ConnectError::Disconnected)
                    };
                }
                Err(e) => {
                    warn!(error = %e, attempt = attempt + 1, "Relay connection attempt failed");
                    last_error = e.to_string();
                }
            }

            if attempt + 1 < max_attempts {
                let delay = self.config.backoff(attempt);
                info!(
                    delay_ms = delay.as_millis() as u64,
                    "Reconnecting in {:?}", delay
                );
                tokio::time::sleep(delay).await;
            }
        }

        {
            let mut state = self.lock_state();
            if state.epoch != epoch {
                return Err(ConnectError::Disconnected);
            }
            state.attempt = None;
        }
        self.set_status(ConnectionStatus::Disconnected);
        error!(attempts = max_attempts, error = %last_error, "Giving up on relay connection");
        Err(ConnectError::AttemptsExhausted {
            attempts: max_attempts,
            last_error,
        })
    }

    /// Adopt a fresh transport session: replay memberships, flush parked
    /// events, start the reader. Returns false if `disconnect()` ran while
    /// the attempt was in flight.
    fn install(self: &Arc<Self>, link: TransportLink, epoch: u64) -> bool {
        let TransportLink { outbound, inbound } = link;

        let session_epoch = {
            let mut state = self.lock_state();
            if state.epoch != epoch {
                return false;
            }
            state.epoch += 1;
            state.attempt = None;

            for channel in &state.channels {
                send_frame(
                    &outbound,
                    &Frame::Join {
                        channel: channel.clone(),
                    },
                );
            }
            for frame in state.pending.take() {
                if outbound.try_send(frame).is_err() {
                    warn!("Outbound queue full while flushing deferred events");
                }
            }
            state.outbound = Some(outbound);
            state.epoch
        };

        self.set_status(ConnectionStatus::Connected);
        info!(url = %self.config.url, "Connected to relay");
        tokio::spawn(Arc::clone(self).read_loop(inbound, session_epoch));
        self.listeners
            .emit(events::CONNECTED, &serde_json::Value::Null);
        true
    }

    async fn read_loop(self: Arc<Self>, mut inbound: mpsc::Receiver<String>, epoch: u64) {
        while let Some(text) = inbound.recv().await {
            if self.epoch() != epoch {
                return;
            }
            match Frame::parse(&text) {
                Ok(Frame::Event { event, payload }) => {
                    if self.listeners.emit(event.as_str(), &payload) == 0 {
                        debug!(event = %event, "No listeners for relay event");
                    }
                }
                Ok(other) => debug!(frame = ?other, "Ignoring non-event frame from relay"),
                Err(e) => warn!(error = %e, "Malformed frame from relay"),
            }
        }
        self.transport_closed(epoch);
    }

    /// The session ended without `disconnect()`: notify and reconnect.
    fn transport_closed(self: Arc<Self>, epoch: u64) {
        {
            let mut state = self.lock_state();
            if state.epoch != epoch {
                return;
            }
            state.outbound = None;
        }

        warn!(url = %self.config.url, "Relay connection lost");
        self.set_status(ConnectionStatus::Disconnected);
        self.listeners
            .emit(events::DISCONNECTED, &serde_json::Value::Null);

        let client = RealtimeClient { inner: self };
        tokio::spawn(async move {
            if let Err(e) = client.connect().await {
                error!(error = %e, "Reconnect failed");
            }
        });
    }
}

fn send_frame(tx: &mpsc::Sender<String>, frame: &Frame) {
    match frame.to_json() {
        Ok(json) => {
            if tx.try_send(json).is_err() {
                warn!("Outbound queue unavailable, dropping frame");
            }
        }
        Err(e) => warn!(error = %e, "Failed to serialize frame"),
    }
}
