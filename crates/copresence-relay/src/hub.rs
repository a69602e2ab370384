//! Connection registry: who is connected, which channels they joined, and
//! the presence record each one announced.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use copresence_common::{ConnectionId, PresenceRecord};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// One connected client.
pub struct Peer {
    pub tx: mpsc::Sender<String>,
    pub channels: HashSet<String>,
    /// Set by `presence:join`, cleared by `presence:leave`.
    pub presence: Option<PresenceRecord>,
}

/// Thread-safe registry of connected clients.
#[derive(Clone, Default)]
pub struct Hub {
    peers: Arc<RwLock<HashMap<ConnectionId, Peer>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: ConnectionId, tx: mpsc::Sender<String>) {
        self.peers.write().await.insert(
            id,
            Peer {
                tx,
                channels: HashSet::new(),
                presence: None,
            },
        );
    }

    /// Forget a connection, returning what it left behind.
    pub async fn unregister(&self, id: &ConnectionId) -> Option<Peer> {
        self.peers.write().await.remove(id)
    }

    pub async fn join(&self, id: &ConnectionId, channel: &str) {
        if let Some(peer) = self.peers.write().await.get_mut(id) {
            if peer.channels.insert(channel.to_string()) {
                debug!(conn = %id, channel = %channel, "Joined channel");
            }
        }
    }

    pub async fn leave(&self, id: &ConnectionId, channel: &str) {
        if let Some(peer) = self.peers.write().await.get_mut(id) {
            if peer.channels.remove(channel) {
                debug!(conn = %id, channel = %channel, "Left channel");
            }
        }
    }

    /// Apply `update` to the connection's presence record, creating it for
    /// `user_id` if none was announced yet. Returns the updated record.
    pub async fn update_presence(
        &self,
        id: &ConnectionId,
        user_id: &str,
        update: impl FnOnce(&mut PresenceRecord),
    ) -> Option<PresenceRecord> {
        let mut peers = self.peers.write().await;
        let peer = peers.get_mut(id)?;
        let record = peer
            .presence
            .get_or_insert_with(|| PresenceRecord::new(user_id));
        update(record);
        Some(record.clone())
    }

    pub async fn clear_presence(&self, id: &ConnectionId) -> Option<PresenceRecord> {
        self.peers.write().await.get_mut(id)?.presence.take()
    }

    /// Presence records of every other announced connection sharing at
    /// least one channel with `id`.
    pub async fn snapshot_for(&self, id: &ConnectionId) -> Vec<PresenceRecord> {
        let peers = self.peers.read().await;
        let Some(me) = peers.get(id) else {
            return Vec::new();
        };
        peers
            .iter()
            .filter(|(other, peer)| *other != id && shares_channel(&me.channels, &peer.channels))
            .filter_map(|(_, peer)| peer.presence.clone())
            .collect()
    }

    /// Send `frame` to every other connection sharing a channel with `id`.
    pub async fn broadcast(&self, id: &ConnectionId, frame: &str) -> usize {
        let channels = match self.peers.read().await.get(id) {
            Some(peer) => peer.channels.clone(),
            None => return 0,
        };
        self.broadcast_to(&channels, id, frame).await
    }

    /// Send `frame` to every connection other than `exclude` that is in
    /// one of `channels`.
    pub async fn broadcast_to(
        &self,
        channels: &HashSet<String>,
        exclude: &ConnectionId,
        frame: &str,
    ) -> usize {
        let peers = self.peers.read().await;
        let mut delivered = 0;
        for (id, peer) in peers.iter() {
            if id == exclude || !shares_channel(channels, &peer.channels) {
                continue;
            }
            match peer.tx.try_send(frame.to_string()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(conn = %id, "Peer queue full, dropping frame");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(conn = %id, "Peer channel closed");
                }
            }
        }
        delivered
    }

    /// Number of connected clients.
    pub async fn count(&self) -> usize {
        self.peers.read().await.len()
    }
}

fn shares_channel(a: &HashSet<String>, b: &HashSet<String>) -> bool {
    !a.is_disjoint(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connect(hub: &Hub) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(8);
        hub.register(id.clone(), tx).await;
        (id, rx)
    }

    #[tokio::test]
    async fn broadcast_reaches_channel_peers_only() {
        let hub = Hub::new();
        let (a, mut rx_a) = connect(&hub).await;
        let (b, mut rx_b) = connect(&hub).await;
        let (c, mut rx_c) = connect(&hub).await;
        hub.join(&a, "delivery:42").await;
        hub.join(&b, "delivery:42").await;
        hub.join(&c, "delivery:7").await;

        assert_eq!(hub.broadcast(&a, "hello").await, 1);
        assert_eq!(rx_b.recv().await.as_deref(), Some("hello"));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn leave_stops_delivery() {
        let hub = Hub::new();
        let (a, _rx_a) = connect(&hub).await;
        let (b, mut rx_b) = connect(&hub).await;
        hub.join(&a, "x").await;
        hub.join(&b, "x").await;
        hub.leave(&b, "x").await;

        assert_eq!(hub.broadcast(&a, "hello").await, 0);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn snapshot_lists_announced_channel_peers() {
        let hub = Hub::new();
        let (a, _rx_a) = connect(&hub).await;
        let (b, _rx_b) = connect(&hub).await;
        let (c, _rx_c) = connect(&hub).await;
        for id in [&a, &b, &c] {
            hub.join(id, "x").await;
        }
        hub.update_presence(&b, "u2", |_| {}).await;

        let snapshot = hub.snapshot_for(&a).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].user_id, "u2");
    }

    #[tokio::test]
    async fn unregister_returns_state() {
        let hub = Hub::new();
        let (a, _rx) = connect(&hub).await;
        hub.join(&a, "x").await;
        hub.update_presence(&a, "u1", |r| r.is_idle = Some(true)).await;

        let peer = hub.unregister(&a).await.unwrap();
        assert!(peer.channels.contains("x"));
        assert_eq!(peer.presence.unwrap().is_idle, Some(true));
        assert_eq!(hub.count().await, 0);
    }
}
