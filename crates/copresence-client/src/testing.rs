//! In-memory transport for unit tests.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use copresence_common::{Frame, TransportError};
use tokio::sync::{mpsc, Mutex};

use crate::realtime::{ConnectionConfig, Connector, RealtimeClient, TransportLink};

/// Relay side of one mock transport session.
pub(crate) struct RemoteEnd {
    /// Frames the client sent.
    pub(crate) from_client: mpsc::Receiver<String>,
    /// Push frames to the client. Dropping it ends the session.
    pub(crate) to_client: mpsc::Sender<String>,
}

impl RemoteEnd {
    pub(crate) async fn next_frame(&mut self) -> Frame {
        let text = tokio::time::timeout(Duration::from_secs(2), self.from_client.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("client closed the session");
        Frame::parse(&text).expect("client sent malformed frame")
    }

    /// Next `event` frame, skipping channel membership frames.
    pub(crate) async fn next_event(&mut self) -> (String, serde_json::Value) {
        loop {
            if let Frame::Event { event, payload } = self.next_frame().await {
                return (event, payload);
            }
        }
    }

    /// True if nothing arrives within `wait`.
    pub(crate) async fn is_quiet(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.from_client.recv()).await.is_err()
    }

    pub(crate) async fn push(&self, event: &str, payload: serde_json::Value) {
        let text = Frame::event(event, payload).to_json().unwrap();
        self.to_client.send(text).await.unwrap();
    }
}

pub(crate) struct MockConnector {
    failures_left: AtomicU32,
    opens: Arc<AtomicUsize>,
    remotes: mpsc::UnboundedSender<RemoteEnd>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self) -> Result<TransportLink, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TransportError::Connect("refused".into()));
        }
        // Give concurrent callers a chance to pile up on the attempt.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        let _ = self.remotes.send(RemoteEnd {
            from_client: out_rx,
            to_client: in_tx,
        });
        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// A client over [`MockConnector`] plus the relay-side handles.
pub(crate) struct Harness {
    pub(crate) client: RealtimeClient,
    opens: Arc<AtomicUsize>,
    remotes: Mutex<mpsc::UnboundedReceiver<RemoteEnd>>,
}

impl Harness {
    /// The first `failures` opens are refused.
    pub(crate) fn new(failures: u32) -> Self {
        let config = ConnectionConfig {
            max_reconnect_attempts: 3,
            reconnect_delay: Duration::from_millis(5),
            max_reconnect_delay: Duration::from_millis(20),
            ..ConnectionConfig::default()
        };
        let opens = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = MockConnector {
            failures_left: AtomicU32::new(failures),
            opens: Arc::clone(&opens),
            remotes: tx,
        };
        Self {
            client: RealtimeClient::new(config, connector),
            opens,
            remotes: Mutex::new(rx),
        }
    }

    pub(crate) async fn next_remote(&self) -> RemoteEnd {
        let mut remotes = self.remotes.lock().await;
        tokio::time::timeout(Duration::from_secs(2), remotes.recv())
            .await
            .expect("timed out waiting for a session")
            .expect("connector dropped")
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

pub(crate) async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
