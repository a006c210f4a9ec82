//! In-process transport.
//!
//! Every subscriber of a broadcast topic receives the other subscribers'
//! sends in call order; change events go to the `PostgresChanges`
//! subscribers of the matching table. Nothing is persisted.
//!
//! Broadcasts are at-most-once: a peer whose queue is full misses the event
//! and the sender never waits on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dailychat_common::{ChatError, Result};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::protocol::ChangeEvent;

use super::channel::{Channel, ChannelEvent, ChannelKind, Transport};

struct Subscriber {
    id: u64,
    topic: String,
    kind: ChannelKind,
    tx: mpsc::Sender<ChannelEvent>,
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

/// Cloneable in-process broadcast hub. Clones share subscribers.
#[derive(Clone, Default)]
pub struct LocalHub {
    state: Arc<RwLock<HubState>>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open channels on `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.state
            .read()
            .await
            .subscribers
            .iter()
            .filter(|s| s.topic == topic)
            .count()
    }

    /// Deliver a change notification to every subscriber of its table.
    pub async fn publish_change(&self, change: ChangeEvent) {
        let targets: Vec<_> = {
            let state = self.state.read().await;
            state
                .subscribers
                .iter()
                .filter(|s| match &s.kind {
                    ChannelKind::PostgresChanges { schema, table } => {
                        *schema == change.schema && *table == change.table
                    }
                    ChannelKind::Broadcast { .. } => false,
                })
                .map(|s| s.tx.clone())
                .collect()
        };
        for tx in targets {
            let _ = tx.send(ChannelEvent::Change(change.clone())).await;
        }
    }

    async fn broadcast_from(
        &self,
        sender_id: u64,
        topic: &str,
        event: &str,
        payload: serde_json::Value,
    ) {
        let targets: Vec<_> = {
            let state = self.state.read().await;
            state
                .subscribers
                .iter()
                .filter(|s| s.topic == topic)
                .filter(|s| match s.kind {
                    ChannelKind::Broadcast { self_send } => s.id != sender_id || self_send,
                    ChannelKind::PostgresChanges { .. } => false,
                })
                .map(|s| (s.id, s.tx.clone()))
                .collect()
        };
        debug!(topic = %topic, event = %event, peers = targets.len(), "Local broadcast");
        for (id, tx) in targets {
            let sent = tx.try_send(ChannelEvent::Broadcast {
                event: event.to_string(),
                payload: payload.clone(),
            });
            if let Err(mpsc::error::TrySendError::Full(_)) = sent {
                warn!(topic = %topic, event = %event, subscriber = id, "Dropped broadcast for a full queue");
            }
        }
    }

    async fn remove(&self, id: u64) -> Option<mpsc::Sender<ChannelEvent>> {
        let mut state = self.state.write().await;
        let idx = state.subscribers.iter().position(|s| s.id == id)?;
        Some(state.subscribers.remove(idx).tx)
    }
}

#[async_trait]
impl Transport for LocalHub {
    async fn open(
        &self,
        topic: &str,
        kind: ChannelKind,
    ) -> Result<(Arc<dyn Channel>, mpsc::Receiver<ChannelEvent>)> {
        let (tx, rx) = mpsc::channel(256);
        let id = {
            let mut state = self.state.write().await;
            state.next_id += 1;
            let id = state.next_id;
            state.subscribers.push(Subscriber {
                id,
                topic: topic.to_string(),
                kind,
                tx: tx.clone(),
            });
            id
        };
        tx.send(ChannelEvent::Subscribed)
            .await
            .map_err(|_| ChatError::Transport("subscriber dropped".into()))?;

        let channel = LocalChannel {
            hub: self.clone(),
            id,
            topic: topic.to_string(),
            closed: AtomicBool::new(false),
        };
        Ok((Arc::new(channel), rx))
    }
}

/// A channel opened on a [`LocalHub`].
pub struct LocalChannel {
    hub: LocalHub,
    id: u64,
    topic: String,
    closed: AtomicBool,
}

#[async_trait]
impl Channel for LocalChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn send(&self, event: &str, payload: serde_json::Value) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChatError::Transport(format!(
                "channel {} is closed",
                self.topic
            )));
        }
        self.hub
            .broadcast_from(self.id, &self.topic, event, payload)
            .await;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(tx) = self.hub.remove(self.id).await {
            let _ = tx.send(ChannelEvent::Closed).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ChangeKind;
    use serde_json::json;

    fn broadcast() -> ChannelKind {
        ChannelKind::Broadcast { self_send: false }
    }

    #[tokio::test]
    async fn open_emits_subscribed() {
        let hub = LocalHub::new();
        let (_ch, mut rx) = hub.open("t", broadcast()).await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), ChannelEvent::Subscribed));
        assert_eq!(hub.subscriber_count("t").await, 1);
    }

    #[tokio::test]
    async fn broadcast_reaches_peers_but_not_sender() {
        let hub = LocalHub::new();
        let (a, mut rx_a) = hub.open("t", broadcast()).await.unwrap();
        let (_b, mut rx_b) = hub.open("t", broadcast()).await.unwrap();
        let (_c, mut rx_c) = hub.open("other", broadcast()).await.unwrap();
        rx_a.recv().await;
        rx_b.recv().await;
        rx_c.recv().await;

        a.send("join", json!({"clientId": "a"})).await.unwrap();

        match rx_b.recv().await.unwrap() {
            ChannelEvent::Broadcast { event, payload } => {
                assert_eq!(event, "join");
                assert_eq!(payload["clientId"], "a");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx_a.try_recv().is_err());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_peer_queue_does_not_block_sender() {
        let hub = LocalHub::new();
        let (a, mut rx_a) = hub.open("t", broadcast()).await.unwrap();
        let (_stalled, mut rx_stalled) = hub.open("t", broadcast()).await.unwrap();
        rx_a.recv().await;

        let flood = async {
            for i in 0..300 {
                a.send("who_is_online", json!({"clientId": i})).await.unwrap();
            }
        };
        tokio::time::timeout(std::time::Duration::from_secs(1), flood)
            .await
            .expect("sender blocked on a full peer");

        // Subscribed plus as many broadcasts as the queue held.
        let mut received = 0;
        while rx_stalled.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 256);
    }

    #[tokio::test]
    async fn self_send_echoes() {
        let hub = LocalHub::new();
        let (a, mut rx) = hub
            .open("t", ChannelKind::Broadcast { self_send: true })
            .await
            .unwrap();
        rx.recv().await;
        a.send("here", json!({"clientId": "a"})).await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), ChannelEvent::Broadcast { .. }));
    }

    #[tokio::test]
    async fn closed_channel_rejects_send_and_detaches() {
        let hub = LocalHub::new();
        let (a, mut rx) = hub.open("t", broadcast()).await.unwrap();
        rx.recv().await;
        a.close().await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), ChannelEvent::Closed));
        assert_eq!(hub.subscriber_count("t").await, 0);
        let err = a.send("join", json!({})).await.unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)));
        // Second close is a no-op.
        a.close().await.unwrap();
    }

    #[tokio::test]
    async fn changes_go_to_matching_table_only() {
        let hub = LocalHub::new();
        let kind = |table: &str| ChannelKind::PostgresChanges {
            schema: "public".into(),
            table: table.into(),
        };
        let (_m, mut rx_m) = hub.open("public:messages", kind("messages")).await.unwrap();
        let (_u, mut rx_u) = hub.open("public:users", kind("users")).await.unwrap();
        rx_m.recv().await;
        rx_u.recv().await;

        hub.publish_change(ChangeEvent {
            schema: "public".into(),
            table: "messages".into(),
            kind: ChangeKind::Insert,
            new: Some(json!({"id": "1", "room_name": null})),
            old: None,
        })
        .await;

        assert!(matches!(rx_m.recv().await.unwrap(), ChannelEvent::Change(_)));
        assert!(rx_u.try_recv().is_err());
    }
}
