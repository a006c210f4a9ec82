//! Transport-neutral channel abstraction.

use std::sync::Arc;

use async_trait::async_trait;
use dailychat_common::Result;
use tokio::sync::mpsc;

use crate::protocol::ChangeEvent;

/// What a channel carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelKind {
    /// Ephemeral publish/subscribe. `self_send` echoes our own broadcasts back.
    Broadcast { self_send: bool },
    /// Row-level change notifications for one table.
    PostgresChanges { schema: String, table: String },
}

/// Events delivered to the owner of an open channel, in transport order.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The subscription was confirmed. May repeat after a reconnect.
    Subscribed,
    Broadcast {
        event: String,
        payload: serde_json::Value,
    },
    Change(ChangeEvent),
    Error(String),
    /// The channel was closed; no further events follow.
    Closed,
}

/// Handle to one open channel.
#[async_trait]
pub trait Channel: Send + Sync {
    fn topic(&self) -> &str;

    /// Broadcast an event to the other subscribers of this topic.
    async fn send(&self, event: &str, payload: serde_json::Value) -> Result<()>;

    /// Unsubscribe. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Opens channels.
///
/// The returned receiver exists before the subscription request goes out,
/// so no event between subscribe and the caller's first `recv` is lost.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(
        &self,
        topic: &str,
        kind: ChannelKind,
    ) -> Result<(Arc<dyn Channel>, mpsc::Receiver<ChannelEvent>)>;
}
