//! Public handle for interacting with the Supabase Realtime connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dailychat_common::{ChatError, Result};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use super::channel::{Channel, ChannelEvent, ChannelKind, Transport};
use super::connection::connection_loop;
use super::types::{ChannelConfig, RealtimeCommand, RealtimeConfig};

/// Per-topic event senders, fed by the connection task.
pub(crate) type Routes = Arc<RwLock<HashMap<String, mpsc::Sender<ChannelEvent>>>>;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Handle for interacting with the Supabase Realtime connection.
///
/// All methods are non-blocking and send commands to the background
/// connection task. Clones share the same connection.
#[derive(Clone)]
pub struct RealtimeClient {
    command_tx: mpsc::Sender<RealtimeCommand>,
    routes: Routes,
}

impl RealtimeClient {
    /// Create a new client and start the background connection.
    pub fn connect(config: RealtimeConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let routes: Routes = Arc::new(RwLock::new(HashMap::new()));

        tokio::spawn(connection_loop(
            config,
            Arc::clone(&routes),
            command_rx,
        ));

        Self {
            command_tx,
            routes,
        }
    }

    /// Join a Supabase Realtime channel.
    pub async fn join_channel(&self, topic: &str, config: ChannelConfig) -> Result<()> {
        self.command(RealtimeCommand::JoinChannel {
            topic: topic.to_string(),
            config,
        })
        .await
    }

    /// Leave a channel.
    pub async fn leave_channel(&self, topic: &str) -> Result<()> {
        self.command(RealtimeCommand::LeaveChannel {
            topic: topic.to_string(),
        })
        .await
    }

    /// Send a broadcast event on a channel.
    pub async fn broadcast(
        &self,
        topic: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        self.command(RealtimeCommand::Broadcast {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
        })
        .await
    }

    /// Leave every channel and close the socket. The client stops reconnecting.
    pub async fn disconnect(&self) {
        if self.command(RealtimeCommand::Disconnect).await.is_err() {
            debug!("realtime connection already stopped");
        }
    }

    async fn command(&self, cmd: RealtimeCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| ChatError::Transport("realtime connection task has stopped".into()))
    }
}

#[async_trait]
impl Transport for RealtimeClient {
    async fn open(
        &self,
        topic: &str,
        kind: ChannelKind,
    ) -> Result<(Arc<dyn Channel>, mpsc::Receiver<ChannelEvent>)> {
        let (event_tx, event_rx) = mpsc::channel(256);
        if self
            .routes
            .write()
            .await
            .insert(topic.to_string(), event_tx)
            .is_some()
        {
            warn!(topic = %topic, "Topic reopened; previous subscriber detached");
        }

        if let Err(e) = self.join_channel(topic, ChannelConfig::from(&kind)).await {
            self.routes.write().await.remove(topic);
            return Err(e);
        }

        let channel = RealtimeChannel {
            topic: topic.to_string(),
            client: self.clone(),
            closed: AtomicBool::new(false),
        };
        Ok((Arc::new(channel), event_rx))
    }
}

// ---------------------------------------------------------------------------
// Channel handle
// ---------------------------------------------------------------------------

/// One joined topic on a [`RealtimeClient`].
pub struct RealtimeChannel {
    topic: String,
    client: RealtimeClient,
    closed: AtomicBool,
}

#[async_trait]
impl Channel for RealtimeChannel {
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
        self.client.broadcast(&self.topic, event, payload).await
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let route = self.client.routes.write().await.remove(&self.topic);
        let result = self.client.leave_channel(&self.topic).await;
        if let Some(tx) = route {
            let _ = tx.send(ChannelEvent::Closed).await;
        }
        result
    }
}
