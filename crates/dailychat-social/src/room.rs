//! One chat screen: the online count plus the message feed of a room.

use std::sync::Arc;

use dailychat_common::{ClientId, Result};
use tokio::sync::watch;
use tracing::info;

use crate::feed::{FeedOptions, FeedSnapshot, MessageFeed};
use crate::identity::UserContext;
use crate::presence::PresenceClient;
use crate::realtime::Transport;
use crate::store::MessageStore;

/// Mount options for a [`ChatRoom`].
#[derive(Debug, Clone)]
pub struct RoomOptions {
    pub presence_topic: String,
    pub client_id: ClientId,
    pub feed: FeedOptions,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            presence_topic: "online-users".to_string(),
            client_id: ClientId::new(),
            feed: FeedOptions::default(),
        }
    }
}

pub struct ChatRoom {
    presence: PresenceClient,
    feed: MessageFeed,
    user: UserContext,
}

impl ChatRoom {
    /// Join presence and load the room's latest messages. If the feed
    /// cannot be mounted, presence is torn down again.
    pub async fn mount(
        transport: &dyn Transport,
        store: Arc<dyn MessageStore>,
        user: UserContext,
        options: RoomOptions,
    ) -> Result<Self> {
        let presence =
            PresenceClient::mount(transport, &options.presence_topic, options.client_id).await?;
        let feed = match MessageFeed::mount(store, transport, options.feed).await {
            Ok(feed) => feed,
            Err(e) => {
                presence.unmount().await;
                return Err(e);
            }
        };
        info!(room = ?feed.room(), client_id = %presence.client_id().await, "Chat room mounted");
        Ok(Self {
            presence,
            feed,
            user,
        })
    }

    pub fn room(&self) -> Option<&str> {
        self.feed.room()
    }

    pub fn online_count(&self) -> watch::Receiver<usize> {
        self.presence.online_count()
    }

    pub fn feed(&self) -> watch::Receiver<FeedSnapshot> {
        self.feed.subscribe()
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.feed.snapshot()
    }

    pub fn has_more_older(&self) -> bool {
        self.feed.has_more_older()
    }

    pub async fn load_older(&self) -> Result<bool> {
        self.feed.load_older().await
    }

    pub async fn send_message(&self, text: &str) -> Result<()> {
        self.feed.send_message(&self.user, text).await
    }

    pub async fn edit_message(&self, id: &str, text: &str) -> Result<()> {
        self.feed.edit_message(id, text).await
    }

    pub async fn delete_message(&self, id: &str) -> Result<()> {
        self.feed.delete_message(id).await
    }

    pub async fn unmount(&self) {
        self.presence.unmount().await;
        self.feed.unmount().await;
    }
}
