//! Feed driver: pulls pages from the store into a [`FeedWindow`] and
//! refreshes it whenever the change channel reports a relevant mutation.

use std::sync::Arc;

use dailychat_common::{ChatError, Result};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::identity::UserContext;
use crate::message::{MessagePatch, NewMessage, PageQuery};
use crate::protocol::ChangeEvent;
use crate::realtime::{Channel, ChannelEvent, ChannelKind, Transport};
use crate::store::MessageStore;

use super::window::{FeedSnapshot, FeedWindow};

/// Messages per page.
pub const PAGE_SIZE: usize = 20;

/// Which room to show and where its change notifications come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedOptions {
    /// `None` is the default room.
    pub room: Option<String>,
    pub page_size: usize,
    pub schema: String,
    pub table: String,
    /// Topic of the change channel.
    pub topic: String,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            room: None,
            page_size: PAGE_SIZE,
            schema: "public".to_string(),
            table: "messages".to_string(),
            topic: "public:messages".to_string(),
        }
    }
}

impl FeedOptions {
    pub fn for_room(room: Option<String>) -> Self {
        Self {
            room,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct FeedInner {
    store: Arc<dyn MessageStore>,
    options: FeedOptions,
    window: Mutex<FeedWindow>,
    snapshot_tx: watch::Sender<FeedSnapshot>,
}

impl FeedInner {
    fn publish(&self, window: &FeedWindow) {
        self.snapshot_tx.send_replace(window.snapshot());
    }

    async fn load_latest(&self) -> Result<()> {
        let request = {
            let mut window = self.window.lock().await;
            let request = window.begin_latest(self.options.page_size);
            self.publish(&window);
            request
        };

        let query = PageQuery::latest(request.limit);
        let result = self
            .store
            .query_messages(self.options.room.as_deref(), &query)
            .await;

        let mut window = self.window.lock().await;
        match result {
            Ok(page) => {
                let count = page.len();
                if window.apply_latest(&request, page) {
                    debug!(room = ?self.options.room, count, "Feed refreshed");
                } else {
                    debug!(room = ?self.options.room, ticket = request.ticket, "Discarded stale feed refresh");
                }
                self.publish(&window);
                Ok(())
            }
            Err(e) => {
                window.fail_latest(request.ticket);
                self.publish(&window);
                warn!(room = ?self.options.room, error = %e, "Failed to load latest messages");
                Err(e)
            }
        }
    }

    async fn load_older(&self) -> Result<bool> {
        let request = {
            let mut window = self.window.lock().await;
            let Some(request) = window.begin_older() else {
                return Ok(false);
            };
            self.publish(&window);
            request
        };

        let query = PageQuery::older_than(request.before, self.options.page_size);
        let result = self
            .store
            .query_messages(self.options.room.as_deref(), &query)
            .await;

        let mut window = self.window.lock().await;
        match result {
            Ok(page) => {
                let applied = window.apply_older(request.ticket, page, self.options.page_size);
                self.publish(&window);
                Ok(applied)
            }
            Err(e) => {
                window.fail_older(request.ticket);
                self.publish(&window);
                warn!(room = ?self.options.room, error = %e, "Failed to load older messages");
                Err(e)
            }
        }
    }

    async fn on_change(&self, change: &ChangeEvent) -> Result<bool> {
        if change.schema != self.options.schema || change.table != self.options.table {
            return Ok(false);
        }
        if !change.affected_room().matches(self.options.room.as_deref()) {
            debug!(room = ?self.options.room, kind = ?change.kind, "Change for another room");
            return Ok(false);
        }
        self.load_latest().await?;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// A mounted, self-refreshing message feed for one room.
pub struct MessageFeed {
    inner: Arc<FeedInner>,
    channel: Arc<dyn Channel>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MessageFeed {
    /// Subscribe to changes, then load the latest page.
    pub async fn mount(
        store: Arc<dyn MessageStore>,
        transport: &dyn Transport,
        options: FeedOptions,
    ) -> Result<Self> {
        let (snapshot_tx, _) = watch::channel(FeedSnapshot::default());
        let kind = ChannelKind::PostgresChanges {
            schema: options.schema.clone(),
            table: options.table.clone(),
        };
        let (channel, events) = transport.open(&options.topic, kind).await?;
        info!(topic = %options.topic, room = ?options.room, "Feed channel opened");

        let inner = Arc::new(FeedInner {
            store,
            options,
            window: Mutex::new(FeedWindow::new()),
            snapshot_tx,
        });
        let task = tokio::spawn(change_loop(events, Arc::clone(&inner)));
        let feed = Self {
            inner,
            channel,
            task: Mutex::new(Some(task)),
        };

        if let Err(e) = feed.load_latest().await {
            feed.unmount().await;
            return Err(e);
        }
        Ok(feed)
    }

    pub fn room(&self) -> Option<&str> {
        self.inner.options.room.as_deref()
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn has_more_older(&self) -> bool {
        self.inner.snapshot_tx.borrow().has_more_older
    }

    /// Re-read the newest messages, down to the oldest one held. On failure
    /// the window is left as it was.
    pub async fn load_latest(&self) -> Result<()> {
        self.inner.load_latest().await
    }

    /// Fetch the page before the oldest visible message. Returns false when
    /// there was nothing to do or the result arrived too late to apply.
    pub async fn load_older(&self) -> Result<bool> {
        self.inner.load_older().await
    }

    /// Refresh if `change` touched this feed's room. Returns whether a
    /// refresh ran.
    pub async fn on_change(&self, change: &ChangeEvent) -> Result<bool> {
        self.inner.on_change(change).await
    }

    /// Insert a message as the current user. The feed picks it up from the
    /// resulting change notification.
    pub async fn send_message(&self, user: &UserContext, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(ChatError::Validation("message is empty".into()));
        }
        let user = user.current().await.ok_or(ChatError::NotSignedIn)?;
        let message = NewMessage {
            text: text.to_string(),
            send_by: user.id,
            room_name: self.inner.options.room.clone(),
        };
        self.inner.store.insert_message(&message).await?;
        debug!(room = ?self.inner.options.room, "Message sent");
        Ok(())
    }

    /// Replace a visible message's text and mark it edited.
    pub async fn edit_message(&self, id: &str, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(ChatError::Validation("edited text is empty".into()));
        }
        {
            let window = self.inner.window.lock().await;
            let current = window
                .find(id)
                .ok_or_else(|| ChatError::Validation(format!("message {id} is not in the feed")))?;
            if current.text == text {
                return Err(ChatError::Validation("text is unchanged".into()));
            }
        }
        self.inner
            .store
            .update_message(id, &MessagePatch::edit(text))
            .await?;
        debug!(id = %id, "Message edited");
        Ok(())
    }

    pub async fn delete_message(&self, id: &str) -> Result<()> {
        self.inner.store.delete_message(id).await?;
        debug!(id = %id, "Message deleted");
        Ok(())
    }

    /// Close the change channel and discard any fetch still in flight.
    /// Later calls do nothing.
    pub async fn unmount(&self) {
        {
            let mut window = self.inner.window.lock().await;
            if window.is_closed() {
                return;
            }
            window.close();
            self.inner.publish(&window);
        }
        if let Err(e) = self.channel.close().await {
            warn!(topic = %self.channel.topic(), error = %e, "Failed to close feed channel");
        }
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
        info!(room = ?self.inner.options.room, "Feed unmounted");
    }
}

// ---------------------------------------------------------------------------
// Change loop
// ---------------------------------------------------------------------------

/// Each relevant change starts its own refresh; overlapping refreshes are
/// resolved by the window's tickets.
async fn change_loop(mut events: mpsc::Receiver<ChannelEvent>, inner: Arc<FeedInner>) {
    let mut subscribed_once = false;
    while let Some(event) = events.recv().await {
        match event {
            ChannelEvent::Subscribed => {
                if subscribed_once {
                    // Changes may have been missed while disconnected.
                    spawn_refresh(&inner, None);
                }
                subscribed_once = true;
            }
            ChannelEvent::Change(change) => spawn_refresh(&inner, Some(change)),
            ChannelEvent::Broadcast { .. } => {}
            ChannelEvent::Error(reason) => {
                warn!(topic = %inner.options.topic, reason = %reason, "Feed channel error");
            }
            ChannelEvent::Closed => break,
        }
    }
    debug!(topic = %inner.options.topic, "Feed change loop finished");
}

fn spawn_refresh(inner: &Arc<FeedInner>, change: Option<ChangeEvent>) {
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        let result = match &change {
            Some(change) => inner.on_change(change).await.map(|_| ()),
            None => inner.load_latest().await,
        };
        if let Err(e) = result {
            warn!(room = ?inner.options.room, error = %e, "Feed refresh failed");
        }
    });
}
