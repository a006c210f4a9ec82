//! Presence driver: feeds channel events into a [`PresenceTracker`] and
//! publishes the count.

use std::sync::Arc;

use dailychat_common::{ClientId, Result};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::PresenceSignal;
use crate::realtime::{Channel, ChannelEvent, ChannelKind, Transport};

use super::tracker::{PresenceState, PresenceTracker};

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// One mounted presence session.
pub struct PresenceClient {
    tracker: Arc<Mutex<PresenceTracker>>,
    channel: Arc<dyn Channel>,
    count_tx: watch::Sender<usize>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PresenceClient {
    /// Open the broadcast channel on `topic` and start the handshake as
    /// soon as the subscription is confirmed.
    pub async fn mount(transport: &dyn Transport, topic: &str, client_id: ClientId) -> Result<Self> {
        let tracker = PresenceTracker::new(client_id);
        let (count_tx, _) = watch::channel(tracker.count());
        let tracker = Arc::new(Mutex::new(tracker));

        let (channel, events) = transport
            .open(topic, ChannelKind::Broadcast { self_send: false })
            .await?;
        info!(topic = %topic, "Presence channel opened");

        let task = tokio::spawn(event_loop(
            events,
            Arc::clone(&channel),
            Arc::clone(&tracker),
            count_tx.clone(),
        ));

        Ok(Self {
            tracker,
            channel,
            count_tx,
            task: Mutex::new(Some(task)),
        })
    }

    /// Watch the number of sessions believed online.
    pub fn online_count(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    pub fn count(&self) -> usize {
        *self.count_tx.borrow()
    }

    pub async fn state(&self) -> PresenceState {
        self.tracker.lock().await.state()
    }

    pub async fn client_id(&self) -> ClientId {
        self.tracker.lock().await.self_id().clone()
    }

    /// Announce departure, close the channel and stop the event loop.
    /// Later calls do nothing.
    pub async fn unmount(&self) {
        let (leave, already_closed) = {
            let mut tracker = self.tracker.lock().await;
            let already_closed = tracker.state() == PresenceState::Closed;
            (tracker.teardown(), already_closed)
        };
        if already_closed {
            return;
        }
        if let Some(leave) = leave {
            send_signal(self.channel.as_ref(), &leave).await;
        }
        if let Err(e) = self.channel.close().await {
            warn!(topic = %self.channel.topic(), error = %e, "Failed to close presence channel");
        }
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
        self.count_tx.send_replace(0);
        info!(topic = %self.channel.topic(), "Presence unmounted");
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

async fn send_signal(channel: &dyn Channel, signal: &PresenceSignal) {
    let event = signal.kind.event_name();
    if let Err(e) = channel.send(event, signal.payload()).await {
        warn!(topic = %channel.topic(), event = %event, error = %e, "Presence broadcast failed");
    }
}

async fn event_loop(
    mut events: mpsc::Receiver<ChannelEvent>,
    channel: Arc<dyn Channel>,
    tracker: Arc<Mutex<PresenceTracker>>,
    count_tx: watch::Sender<usize>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ChannelEvent::Subscribed => {
                let outgoing = tracker.lock().await.begin_handshake();
                if outgoing.is_empty() {
                    debug!(topic = %channel.topic(), "Presence channel resubscribed");
                    continue;
                }
                for signal in &outgoing {
                    send_signal(channel.as_ref(), signal).await;
                }
                tracker.lock().await.complete_handshake();
                debug!(topic = %channel.topic(), "Presence handshake sent");
            }
            ChannelEvent::Broadcast { event, payload } => {
                let Some(signal) = PresenceSignal::from_wire(&event, &payload) else {
                    debug!(event = %event, "Ignoring unrecognized presence broadcast");
                    continue;
                };
                let (reply, count) = {
                    let mut tracker = tracker.lock().await;
                    let reply = tracker.handle(&signal);
                    (reply, tracker.count())
                };
                count_tx.send_if_modified(|current| {
                    let changed = *current != count;
                    *current = count;
                    changed
                });
                if let Some(reply) = reply {
                    send_signal(channel.as_ref(), &reply).await;
                }
            }
            ChannelEvent::Change(_) => {}
            ChannelEvent::Error(reason) => {
                warn!(topic = %channel.topic(), reason = %reason, "Presence channel error");
            }
            ChannelEvent::Closed => break,
        }
    }
    debug!(topic = %channel.topic(), "Presence event loop finished");
}
