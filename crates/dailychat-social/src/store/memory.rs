//! In-memory message store.
//!
//! Used by offline mode and tests. When attached to a [`LocalHub`], every
//! accepted mutation is echoed as a change notification, the same way the
//! database would publish it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dailychat_common::{new_id, ChatError, Result};
use tokio::sync::RwLock;
use tracing::debug;

use crate::message::{Message, MessagePatch, NewMessage, PageQuery, SenderProfile, SortOrder, UserProfile};
use crate::protocol::{ChangeEvent, ChangeKind};
use crate::realtime::LocalHub;

use super::MessageStore;

#[derive(Default)]
struct StoreState {
    messages: Vec<Message>,
    profiles: Vec<UserProfile>,
    last_created_at: Option<DateTime<Utc>>,
    reject_mutations: Option<String>,
    fail_queries: Option<String>,
}

impl StoreState {
    /// `now`, bumped forward so creation times are strictly increasing.
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let at = match self.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(at);
        at
    }

    fn profile_for(&self, user_id: &str) -> Option<SenderProfile> {
        self.profiles
            .iter()
            .find(|p| p.id == user_id)
            .map(|p| SenderProfile {
                display_name: Some(p.display_name.clone()),
            })
    }
}

/// Cloneable store; clones share rows.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
    hub: Option<LocalHub>,
    schema: String,
    table: String,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            hub: None,
            schema: "public".to_string(),
            table: "messages".to_string(),
        }
    }

    /// Publish a change on `hub` for every accepted mutation.
    pub fn with_hub(mut self, hub: LocalHub) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Schema and table named in published change events.
    pub fn with_table(mut self, schema: &str, table: &str) -> Self {
        self.schema = schema.to_string();
        self.table = table.to_string();
        self
    }

    /// All rows, oldest first.
    pub async fn messages(&self) -> Vec<Message> {
        self.state.read().await.messages.clone()
    }

    pub async fn profiles(&self) -> Vec<UserProfile> {
        self.state.read().await.profiles.clone()
    }

    /// Make every mutation fail with `reason` (or stop failing with `None`).
    pub async fn set_reject_mutations(&self, reason: Option<String>) {
        self.state.write().await.reject_mutations = reason;
    }

    /// Make every query fail with `reason` (or stop failing with `None`).
    pub async fn set_fail_queries(&self, reason: Option<String>) {
        self.state.write().await.fail_queries = reason;
    }

    async fn publish(&self, kind: ChangeKind, new: Option<&Message>, old: Option<&Message>) {
        let Some(hub) = &self.hub else {
            return;
        };
        let row = |m: Option<&Message>| m.and_then(|m| serde_json::to_value(m).ok());
        hub.publish_change(ChangeEvent {
            schema: self.schema.clone(),
            table: self.table.clone(),
            kind,
            new: row(new),
            old: row(old),
        })
        .await;
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn query_messages(&self, room: Option<&str>, query: &PageQuery) -> Result<Vec<Message>> {
        let state = self.state.read().await;
        if let Some(reason) = &state.fail_queries {
            return Err(ChatError::Query(reason.clone()));
        }
        let mut rows: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.room.as_deref() == room)
            .filter(|m| query.before.map_or(true, |before| m.created_at < before))
            .cloned()
            .map(|mut m| {
                m.profile = state.profile_for(&m.sender);
                m
            })
            .collect();
        rows.sort_by(|a, b| a.feed_order(b));
        if query.order == SortOrder::Descending {
            rows.reverse();
        }
        rows.truncate(query.limit);
        Ok(rows)
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<()> {
        let inserted = {
            let mut state = self.state.write().await;
            if let Some(reason) = &state.reject_mutations {
                return Err(ChatError::MutationRejected(reason.clone()));
            }
            let row = Message {
                id: new_id(),
                text: message.text.clone(),
                sender: message.send_by.clone(),
                room: message.room_name.clone(),
                created_at: state.next_created_at(),
                edited: false,
                profile: None,
            };
            state.messages.push(row.clone());
            row
        };
        debug!(id = %inserted.id, room = ?inserted.room, "Message inserted");
        self.publish(ChangeKind::Insert, Some(&inserted), None).await;
        Ok(())
    }

    async fn update_message(&self, id: &str, patch: &MessagePatch) -> Result<()> {
        let changed = {
            let mut state = self.state.write().await;
            if let Some(reason) = &state.reject_mutations {
                return Err(ChatError::MutationRejected(reason.clone()));
            }
            state.messages.iter_mut().find(|m| m.id == id).map(|row| {
                let old = row.clone();
                if let Some(text) = &patch.text {
                    row.text = text.clone();
                }
                if let Some(edited) = patch.is_edit {
                    row.edited = edited;
                }
                (old, row.clone())
            })
        };
        if let Some((old, new)) = changed {
            self.publish(ChangeKind::Update, Some(&new), Some(&old)).await;
        }
        Ok(())
    }

    async fn delete_message(&self, id: &str) -> Result<()> {
        let removed = {
            let mut state = self.state.write().await;
            if let Some(reason) = &state.reject_mutations {
                return Err(ChatError::MutationRejected(reason.clone()));
            }
            state
                .messages
                .iter()
                .position(|m| m.id == id)
                .map(|idx| state.messages.remove(idx))
        };
        if let Some(old) = removed {
            self.publish(ChangeKind::Delete, None, Some(&old)).await;
        }
        Ok(())
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(reason) = &state.reject_mutations {
            return Err(ChatError::MutationRejected(reason.clone()));
        }
        match state.profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => *existing = profile.clone(),
            None => state.profiles.push(profile.clone()),
        }
        Ok(())
    }
}
