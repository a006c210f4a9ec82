//! Message rows and the request shapes used against the message store.
//!
//! Field names on the wire follow the `messages` table (`send_by`,
//! `room_name`, `is_edit`); the Rust names describe what they hold.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    #[serde(rename = "send_by")]
    pub sender: String,
    /// `None` is the default room.
    #[serde(rename = "room_name", default)]
    pub room: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "is_edit", default)]
    pub edited: bool,
    /// Embedded sender profile, present when the query joined `users`.
    #[serde(rename = "users", default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<SenderProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderProfile {
    pub display_name: Option<String>,
}

impl Message {
    /// Display name of the sender, falling back to `"User"`.
    pub fn sender_name(&self) -> &str {
        self.profile
            .as_ref()
            .and_then(|p| p.display_name.as_deref())
            .filter(|n| !n.is_empty())
            .unwrap_or("User")
    }

    /// Feed order: `created_at`, then `id` to break ties.
    pub fn feed_order(&self, other: &Message) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Insert request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub text: String,
    pub send_by: String,
    pub room_name: Option<String>,
}

/// Partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_edit: Option<bool>,
}

impl MessagePatch {
    /// Replace the text and flag the message as edited.
    pub fn edit(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            is_edit: Some(true),
        }
    }
}

/// Row in the `users` table, upserted when a signed-in user is first seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// A page request over one room, ordered by `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    /// Only rows strictly older than this.
    pub before: Option<DateTime<Utc>>,
    pub limit: usize,
    pub order: SortOrder,
}

impl PageQuery {
    /// The newest `limit` rows, newest first.
    pub fn latest(limit: usize) -> Self {
        Self {
            before: None,
            limit,
            order: SortOrder::Descending,
        }
    }

    /// Up to `limit` rows older than `before`, newest first.
    pub fn older_than(before: DateTime<Utc>, limit: usize) -> Self {
        Self {
            before: Some(before),
            limit,
            order: SortOrder::Descending,
        }
    }
}
