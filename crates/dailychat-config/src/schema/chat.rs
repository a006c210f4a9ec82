//! Presence and message feed settings.

use serde::{Deserialize, Serialize};

/// Presence broadcast channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceSettings {
    pub topic: String,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            topic: "online-users".to_string(),
        }
    }
}

/// Message feed paging and change subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub page_size: usize,
    pub schema: String,
    pub table: String,
    pub changes_topic: String,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            page_size: 20,
            schema: "public".to_string(),
            table: "messages".to_string(),
            changes_topic: "public:messages".to_string(),
        }
    }
}
