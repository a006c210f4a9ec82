//! Message store interface.
//!
//! The feed only reads through [`MessageStore::query_messages`]; every
//! mutation goes out through the other methods and comes back as a change
//! notification on the realtime channel.

mod memory;
mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

use async_trait::async_trait;
use dailychat_common::Result;

use crate::message::{Message, MessagePatch, NewMessage, PageQuery, UserProfile};

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Messages of one room (`None` = default room only), in `query.order`.
    async fn query_messages(&self, room: Option<&str>, query: &PageQuery) -> Result<Vec<Message>>;

    async fn insert_message(&self, message: &NewMessage) -> Result<()>;

    async fn update_message(&self, id: &str, patch: &MessagePatch) -> Result<()>;

    async fn delete_message(&self, id: &str) -> Result<()>;

    /// Insert or refresh the signed-in user's profile row.
    async fn upsert_profile(&self, profile: &UserProfile) -> Result<()>;
}
