//! Configuration schema types for Daily Chat.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod chat;
mod realtime;
mod supabase;
mod system;

pub use chat::*;
pub use realtime::*;
pub use supabase::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub supabase: SupabaseConfig,
    pub realtime: RealtimeSettings,
    pub presence: PresenceSettings,
    pub feed: FeedSettings,
    pub logging: LoggingConfig,
}
