pub mod feed;
pub mod identity;
pub mod message;
pub mod presence;
pub mod protocol;
pub mod realtime;
pub mod room;
pub mod store;

pub use feed::{FeedOptions, FeedSnapshot, FeedWindow, MessageFeed, PAGE_SIZE};
pub use identity::{CurrentUser, UserContext};
pub use message::{Message, MessagePatch, NewMessage, PageQuery, SortOrder, UserProfile};
pub use presence::{PresenceClient, PresenceState, PresenceTracker};
pub use protocol::{ChangeEvent, ChangeKind, PresenceEventKind, PresenceSignal, RoomRef};
pub use realtime::{
    Channel, ChannelEvent, ChannelKind, LocalHub, RealtimeClient, RealtimeConfig, Transport,
};
pub use room::{ChatRoom, RoomOptions};
pub use store::{MemoryStore, MessageStore, RestStore};
