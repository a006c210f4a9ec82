//! Realtime transport.
//!
//! [`Transport`] and [`Channel`] are the seam the presence tracker and the
//! message feed consume. Two implementations ship here: [`RealtimeClient`],
//! a Supabase Realtime client over Phoenix Channels v1 (`tokio-tungstenite`,
//! heartbeats, auto-reconnect with backoff), and [`LocalHub`], an
//! in-process hub for tests and offline use.

mod channel;
mod client;
mod connection;
mod handler;
mod local;
mod types;

pub use channel::{Channel, ChannelEvent, ChannelKind, Transport};
pub use client::{RealtimeChannel, RealtimeClient};
pub use local::{LocalChannel, LocalHub};
pub use types::{BroadcastConfig, ChannelConfig, PhoenixMessage, PostgresChangesFilter, RealtimeConfig};
