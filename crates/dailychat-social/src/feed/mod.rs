//! Paginated, realtime-refreshed message feed for one room.

mod client;
mod window;


pub use client::{FeedOptions, MessageFeed, PAGE_SIZE};
pub use window::{FeedSnapshot, FeedWindow, LatestRequest, OlderRequest};
