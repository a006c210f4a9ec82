//! Online-user count over a shared broadcast channel.
//!
//! Peers announce themselves with `join`, solicit `here` replies with
//! `who_is_online`, and say goodbye with `leave`. There is no server-side
//! state: the count is whatever this session has heard. The pure
//! [`PresenceTracker`] holds the set; [`PresenceClient`] drives it from a
//! transport channel.

mod client;
mod tracker;

pub use client::PresenceClient;
pub use tracker::{PresenceState, PresenceTracker};
