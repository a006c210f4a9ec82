//! Wire-level payloads for the presence broadcast channel and the
//! row-level change notifications of the message table.
//!
//! The transport envelope (Phoenix Channels) is handled by `realtime`.

use dailychat_common::ClientId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Presence broadcast events
// ---------------------------------------------------------------------------

/// Event names used on the presence broadcast channel.
pub mod events {
    pub const WHO_IS_ONLINE: &str = "who_is_online";
    pub const HERE: &str = "here";
    pub const JOIN: &str = "join";
    pub const LEAVE: &str = "leave";
}

/// Payload carried by every presence broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePayload {
    #[serde(rename = "clientId")]
    pub client_id: ClientId,
}

/// The four presence handshake events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenceEventKind {
    /// Solicits a `Here` from every other peer.
    WhoIsOnline,
    /// Reply to `WhoIsOnline`.
    Here,
    Join,
    Leave,
}

impl PresenceEventKind {
    pub fn event_name(&self) -> &'static str {
        match self {
            PresenceEventKind::WhoIsOnline => events::WHO_IS_ONLINE,
            PresenceEventKind::Here => events::HERE,
            PresenceEventKind::Join => events::JOIN,
            PresenceEventKind::Leave => events::LEAVE,
        }
    }

    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            events::WHO_IS_ONLINE => Some(PresenceEventKind::WhoIsOnline),
            events::HERE => Some(PresenceEventKind::Here),
            events::JOIN => Some(PresenceEventKind::Join),
            events::LEAVE => Some(PresenceEventKind::Leave),
            _ => None,
        }
    }
}

/// One presence event, either received from a peer or about to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceSignal {
    pub kind: PresenceEventKind,
    pub client_id: ClientId,
}

impl PresenceSignal {
    pub fn new(kind: PresenceEventKind, client_id: ClientId) -> Self {
        Self { kind, client_id }
    }

    /// Decode a broadcast. Unknown event names and malformed payloads yield `None`.
    pub fn from_wire(event: &str, payload: &serde_json::Value) -> Option<Self> {
        let kind = PresenceEventKind::from_event_name(event)?;
        let payload: PresencePayload = serde_json::from_value(payload.clone()).ok()?;
        Some(Self {
            kind,
            client_id: payload.client_id,
        })
    }

    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({ "clientId": self.client_id })
    }
}

// ---------------------------------------------------------------------------
// Change notifications
// ---------------------------------------------------------------------------

/// Row-level mutation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A push notification describing one row mutation.
///
/// `new` is absent for deletes, `old` is absent for inserts. Depending on
/// the table's replica identity, `old` may carry only the primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub schema: String,
    pub table: String,
    pub kind: ChangeKind,
    pub new: Option<serde_json::Value>,
    pub old: Option<serde_json::Value>,
}

/// Which room a change touched, as far as the row snapshots tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomRef {
    /// `None` is the default room.
    Known(Option<String>),
    /// Neither snapshot carried a `room_name` column.
    Unknown,
}

impl RoomRef {
    /// Whether a feed showing `room` should treat this change as its own.
    /// Unknown rooms count as a match.
    pub fn matches(&self, room: Option<&str>) -> bool {
        match self {
            RoomRef::Known(r) => r.as_deref() == room,
            RoomRef::Unknown => true,
        }
    }
}

impl ChangeEvent {
    /// Resolve the affected room, preferring the new row over the old one.
    pub fn affected_room(&self) -> RoomRef {
        let room_of = |row: &Option<serde_json::Value>| {
            row.as_ref()
                .and_then(|r| r.get("room_name"))
                .cloned()
        };
        match (room_of(&self.new), room_of(&self.old)) {
            (Some(serde_json::Value::String(room)), _) => RoomRef::Known(Some(room)),
            (_, Some(serde_json::Value::String(room))) => RoomRef::Known(Some(room)),
            (Some(_), _) | (_, Some(_)) => RoomRef::Known(None),
            (None, None) => RoomRef::Unknown,
        }
    }
}
