//! Configuration, protocol types, and command enum for the realtime client.

use serde::{Deserialize, Serialize};

use super::channel::ChannelKind;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for connecting to Supabase Realtime.
#[derive(Clone)]
pub struct RealtimeConfig {
    /// Project URL (e.g., "https://xyzcompany.supabase.co").
    pub url: String,
    /// Supabase anon key (publishable).
    pub api_key: String,
    /// Optional access token (JWT) for authenticated channels.
    pub access_token: Option<String>,
    /// Heartbeat interval in seconds (default: 25).
    pub heartbeat_interval_secs: u64,
    /// Reconnect base delay in seconds.
    pub reconnect_delay_secs: u64,
    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay_secs: u64,
    /// Give up on a connection attempt after this many seconds.
    pub connect_timeout_secs: u64,
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("max_reconnect_delay_secs", &self.max_reconnect_delay_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            access_token: None,
            heartbeat_interval_secs: 25,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
            connect_timeout_secs: 15,
        }
    }
}

impl RealtimeConfig {
    /// Build the WebSocket URL for Supabase Realtime from the project URL.
    pub(crate) fn ws_url(&self) -> String {
        let base = self.url.trim().trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("wss://{base}")
        };
        format!(
            "{base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.api_key
        )
    }
}

// ---------------------------------------------------------------------------
// Phoenix Protocol Types
// ---------------------------------------------------------------------------

/// A Phoenix protocol message envelope (v1 JSON format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
    #[serde(rename = "ref")]
    pub msg_ref: Option<String>,
}

// ---------------------------------------------------------------------------
// Channel Configuration
// ---------------------------------------------------------------------------

/// Join configuration for a Supabase Realtime channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelConfig {
    pub broadcast: BroadcastConfig,
    pub postgres_changes: Vec<PostgresChangesFilter>,
}

/// Broadcast configuration for a channel.
#[derive(Debug, Clone, Default)]
pub struct BroadcastConfig {
    /// Whether to receive your own broadcasts (Supabase "self" key).
    pub self_send: bool,
    /// Whether broadcasts are acknowledged by the server.
    pub ack: bool,
}

/// One `postgres_changes` subscription. `event` is `*` for all mutations.
#[derive(Debug, Clone)]
pub struct PostgresChangesFilter {
    pub event: String,
    pub schema: String,
    pub table: String,
}

impl From<&ChannelKind> for ChannelConfig {
    fn from(kind: &ChannelKind) -> Self {
        match kind {
            ChannelKind::Broadcast { self_send } => ChannelConfig {
                broadcast: BroadcastConfig {
                    self_send: *self_send,
                    ack: false,
                },
                postgres_changes: Vec::new(),
            },
            ChannelKind::PostgresChanges { schema, table } => ChannelConfig {
                broadcast: BroadcastConfig::default(),
                postgres_changes: vec![PostgresChangesFilter {
                    event: "*".to_string(),
                    schema: schema.clone(),
                    table: table.clone(),
                }],
            },
        }
    }
}

impl ChannelConfig {
    /// Serialize to the JSON payload expected by Supabase phx_join.
    pub(crate) fn to_join_payload(&self, access_token: Option<&str>) -> serde_json::Value {
        let changes: Vec<serde_json::Value> = self
            .postgres_changes
            .iter()
            .map(|f| {
                serde_json::json!({
                    "event": f.event,
                    "schema": f.schema,
                    "table": f.table
                })
            })
            .collect();
        let mut payload = serde_json::json!({
            "config": {
                "broadcast": {
                    "self": self.broadcast.self_send,
                    "ack": self.broadcast.ack
                },
                "presence": {
                    "key": ""
                },
                "postgres_changes": changes
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = serde_json::json!(token);
        }
        payload
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Commands sent to the connection task from channel handles.
#[derive(Debug)]
pub(crate) enum RealtimeCommand {
    JoinChannel {
        topic: String,
        config: ChannelConfig,
    },
    LeaveChannel {
        topic: String,
    },
    Broadcast {
        topic: String,
        event: String,
        payload: serde_json::Value,
    },
    Disconnect,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_from_https_project_url() {
        let config = RealtimeConfig {
            url: "https://abc.supabase.co/".into(),
            api_key: "anon".into(),
            ..Default::default()
        };
        assert_eq!(
            config.ws_url(),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
    }

    #[test]
    fn ws_url_from_local_http_url() {
        let config = RealtimeConfig {
            url: "http://localhost:54321".into(),
            api_key: "k".into(),
            ..Default::default()
        };
        assert!(config.ws_url().starts_with("ws://localhost:54321/realtime/v1/websocket"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = RealtimeConfig {
            api_key: "super-secret".into(),
            access_token: Some("jwt".into()),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("jwt"));
    }

    #[test]
    fn broadcast_join_payload() {
        let config = ChannelConfig::from(&ChannelKind::Broadcast { self_send: false });
        let payload = config.to_join_payload(None);
        assert_eq!(payload["config"]["broadcast"]["self"], false);
        assert_eq!(payload["config"]["postgres_changes"], serde_json::json!([]));
        assert!(payload.get("access_token").is_none());
    }

    #[test]
    fn postgres_changes_join_payload() {
        let config = ChannelConfig::from(&ChannelKind::PostgresChanges {
            schema: "public".into(),
            table: "messages".into(),
        });
        let payload = config.to_join_payload(Some("jwt"));
        let changes = &payload["config"]["postgres_changes"][0];
        assert_eq!(changes["event"], "*");
        assert_eq!(changes["schema"], "public");
        assert_eq!(changes["table"], "messages");
        assert_eq!(payload["access_token"], "jwt");
    }
}
