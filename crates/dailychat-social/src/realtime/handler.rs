//! Incoming Phoenix message handler and per-topic dispatch.

use tracing::{debug, info, warn};

use crate::protocol::{ChangeEvent, ChangeKind};

use super::channel::ChannelEvent;
use super::client::Routes;
use super::connection::JoinedChannels;
use super::types::PhoenixMessage;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract the short topic name from a Phoenix topic (strip "realtime:" prefix).
fn strip_topic_prefix(topic: &str) -> &str {
    topic.strip_prefix("realtime:").unwrap_or(topic)
}

/// Deliver an event to the subscriber of `topic`, if any.
pub(crate) async fn dispatch(routes: &Routes, topic: &str, event: ChannelEvent) {
    let tx = routes.read().await.get(topic).cloned();
    match tx {
        Some(tx) => {
            if tx.send(event).await.is_err() {
                debug!(topic = %topic, "Channel receiver dropped");
            }
        }
        None => debug!(topic = %topic, "No subscriber for topic"),
    }
}

/// Deliver an event to every open channel.
pub(crate) async fn dispatch_all(routes: &Routes, event: ChannelEvent) {
    let senders: Vec<_> = routes.read().await.values().cloned().collect();
    for tx in senders {
        let _ = tx.send(event.clone()).await;
    }
}

/// Parse the `data` object of a `postgres_changes` frame.
pub(crate) fn parse_change(data: &serde_json::Value) -> Option<ChangeEvent> {
    let kind: ChangeKind = serde_json::from_value(data.get("type")?.clone()).ok()?;
    let row = |key: &str| {
        data.get(key)
            .filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))
            .cloned()
    };
    Some(ChangeEvent {
        schema: data.get("schema")?.as_str()?.to_string(),
        table: data.get("table")?.as_str()?.to_string(),
        kind,
        new: row("record"),
        old: row("old_record"),
    })
}

// ---------------------------------------------------------------------------
// Message Handler
// ---------------------------------------------------------------------------

/// Handle a single incoming Phoenix message.
pub(crate) async fn handle_phoenix_message(
    msg: &PhoenixMessage,
    joined_channels: &JoinedChannels,
    routes: &Routes,
) {
    let topic = strip_topic_prefix(&msg.topic);

    match msg.event.as_str() {
        "phx_reply" => {
            let is_join_reply = {
                let channels = joined_channels.read().await;
                channels
                    .get(topic)
                    .and_then(|c| c.join_ref.as_ref())
                    .is_some_and(|r| msg.msg_ref.as_ref() == Some(r))
            };
            let status = msg
                .payload
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("");
            match (is_join_reply, status) {
                (true, "ok") => {
                    debug!(topic = %topic, "Channel joined");
                    dispatch(routes, topic, ChannelEvent::Subscribed).await;
                }
                (true, _) => {
                    let reason = msg
                        .payload
                        .get("response")
                        .and_then(|r| r.get("reason"))
                        .and_then(|r| r.as_str())
                        .unwrap_or("unknown error")
                        .to_string();
                    warn!(topic = %topic, status = %status, reason = %reason, "Channel join rejected");
                    dispatch(routes, topic, ChannelEvent::Error(reason)).await;
                }
                (false, "ok") => {}
                (false, _) => {
                    warn!(topic = %topic, status = %status, "Channel reply error");
                }
            }
        }
        "phx_error" => {
            warn!(topic = %topic, "Channel error");
            dispatch(routes, topic, ChannelEvent::Error("channel error".to_string())).await;
        }
        "phx_close" => {
            info!(topic = %topic, "Channel closed");
            dispatch(
                routes,
                topic,
                ChannelEvent::Error("channel closed by server".to_string()),
            )
            .await;
        }
        "broadcast" => {
            let inner_event = msg
                .payload
                .get("event")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown")
                .to_string();
            let inner_payload = msg
                .payload
                .get("payload")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            debug!(topic = %topic, event = %inner_event, "Broadcast received");
            dispatch(
                routes,
                topic,
                ChannelEvent::Broadcast {
                    event: inner_event,
                    payload: inner_payload,
                },
            )
            .await;
        }
        "postgres_changes" => match msg.payload.get("data").and_then(parse_change) {
            Some(change) => {
                debug!(topic = %topic, table = %change.table, kind = ?change.kind, "Change received");
                dispatch(routes, topic, ChannelEvent::Change(change)).await;
            }
            None => warn!(topic = %topic, "Malformed postgres_changes payload"),
        },
        "system" => {
            debug!(topic = %topic, payload = %msg.payload, "System message");
        }
        _ => {
            debug!(
                topic = %topic,
                event = %msg.event,
                "Unhandled Phoenix event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use serde_json::json;
    use tokio::sync::{mpsc, RwLock};

    use super::*;
    use crate::realtime::connection::JoinedChannel;
    use crate::realtime::types::ChannelConfig;

    fn setup(topic: &str, join_ref: &str) -> (JoinedChannels, Routes, mpsc::Receiver<ChannelEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let routes: Routes = Arc::new(RwLock::new(HashMap::from([(topic.to_string(), tx)])));
        let joined: JoinedChannels = Arc::new(RwLock::new(HashMap::from([(
            topic.to_string(),
            JoinedChannel {
                config: ChannelConfig::default(),
                join_ref: Some(join_ref.to_string()),
            },
        )])));
        (joined, routes, rx)
    }

    fn frame(topic: &str, event: &str, payload: serde_json::Value, r: Option<&str>) -> PhoenixMessage {
        PhoenixMessage {
            topic: format!("realtime:{topic}"),
            event: event.to_string(),
            payload,
            msg_ref: r.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn join_reply_emits_subscribed() {
        let (joined, routes, mut rx) = setup("online-users", "7");
        let msg = frame("online-users", "phx_reply", json!({"status": "ok", "response": {}}), Some("7"));
        handle_phoenix_message(&msg, &joined, &routes).await;
        assert!(matches!(rx.try_recv().unwrap(), ChannelEvent::Subscribed));
    }

    #[tokio::test]
    async fn unrelated_reply_is_ignored() {
        let (joined, routes, mut rx) = setup("online-users", "7");
        let msg = frame("online-users", "phx_reply", json!({"status": "ok"}), Some("8"));
        handle_phoenix_message(&msg, &joined, &routes).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rejected_join_emits_error_with_reason() {
        let (joined, routes, mut rx) = setup("online-users", "3");
        let msg = frame(
            "online-users",
            "phx_reply",
            json!({"status": "error", "response": {"reason": "unauthorized"}}),
            Some("3"),
        );
        handle_phoenix_message(&msg, &joined, &routes).await;
        match rx.try_recv().unwrap() {
            ChannelEvent::Error(reason) => assert_eq!(reason, "unauthorized"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn broadcast_unwraps_inner_event() {
        let (joined, routes, mut rx) = setup("online-users", "1");
        let msg = frame(
            "online-users",
            "broadcast",
            json!({"type": "broadcast", "event": "here", "payload": {"clientId": "p1"}}),
            None,
        );
        handle_phoenix_message(&msg, &joined, &routes).await;
        match rx.try_recv().unwrap() {
            ChannelEvent::Broadcast { event, payload } => {
                assert_eq!(event, "here");
                assert_eq!(payload["clientId"], "p1");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn postgres_change_is_parsed() {
        let (joined, routes, mut rx) = setup("public:messages", "1");
        let msg = frame(
            "public:messages",
            "postgres_changes",
            json!({
                "data": {
                    "schema": "public",
                    "table": "messages",
                    "type": "DELETE",
                    "record": {},
                    "old_record": {"id": "m1", "room_name": "lobby"}
                },
                "ids": [1]
            }),
            None,
        );
        handle_phoenix_message(&msg, &joined, &routes).await;
        match rx.try_recv().unwrap() {
            ChannelEvent::Change(change) => {
                assert_eq!(change.kind, ChangeKind::Delete);
                assert!(change.new.is_none());
                assert_eq!(change.old.unwrap()["room_name"], "lobby");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parse_change_requires_type() {
        assert!(parse_change(&json!({"schema": "public", "table": "messages"})).is_none());
    }

    #[tokio::test]
    async fn dispatch_all_reaches_every_route() {
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        let routes: Routes = Arc::new(RwLock::new(HashMap::from([
            ("a".to_string(), tx1),
            ("b".to_string(), tx2),
        ])));
        dispatch_all(&routes, ChannelEvent::Closed).await;
        assert!(matches!(rx1.try_recv().unwrap(), ChannelEvent::Closed));
        assert!(matches!(rx2.try_recv().unwrap(), ChannelEvent::Closed));
    }
}
