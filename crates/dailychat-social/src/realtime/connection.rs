//! Background WebSocket connection loop with auto-reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::channel::ChannelEvent;
use super::client::Routes;
use super::handler::{dispatch_all, handle_phoenix_message};
use super::types::{ChannelConfig, PhoenixMessage, RealtimeCommand, RealtimeConfig};

// ---------------------------------------------------------------------------
// Ref Counter
// ---------------------------------------------------------------------------

/// Monotonically increasing ref counter for Phoenix messages.
static REF_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_ref() -> String {
    REF_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

/// A channel that should be (re)joined on reconnect.
#[derive(Clone)]
pub(crate) struct JoinedChannel {
    pub(crate) config: ChannelConfig,
    /// Ref of the most recent `phx_join`; its reply confirms the subscription.
    pub(crate) join_ref: Option<String>,
}

pub(crate) type JoinedChannels = Arc<RwLock<HashMap<String, JoinedChannel>>>;

fn phoenix(topic: &str, event: &str, payload: serde_json::Value) -> PhoenixMessage {
    PhoenixMessage {
        topic: format!("realtime:{topic}"),
        event: event.to_string(),
        payload,
        msg_ref: Some(next_ref()),
    }
}

/// Serialize and write one frame. Returns false if the socket rejected it.
async fn write_frame<S>(ws_write: &Mutex<S>, msg: &PhoenixMessage) -> bool
where
    S: Sink<WsMessage> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => {
            let mut writer = ws_write.lock().await;
            writer.send(WsMessage::Text(json.into())).await.is_ok()
        }
        Err(e) => {
            warn!(error = %e, "Failed to encode Phoenix message");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Background task managing the WebSocket connection with auto-reconnect.
pub(crate) async fn connection_loop(
    config: RealtimeConfig,
    routes: Routes,
    command_rx: mpsc::Receiver<RealtimeCommand>,
) {
    let command_rx = Arc::new(Mutex::new(command_rx));
    let joined_channels: JoinedChannels = Arc::new(RwLock::new(HashMap::new()));
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut reconnect_delay = config.reconnect_delay_secs;

    loop {
        let url = config.ws_url();
        info!(url = %url.split('?').next().unwrap_or(""), "Connecting to Supabase Realtime");

        match tokio::time::timeout(
            Duration::from_secs(config.connect_timeout_secs),
            tokio_tungstenite::connect_async(&url),
        )
        .await
        {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;
                info!("Connected to Supabase Realtime");

                let (ws_write, ws_read) = ws_stream.split();
                let ws_write = Arc::new(Mutex::new(ws_write));

                // Rejoin previously-joined channels.
                {
                    let mut channels = joined_channels.write().await;
                    for (topic, joined) in channels.iter_mut() {
                        let msg = phoenix(
                            topic,
                            "phx_join",
                            joined
                                .config
                                .to_join_payload(config.access_token.as_deref()),
                        );
                        joined.join_ref = msg.msg_ref.clone();
                        write_frame(&ws_write, &msg).await;
                    }
                }

                let heartbeat_handle = tokio::spawn(heartbeat_task(
                    Arc::clone(&ws_write),
                    config.heartbeat_interval_secs,
                ));

                let cmd_handle = tokio::spawn(command_forwarder(
                    Arc::clone(&command_rx),
                    Arc::clone(&ws_write),
                    Arc::clone(&joined_channels),
                    Arc::clone(&shutdown),
                    config.access_token.clone(),
                ));

                // Process incoming messages.
                let mut read_stream = ws_read;
                while let Some(msg_result) = read_stream.next().await {
                    match msg_result {
                        Ok(WsMessage::Text(text)) => {
                            match serde_json::from_str::<PhoenixMessage>(&text) {
                                Ok(phoenix_msg) => {
                                    handle_phoenix_message(
                                        &phoenix_msg,
                                        &joined_channels,
                                        &routes,
                                    )
                                    .await;
                                }
                                Err(_) => {
                                    debug!(text = %text, "Unrecognized message from Supabase");
                                }
                            }
                        }
                        Ok(WsMessage::Close(_)) => {
                            info!("Supabase Realtime closed connection");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }
                        _ => {}
                    }
                }

                heartbeat_handle.abort();
                cmd_handle.abort();

                if shutdown.load(Ordering::Acquire) {
                    dispatch_all(&routes, ChannelEvent::Closed).await;
                    info!("Realtime connection shut down");
                    return;
                }
                dispatch_all(&routes, ChannelEvent::Error("connection lost".to_string())).await;
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to Supabase Realtime");
                dispatch_all(&routes, ChannelEvent::Error(format!("connection failed: {e}")))
                    .await;
            }
            Err(_elapsed) => {
                error!(
                    timeout = config.connect_timeout_secs,
                    "WebSocket connection timed out"
                );
                dispatch_all(
                    &routes,
                    ChannelEvent::Error("connection timed out".to_string()),
                )
                .await;
            }
        }

        if shutdown.load(Ordering::Acquire) {
            return;
        }

        // Exponential backoff reconnect.
        info!(delay = reconnect_delay, "Reconnecting in {} seconds", reconnect_delay);
        tokio::time::sleep(Duration::from_secs(reconnect_delay)).await;
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs);
    }
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

async fn heartbeat_task<S>(ws_write: Arc<Mutex<S>>, interval_secs: u64)
where
    S: Sink<WsMessage> + Unpin,
{
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        let msg = PhoenixMessage {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: serde_json::json!({}),
            msg_ref: Some(next_ref()),
        };
        if !write_frame(&ws_write, &msg).await {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Command Forwarder
// ---------------------------------------------------------------------------

async fn command_forwarder<S>(
    cmd_rx: Arc<Mutex<mpsc::Receiver<RealtimeCommand>>>,
    cmd_write: Arc<Mutex<S>>,
    joined_channels: JoinedChannels,
    shutdown: Arc<AtomicBool>,
    access_token: Option<String>,
) where
    S: Sink<WsMessage> + Unpin,
{
    let mut rx = cmd_rx.lock().await;
    while let Some(cmd) = rx.recv().await {
        match cmd {
            RealtimeCommand::JoinChannel { topic, config } => {
                let msg = phoenix(
                    &topic,
                    "phx_join",
                    config.to_join_payload(access_token.as_deref()),
                );
                let join_ref = msg.msg_ref.clone();
                // Record before writing so the reply can never outrun the ref.
                joined_channels
                    .write()
                    .await
                    .insert(topic.clone(), JoinedChannel { config, join_ref });
                if !write_frame(&cmd_write, &msg).await {
                    warn!(topic = %topic, "Failed to send phx_join");
                }
            }
            RealtimeCommand::LeaveChannel { topic } => {
                joined_channels.write().await.remove(&topic);
                let msg = phoenix(&topic, "phx_leave", serde_json::json!({}));
                if !write_frame(&cmd_write, &msg).await {
                    warn!(topic = %topic, "Failed to send phx_leave");
                }
            }
            RealtimeCommand::Broadcast {
                topic,
                event,
                payload,
            } => {
                let msg = phoenix(
                    &topic,
                    "broadcast",
                    serde_json::json!({
                        "type": "broadcast",
                        "event": event,
                        "payload": payload
                    }),
                );
                if !write_frame(&cmd_write, &msg).await {
                    warn!(topic = %topic, event = %event, "Broadcast send failed");
                }
            }
            RealtimeCommand::Disconnect => {
                shutdown.store(true, Ordering::Release);
                let topics: Vec<String> = joined_channels.write().await.drain().map(|(t, _)| t).collect();
                for topic in topics {
                    let msg = phoenix(&topic, "phx_leave", serde_json::json!({}));
                    write_frame(&cmd_write, &msg).await;
                }
                let mut writer = cmd_write.lock().await;
                let _ = writer.send(WsMessage::Close(None)).await;
                return;
            }
        }
    }
}
