//! dailychat: terminal client for one realtime chat room.
//!
//! Shows the online count and the room's message feed, and reads commands
//! from stdin. Ctrl-C leaves the room the same way `/quit` does.

mod cli;
mod commands;
mod logging;
mod render;

use std::sync::Arc;

use dailychat_common::{new_id, ChatError, ClientId, ConfigError};
use dailychat_config::ChatConfig;
use dailychat_social::{
    ChatRoom, CurrentUser, FeedOptions, LocalHub, MemoryStore, MessageStore, RealtimeClient,
    RealtimeConfig, RestStore, RoomOptions, Transport, UserContext,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::Args;
use crate::commands::{parse_command, Command, HELP};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    let logging = logging::init(args.log_level.as_deref());

    let config = match &args.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "Using config override");
            dailychat_config::load_config_from(path)
        }
        None => dailychat_config::load_config(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("dailychat: {e}");
            std::process::exit(2);
        }
    };
    logging.apply_config_level(config.logging.level.as_str());

    if args.print_config {
        println!("{}", dailychat_config::config_to_json(&redacted(&config)));
        return;
    }

    if let Err(e) = run(args, config).await {
        tracing::error!(error = %e, "dailychat exited with an error");
        eprintln!("dailychat: {e}");
        std::process::exit(1);
    }
}

/// The config with the anon key masked, for printing.
fn redacted(config: &ChatConfig) -> ChatConfig {
    let mut config = config.clone();
    if !config.supabase.anon_key.is_empty() {
        config.supabase.anon_key = "<redacted>".to_string();
    }
    config
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

struct Backend {
    transport: Arc<dyn Transport>,
    store: Arc<dyn MessageStore>,
    realtime: Option<RealtimeClient>,
}

fn offline_backend(config: &ChatConfig) -> Backend {
    let hub = LocalHub::new();
    let store = MemoryStore::new()
        .with_hub(hub.clone())
        .with_table(&config.feed.schema, &config.feed.table);
    Backend {
        transport: Arc::new(hub),
        store: Arc::new(store),
        realtime: None,
    }
}

fn supabase_backend(config: &ChatConfig, access_token: Option<String>) -> Result<Backend, ChatError> {
    if !config.supabase.is_configured() {
        return Err(ConfigError::ValidationError(
            "supabase.url and supabase.anon_key must be set (or run with --offline)".into(),
        )
        .into());
    }
    let realtime = RealtimeClient::connect(RealtimeConfig {
        url: config.supabase.url.clone(),
        api_key: config.supabase.anon_key.clone(),
        access_token: access_token.clone(),
        heartbeat_interval_secs: config.realtime.heartbeat_interval_secs,
        reconnect_delay_secs: config.realtime.reconnect_delay_secs,
        max_reconnect_delay_secs: config.realtime.max_reconnect_delay_secs,
        connect_timeout_secs: config.realtime.connect_timeout_secs,
    });
    let store = RestStore::new(&config.supabase.url, &config.supabase.anon_key)?
        .with_access_token(access_token)
        .with_messages_table(&config.feed.table);
    Ok(Backend {
        transport: Arc::new(realtime.clone()),
        store: Arc::new(store),
        realtime: Some(realtime),
    })
}

fn room_options(args: &Args, config: &ChatConfig) -> RoomOptions {
    RoomOptions {
        presence_topic: config.presence.topic.clone(),
        client_id: ClientId::new(),
        feed: FeedOptions {
            room: args.room.clone(),
            page_size: config.feed.page_size,
            schema: config.feed.schema.clone(),
            table: config.feed.table.clone(),
            topic: config.feed.changes_topic.clone(),
        },
    }
}

async fn run(args: Args, config: ChatConfig) -> Result<(), ChatError> {
    let backend = if args.offline {
        offline_backend(&config)
    } else {
        supabase_backend(&config, args.access_token.clone())?
    };

    let user = UserContext::new();
    let user_id = match (&args.user_id, args.offline) {
        (Some(id), _) => Some(id.clone()),
        (None, true) => Some(new_id()),
        (None, false) => None,
    };
    match user_id {
        Some(id) => {
            let current = CurrentUser::from_auth(
                id,
                args.display_name.as_deref().or(Some("Guest")),
                None,
                None,
                args.access_token.clone(),
            );
            user.init(current, backend.store.as_ref()).await;
        }
        None => println!("not signed in: the room is read-only (pass --user-id to post)"),
    }

    let room = ChatRoom::mount(
        backend.transport.as_ref(),
        Arc::clone(&backend.store),
        user,
        room_options(&args, &config),
    )
    .await?;

    let renderer = tokio::spawn(render_loop(
        room.room().map(str::to_string),
        room.online_count(),
        room.feed(),
    ));

    let result = input_loop(&room).await;

    room.unmount().await;
    renderer.abort();
    if let Some(realtime) = &backend.realtime {
        realtime.disconnect().await;
    }
    result
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

async fn render_loop(
    room: Option<String>,
    mut online: tokio::sync::watch::Receiver<usize>,
    mut feed: tokio::sync::watch::Receiver<dailychat_social::FeedSnapshot>,
) {
    let mut last = None;
    loop {
        let screen = {
            let snapshot = feed.borrow_and_update().clone();
            let count = *online.borrow_and_update();
            render::render_window(room.as_deref(), count, &snapshot, &chrono::Local)
        };
        if last.as_ref() != Some(&screen) {
            println!("{screen}");
            last = Some(screen);
        }
        tokio::select! {
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = feed.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Read commands until `/quit`, end of input or Ctrl-C.
async fn input_loop(room: &ChatRoom) -> Result<(), ChatError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let line = tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, leaving room");
                return Ok(());
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            return Ok(());
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        if command == Command::Quit {
            return Ok(());
        }
        if let Err(e) = execute(room, command).await {
            eprintln!("{}", render::error_line(&e));
        }
    }
}

async fn execute(room: &ChatRoom, command: Command) -> Result<(), ChatError> {
    match command {
        Command::Send(text) => room.send_message(&text).await,
        Command::Older => {
            if !room.load_older().await? && !room.has_more_older() {
                println!("no older messages");
            }
            Ok(())
        }
        Command::Edit { id, text } => room.edit_message(&id, &text).await,
        Command::Delete { id } => room.delete_message(&id).await,
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Quit => Ok(()),
    }
}
