//! Plain-text rendering of the room header and the feed window.

use std::fmt::Write as _;

use chrono::TimeZone;
use dailychat_common::ChatError;
use dailychat_social::{FeedSnapshot, Message};

/// Header label, pluralized the way the web header does it.
pub fn online_label(count: usize) -> String {
    if count == 1 {
        "1 online".to_string()
    } else {
        format!("{count} onlines")
    }
}

pub fn format_message<Tz>(message: &Message, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let at = message.created_at.with_timezone(tz).format("%H:%M");
    let edited = if message.edited { " (edited)" } else { "" };
    format!(
        "{at} {}: {}{edited}  [{}]",
        message.sender_name(),
        message.text,
        message.id
    )
}

/// How a failed command is reported. Errors raised before anything reached
/// the store read as hints.
pub fn error_line(error: &ChatError) -> String {
    if error.is_local() {
        format!("! {error}")
    } else {
        format!("error: {error}")
    }
}

/// The whole screen: header, optional "more above" hint, messages.
pub fn render_window<Tz>(room: Option<&str>, online: usize, snapshot: &FeedSnapshot, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut out = String::new();
    let _ = writeln!(
        out,
        "== {} · {} ==",
        room.unwrap_or("default room"),
        online_label(online)
    );
    if snapshot.has_more_older {
        let _ = writeln!(out, "   (older messages: /older)");
    }
    if snapshot.messages.is_empty() {
        let _ = writeln!(out, "   no messages yet");
    }
    for message in &snapshot.messages {
        let _ = writeln!(out, "{}", format_message(message, tz));
    }
    out
}
