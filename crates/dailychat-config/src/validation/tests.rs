//! Tests for the full validation pipeline.

use super::*;
use crate::schema::*;

#[test]
fn default_config_validates() {
    let config = ChatConfig::default();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_page_size_zero() {
    let mut config = ChatConfig::default();
    config.feed.page_size = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("feed.page_size"));
}

#[test]
fn catches_page_size_too_large() {
    let mut config = ChatConfig::default();
    config.feed.page_size = 101;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("feed.page_size"));
}

#[test]
fn catches_bad_url_scheme() {
    let mut config = ChatConfig::default();
    config.supabase.url = "ftp://abc.supabase.co".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("supabase.url"));
}

#[test]
fn accepts_http_and_https_urls() {
    let mut config = ChatConfig::default();
    config.supabase.url = "http://localhost:54321".into();
    assert!(validate(&config).is_ok());
    config.supabase.url = "https://abc.supabase.co".into();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_inverted_reconnect_delays() {
    let mut config = ChatConfig::default();
    config.realtime.reconnect_delay_secs = 10;
    config.realtime.max_reconnect_delay_secs = 5;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("max_reconnect_delay_secs"));
}

#[test]
fn catches_blank_topics() {
    let mut config = ChatConfig::default();
    config.presence.topic = "  ".into();
    config.feed.table = String::new();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("presence.topic"));
    assert!(err.contains("feed.table"));
}

#[test]
fn collects_multiple_errors() {
    let mut config = ChatConfig::default();
    config.feed.page_size = 0;
    config.realtime.heartbeat_interval_secs = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("feed.page_size"));
    assert!(err.contains("realtime.heartbeat_interval_secs"));
    assert!(err.contains("; "));
}
