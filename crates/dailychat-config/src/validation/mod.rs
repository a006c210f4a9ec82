//! Full configuration validation.
//!
//! Every section is checked and all problems are collected into a single
//! `ConfigError` so the user sees them at once.

mod helpers;

#[cfg(test)]
mod tests;

use crate::schema::ChatConfig;
use dailychat_common::ConfigError;

use helpers::{validate_non_empty, validate_range};

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &ChatConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_supabase(&mut errors, config);
    validate_realtime(&mut errors, config);
    validate_presence(&mut errors, config);
    validate_feed(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_supabase(errors: &mut Vec<String>, config: &ChatConfig) {
    let url = config.supabase.url.trim();
    if !url.is_empty() && !(url.starts_with("https://") || url.starts_with("http://")) {
        errors.push(format!("supabase.url = {url:?} must start with http:// or https://"));
    }
}

fn validate_realtime(errors: &mut Vec<String>, config: &ChatConfig) {
    let rt = &config.realtime;
    validate_range(errors, "realtime.heartbeat_interval_secs", rt.heartbeat_interval_secs, 1, 300);
    validate_range(errors, "realtime.reconnect_delay_secs", rt.reconnect_delay_secs, 1, 300);
    validate_range(errors, "realtime.connect_timeout_secs", rt.connect_timeout_secs, 1, 120);
    if rt.max_reconnect_delay_secs < rt.reconnect_delay_secs {
        errors.push(format!(
            "realtime.max_reconnect_delay_secs = {} is below reconnect_delay_secs = {}",
            rt.max_reconnect_delay_secs, rt.reconnect_delay_secs
        ));
    }
}

fn validate_presence(errors: &mut Vec<String>, config: &ChatConfig) {
    validate_non_empty(errors, "presence.topic", &config.presence.topic);
}

fn validate_feed(errors: &mut Vec<String>, config: &ChatConfig) {
    let feed = &config.feed;
    validate_range(errors, "feed.page_size", feed.page_size as u64, 1, 100);
    validate_non_empty(errors, "feed.schema", &feed.schema);
    validate_non_empty(errors, "feed.table", &feed.table);
    validate_non_empty(errors, "feed.changes_topic", &feed.changes_topic);
}
