//! Daily Chat configuration system.
//!
//! TOML-based configuration with validation. Every section uses serde
//! defaults so a partial (or missing) config file works out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use dailychat_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{ChatConfig, CONFIG_SCHEMA_VERSION};

use dailychat_common::ConfigError;
use std::path::Path;

/// Environment variable overriding `supabase.url`.
pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
/// Environment variable overriding `supabase.anon_key`.
pub const ENV_SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";

/// Load config from the platform default path, apply environment
/// overrides and validate the result.
pub fn load_config() -> Result<ChatConfig, ConfigError> {
    let mut config = toml_loader::load_default()?;
    apply_env_overrides(&mut config);
    validation::validate(&config)?;
    Ok(config)
}

/// Same as [`load_config`] but reads an explicit file.
pub fn load_config_from(path: &Path) -> Result<ChatConfig, ConfigError> {
    let mut config = toml_loader::load_from_path(path)?;
    apply_env_overrides(&mut config);
    validation::validate(&config)?;
    Ok(config)
}

/// Overlay `SUPABASE_URL` / `SUPABASE_ANON_KEY` when they are set and non-empty.
pub fn apply_env_overrides(config: &mut ChatConfig) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

fn apply_overrides_from(config: &mut ChatConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup(ENV_SUPABASE_URL).filter(|v| !v.trim().is_empty()) {
        tracing::debug!("supabase.url overridden from environment");
        config.supabase.url = url.trim().to_string();
    }
    if let Some(key) = lookup(ENV_SUPABASE_ANON_KEY).filter(|v| !v.trim().is_empty()) {
        tracing::debug!("supabase.anon_key overridden from environment");
        config.supabase.anon_key = key.trim().to_string();
    }
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &ChatConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
