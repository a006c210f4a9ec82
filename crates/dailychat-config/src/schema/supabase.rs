//! Supabase project connection settings.

use serde::{Deserialize, Serialize};

/// Where the message store and realtime service live.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyzcompany.supabase.co`.
    pub url: String,
    /// Public anon key.
    pub anon_key: String,
}

impl SupabaseConfig {
    /// True when both the URL and the anon key are present.
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.anon_key.trim().is_empty()
    }
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .finish()
    }
}
