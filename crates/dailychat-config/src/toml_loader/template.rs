//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Daily Chat Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.
# SUPABASE_URL and SUPABASE_ANON_KEY in the environment take precedence.

[supabase]
# url = "https://xyzcompany.supabase.co"
# anon_key = ""

[realtime]
# heartbeat_interval_secs = 25    # 1-300
# reconnect_delay_secs = 1
# max_reconnect_delay_secs = 30   # >= reconnect_delay_secs
# connect_timeout_secs = 15       # 1-120

[presence]
# topic = "online-users"

[feed]
# page_size = 20                  # 1-100
# schema = "public"
# table = "messages"
# changes_topic = "public:messages"

[logging]
# level = "info"                  # trace, debug, info, warn, error
"##
    .to_string()
}
