use std::path::PathBuf;

use clap::Parser;

/// Daily Chat: a terminal client for a realtime chat room.
#[derive(Parser, Debug)]
#[command(name = "dailychat", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Room to join. Omit for the default room.
    #[arg(short, long)]
    pub room: Option<String>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Print the effective config as JSON and exit.
    #[arg(long)]
    pub print_config: bool,

    /// Run against an in-process hub and in-memory store.
    #[arg(long)]
    pub offline: bool,

    /// Id of the signed-in user. Without it the room is read-only
    /// (offline mode makes one up).
    #[arg(long)]
    pub user_id: Option<String>,

    /// Display name stored in the user's profile row.
    #[arg(long)]
    pub display_name: Option<String>,

    /// Supabase Auth JWT of the signed-in user.
    #[arg(long, env = "DAILYCHAT_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_room_and_offline() {
        let args = Args::try_parse_from(["dailychat", "--room", "lobby", "--offline"]).unwrap();
        assert_eq!(args.room.as_deref(), Some("lobby"));
        assert!(args.offline);
        assert!(args.user_id.is_none());
    }

    #[test]
    fn defaults_to_default_room() {
        let args = Args::try_parse_from(["dailychat"]).unwrap();
        assert!(args.room.is_none());
        assert!(!args.offline);
        assert!(!args.print_config);
    }

    #[test]
    fn parses_print_config() {
        let args = Args::try_parse_from(["dailychat", "--print-config"]).unwrap();
        assert!(args.print_config);
    }
}
