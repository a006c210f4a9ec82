use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Every failure the chat core reports to its caller.
///
/// Nothing is retried automatically; the UI layer decides how to show it.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Channel open or send failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A read against the message store failed. The feed window is untouched.
    #[error("query error: {0}")]
    Query(String),

    /// The store refused an insert, update or delete.
    #[error("mutation rejected: {0}")]
    MutationRejected(String),

    /// Input rejected before any request was issued.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not signed in")]
    NotSignedIn,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// True for errors produced before anything was sent to the store.
    pub fn is_local(&self) -> bool {
        matches!(self, ChatError::Validation(_) | ChatError::NotSignedIn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("feed.page_size = 0".into());
        assert_eq!(err.to_string(), "config validation error: feed.page_size = 0");
    }

    #[test]
    fn chat_error_display() {
        let err = ChatError::Transport("socket closed".into());
        assert_eq!(err.to_string(), "transport error: socket closed");

        let err = ChatError::Query("timeout".into());
        assert_eq!(err.to_string(), "query error: timeout");

        let err = ChatError::MutationRejected("row level security".into());
        assert_eq!(err.to_string(), "mutation rejected: row level security");

        let err = ChatError::Validation("message text is empty".into());
        assert_eq!(err.to_string(), "validation error: message text is empty");

        assert_eq!(ChatError::NotSignedIn.to_string(), "not signed in");
    }

    #[test]
    fn chat_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let err: ChatError = config_err.into();
        assert!(matches!(err, ChatError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn chat_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: ChatError = io_err.into();
        assert!(matches!(err, ChatError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn local_errors() {
        assert!(ChatError::Validation("x".into()).is_local());
        assert!(ChatError::NotSignedIn.is_local());
        assert!(!ChatError::Query("x".into()).is_local());
        assert!(!ChatError::MutationRejected("x".into()).is_local());
    }
}
