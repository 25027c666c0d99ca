//! Error types surfaced to callers of the engine.

/// Failures a caller of [`crate::connection::EventSocket`] can observe.
///
/// Internal, non-fatal framing hiccups (bad header line, bad
/// `Content-Length`) are not represented here; the parser absorbs and logs
/// those and the engine continues.
#[derive(Debug, thiserror::Error)]
pub enum EslError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("max retries exceeded ({0} attempts)")]
    MaxRetriesExceeded(u32),

    #[error("not connected")]
    NotConnected,

    #[error("request cancelled")]
    Cancelled,
}

/// Failures loading a [`crate::config::Config`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required field: {0}")]
    MissingField(String),
}
