//! Errors returned by the bridge facade and setup functions.
//!
//! Session failures are deliberately absent: the worker logs them and callers
//! keep reading the last cached value.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The observer was released (or the registry torn down) and must not be
    /// used again. Ask the registry for a fresh instance instead.
    #[error("user data observer has been released")]
    Released,
    /// Facade methods may only be called from the thread that owns the observer.
    #[error("user data observer called from a thread that does not own it")]
    WrongThread,
    #[error("failed to spawn bridge worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("can't read config {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("invalid log filter: {0}")]
    LogFilter(#[from] tracing_subscriber::filter::ParseError),
}
