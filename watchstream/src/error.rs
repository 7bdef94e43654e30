//! Error types for stream scheduling and the run loop.

use thiserror::Error;

/// Result type alias for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors that can occur while running or controlling a stream.
#[derive(Error, Debug)]
pub enum StreamError {
    /// A second loop was entered while one is already running.
    #[error("stream is already running a loop")]
    AlreadyLooping,

    /// The native watch backend rejected a path or failed to start.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// The consumer callback failed; the loop has shut down.
    #[error("handler error: {0}")]
    Handler(anyhow::Error),

    /// The event delivery channel closed while the loop was running.
    #[error("event source disconnected")]
    Disconnected,

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The thread hosting the run loop panicked.
    #[error("run loop thread panicked")]
    LoopPanicked,
}
