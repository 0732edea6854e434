//! Error types for the race server
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, RaceError>;

/// Errors that can occur while accepting racers and running matches
#[derive(Debug, Error)]
pub enum RaceError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Passage file or directory does not exist
    #[error("Passage not found: {}", .0.display())]
    PassageNotFound(PathBuf),

    /// Passage contained only whitespace
    #[error("Passage is empty: {0}")]
    EmptyPassage(String),

    /// The registry actor has stopped and no longer accepts commands
    #[error("Registry closed")]
    RegistryClosed,

    /// The peer's connection is gone
    #[error("Connection closed")]
    ConnectionClosed,
}
