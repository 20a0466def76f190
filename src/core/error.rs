//! Error types for the scene host

use thiserror::Error;

/// Main error type for the scene host
#[derive(Debug, Error)]
pub enum Error {
    #[error("Scene '{0}' is not registered with the streaming catalog")]
    SceneNotFound(String),

    #[error("Streaming error: {0}")]
    Streaming(String),

    #[error("Cannot unload scene '{scene}': {reason}")]
    InvalidUnload { scene: String, reason: &'static str },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;
