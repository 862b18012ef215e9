//! services/journal/src/error.rs
//!
//! Defines the primary error type for the journal service.

use crate::config::ConfigError;
use for_me_core::ports::PortError;

/// The primary error type for the `journal` service.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the HTTP client used by the remote adapters.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Represents an error related to the WebSocket connection.
    #[error("WebSocket Error: {0}")]
    Websocket(#[from] axum::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
