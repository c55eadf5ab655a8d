//! Error types for the installation core

use thiserror::Error;

use crate::EntityId;

/// Core errors
#[derive(Error, Debug)]
pub enum ShoalError {
    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Stream closed by remote")]
    StreamClosed,

    // Payload errors
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    // Scene errors
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Operation cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ShoalError {
    /// Transport-level failures are eligible for retry
    pub fn is_transient(&self) -> bool {
        match self {
            ShoalError::Transport(_) | ShoalError::StreamClosed => true,
            ShoalError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Result type for core operations
pub type ShoalResult<T> = Result<T, ShoalError>;
