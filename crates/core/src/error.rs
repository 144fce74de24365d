//! Chatbox error taxonomy
//!
//! Protocol errors (unknown or malformed message specs) are raised to the
//! caller. Amendment rejection is never an error; it is an ordinary
//! `false` / `NotAmended` outcome handled inside the core.

use thiserror::Error;

/// Errors raised by the chatbox core and its collaborators.
#[derive(Debug, Error)]
pub enum ChatboxError {
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Message spec of type '{kind}' is missing field '{field}'")]
    MissingField { kind: String, field: String },

    #[error("Invalid message spec: {0}")]
    InvalidSpec(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ChatboxError {
    /// True for errors that mean the service and the core disagree on the
    /// message contract.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownMessageType(_) | Self::MissingField { .. } | Self::InvalidSpec(_) | Self::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ChatboxError>;
