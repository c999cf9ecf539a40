use common::CommandId;
use thiserror::Error;

/// Errors that can occur when interacting with the command log.
#[derive(Debug, Error)]
pub enum CommandLogError {
    /// A commit was attempted for a command that was never read, or was
    /// already committed.
    #[error("no in-flight command {0} to commit")]
    NotInFlight(CommandId),

    /// A serialization/deserialization error occurred in the transport.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The underlying transport failed.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for command log operations.
pub type Result<T> = std::result::Result<T, CommandLogError>;
