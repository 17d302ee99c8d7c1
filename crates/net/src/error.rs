//! Network error types

use std::io;

use hive_core::MessageId;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Credential exchange failed; carries the text shown to the user
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Socket-level failure; the close that follows settles the session
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or unrecognised frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Send of message {message_id} was not confirmed in time")]
    SendTimeout { message_id: MessageId },

    #[error("attempted send while disconnected")]
    NotConnected,

    #[error("A previous message is still awaiting confirmation")]
    SendBusy,

    #[error("Config error: {0}")]
    Config(#[from] hive_core::Error),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}
