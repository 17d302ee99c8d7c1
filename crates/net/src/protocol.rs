//! Socket protocol frames
//!
//! Every frame is a JSON text message of the form
//! `{"messageType": "...", "data": ...}`.

use std::collections::HashMap;

use hive_core::{ChatMessage, MessageId};
use serde::{Deserialize, Serialize};

/// Frames exchanged over the chat socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", content = "data")]
pub enum Frame {
    /// Full authoritative message set, sent right after the socket opens
    #[serde(rename = "chat:list")]
    ChatList(HashMap<MessageId, ChatMessage>),

    /// One message delta, including the echo of our own sends
    #[serde(rename = "chat:broadcast")]
    ChatBroadcast(ChatMessage),

    /// Client-submitted message (outbound only)
    #[serde(rename = "chat:send")]
    ChatSend(ChatMessage),
}

impl Frame {
    /// Serialize frame to JSON text
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize frame from JSON text
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::ChatList(_) => "chat:list",
            Frame::ChatBroadcast(_) => "chat:broadcast",
            Frame::ChatSend(_) => "chat:send",
        }
    }
}

/// Successful auth endpoint response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Auth endpoint error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}
