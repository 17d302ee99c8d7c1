//! Inbound frame reconciliation
//!
//! Applies snapshot and broadcast frames to the local [`ChatStore`].
//! Broadcasts upsert by id, so re-delivery never duplicates a message.

use hive_core::{ChatStore, MessageId};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::Frame;

/// What a frame did to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// Snapshot replaced the store wholesale
    Replaced { count: usize },
    /// Single message inserted, or overwritten when `replaced` is set
    Upserted { message_id: MessageId, replaced: bool },
}

/// Apply a decoded frame to the store
pub fn apply(store: &mut ChatStore, frame: Frame) -> Result<Reconciled> {
    match frame {
        Frame::ChatList(snapshot) => {
            let count = snapshot.len();
            store.replace(snapshot);
            debug!(count = count, "Applied chat snapshot");
            Ok(Reconciled::Replaced { count })
        }
        Frame::ChatBroadcast(message) => {
            let message_id = message.message_id.clone();
            let replaced = store.upsert(message).is_some();
            debug!(message_id = %message_id, replaced = replaced, "Applied chat broadcast");
            Ok(Reconciled::Upserted {
                message_id,
                replaced,
            })
        }
        Frame::ChatSend(_) => Err(Error::Protocol(
            "chat:send is outbound only".to_string(),
        )),
    }
}

/// Decode a text frame and apply it.
///
/// Malformed frames leave the store untouched and are logged; the returned
/// error is informational and never fatal to the session.
pub fn apply_text(store: &mut ChatStore, text: &str) -> Result<Reconciled> {
    let result = Frame::from_text(text)
        .map_err(|e| Error::Protocol(format!("Invalid JSON frame: {}", e)))
        .and_then(|frame| apply(store, frame));

    if let Err(e) = &result {
        warn!(error = %e, len = text.len(), "Dropping inbound frame");
    }
    result
}
