//! Outgoing send tracking
//!
//! Every sent message is held as pending until its id shows up in the
//! store. Each entry carries its own deadline; the connection task sleeps
//! until the earliest one. Removing an entry from the map is the only way
//! a pending send ends, so it is cancelled exactly once.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hive_core::{ChatStore, MessageId, SendPolicy};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};

/// A sent message awaiting confirmation
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub message_id: MessageId,
    pub created_at: DateTime<Utc>,
    pub deadline: Instant,
}

/// Tracks pending sends and their deadlines
#[derive(Debug)]
pub struct SendCoordinator {
    policy: SendPolicy,
    window: Duration,
    pending: HashMap<MessageId, PendingSend>,
}

impl SendCoordinator {
    pub fn new(policy: SendPolicy, window: Duration) -> Self {
        Self {
            policy,
            window,
            pending: HashMap::new(),
        }
    }

    /// True when the policy forbids another send right now
    pub fn is_busy(&self) -> bool {
        self.policy == SendPolicy::Single && !self.pending.is_empty()
    }

    /// Start the confirmation window for a message
    pub fn register(&mut self, message_id: MessageId, created_at: DateTime<Utc>) -> Result<()> {
        if self.is_busy() {
            return Err(Error::SendBusy);
        }

        let deadline = Instant::now() + self.window;
        debug!(message_id = %message_id, window_ms = self.window.as_millis() as u64, "Send pending");
        self.pending.insert(
            message_id.clone(),
            PendingSend {
                message_id,
                created_at,
                deadline,
            },
        );
        Ok(())
    }

    /// Resolve every pending send whose id is now in the store
    pub fn confirm(&mut self, store: &ChatStore) -> Vec<MessageId> {
        let confirmed: Vec<MessageId> = self
            .pending
            .keys()
            .filter(|id| store.contains(id))
            .cloned()
            .collect();

        for id in &confirmed {
            self.pending.remove(id);
            debug!(message_id = %id, "Send confirmed");
        }
        confirmed
    }

    /// Drop a single pending send. Returns false if it was already gone.
    pub fn cancel(&mut self, message_id: &MessageId) -> bool {
        self.pending.remove(message_id).is_some()
    }

    /// Drop every pending send, returning how many there were
    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    /// Earliest deadline among pending sends
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Remove and return every send whose deadline has passed
    pub fn take_expired(&mut self, now: Instant) -> Vec<MessageId> {
        let expired: Vec<MessageId> = self
            .pending
            .values()
            .filter(|p| p.deadline <= now)
            .map(|p| p.message_id.clone())
            .collect();

        for id in &expired {
            self.pending.remove(id);
        }
        expired
    }

    pub fn is_pending(&self, message_id: &MessageId) -> bool {
        self.pending.contains_key(message_id)
    }

    pub fn pending_ids(&self) -> Vec<MessageId> {
        self.pending.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::ChatMessage;

    const WINDOW: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn test_single_policy_blocks_second_send() {
        let mut outbox = SendCoordinator::new(SendPolicy::Single, WINDOW);
        outbox.register(MessageId::from("a"), Utc::now()).unwrap();

        assert!(outbox.is_busy());
        assert!(matches!(
            outbox.register(MessageId::from("b"), Utc::now()),
            Err(Error::SendBusy)
        ));
        assert_eq!(outbox.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_policy_independent_deadlines() {
        let mut outbox = SendCoordinator::new(SendPolicy::Concurrent, WINDOW);
        outbox.register(MessageId::from("a"), Utc::now()).unwrap();
        let first_deadline = outbox.next_deadline().unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        outbox.register(MessageId::from("b"), Utc::now()).unwrap();
        assert!(!outbox.is_busy());
        assert_eq!(outbox.next_deadline(), Some(first_deadline));

        tokio::time::advance(Duration::from_secs(3)).await;
        let expired = outbox.take_expired(Instant::now());
        assert_eq!(expired, vec![MessageId::from("a")]);
        assert!(outbox.is_pending(&MessageId::from("b")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_clears_matching_ids() {
        let mut outbox = SendCoordinator::new(SendPolicy::Concurrent, WINDOW);
        let sent = ChatMessage::new("alice", "hi");
        outbox
            .register(sent.message_id.clone(), sent.timestamp)
            .unwrap();
        outbox.register(MessageId::from("other"), Utc::now()).unwrap();

        let store: ChatStore = [sent.clone()].into_iter().collect();
        let confirmed = outbox.confirm(&store);

        assert_eq!(confirmed, vec![sent.message_id.clone()]);
        assert!(!outbox.is_pending(&sent.message_id));
        assert_eq!(outbox.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_happens_once() {
        let mut outbox = SendCoordinator::new(SendPolicy::Single, WINDOW);
        let id = MessageId::from("a");
        outbox.register(id.clone(), Utc::now()).unwrap();

        let store: ChatStore = [ChatMessage {
            message_id: id.clone(),
            sender: "alice".into(),
            text: "hi".into(),
            timestamp: Utc::now(),
        }]
        .into_iter()
        .collect();
        assert_eq!(outbox.confirm(&store).len(), 1);

        // Confirmed entries can no longer time out or be cancelled again
        tokio::time::advance(WINDOW * 2).await;
        assert!(outbox.take_expired(Instant::now()).is_empty());
        assert!(!outbox.cancel(&id));
        assert_eq!(outbox.cancel_all(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_expired_before_window() {
        let mut outbox = SendCoordinator::new(SendPolicy::Single, WINDOW);
        outbox.register(MessageId::from("a"), Utc::now()).unwrap();

        tokio::time::advance(WINDOW - Duration::from_millis(1)).await;
        assert!(outbox.take_expired(Instant::now()).is_empty());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(outbox.take_expired(Instant::now()).len(), 1);
        assert!(outbox.next_deadline().is_none());
    }
}
