//! Keyed chat message store
//!
//! Holds the client's view of the conversation, keyed by message id.
//! Insertion order carries no meaning; renderers sort with [`ChatStore::ordered`].

use std::collections::HashMap;

use crate::models::{ChatMessage, MessageId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatStore {
    messages: HashMap<MessageId, ChatMessage>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the whole store with an authoritative snapshot.
    ///
    /// Entries are keyed by each message's own id; the snapshot's map keys
    /// are not trusted.
    pub fn replace(&mut self, snapshot: HashMap<MessageId, ChatMessage>) {
        self.messages = snapshot
            .into_values()
            .map(|message| (message.message_id.clone(), message))
            .collect();
    }

    /// Insert or overwrite a single message by id.
    ///
    /// Returns the message previously stored under that id.
    pub fn upsert(&mut self, message: ChatMessage) -> Option<ChatMessage> {
        self.messages.insert(message.message_id.clone(), message)
    }

    pub fn get(&self, id: &MessageId) -> Option<&ChatMessage> {
        self.messages.get(id)
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.values()
    }

    /// Messages sorted by timestamp, ties broken by id
    pub fn ordered(&self) -> Vec<&ChatMessage> {
        let mut sorted: Vec<&ChatMessage> = self.messages.values().collect();
        sorted.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.message_id.cmp(&b.message_id))
        });
        sorted
    }
}

impl FromIterator<ChatMessage> for ChatStore {
    fn from_iter<I: IntoIterator<Item = ChatMessage>>(iter: I) -> Self {
        let mut store = ChatStore::new();
        for message in iter {
            store.upsert(message);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn message(id: &str, text: &str) -> ChatMessage {
        ChatMessage {
            message_id: MessageId::from(id),
            sender: "alice".to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_upsert_same_id_keeps_one_entry() {
        let mut store = ChatStore::new();
        assert!(store.upsert(message("a", "first")).is_none());

        let previous = store.upsert(message("a", "second"));
        assert_eq!(previous.unwrap().text, "first");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&MessageId::from("a")).unwrap().text, "second");
    }

    #[test]
    fn test_replace_discards_prior_entries() {
        let mut store: ChatStore = [message("a", "one"), message("b", "two")]
            .into_iter()
            .collect();

        let mut snapshot = HashMap::new();
        snapshot.insert(MessageId::from("c"), message("c", "three"));
        store.replace(snapshot);

        assert_eq!(store.len(), 1);
        assert!(store.contains(&MessageId::from("c")));
        assert!(!store.contains(&MessageId::from("a")));
    }

    #[test]
    fn test_replace_keys_by_message_id() {
        let mut store = ChatStore::new();
        let mut snapshot = HashMap::new();
        snapshot.insert(MessageId::from("other-key"), message("m1", "hello"));
        store.replace(snapshot);

        assert!(store.contains(&MessageId::from("m1")));
        assert!(!store.contains(&MessageId::from("other-key")));

        // Re-delivery of the same message lands on the same entry
        store.upsert(message("m1", "hello"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_ordered_by_timestamp() {
        let now = Utc::now();
        let mut late = message("z-late", "late");
        late.timestamp = now;
        let mut early = message("a-early", "early");
        early.timestamp = now - Duration::seconds(30);
        let mut tie = message("b-tie", "tie");
        tie.timestamp = now;

        let store: ChatStore = [late, early, tie].into_iter().collect();
        let texts: Vec<&str> = store.ordered().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["early", "tie", "late"]);
    }

    #[test]
    fn test_clear() {
        let mut store: ChatStore = [message("a", "one")].into_iter().collect();
        store.clear();
        assert!(store.is_empty());
    }
}
