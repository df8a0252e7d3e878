//! Conversation History Store
//!
//! Keeps a bounded, in-memory window of role-tagged turns per chat.
//! The window is what gets replayed to the AI backend as context.
//!
//! Entries live in a sharded map: every operation on one chat runs under
//! that chat's entry guard, so appends, snapshots and clears for the same
//! chat are atomic while unrelated chats only contend on a shard briefly.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info};

/// Default number of turns retained per chat (sliding window)
pub const DEFAULT_WINDOW: usize = 20;

/// Opaque conversation identifier
pub type ChatId = i64;

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Per-chat bounded history with concurrency-safe mutation
pub struct HistoryStore {
    chats: DashMap<ChatId, VecDeque<Turn>>,
    window: usize,
}

impl HistoryStore {
    /// Create a store keeping at most `window` turns per chat (minimum 1)
    pub fn new(window: usize) -> Self {
        Self {
            chats: DashMap::new(),
            window: window.max(1),
        }
    }

    /// Maximum turns retained per chat
    pub fn window(&self) -> usize {
        self.window
    }

    /// Append a turn, evicting the oldest turns beyond the window
    pub fn append(&self, chat_id: ChatId, turn: Turn) {
        let mut entry = self.chats.entry(chat_id).or_default();
        let role = turn.role;
        entry.push_back(turn);
        while entry.len() > self.window {
            entry.pop_front();
        }
        debug!("Appended {} turn to chat {} (size={})", role, chat_id, entry.len());
    }

    /// Point-in-time copy of a chat's window; empty if unknown
    pub fn snapshot(&self, chat_id: ChatId) -> Vec<Turn> {
        self.chats
            .get(&chat_id)
            .map(|turns| turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Copy the current window, then append `turn`, under one entry guard.
    ///
    /// The returned window excludes `turn`.
    pub fn snapshot_then_append(&self, chat_id: ChatId, turn: Turn) -> Vec<Turn> {
        let mut entry = self.chats.entry(chat_id).or_default();
        let before: Vec<Turn> = entry.iter().cloned().collect();
        entry.push_back(turn);
        while entry.len() > self.window {
            entry.pop_front();
        }
        before
    }

    /// Drop a chat's window entirely. Idempotent.
    pub fn clear(&self, chat_id: ChatId) {
        if let Some((_, turns)) = self.chats.remove(&chat_id) {
            info!("Cleared {} turns from chat {}", turns.len(), chat_id);
        }
    }

    /// Number of turns currently held for a chat
    pub fn size(&self, chat_id: ChatId) -> usize {
        self.chats.get(&chat_id).map(|turns| turns.len()).unwrap_or(0)
    }

    /// Number of chats with a history entry
    pub fn active_conversation_count(&self) -> usize {
        self.chats.len()
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_append_and_snapshot_order() {
        let store = HistoryStore::default();
        store.append(1, Turn::user("hola"));
        store.append(1, Turn::assistant("¡Hola! ¿En qué te ayudo?"));
        store.append(1, Turn::user("nada"));

        let history = store.snapshot(1);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0], Turn::user("hola"));
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[2].content, "nada");
    }

    #[test]
    fn test_sliding_window_keeps_most_recent() {
        let store = HistoryStore::new(5);
        for i in 0..12 {
            store.append(7, Turn::user(format!("Message {}", i)));
            assert_eq!(store.size(7), (i + 1).min(5));
        }

        let history = store.snapshot(7);
        let contents: Vec<&str> = history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["Message 7", "Message 8", "Message 9", "Message 10", "Message 11"]
        );
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = HistoryStore::default();
        store.append(1, Turn::user("first"));
        let snapshot = store.snapshot(1);
        store.append(1, Turn::user("second"));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.size(1), 2);
    }

    #[test]
    fn test_snapshot_then_append_excludes_new_turn() {
        let store = HistoryStore::new(2);
        assert!(store.snapshot_then_append(3, Turn::user("a")).is_empty());
        assert_eq!(store.snapshot_then_append(3, Turn::user("b")), vec![Turn::user("a")]);
        assert_eq!(
            store.snapshot_then_append(3, Turn::user("c")),
            vec![Turn::user("a"), Turn::user("b")]
        );
        assert_eq!(store.snapshot(3), vec![Turn::user("b"), Turn::user("c")]);
    }

    #[test]
    fn test_unknown_chat_is_empty() {
        let store = HistoryStore::default();
        assert!(store.snapshot(404).is_empty());
        assert_eq!(store.size(404), 0);
        assert_eq!(store.active_conversation_count(), 0);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = HistoryStore::default();
        store.append(1, Turn::user("a"));
        store.append(2, Turn::user("b"));

        store.clear(1);
        store.clear(1);
        store.clear(999);

        assert!(store.snapshot(1).is_empty());
        assert_eq!(store.size(2), 1);
        assert_eq!(store.active_conversation_count(), 1);
    }

    #[test]
    fn test_zero_window_is_clamped() {
        let store = HistoryStore::new(0);
        store.append(1, Turn::user("a"));
        store.append(1, Turn::user("b"));
        assert_eq!(store.window(), 1);
        assert_eq!(store.snapshot(1), vec![Turn::user("b")]);
    }

    #[test]
    fn test_concurrent_appends_on_distinct_chats() {
        let store = Arc::new(HistoryStore::new(DEFAULT_WINDOW));
        let chats: Vec<ChatId> = (1..=8).collect();
        let per_chat = 200;

        std::thread::scope(|scope| {
            for &chat_id in &chats {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for i in 0..per_chat {
                        store.append(chat_id, Turn::user(format!("{}:{}", chat_id, i)));
                        let snapshot = store.snapshot(chat_id);
                        assert!(snapshot.len() <= DEFAULT_WINDOW);
                    }
                });
            }
        });

        assert_eq!(store.active_conversation_count(), chats.len());
        for &chat_id in &chats {
            let history = store.snapshot(chat_id);
            assert_eq!(history.len(), DEFAULT_WINDOW);
            for (offset, turn) in history.iter().enumerate() {
                let expected = per_chat - DEFAULT_WINDOW + offset;
                assert_eq!(turn.content, format!("{}:{}", chat_id, expected));
            }
        }
    }

    #[test]
    fn test_concurrent_appends_on_same_chat_stay_bounded() {
        let store = Arc::new(HistoryStore::new(10));

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for i in 0..100 {
                        store.append(42, Turn::user(format!("w{}-{}", worker, i)));
                    }
                });
            }
        });

        let history = store.snapshot(42);
        assert_eq!(history.len(), 10);
        // Per-writer order survives inside the window
        for worker in 0..4 {
            let seq: Vec<usize> = history
                .iter()
                .filter_map(|t| t.content.strip_prefix(&format!("w{}-", worker)))
                .filter_map(|n| n.parse().ok())
                .collect();
            assert!(seq.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
