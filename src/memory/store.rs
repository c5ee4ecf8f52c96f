//! 会话存储：按 conversation_id 隔离的对话记忆
//!
//! 编排器把 plan_id 作为 conversation_id，同一计划的所有步骤共享一段历史。

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::memory::{ConversationMemory, Message};

/// 会话记忆接口：追加与按序读取最近 n 条
pub trait ConversationStore: Send + Sync {
    fn append(&self, conversation_id: &str, message: Message);

    /// 最近 n 条消息，按插入顺序
    fn recent(&self, conversation_id: &str, n: usize) -> Vec<Message>;
}

/// 内存实现：每个会话一个有界 ConversationMemory
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, ConversationMemory>>,
    max_turns: usize,
}

impl InMemoryConversationStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            max_turns,
        }
    }

    pub fn len(&self, conversation_id: &str) -> usize {
        self.conversations
            .read()
            .get(conversation_id)
            .map(ConversationMemory::len)
            .unwrap_or(0)
    }

    pub fn clear(&self, conversation_id: &str) {
        self.conversations.write().remove(conversation_id);
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn append(&self, conversation_id: &str, message: Message) {
        let max_turns = self.max_turns;
        self.conversations
            .write()
            .entry(conversation_id.to_string())
            .or_insert_with(|| ConversationMemory::new(max_turns))
            .push(message);
    }

    fn recent(&self, conversation_id: &str, n: usize) -> Vec<Message> {
        self.conversations
            .read()
            .get(conversation_id)
            .map(|memory| memory.recent(n).to_vec())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversations_are_isolated() {
        let store = InMemoryConversationStore::new(10);
        store.append("plan_a", Message::user("a1"));
        store.append("plan_b", Message::user("b1"));
        store.append("plan_a", Message::assistant("a2"));

        let a = store.recent("plan_a", 10);
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].content, "a1");
        assert_eq!(a[1].content, "a2");
        assert_eq!(store.len("plan_b"), 1);
        assert!(store.recent("missing", 5).is_empty());
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let store = InMemoryConversationStore::new(10);
        for i in 0..5 {
            store.append("c", Message::user(format!("{i}")));
        }
        let tail: Vec<String> = store.recent("c", 3).into_iter().map(|m| m.content).collect();
        assert_eq!(tail, vec!["2", "3", "4"]);
    }

    #[test]
    fn test_max_turns_keeps_two_messages_per_turn() {
        let store = InMemoryConversationStore::new(2);
        for i in 0..10 {
            store.append("c", Message::user(format!("{i}")));
        }
        assert_eq!(store.len("c"), 4);
        let kept: Vec<String> = store.recent("c", 10).into_iter().map(|m| m.content).collect();
        assert_eq!(kept, vec!["6", "7", "8", "9"]);
    }
}
