//! 短期记忆：按会话标识保存的对话历史
//!
//! 每个会话持有自己的系统提示词与最近 N 条消息，超出时自动剪枝；后端适配层据此拼装请求。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 最近 max_messages 条消息
#[derive(Clone, Debug)]
pub struct ConversationMemory {
    messages: Vec<Message>,
    max_messages: usize,
}

impl ConversationMemory {
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_messages,
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
        self.prune();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 超出容量时丢弃最旧的消息
    fn prune(&mut self) {
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// 单个会话：系统提示词 + 历史
#[derive(Clone, Debug)]
pub struct Conversation {
    system_prompt: Option<String>,
    memory: ConversationMemory,
}

impl Conversation {
    fn new(capacity: usize) -> Self {
        Self {
            system_prompt: None,
            memory: ConversationMemory::new(capacity),
        }
    }

    /// 重复设置同一内容无副作用
    pub fn set_system_prompt(&mut self, prompt: &str) {
        if self.system_prompt.as_deref() != Some(prompt) {
            self.system_prompt = Some(prompt.to_string());
        }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn history(&self) -> &[Message] {
        self.memory.messages()
    }

    /// 拼装一次请求：系统提示词、历史、本轮用户提示
    pub fn compose(&self, prompt: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.memory.len() + 2);
        if let Some(system) = &self.system_prompt {
            messages.push(Message::system(system.clone()));
        }
        messages.extend(self.memory.messages().iter().cloned());
        messages.push(Message::user(prompt));
        messages
    }

    /// 一次交换完成后记入历史
    pub fn record(&mut self, prompt: &str, reply: &str) {
        self.memory.push(Message::user(prompt));
        self.memory.push(Message::assistant(reply));
    }
}

/// 会话表：按标识选择（不存在则创建）
#[derive(Clone, Debug)]
pub struct ConversationStore {
    capacity: usize,
    conversations: HashMap<String, Conversation>,
}

impl ConversationStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            conversations: HashMap::new(),
        }
    }

    pub fn select(&mut self, id: &str) -> &mut Conversation {
        let capacity = self.capacity;
        self.conversations
            .entry(id.to_string())
            .or_insert_with(|| Conversation::new(capacity))
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_prunes_oldest() {
        let mut memory = ConversationMemory::new(3);
        for i in 0..5 {
            memory.push(Message::user(format!("m{i}")));
        }
        let contents: Vec<&str> = memory.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_compose_puts_system_first_and_prompt_last() {
        let mut store = ConversationStore::new(10);
        let conversation = store.select("main");
        conversation.set_system_prompt("sys");
        conversation.set_system_prompt("sys");
        conversation.record("p1", "r1");

        let messages = conversation.compose("p2");
        assert_eq!(
            messages,
            vec![
                Message::system("sys"),
                Message::user("p1"),
                Message::assistant("r1"),
                Message::user("p2"),
            ]
        );
    }

    #[test]
    fn test_conversations_are_isolated() {
        let mut store = ConversationStore::new(4);
        store.select("a").record("hello", "hi");
        assert!(store.select("b").history().is_empty());
        assert_eq!(store.get("a").map(|c| c.history().len()), Some(2));
    }
}
