//! 输入事件：来源 + 内容 + 创建时间（毫秒时间戳），创建后不可变

use std::fmt;

use serde::Serialize;

/// 事件来源
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventSource {
    /// 用户直接输入
    User,
    /// 内核或其它信号源自动产生的事件（启动信号、回调、状态变更）
    System,
}

impl EventSource {
    /// 渲染进提示词时使用的来源标签
    pub fn label(&self) -> &'static str {
        match self {
            EventSource::User => "用户输入信息",
            EventSource::System => "来自其他信号源的事件",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSource::User => f.write_str("USER"),
            EventSource::System => f.write_str("SYSTEM"),
        }
    }
}

/// 单个输入事件；字段只读，由 EventIngress 恰好交付一次
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InputEvent {
    source: EventSource,
    content: String,
    timestamp: i64,
}

impl InputEvent {
    /// 以当前墙上时间创建事件
    pub fn new(source: EventSource, content: impl Into<String>) -> Self {
        Self::with_timestamp(source, content, chrono::Utc::now().timestamp_millis())
    }

    pub fn with_timestamp(source: EventSource, content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            source,
            content: content.into(),
            timestamp,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(EventSource::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(EventSource::System, content)
    }

    pub fn source(&self) -> EventSource {
        self.source
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Unix 毫秒时间戳
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}
