//! UI 日志出口
//!
//! 内核只通过 LogSink 与展示层交互：覆盖式的「思考」流（publish / clear）与追加式日志行。
//! 所有方法不可失败，调用方发完即走。LogBuffer 为内存实现：滚动保留最近 N 行，思考内容经 watch 通道广播。

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;

/// 默认最多保留的日志行数
pub const DEFAULT_MAX_LINES: usize = 500;

/// 展示层能力：思考流 + 日志行
pub trait LogSink: Send + Sync {
    /// 以完整内容覆盖当前思考文本
    fn publish_thinking(&self, text: &str);

    /// 思考结束，清空展示
    fn clear_thinking(&self);

    fn append_log_line(&self, line: &str);
}

/// 丢弃一切输出
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn publish_thinking(&self, _text: &str) {}

    fn clear_thinking(&self) {}

    fn append_log_line(&self, _line: &str) {}
}

/// 内存日志缓冲：并发安全的滚动行缓冲 + 当前思考文本
#[derive(Debug)]
pub struct LogBuffer {
    lines: Mutex<VecDeque<String>>,
    max_lines: usize,
    thinking: watch::Sender<String>,
}

impl LogBuffer {
    pub fn new(max_lines: usize) -> Self {
        let (thinking, _) = watch::channel(String::new());
        Self {
            lines: Mutex::new(VecDeque::with_capacity(max_lines.min(DEFAULT_MAX_LINES))),
            max_lines: max_lines.max(1),
            thinking,
        }
    }

    /// 日志行快照（旧 -> 新）
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 当前思考文本
    pub fn thinking(&self) -> String {
        self.thinking.borrow().clone()
    }

    /// 订阅思考文本变化（实时展示用）
    pub fn subscribe_thinking(&self) -> watch::Receiver<String> {
        self.thinking.subscribe()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES)
    }
}

impl LogSink for LogBuffer {
    fn publish_thinking(&self, text: &str) {
        self.thinking.send_replace(text.to_string());
    }

    fn clear_thinking(&self) {
        self.thinking.send_replace(String::new());
    }

    fn append_log_line(&self, line: &str) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        while lines.len() >= self.max_lines {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
    }
}
