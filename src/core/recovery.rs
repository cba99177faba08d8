//! 错误恢复引擎
//!
//! 根据 KernelError 类型返回 RecoveryAction，供主循环决定本轮失败后是先退避还是立即继续。
//! 任何错误都不会终止主循环。

use std::time::Duration;

use crate::core::KernelError;

/// 一轮失败后的处理动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 等待固定时长后再开始下一轮
    Backoff(Duration),
    /// 立即进入下一轮
    Continue,
}

/// 网络类失败退避，其余失败立即继续
#[derive(Debug, Clone, Copy)]
pub struct RecoveryEngine {
    io_backoff: Duration,
}

impl RecoveryEngine {
    pub fn new(io_backoff: Duration) -> Self {
        Self { io_backoff }
    }

    pub fn handle(&self, err: &KernelError) -> RecoveryAction {
        if err.is_transient_io() {
            RecoveryAction::Backoff(self.io_backoff)
        } else {
            RecoveryAction::Continue
        }
    }
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}
