//! 后端适配层抽象
//!
//! 内核只把后端当作可替换能力：同步的 connect / disconnect 与异步的单次流式交换。
//! 所有实现（OpenAI 兼容 / Mock）都实现 LlmBackend，由调用方在进程启动时构造并注入。

use std::time::Duration;

use async_trait::async_trait;

use crate::config::{KernelSection, LlmConnectionConfig};
use crate::core::KernelError;

/// 连接参数中与凭据无关的部分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendOptions {
    /// 单次请求（含完整流式响应）的超时
    pub request_timeout: Duration,
    /// 每个会话保留的消息条数
    pub memory_capacity: usize,
}

impl BackendOptions {
    pub fn from_config(kernel: &KernelSection) -> Self {
        Self {
            request_timeout: Duration::from_secs(kernel.request_timeout_secs),
            memory_capacity: kernel.memory_capacity,
        }
    }
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self::from_config(&KernelSection::default())
    }
}

/// 后端能力：连接生命周期 + 流式交换
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// 建立连接；参数非法返回 InvalidConfiguration，生命周期冲突返回 IllegalState
    fn connect(
        &self,
        config: &LlmConnectionConfig,
        options: &BackendOptions,
    ) -> Result<(), KernelError>;

    /// 关闭连接；从未连接时也可安全调用
    fn disconnect(&self) -> Result<(), KernelError>;

    /// 在指定会话中执行一次流式交换：设置系统提示词、提交 prompt，每个增量 token 调用一次 on_token，
    /// 返回完整回复
    async fn run_exchange(
        &self,
        conversation_id: &str,
        system_prompt: &str,
        prompt: &str,
        on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<String, KernelError>;
}
