//! 轮次调度：内核主循环
//!
//! 每一轮：休眠态则等待后重查；活动态则先去抖等待，再一次性排空入口队列、渲染 prompt、执行一次流式交换。
//! 主循环是后端交换的唯一调用者，因此任意时刻至多一次交换在进行中。失败按 RecoveryEngine 分类处理，不会终止循环。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::KernelSection;
use crate::core::{
    ActivityFlag, EventIngress, IngressHandle, KernelError, RecoveryAction, RecoveryEngine,
};
use crate::llm::LlmBackend;
use crate::protocol::{build_prompt, InputEvent, SYSTEM_PROMPT};
use crate::sink::LogSink;

/// 启动时入队的系统事件内容
pub const STARTUP_EVENT: &str = "first start up";

/// 主循环节奏
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTimings {
    /// 活动态下排空前的等待，用于合并突发事件
    pub debounce: Duration,
    /// 休眠态的重查间隔
    pub dormant_poll: Duration,
    /// 网络 / 超时失败后的退避
    pub io_backoff: Duration,
}

impl RoundTimings {
    pub fn from_config(kernel: &KernelSection) -> Self {
        Self {
            debounce: Duration::from_millis(kernel.debounce_ms),
            dormant_poll: Duration::from_millis(kernel.dormant_poll_ms),
            io_backoff: Duration::from_millis(kernel.io_backoff_ms),
        }
    }
}

impl Default for RoundTimings {
    fn default() -> Self {
        Self::from_config(&KernelSection::default())
    }
}

/// 单轮结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// 休眠中，未排空队列
    Dormant,
    Completed { events: usize, reply: String },
    Failed {
        kind: &'static str,
        action: RecoveryAction,
    },
}

/// 主循环：入口队列的唯一消费者
pub struct RoundScheduler {
    ingress: EventIngress,
    handle: IngressHandle,
    backend: Arc<dyn LlmBackend>,
    sink: Arc<dyn LogSink>,
    state: ActivityFlag,
    recovery: RecoveryEngine,
    timings: RoundTimings,
    conversation_id: String,
    rounds: u64,
}

impl RoundScheduler {
    pub fn new(
        ingress: EventIngress,
        handle: IngressHandle,
        backend: Arc<dyn LlmBackend>,
        sink: Arc<dyn LogSink>,
        state: ActivityFlag,
    ) -> Self {
        let timings = RoundTimings::default();
        Self {
            ingress,
            handle,
            backend,
            sink,
            state,
            recovery: RecoveryEngine::new(timings.io_backoff),
            timings,
            conversation_id: KernelSection::default().conversation_id,
            rounds: 0,
        }
    }

    pub fn with_timings(mut self, timings: RoundTimings) -> Self {
        self.recovery = RecoveryEngine::new(timings.io_backoff);
        self.timings = timings;
        self
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = conversation_id.into();
        self
    }

    /// 已执行交换的轮数
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// 入队启动事件后循环执行，直到取消
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!("Initializing Agent Kernel...");
        self.handle.submit(InputEvent::system(STARTUP_EVENT));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.tick() => {}
            }
        }

        self.sink.clear_thinking();
        tracing::info!(rounds = self.rounds, "Round scheduler stopped");
    }

    /// 执行一轮
    pub async fn tick(&mut self) -> RoundOutcome {
        if !self.state.is_active() {
            tokio::time::sleep(self.timings.dormant_poll).await;
            return RoundOutcome::Dormant;
        }

        tokio::time::sleep(self.timings.debounce).await;
        let events = self.ingress.drain_available();
        let prompt = build_prompt(&events);
        self.rounds += 1;
        tracing::debug!(round = self.rounds, events = events.len(), "try start a round");
        tracing::debug!("build-up prompt: {}", prompt);

        match stream_exchange(
            self.backend.as_ref(),
            self.sink.as_ref(),
            &self.conversation_id,
            &prompt,
        )
        .await
        {
            Ok(reply) => RoundOutcome::Completed {
                events: events.len(),
                reply,
            },
            Err(e) => {
                log_round_failure(&e);
                let action = self.recovery.handle(&e);
                if let RecoveryAction::Backoff(delay) = action {
                    tokio::time::sleep(delay).await;
                }
                RoundOutcome::Failed {
                    kind: e.kind(),
                    action,
                }
            }
        }
    }
}

fn log_round_failure(err: &KernelError) {
    match err {
        KernelError::Network(_) | KernelError::Timeout(_) => {
            tracing::error!(kind = err.kind(), "Network IO error during reasoning: {}", err)
        }
        KernelError::Serialization(_) => {
            tracing::error!(kind = err.kind(), "Protocol/Data serialization failed: {}", err)
        }
        KernelError::InvalidArgument(_) => {
            tracing::error!(kind = err.kind(), "Invalid arguments in LLM request: {}", err)
        }
        KernelError::IllegalState(_) | KernelError::InvalidConfiguration(_) => {
            tracing::error!(kind = err.kind(), "Round aborted: {}", err)
        }
    }
}

/// 一次流式交换：逐 token 累积思考文本并以覆盖方式发布，结束（含失败）后清空，最终文本写入 info 日志
pub async fn stream_exchange(
    backend: &dyn LlmBackend,
    sink: &dyn LogSink,
    conversation_id: &str,
    prompt: &str,
) -> Result<String, KernelError> {
    let mut thinking = String::new();
    let result = backend
        .run_exchange(conversation_id, SYSTEM_PROMPT, prompt, &mut |token: &str| {
            thinking.push_str(token);
            sink.publish_thinking(&thinking);
        })
        .await;
    sink.clear_thinking();

    let reply = result?;
    tracing::info!("{}", reply);
    Ok(reply)
}
