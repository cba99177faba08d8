//! 内核装配：构建器注入后端与日志出口，启动监管与主循环两个任务，对外暴露生产者入口与关闭
//!
//! 两个任务各自处理自身错误；任务 panic 被 tokio::spawn 隔离，不会终止进程。

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, KernelSection};
use crate::core::{
    ingress, ActivityFlag, ConnectionSupervisor, IngressHandle, KernelState, RoundScheduler,
    RoundTimings,
};
use crate::llm::{BackendOptions, LlmBackend};
use crate::protocol::InputEvent;
use crate::sink::LogSink;

/// 内核构建器
pub struct KernelBuilder {
    backend: Arc<dyn LlmBackend>,
    sink: Arc<dyn LogSink>,
    timings: RoundTimings,
    options: BackendOptions,
    conversation_id: String,
}

impl KernelBuilder {
    pub fn new(backend: Arc<dyn LlmBackend>, sink: Arc<dyn LogSink>) -> Self {
        Self::from_config(backend, sink, &KernelSection::default())
    }

    /// 从 [kernel] 段读取节奏、超时、记忆容量与会话标识
    pub fn from_config(
        backend: Arc<dyn LlmBackend>,
        sink: Arc<dyn LogSink>,
        kernel: &KernelSection,
    ) -> Self {
        Self {
            backend,
            sink,
            timings: RoundTimings::from_config(kernel),
            options: BackendOptions::from_config(kernel),
            conversation_id: kernel.conversation_id.clone(),
        }
    }

    pub fn with_timings(mut self, timings: RoundTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_backend_options(mut self, options: BackendOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = conversation_id.into();
        self
    }

    /// 启动内核：必须在 tokio 运行时内调用
    pub fn start(self, configs: watch::Receiver<AppConfig>) -> AgentKernel {
        let (handle, events) = ingress::channel();
        let state = ActivityFlag::new();
        let shutdown = CancellationToken::new();

        let supervisor =
            ConnectionSupervisor::new(self.backend.clone(), state.clone(), self.options);
        let scheduler = RoundScheduler::new(
            events,
            handle.clone(),
            self.backend,
            self.sink,
            state.clone(),
        )
        .with_timings(self.timings)
        .with_conversation_id(self.conversation_id);

        let tasks = vec![
            tokio::spawn(supervisor.run(configs, shutdown.clone())),
            tokio::spawn(scheduler.run(shutdown.clone())),
        ];
        tracing::debug!("Agent kernel started");

        AgentKernel {
            ingress: handle,
            state,
            shutdown,
            tasks,
        }
    }
}

/// 运行中的内核
pub struct AgentKernel {
    ingress: IngressHandle,
    state: ActivityFlag,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl AgentKernel {
    /// 提交一条用户消息；不阻塞、不失败
    pub fn submit_user_message(&self, text: impl Into<String>) {
        self.post_event(InputEvent::user(text));
    }

    /// 提交一条来自其他信号源的事件
    pub fn submit_system_event(&self, text: impl Into<String>) {
        self.post_event(InputEvent::system(text));
    }

    pub fn post_event(&self, event: InputEvent) {
        self.ingress.submit(event);
    }

    pub fn state(&self) -> KernelState {
        self.state.get()
    }

    /// 供其他生产者克隆使用的入口句柄
    pub fn ingress(&self) -> IngressHandle {
        self.ingress.clone()
    }

    /// 取消两个任务并等待其退出
    pub async fn shutdown(mut self) {
        tracing::info!("Shutting down agent kernel...");
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::error!("Kernel task terminated abnormally: {}", e);
            }
        }
        tracing::info!("Agent kernel stopped");
    }
}

impl Drop for AgentKernel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::llm::MockBackend;
    use crate::sink::NoopSink;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_kernel_activates_and_shuts_down() {
        let backend = Arc::new(MockBackend::new());
        let mut cfg = AppConfig::default();
        cfg.llm.api_key = "sk-1".to_string();
        let store = ConfigStore::new(cfg, None);

        let kernel = KernelBuilder::new(backend.clone(), Arc::new(NoopSink)).start(store.subscribe());
        kernel.submit_user_message("hello");
        tokio::time::sleep(Duration::from_millis(800)).await;

        assert_eq!(kernel.state(), KernelState::Active);
        let prompts = backend.exchange_prompts();
        assert!(!prompts.is_empty());
        assert!(prompts[0].contains("hello"));

        kernel.shutdown().await;
        assert!(!backend.is_connected());
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_harmless() {
        let backend = Arc::new(MockBackend::new());
        let store = ConfigStore::new(AppConfig::default(), None);
        let kernel = KernelBuilder::new(backend, Arc::new(NoopSink)).start(store.subscribe());
        let handle = kernel.ingress();

        kernel.shutdown().await;
        handle.submit(InputEvent::user("too late"));
    }
}
