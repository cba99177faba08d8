//! 连接监管：观察实时配置流，按需重连后端并维护 Dormant / Active 状态
//!
//! 监管者是配置流的顺序消费者：watch 通道只保留最新值，评估重连期间到达的中间值会被直接跳过。
//! 记录的是「最近一次尝试」的三元组，连接失败后再次收到同一配置不会重试，只有三元组变化才会再次尝试。

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, LlmConnectionConfig};
use crate::core::{ActivityFlag, KernelState};
use crate::llm::{BackendOptions, LlmBackend};

/// 最近一次应用（尝试）的连接配置
#[derive(Debug, Clone)]
struct AppliedConnection {
    config: LlmConnectionConfig,
    connected: bool,
}

/// 配置流观察者，状态标志的唯一写者
pub struct ConnectionSupervisor {
    backend: Arc<dyn LlmBackend>,
    state: ActivityFlag,
    options: BackendOptions,
    applied: Option<AppliedConnection>,
}

impl ConnectionSupervisor {
    pub fn new(backend: Arc<dyn LlmBackend>, state: ActivityFlag, options: BackendOptions) -> Self {
        Self {
            backend,
            state,
            options,
            applied: None,
        }
    }

    /// 当前状态（与主循环读取的是同一个标志）
    pub fn state(&self) -> KernelState {
        self.state.get()
    }

    /// 处理一次配置发射，返回处理后的状态
    pub fn apply(&mut self, config: &AppConfig) -> KernelState {
        let connection = config.llm_connection();

        if !connection.has_credentials() {
            if self.state.set(KernelState::Dormant) == KernelState::Active {
                tracing::info!("API key cleared, kernel is now dormant");
            }
            tracing::info!("Waiting for API key configuration...");
            return KernelState::Dormant;
        }

        if let Some(applied) = &self.applied {
            if applied.config == connection {
                if applied.connected {
                    self.state.set(KernelState::Active);
                    return KernelState::Active;
                }
                tracing::debug!("Connection config unchanged since last failed attempt, not retrying");
                return self.state.get();
            }
        }

        self.applied = Some(AppliedConnection {
            config: connection.clone(),
            connected: false,
        });

        tracing::info!(
            base_url = %connection.base_url,
            model = %connection.model_name,
            "Connecting LLM backend"
        );
        if let Err(e) = self.backend.disconnect() {
            tracing::warn!(kind = e.kind(), "Failed to close previous connection: {}", e);
        }

        match self.backend.connect(&connection, &self.options) {
            Ok(()) => {
                if let Some(applied) = self.applied.as_mut() {
                    applied.connected = true;
                }
                self.state.set(KernelState::Active);
                tracing::info!(model = %connection.model_name, "LLM backend connected, kernel is active");
                KernelState::Active
            }
            Err(e) => {
                self.state.set(KernelState::Dormant);
                tracing::error!(kind = e.kind(), "Failed to connect LLM backend: {}", e);
                KernelState::Dormant
            }
        }
    }

    /// 持续观察配置流，直到取消或发送端关闭
    pub async fn run(mut self, mut configs: watch::Receiver<AppConfig>, shutdown: CancellationToken) {
        tracing::debug!("Connection supervisor started");
        loop {
            let config = configs.borrow_and_update().clone();
            self.apply(&config);

            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = configs.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Configuration stream closed");
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.backend.disconnect() {
            tracing::warn!(kind = e.kind(), "Failed to close connection on shutdown: {}", e);
        }
        self.state.set(KernelState::Dormant);
        tracing::debug!("Connection supervisor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::KernelError;
    use crate::llm::{BackendCall, MockBackend};

    fn config_with_key(key: &str) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.llm.api_key = key.to_string();
        cfg
    }

    fn supervisor(backend: &Arc<MockBackend>) -> ConnectionSupervisor {
        ConnectionSupervisor::new(backend.clone(), ActivityFlag::new(), BackendOptions::default())
    }

    #[test]
    fn test_blank_key_stays_dormant_without_touching_backend() {
        let backend = Arc::new(MockBackend::new());
        let mut sup = supervisor(&backend);

        assert_eq!(sup.apply(&config_with_key("")), KernelState::Dormant);
        assert_eq!(sup.apply(&config_with_key("   ")), KernelState::Dormant);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_key_change_reconnects_in_order() {
        let backend = Arc::new(MockBackend::new());
        let mut sup = supervisor(&backend);

        let first = config_with_key("sk-1");
        let second = config_with_key("sk-2");
        assert_eq!(sup.apply(&first), KernelState::Active);
        assert_eq!(sup.apply(&first), KernelState::Active);
        assert_eq!(sup.apply(&second), KernelState::Active);

        let options = BackendOptions::default();
        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::Disconnect,
                BackendCall::Connect {
                    config: first.llm_connection(),
                    options,
                },
                BackendCall::Disconnect,
                BackendCall::Connect {
                    config: second.llm_connection(),
                    options,
                },
            ]
        );
    }

    #[test]
    fn test_connect_failure_is_dormant_and_not_retried() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_next_connect(KernelError::InvalidConfiguration("bad url".to_string()));
        let mut sup = supervisor(&backend);

        let bad = config_with_key("sk-crash");
        assert_eq!(sup.apply(&bad), KernelState::Dormant);
        assert_eq!(sup.apply(&bad), KernelState::Dormant);
        assert_eq!(backend.connect_count(), 1);

        assert_eq!(sup.apply(&config_with_key("sk-ok")), KernelState::Active);
        assert_eq!(backend.connect_count(), 2);
    }

    #[test]
    fn test_failure_after_success_never_reports_active() {
        let backend = Arc::new(MockBackend::new());
        let mut sup = supervisor(&backend);

        assert_eq!(sup.apply(&config_with_key("sk-1")), KernelState::Active);
        backend.fail_next_connect(KernelError::IllegalState("boom".to_string()));
        assert_eq!(sup.apply(&config_with_key("sk-2")), KernelState::Dormant);
        assert_eq!(sup.state(), KernelState::Dormant);
        assert!(!backend.is_connected());
    }

    #[test]
    fn test_key_restored_after_blank_reactivates_without_reconnect() {
        let backend = Arc::new(MockBackend::new());
        let mut sup = supervisor(&backend);

        sup.apply(&config_with_key("sk-1"));
        assert_eq!(sup.apply(&config_with_key("")), KernelState::Dormant);
        assert_eq!(sup.apply(&config_with_key("sk-1")), KernelState::Active);
        assert_eq!(backend.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_run_follows_config_stream_until_cancelled() {
        let backend = Arc::new(MockBackend::new());
        let state = ActivityFlag::new();
        let sup = ConnectionSupervisor::new(backend.clone(), state.clone(), BackendOptions::default());

        let (tx, mut rx) = watch::channel(config_with_key(""));
        rx.mark_changed();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(sup.run(rx, shutdown.clone()));

        tx.send_replace(config_with_key("sk-1"));
        for _ in 0..100 {
            if state.is_active() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(state.is_active());

        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(state.get(), KernelState::Dormant);
        assert!(!backend.is_connected());
    }

    #[tokio::test]
    async fn test_queued_configs_are_superseded_by_the_latest() {
        let backend = Arc::new(MockBackend::new());
        let state = ActivityFlag::new();
        let sup = ConnectionSupervisor::new(backend.clone(), state.clone(), BackendOptions::default());

        let (tx, rx) = watch::channel(config_with_key("sk-1"));
        for i in 2..=5 {
            tx.send_replace(config_with_key(&format!("sk-{i}")));
        }
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(sup.run(rx, shutdown.clone()));

        for _ in 0..100 {
            if state.is_active() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(state.is_active());
        assert_eq!(backend.connect_count(), 1);
        assert!(backend.calls().contains(&BackendCall::Connect {
            config: config_with_key("sk-5").llm_connection(),
            options: BackendOptions::default(),
        }));

        shutdown.cancel();
        task.await.unwrap();
    }
}
