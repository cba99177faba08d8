//! 内核集成测试：通过公开 API 驱动完整内核（Mock 后端 + 内存日志缓冲）

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use airi::config::{AppConfig, ConfigStore};
    use airi::core::STARTUP_EVENT;
    use airi::llm::{BackendCall, BackendOptions, MockBackend};
    use airi::sink::{LogBuffer, LogSink};
    use airi::{KernelBuilder, KernelError, KernelState};

    fn config_with_key(key: &str) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.llm.api_key = key.to_string();
        cfg
    }

    fn lifecycle_calls(backend: &MockBackend) -> Vec<BackendCall> {
        backend
            .calls()
            .into_iter()
            .filter(|call| !matches!(call, BackendCall::Exchange { .. }))
            .collect()
    }

    /// 记录思考发布次数并转发到 LogBuffer
    #[derive(Default)]
    struct RecordingSink {
        buffer: LogBuffer,
        published: Mutex<usize>,
    }

    impl LogSink for RecordingSink {
        fn publish_thinking(&self, text: &str) {
            *self.published.lock().unwrap() += 1;
            self.buffer.publish_thinking(text);
        }

        fn clear_thinking(&self) {
            self.buffer.clear_thinking();
        }

        fn append_log_line(&self, line: &str) {
            self.buffer.append_log_line(line);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_submitted_while_dormant_are_kept_in_order() {
        let backend = Arc::new(MockBackend::new());
        let store = ConfigStore::new(config_with_key(""), None);
        let kernel = KernelBuilder::new(backend.clone(), Arc::new(LogBuffer::default()))
            .start(store.subscribe());

        tokio::time::sleep(Duration::from_millis(100)).await;
        kernel.submit_user_message("a");
        kernel.submit_system_event("b");
        kernel.submit_user_message("c");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(kernel.state(), KernelState::Dormant);
        assert!(backend.exchange_prompts().is_empty());

        store.update(config_with_key("sk-1"));
        tokio::time::sleep(Duration::from_millis(800)).await;

        let prompts = backend.exchange_prompts();
        assert!(!prompts.is_empty());
        let first = &prompts[0];
        let positions: Vec<usize> = [STARTUP_EVENT, "] a", "] b", "] c"]
            .iter()
            .map(|needle| first.find(needle).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{first}");
        assert!(prompts[1..].iter().all(|p| !p.contains("] a")), "events are delivered once");

        kernel.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_key_never_connects() {
        let backend = Arc::new(MockBackend::new());
        let store = ConfigStore::new(config_with_key("   "), None);
        let kernel = KernelBuilder::new(backend.clone(), Arc::new(LogBuffer::default()))
            .start(store.subscribe());

        kernel.submit_user_message("anyone there?");
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(kernel.state(), KernelState::Dormant);
        assert_eq!(backend.connect_count(), 0);
        assert!(backend.exchange_prompts().is_empty());
        kernel.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_change_disconnects_then_connects() {
        let backend = Arc::new(MockBackend::new());
        let store = ConfigStore::new(config_with_key("sk-1"), None);
        let kernel = KernelBuilder::new(backend.clone(), Arc::new(LogBuffer::default()))
            .start(store.subscribe());

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.update(config_with_key("sk-2"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let options = BackendOptions::default();
        assert_eq!(
            lifecycle_calls(&backend),
            vec![
                BackendCall::Disconnect,
                BackendCall::Connect {
                    config: config_with_key("sk-1").llm_connection(),
                    options,
                },
                BackendCall::Disconnect,
                BackendCall::Connect {
                    config: config_with_key("sk-2").llm_connection(),
                    options,
                },
            ]
        );
        assert_eq!(kernel.state(), KernelState::Active);
        kernel.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_is_survivable_and_not_retried() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_next_connect(KernelError::InvalidConfiguration("bad url".to_string()));
        let store = ConfigStore::new(config_with_key("sk-crash"), None);
        let kernel = KernelBuilder::new(backend.clone(), Arc::new(LogBuffer::default()))
            .start(store.subscribe());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(kernel.state(), KernelState::Dormant);

        let mut same_triple = config_with_key("sk-crash");
        same_triple.llm.summary_model = "other-summary-model".to_string();
        assert!(store.update(same_triple));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(backend.connect_count(), 1);
        assert_eq!(kernel.state(), KernelState::Dormant);

        store.update(config_with_key("sk-good"));
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(backend.connect_count(), 2);
        assert_eq!(kernel.state(), KernelState::Active);
        assert!(!backend.exchange_prompts().is_empty());
        kernel.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_exchange_in_flight_under_config_churn() {
        let backend = Arc::new(MockBackend::new().with_exchange_delay(Duration::from_millis(300)));
        let store = ConfigStore::new(config_with_key("sk-0"), None);
        let kernel = KernelBuilder::new(backend.clone(), Arc::new(LogBuffer::default()))
            .start(store.subscribe());

        for i in 1..=10 {
            kernel.submit_user_message(format!("message {i}"));
            store.update(config_with_key(&format!("sk-{i}")));
            tokio::time::sleep(Duration::from_millis(170)).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(backend.exchange_prompts().len() >= 2);
        assert_eq!(backend.max_in_flight(), 1);
        kernel.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_thinking_is_published_then_cleared() {
        let backend = Arc::new(MockBackend::new());
        backend.push_exchange(Ok("thinking about the user".to_string()));
        let sink = Arc::new(RecordingSink::default());
        let store = ConfigStore::new(config_with_key("sk-1"), None);
        let kernel = KernelBuilder::new(backend.clone(), sink.clone()).start(store.subscribe());

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(*sink.published.lock().unwrap() >= 4);
        assert!(sink.buffer.thinking().is_empty());
        kernel.shutdown().await;
        assert!(sink.buffer.thinking().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_backs_off_and_loop_continues() {
        let backend = Arc::new(MockBackend::new());
        backend.push_exchange(Err(KernelError::Network("connection reset".to_string())));
        backend.push_exchange(Err(KernelError::Timeout(60)));
        let store = ConfigStore::new(config_with_key("sk-1"), None);
        let kernel = KernelBuilder::new(backend.clone(), Arc::new(LogBuffer::default()))
            .start(store.subscribe());

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(backend.exchange_prompts().len() >= 3);
        assert_eq!(kernel.state(), KernelState::Active);
        assert_eq!(backend.history("main").len(), 2 * (backend.exchange_prompts().len() - 2).min(5));
        kernel.shutdown().await;
    }
}
