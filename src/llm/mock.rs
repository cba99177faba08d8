//! Mock 后端（用于测试与离线运行，无需 API）
//!
//! 记录每一次 connect / disconnect / 交换调用，可预置连接失败与交换结果；
//! 未预置时回显一段固定回复并按词切分为 token 流。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::LlmConnectionConfig;
use crate::core::KernelError;
use crate::llm::{BackendOptions, LlmBackend};
use crate::memory::{ConversationStore, Message};

/// 未预置结果时的回复
pub const DEFAULT_MOCK_REPLY: &str = "Echo from Mock: events received";

/// 后端收到的调用（按发生顺序记录）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Connect {
        config: LlmConnectionConfig,
        options: BackendOptions,
    },
    Disconnect,
    Exchange {
        conversation_id: String,
        prompt: String,
    },
}

#[derive(Default)]
struct MockState {
    calls: Vec<BackendCall>,
    connect_failures: VecDeque<KernelError>,
    exchange_script: VecDeque<Result<String, KernelError>>,
    conversations: Option<ConversationStore>,
}

/// 可编排的后端替身
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
    exchange_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次交换在产出 token 前等待给定时长
    pub fn with_exchange_delay(mut self, delay: Duration) -> Self {
        self.exchange_delay = delay;
        self
    }

    /// 下一次 connect 返回该错误
    pub fn fail_next_connect(&self, err: KernelError) {
        self.lock().connect_failures.push_back(err);
    }

    /// 预置下一次交换的结果
    pub fn push_exchange(&self, result: Result<String, KernelError>) {
        self.lock().exchange_script.push_back(result);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, BackendCall::Connect { .. }))
            .count()
    }

    /// 按顺序返回每次交换提交的 prompt
    pub fn exchange_prompts(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Exchange { prompt, .. } => Some(prompt.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().conversations.is_some()
    }

    /// 同时进行中的交换数的历史最大值
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// 会话历史（未连接或会话不存在时为空）
    pub fn history(&self, conversation_id: &str) -> Vec<Message> {
        self.lock()
            .conversations
            .as_ref()
            .and_then(|store| store.get(conversation_id))
            .map(|conversation| conversation.history().to_vec())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn exchange(
        &self,
        conversation_id: &str,
        system_prompt: &str,
        prompt: &str,
        on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<String, KernelError> {
        let scripted = {
            let mut state = self.lock();
            state.calls.push(BackendCall::Exchange {
                conversation_id: conversation_id.to_string(),
                prompt: prompt.to_string(),
            });
            let Some(conversations) = state.conversations.as_mut() else {
                return Err(KernelError::IllegalState("backend is not connected".to_string()));
            };
            conversations
                .select(conversation_id)
                .set_system_prompt(system_prompt);
            state.exchange_script.pop_front()
        };

        if !self.exchange_delay.is_zero() {
            tokio::time::sleep(self.exchange_delay).await;
        }

        let reply = match scripted {
            Some(result) => result?,
            None => DEFAULT_MOCK_REPLY.to_string(),
        };
        for token in reply.split_inclusive(' ') {
            on_token(token);
        }

        if let Some(conversations) = self.lock().conversations.as_mut() {
            conversations.select(conversation_id).record(prompt, &reply);
        }
        Ok(reply)
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn connect(
        &self,
        config: &LlmConnectionConfig,
        options: &BackendOptions,
    ) -> Result<(), KernelError> {
        let mut state = self.lock();
        state.calls.push(BackendCall::Connect {
            config: config.clone(),
            options: *options,
        });
        if let Some(err) = state.connect_failures.pop_front() {
            return Err(err);
        }
        if state.conversations.is_some() {
            return Err(KernelError::IllegalState("backend is already connected".to_string()));
        }
        state.conversations = Some(ConversationStore::new(options.memory_capacity));
        Ok(())
    }

    fn disconnect(&self) -> Result<(), KernelError> {
        let mut state = self.lock();
        state.calls.push(BackendCall::Disconnect);
        state.conversations = None;
        Ok(())
    }

    async fn run_exchange(
        &self,
        conversation_id: &str,
        system_prompt: &str,
        prompt: &str,
        on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<String, KernelError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let result = self
            .exchange(conversation_id, system_prompt, prompt, on_token)
            .await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
