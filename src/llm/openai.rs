//! OpenAI 兼容 API 后端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 SiliconFlow、DeepSeek、OpenAI、自建代理等。
//! connect 只做参数校验并构造客户端，真正的网络 I/O 发生在 run_exchange 的流式请求中。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::config::LlmConnectionConfig;
use crate::core::KernelError;
use crate::llm::{BackendOptions, LlmBackend};
use crate::memory::{ConversationStore, Message, Role};

/// 一次成功 connect 的产物；disconnect 时整体丢弃（会话记忆随之清空）
#[derive(Clone)]
struct Connection {
    client: Client<OpenAIConfig>,
    model: String,
    request_timeout: Duration,
    conversations: Arc<tokio::sync::Mutex<ConversationStore>>,
}

/// OpenAI 兼容后端
#[derive(Default)]
pub struct OpenAiBackend {
    connection: Mutex<Option<Connection>>,
}

impl OpenAiBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> Result<Connection, KernelError> {
        self.lock()
            .clone()
            .ok_or_else(|| KernelError::IllegalState("LLM backend is not connected".to_string()))
    }
}

fn validate(config: &LlmConnectionConfig, options: &BackendOptions) -> Result<(), KernelError> {
    let base_url = config.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(KernelError::InvalidConfiguration(format!(
            "base url must start with http:// or https://, got '{}'",
            config.base_url
        )));
    }
    if !config.has_credentials() {
        return Err(KernelError::InvalidConfiguration("api key is empty".to_string()));
    }
    if config.model_name.trim().is_empty() {
        return Err(KernelError::InvalidConfiguration("model name is empty".to_string()));
    }
    if options.request_timeout.is_zero() {
        return Err(KernelError::InvalidConfiguration("request timeout must be positive".to_string()));
    }
    Ok(())
}

fn to_openai_messages(
    messages: &[Message],
) -> Result<Vec<ChatCompletionRequestMessage>, KernelError> {
    messages
        .iter()
        .map(|m| {
            let message = match m.role {
                Role::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()?,
                ),
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()?,
                ),
                Role::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()?,
                ),
            };
            Ok(message)
        })
        .collect()
}

impl From<OpenAIError> for KernelError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::JSONDeserialize(..) => KernelError::Serialization(err.to_string()),
            OpenAIError::InvalidArgument(..) => KernelError::InvalidArgument(err.to_string()),
            other => KernelError::Network(other.to_string()),
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn connect(
        &self,
        config: &LlmConnectionConfig,
        options: &BackendOptions,
    ) -> Result<(), KernelError> {
        validate(config, options)?;

        let mut slot = self.lock();
        if slot.is_some() {
            return Err(KernelError::IllegalState(
                "LLM backend is already connected; disconnect first".to_string(),
            ));
        }

        let openai_config = OpenAIConfig::new()
            .with_api_base(config.base_url.trim().trim_end_matches('/'))
            .with_api_key(config.api_key.clone());

        *slot = Some(Connection {
            client: Client::with_config(openai_config),
            model: config.model_name.clone(),
            request_timeout: options.request_timeout,
            conversations: Arc::new(tokio::sync::Mutex::new(ConversationStore::new(
                options.memory_capacity,
            ))),
        });
        tracing::debug!(model = %config.model_name, "OpenAI-compatible client created");
        Ok(())
    }

    fn disconnect(&self) -> Result<(), KernelError> {
        if self.lock().take().is_some() {
            tracing::debug!("OpenAI-compatible client closed");
        }
        Ok(())
    }

    async fn run_exchange(
        &self,
        conversation_id: &str,
        system_prompt: &str,
        prompt: &str,
        on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<String, KernelError> {
        let connection = self.current()?;
        let timeout = connection.request_timeout;

        let exchange = async {
            let messages = {
                let mut store = connection.conversations.lock().await;
                let conversation = store.select(conversation_id);
                conversation.set_system_prompt(system_prompt);
                conversation.compose(prompt)
            };

            let request = CreateChatCompletionRequestArgs::default()
                .model(&connection.model)
                .messages(to_openai_messages(&messages)?)
                .stream(true)
                .build()?;

            let mut stream = connection.client.chat().create_stream(request).await?;
            let mut reply = String::new();
            while let Some(chunk) = stream.next().await {
                for choice in chunk?.choices {
                    if let Some(token) = choice.delta.content {
                        if !token.is_empty() {
                            on_token(&token);
                            reply.push_str(&token);
                        }
                    }
                }
            }

            connection
                .conversations
                .lock()
                .await
                .select(conversation_id)
                .record(prompt, &reply);
            Ok::<_, KernelError>(reply)
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| KernelError::Timeout(timeout.as_secs()))?
    }
}
