//! 应用配置：从 config/default.toml 与环境变量加载，并以 watch 通道作为「实时配置流」发布
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `AIRI__*` 覆盖（双下划线表示嵌套，如 `AIRI__LLM__API_KEY=sk-...`）。
//! 内核只关心 [llm] 中的 base_url / api_key / main_model 三项，其余字段对连接监管不透明。

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub kernel: KernelSection,
    pub log: LogSection,
}

impl AppConfig {
    /// 投影出连接监管关心的三元组
    pub fn llm_connection(&self) -> LlmConnectionConfig {
        LlmConnectionConfig {
            base_url: self.llm.base_url.clone(),
            api_key: self.llm.api_key.clone(),
            model_name: self.llm.main_model.clone(),
        }
    }

    /// 尚未配置 API Key
    pub fn is_first_run(&self) -> bool {
        self.llm.api_key.trim().is_empty()
    }
}

/// [llm] 段：OpenAI 兼容端点与模型
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_main_model")]
    pub main_model: String,
    /// 摘要模型（预留，内核不使用）
    #[serde(default = "default_summary_model")]
    pub summary_model: String,
}

fn default_base_url() -> String {
    "https://api.siliconflow.cn/v1".to_string()
}

fn default_main_model() -> String {
    "deepseek-ai/DeepSeek-V3.2".to_string()
}

fn default_summary_model() -> String {
    "Qwen/Qwen3-Next-80B-A3B-Instruct".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            main_model: default_main_model(),
            summary_model: default_summary_model(),
        }
    }
}

impl fmt::Debug for LlmSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSection")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("main_model", &self.main_model)
            .field("summary_model", &self.summary_model)
            .finish()
    }
}

/// [kernel] 段：轮次节奏、请求超时、会话记忆容量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelSection {
    /// 后端会话标识
    #[serde(default = "default_conversation_id")]
    pub conversation_id: String,
    /// 排空前的去抖等待（毫秒）
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// 休眠态的重查间隔（毫秒）
    #[serde(default = "default_dormant_poll_ms")]
    pub dormant_poll_ms: u64,
    /// 网络类失败后的退避（毫秒）
    #[serde(default = "default_io_backoff_ms")]
    pub io_backoff_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 每个会话保留的消息条数
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
}

fn default_conversation_id() -> String {
    "main".to_string()
}

fn default_debounce_ms() -> u64 {
    200
}

fn default_dormant_poll_ms() -> u64 {
    500
}

fn default_io_backoff_ms() -> u64 {
    200
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_memory_capacity() -> usize {
    10
}

impl Default for KernelSection {
    fn default() -> Self {
        Self {
            conversation_id: default_conversation_id(),
            debounce_ms: default_debounce_ms(),
            dormant_poll_ms: default_dormant_poll_ms(),
            io_backoff_ms: default_io_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            memory_capacity: default_memory_capacity(),
        }
    }
}

/// [log] 段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSection {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
}

fn default_max_lines() -> usize {
    crate::sink::DEFAULT_MAX_LINES
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
        }
    }
}

/// 连接三元组；逐字段比较以判断是否需要重连
#[derive(Clone, PartialEq, Eq, Default)]
pub struct LlmConnectionConfig {
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
}

impl LlmConnectionConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model_name: model_name.into(),
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl fmt::Debug for LlmConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConnectionConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model_name", &self.model_name)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

/// 从 config 目录加载配置，环境变量 AIRI__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 AIRI__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("AIRI")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// 配置的持有方：保存当前快照，并把每次变化推送到订阅者（连接监管）
#[derive(Debug)]
pub struct ConfigStore {
    tx: watch::Sender<AppConfig>,
    path: Option<PathBuf>,
}

impl ConfigStore {
    pub fn new(initial: AppConfig, path: Option<PathBuf>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx, path }
    }

    /// 当前配置快照
    pub fn current(&self) -> AppConfig {
        self.tx.borrow().clone()
    }

    /// 订阅实时配置流；订阅时的当前值视为第一次发射
    pub fn subscribe(&self) -> watch::Receiver<AppConfig> {
        let mut rx = self.tx.subscribe();
        rx.mark_changed();
        rx
    }

    /// 发布新配置；与当前值相同则不通知，返回是否发生变化
    pub fn update(&self, config: AppConfig) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == config {
                false
            } else {
                *current = config;
                true
            }
        })
    }

    /// 重新从磁盘与环境变量加载并发布（配置热更新）
    pub fn reload(&self) -> Result<bool, config::ConfigError> {
        let config = load_config(self.path.clone())?;
        let changed = self.update(config);
        tracing::info!(changed, "Configuration reloaded");
        Ok(changed)
    }
}
