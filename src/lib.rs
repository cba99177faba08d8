//! AiRi - 本地对话智能体的反应式编排内核
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）与实时配置流
//! - **core**: 错误与恢复、状态标志、事件入口、连接监管、轮次调度、内核装配
//! - **llm**: 后端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 按会话保存的短期对话历史
//! - **observability**: tracing 初始化与展示层日志镜像
//! - **protocol**: 输入事件、系统提示词、prompt 渲染、工具 Schema
//! - **sink**: 展示层日志出口（思考流 + 滚动日志）

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod protocol;
pub mod sink;

pub use crate::core::{AgentKernel, KernelBuilder, KernelError, KernelState};
