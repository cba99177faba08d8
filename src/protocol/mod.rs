//! 提示词协议层：输入事件模型、固定系统提示词、事件批次渲染、工具 Schema 构建
//!
//! 全部为无状态的纯函数与数据类型，供主循环与后端适配层共享。

pub mod events;
pub mod prompt;
pub mod tools;

pub use events::{EventSource, InputEvent};
pub use prompt::{build_prompt, build_prompt_at, NO_EVENTS_LINE, SYSTEM_PROMPT, TRAILING_INSTRUCTION};
pub use tools::{define_tool, parse_tool_args, ToolArgs, ToolDefinition, ToolSet};
