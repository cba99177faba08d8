//! 系统提示词与事件批次渲染
//!
//! 每一轮把排空得到的事件批次渲染成一条提示词：状态头（当前时间）、逐行事件或「无新事件」、结尾指令。

use std::fmt::Write as _;

use chrono::{DateTime, Local, TimeZone};

use crate::protocol::events::InputEvent;

/// 固定系统提示词（每轮对同一会话重复设置，幂等）
pub const SYSTEM_PROMPT: &str = "\
你是 AiRi (Artificial Intelligence Recurring Interaction)，运行于本地环境的智能代理核心。

【系统架构定义】
本系统采用 \"思维链 (CoT) -> 动作 (Action)\" 的运行模式。

【I/O 协议规范】
1. 输入流 (Input Stream):
   - [用户输入信息]: 用户的直接输入。
   - [来自其他信号源的事件]: 系统自动生成的事件（如启动信号、工具回调、状态变更）。
   - 输入以时间戳标记的事件序列形式提供，你需处理整个上下文。

2. 输出流 (Output Stream):
   - **原始文本 (Raw Text)**: 你生成的任何自然语言文本均被视为 \"内部推理日志 (Internal Log)\"。此部分内容仅显示在调试控制台，**用户不可见**。
   - **工具调用 (Tool Call)**: 你与外部世界（包括用户）交互的**唯一**途径。

【运行指令】
1. **交互强制性**: 若需对用户做出响应，必须调用相应的工具（如 `reply` 或其他业务工具）。仅生成文本而无工具调用将被视为无效操作。
2. **推理优先**: 在执行动作前，利用原始文本输出区进行简短的逻辑分析和任务规划。
3. **格式严格**: 工具调用必须严格符合提供的 JSON Schema 定义。

【当前状态】
系统处于初始化阶段，请根据传入的事件流判断意图并执行相应操作。";

/// 批次为空时写入的提示行
pub const NO_EVENTS_LINE: &str = "当前无新事件。";
/// 每条提示词的结尾指令
pub const TRAILING_INSTRUCTION: &str = "基于以上内容继续你的思维。";

const HEADER_LINE: &str = "--- STATUS ---";
const RULE_LINE: &str = "--------------";
const NOW_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const EVENT_TIME_FORMAT: &str = "%H:%M:%S%.3f";

/// 以本地当前时间渲染
pub fn build_prompt(events: &[InputEvent]) -> String {
    build_prompt_at(events, Local::now())
}

/// 以指定时间渲染（事件行按到达顺序，格式 `[HH:MM:SS.mmm][来源标签] 内容`）
pub fn build_prompt_at<Tz>(events: &[InputEvent], now: DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{HEADER_LINE}");
    let _ = writeln!(prompt, "当前时间: {}", now.format(NOW_FORMAT));
    let _ = writeln!(prompt, "{RULE_LINE}");

    if events.is_empty() {
        let _ = writeln!(prompt, "{NO_EVENTS_LINE}");
    } else {
        for event in events {
            let _ = writeln!(
                prompt,
                "[{}][{}] {}",
                event_time(event.timestamp()),
                event.source().label(),
                event.content()
            );
        }
    }

    let _ = writeln!(prompt, "{RULE_LINE}");
    let _ = writeln!(prompt, "{TRAILING_INSTRUCTION}");
    prompt
}

/// 越界时间戳退化为原始毫秒数，不让渲染失败
fn event_time(timestamp: i64) -> String {
    match Local.timestamp_millis_opt(timestamp).single() {
        Some(time) => time.format(EVENT_TIME_FORMAT).to_string(),
        None => timestamp.to_string(),
    }
}
