//! 工具定义与 Schema 构建
//!
//! define_tool 由参数名列表生成 `{"type":"object","properties":{..},"required":[..]}`（schemars Schema 对象），
//! 执行器先把原始 JSON 参数解析为字符串映射再调用业务闭包。ToolSet 按名登记，供后端拼装工具列表。
//! 主循环不执行工具，这里只提供数据能力。

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use schemars::schema::{InstanceType, ObjectValidation, Schema, SchemaObject};
use serde_json::Value;

/// 解析后的工具参数：参数名 -> 字符串值
pub type ToolArgs = HashMap<String, String>;

type Executor = Arc<dyn Fn(&ToolArgs) -> String + Send + Sync>;

/// 工具定义：名称、描述（供 LLM 理解）、参数 Schema、执行器
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameter_schema: Value,
    executor: Executor,
}

impl ToolDefinition {
    /// 解析原始参数并调用执行器；参数畸形时执行器拿到的是不完整（可能为空）的映射
    pub fn execute(&self, raw_args: &str) -> String {
        let args = parse_tool_args(raw_args);
        (self.executor)(&args)
    }

    /// OpenAI function-calling 格式
    pub fn to_openai_json(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameter_schema,
            }
        })
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameter_schema", &self.parameter_schema)
            .finish_non_exhaustive()
    }
}

/// 由参数名列表构建工具：每个参数都是必填字符串
pub fn define_tool<F>(
    name: impl Into<String>,
    description: impl Into<String>,
    params: &[&str],
    executor: F,
) -> ToolDefinition
where
    F: Fn(&ToolArgs) -> String + Send + Sync + 'static,
{
    ToolDefinition {
        name: name.into(),
        description: description.into(),
        parameter_schema: string_params_schema(params),
        executor: Arc::new(executor),
    }
}

fn string_params_schema(params: &[&str]) -> Value {
    let properties = params
        .iter()
        .map(|param| {
            let schema = SchemaObject {
                instance_type: Some(InstanceType::String.into()),
                ..Default::default()
            };
            ((*param).to_string(), Schema::Object(schema))
        })
        .collect();
    let required = params.iter().map(|param| (*param).to_string()).collect();

    let schema = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        object: Some(Box::new(ObjectValidation {
            properties,
            required,
            ..Default::default()
        })),
        ..Default::default()
    };

    serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
}

/// 原始参数 -> 字符串映射。
///
/// 仅接受 JSON 对象：标量值取其文本（字符串原样、数字/布尔取 JSON 文本、null 为 "null"），
/// 嵌套对象或数组被跳过；非对象或无法解析的载荷得到空映射。
pub fn parse_tool_args(raw_args: &str) -> ToolArgs {
    match serde_json::from_str::<Value>(raw_args) {
        Ok(Value::Object(fields)) => fields
            .into_iter()
            .filter_map(|(key, value)| scalar_text(value).map(|text| (key, text)))
            .collect(),
        Ok(_) => ToolArgs::new(),
        Err(e) => {
            tracing::debug!("Tool arguments are not valid JSON: {}", e);
            ToolArgs::new()
        }
    }
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// 工具集合：按名称登记（有序，保证 Schema 输出稳定）
#[derive(Clone, Debug, Default)]
pub struct ToolSet {
    tools: BTreeMap<String, ToolDefinition>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同名工具会被覆盖
    pub fn register(&mut self, tool: ToolDefinition) {
        self.tools.insert(tool.name.clone(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 未登记的工具返回 None
    pub fn execute(&self, name: &str, raw_args: &str) -> Option<String> {
        self.tools.get(name).map(|tool| tool.execute(raw_args))
    }

    pub fn schema_json(&self) -> String {
        let tools: Vec<Value> = self.tools.values().map(ToolDefinition::to_openai_json).collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}
