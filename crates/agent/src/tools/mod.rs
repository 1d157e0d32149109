pub mod http;
pub mod rental;
pub mod sales;
#[cfg(test)]
pub(crate) mod test_server;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::llm::ToolSchema;

pub use rental::rental_registry;
pub use sales::sales_registry;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("{0}")]
    Network(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("tool misconfigured: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn argument_schema(&self) -> Value;
    async fn execute(&self, arguments: Value) -> Result<Value, ToolError>;

    /// Fields merged into the `{"error": ...}` object when `execute` fails.
    fn error_context(&self) -> Map<String, Value> {
        Map::new()
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.argument_schema(),
        }
    }
}

/// Tools of one domain, in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Arc::new(tool)).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.order.iter().filter_map(|name| self.tools.get(name)).map(|tool| tool.schema()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Runs a tool by name. Never fails: unknown names and tool errors come back
    /// as values the model can read.
    pub async fn invoke(&self, name: &str, arguments: Value) -> Value {
        let Some(tool) = self.tools.get(name) else {
            warn!(event_name = "tool.unknown", tool = %name, "model requested an unregistered tool");
            return Value::String(format!("Unknown tool: {name}"));
        };

        match tool.execute(arguments).await {
            Ok(value) => value,
            Err(error) => {
                warn!(event_name = "tool.failed", tool = %name, error = %error, "tool call failed");
                let mut body = Map::new();
                body.insert("error".to_string(), Value::String(error.to_string()));
                body.extend(tool.error_context());
                Value::Object(body)
            }
        }
    }
}

/// Text stored in a `ToolResult` message. Strings are kept verbatim.
pub fn render_tool_content(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

pub(crate) fn arguments_object(arguments: &Value) -> Result<&Map<String, Value>, ToolError> {
    arguments
        .as_object()
        .ok_or_else(|| ToolError::InvalidArguments("arguments must be a JSON object".to_string()))
}

pub(crate) fn required_str(arguments: &Value, key: &str) -> Result<String, ToolError> {
    match arguments_object(arguments)?.get(key) {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.clone()),
        Some(Value::Number(number)) => Ok(number.to_string()),
        Some(_) => Err(ToolError::InvalidArguments(format!("`{key}` must be a non-empty string"))),
        None => Err(ToolError::InvalidArguments(format!("missing required argument `{key}`"))),
    }
}

pub(crate) fn required_int(arguments: &Value, key: &str) -> Result<i64, ToolError> {
    let invalid = || ToolError::InvalidArguments(format!("`{key}` must be an integer"));
    match arguments_object(arguments)?.get(key) {
        Some(Value::Number(number)) => number.as_i64().ok_or_else(invalid),
        Some(Value::String(text)) => text.trim().parse::<i64>().map_err(|_| invalid()),
        Some(_) => Err(invalid()),
        None => Err(ToolError::InvalidArguments(format!("missing required argument `{key}`"))),
    }
}

pub(crate) fn optional_str(arguments: &Value, key: &str) -> Result<Option<String>, ToolError> {
    match arguments_object(arguments)?.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(ToolError::InvalidArguments(format!("`{key}` must be a string"))),
    }
}
