//! OpenAI-compatible `/chat/completions` client (OpenAI, Ollama).

use std::time::Duration;

use async_trait::async_trait;
use carline_core::config::LlmConfig;
use carline_core::domain::{Message, SystemDirective, ToolCallRequest};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::llm::{LlmClient, LlmError, ToolSchema};

pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl OpenAiClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Configuration(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.effective_base_url(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, body: &ChatCompletionRequest) -> Result<ChatCompletionResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.http.post(&url).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| LlmError::Network(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Http { status: status.as_u16(), body });
        }

        let text = response.text().await.map_err(|error| LlmError::Network(error.to_string()))?;
        serde_json::from_str(&text).map_err(|error| LlmError::Decode(error.to_string()))
    }

    fn request(&self, messages: Vec<ChatMessage>, tools: &[ToolSchema]) -> ChatCompletionRequest {
        let tools: Option<Vec<ToolDefinition>> =
            (!tools.is_empty()).then(|| tools.iter().map(ToolDefinition::from).collect());
        ChatCompletionRequest {
            model: self.model.clone(),
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            messages,
            tools,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(
        &self,
        directive: &SystemDirective,
        history: &[Message],
        tools: &[ToolSchema],
    ) -> Result<Message, LlmError> {
        let body = self.request(to_wire_messages(Some(directive), history), tools);
        debug!(
            event_name = "llm.generate",
            model = %self.model,
            messages = body.messages.len(),
            tools = tools.len(),
            "requesting assistant turn"
        );
        let response = self.send(&body).await?;
        parse_reply(response)
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let body = self.request(to_wire_messages(None, &[Message::user(prompt)]), &[]);
        let response = self.send(&body).await?;
        match parse_reply(response)? {
            Message::Assistant { text, .. } => Ok(text),
            Message::User { .. } | Message::ToolResult { .. } => {
                Err(LlmError::Decode("completion did not yield an assistant turn".to_string()))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Outgoing chat message. `content` is always a string; several local runtimes
/// reject `null` content on assistant turns that carry tool calls.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireToolCall {
    pub id: String,
    pub r#type: String,
    pub function: WireFunctionCall,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl From<&ToolSchema> for ToolDefinition {
    fn from(schema: &ToolSchema) -> Self {
        Self {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: schema.name.clone(),
                description: schema.description.clone(),
                parameters: schema.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseToolCall {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<ResponseFunction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseFunction {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

pub fn to_wire_messages(directive: Option<&SystemDirective>, history: &[Message]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if let Some(directive) = directive {
        messages.push(ChatMessage {
            role: Role::System,
            content: directive.text.clone(),
            tool_call_id: None,
            tool_calls: None,
        });
    }

    for message in history {
        let wire = match message {
            Message::User { text } => ChatMessage {
                role: Role::User,
                content: text.clone(),
                tool_call_id: None,
                tool_calls: None,
            },
            Message::Assistant { text, tool_calls } => ChatMessage {
                role: Role::Assistant,
                content: text.clone(),
                tool_call_id: None,
                tool_calls: (!tool_calls.is_empty())
                    .then(|| tool_calls.iter().map(wire_tool_call).collect()),
            },
            Message::ToolResult { tool_call_id, content } => ChatMessage {
                role: Role::Tool,
                content: content.clone(),
                tool_call_id: Some(tool_call_id.clone()),
                tool_calls: None,
            },
        };
        messages.push(wire);
    }

    messages
}

fn wire_tool_call(call: &ToolCallRequest) -> WireToolCall {
    let arguments = match &call.arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    };
    WireToolCall {
        id: call.id.clone(),
        r#type: "function".to_string(),
        function: WireFunctionCall { name: call.name.clone(), arguments },
    }
}

/// Converts the first choice into an assistant turn, filling in sentinels for
/// missing ids or names and keeping unparsable arguments as the raw string.
pub fn parse_reply(response: ChatCompletionResponse) -> Result<Message, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Decode("response contained no choices".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let (name, raw_arguments) = match call.function {
                Some(function) => (function.name, function.arguments),
                None => (None, None),
            };
            ToolCallRequest::from_parts(call.id, name, parse_arguments(raw_arguments))
        })
        .collect();

    Ok(Message::assistant_with_tools(choice.message.content.unwrap_or_default(), tool_calls))
}

fn parse_arguments(raw: Option<String>) -> Value {
    match raw {
        None => Value::Object(Default::default()),
        Some(raw) if raw.trim().is_empty() => Value::Object(Default::default()),
        Some(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
    }
}
