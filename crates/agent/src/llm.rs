use async_trait::async_trait;
use carline_core::domain::{Message, SystemDirective};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A tool as advertised to the text generator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm client misconfigured: {0}")]
    Configuration(String),
    #[error("llm request failed: {0}")]
    Network(String),
    #[error("llm endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("could not decode llm response: {0}")]
    Decode(String),
    #[error("scripted llm has no reply left for `{0}`")]
    Exhausted(&'static str),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Produces the next assistant turn. The returned message is always `Message::Assistant`.
    async fn generate(
        &self,
        directive: &SystemDirective,
        history: &[Message],
        tools: &[ToolSchema],
    ) -> Result<Message, LlmError>;

    /// Plain single-prompt completion with no tools.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}
