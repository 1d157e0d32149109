use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DomainError;

/// Id used when the model emits a tool call without one.
pub const UNKNOWN_TOOL_CALL_ID: &str = "unknown";
/// Name used when the model emits a tool call without one.
pub const UNKNOWN_TOOL_NAME: &str = "unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Rental,
    Sales,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rental => "rental",
            Self::Sales => "sales",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Rental,
    Sales,
    #[default]
    Unknown,
}

impl Intent {
    pub fn domain(&self) -> Option<Domain> {
        match self {
            Self::Rental => Some(Domain::Rental),
            Self::Sales => Some(Domain::Sales),
            Self::Unknown => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.domain().is_some()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rental => "rental",
            Self::Sales => "sales",
            Self::Unknown => "unknown",
        }
    }

    /// Moves `Unknown` to a concrete domain. A resolved intent never changes.
    pub fn resolve(self, next: Intent) -> Result<Intent, DomainError> {
        match (self, next) {
            (current, next) if current == next => Ok(current),
            (Self::Unknown, next) => Ok(next),
            (from, to) => Err(DomainError::IntentRegression { from, to }),
        }
    }
}

impl From<Domain> for Intent {
    fn from(domain: Domain) -> Self {
        match domain {
            Domain::Rental => Self::Rental,
            Domain::Sales => Self::Sales,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self { id: id.into(), name: name.into(), arguments }
    }

    /// Builds a request from fields a model may have left out. Missing or blank
    /// ids and names fall back to the `unknown` sentinels.
    pub fn from_parts(id: Option<String>, name: Option<String>, arguments: Value) -> Self {
        let id = id
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_TOOL_CALL_ID.to_string());
        let name = name
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_TOOL_NAME.to_string());
        Self { id, name, arguments }
    }
}

/// Per-turn instructions for the text generator. Never stored in history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemDirective {
    pub text: String,
}

impl SystemDirective {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        text: String,
    },
    Assistant {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant { text: text.into(), tool_calls: Vec::new() }
    }

    pub fn assistant_with_tools(text: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self::Assistant { text: text.into(), tool_calls }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult { tool_call_id: tool_call_id.into(), content: content.into() }
    }

    pub fn pending_tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            Self::User { .. } | Self::ToolResult { .. } => &[],
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::User { text } | Self::Assistant { text, .. } => text,
            Self::ToolResult { content, .. } => content,
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::ToolResult { .. } => "tool",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub history: Vec<Message>,
    pub slots_complete: bool,
    pub intent: Intent,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_history(history: Vec<Message>) -> Self {
        Self { history, ..Self::default() }
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = intent;
        self
    }

    pub fn push(&mut self, message: Message) {
        self.history.push(message);
    }

    pub fn user_text(&self) -> String {
        user_text(&self.history)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.history.last()
    }

    pub fn last_assistant(&self) -> Option<&Message> {
        self.history.iter().rev().find(|message| matches!(message, Message::Assistant { .. }))
    }

    /// Tool calls of the latest message when it is an assistant turn.
    pub fn pending_tool_calls(&self) -> &[ToolCallRequest] {
        self.history.last().map(Message::pending_tool_calls).unwrap_or(&[])
    }

    /// Text of the most recent assistant turn.
    pub fn final_reply(&self) -> Option<&str> {
        self.last_assistant().map(Message::text)
    }
}

/// Newline-joined text of every user turn, in order.
pub fn user_text(history: &[Message]) -> String {
    history
        .iter()
        .filter_map(|message| match message {
            Message::User { text } => Some(text.as_str()),
            Message::Assistant { .. } | Message::ToolResult { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Checks that every assistant tool call is answered by exactly one tool result
/// before the next assistant turn. Only a trailing assistant turn may leave its
/// calls unanswered; a batch that is partly answered at the end is rejected.
pub fn check_tool_pairing(history: &[Message]) -> Result<(), DomainError> {
    let mut outstanding: BTreeMap<&str, usize> = BTreeMap::new();

    for (index, message) in history.iter().enumerate() {
        match message {
            Message::Assistant { tool_calls, .. } => {
                if !outstanding.is_empty() {
                    return Err(unresolved(index, &outstanding));
                }
                for call in tool_calls {
                    *outstanding.entry(call.id.as_str()).or_insert(0) += 1;
                }
            }
            Message::ToolResult { tool_call_id, .. } => {
                match outstanding.get_mut(tool_call_id.as_str()) {
                    Some(open) if *open > 1 => *open -= 1,
                    Some(_) => {
                        outstanding.remove(tool_call_id.as_str());
                    }
                    None => {
                        return Err(DomainError::InvariantViolation(format!(
                            "tool result `{tool_call_id}` at position {index} has no matching open call"
                        )));
                    }
                }
            }
            Message::User { .. } => {
                if !outstanding.is_empty() {
                    return Err(unresolved(index, &outstanding));
                }
            }
        }
    }

    let trailing_turn = matches!(history.last(), Some(Message::Assistant { .. }));
    if !outstanding.is_empty() && !trailing_turn {
        return Err(unresolved(history.len(), &outstanding));
    }

    Ok(())
}

fn unresolved(index: usize, outstanding: &BTreeMap<&str, usize>) -> DomainError {
    let ids = outstanding.keys().copied().collect::<Vec<_>>().join(", ");
    DomainError::InvariantViolation(format!(
        "tool calls [{ids}] were not resolved before position {index}"
    ))
}
