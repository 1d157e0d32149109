//! Deterministic `LlmClient` for tests and offline runs.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use carline_core::domain::{Message, SystemDirective};

use crate::llm::{LlmClient, LlmError, ToolSchema};

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedGeneration {
    pub directive: SystemDirective,
    pub history: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// Replays queued assistant turns and completions in order and records every call.
#[derive(Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Message>>,
    completions: Mutex<VecDeque<String>>,
    repeat_reply: Option<Message>,
    generations: Mutex<Vec<RecordedGeneration>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, reply: Message) -> Self {
        lock(&self.replies).push_back(reply);
        self
    }

    pub fn with_replies(self, replies: impl IntoIterator<Item = Message>) -> Self {
        lock(&self.replies).extend(replies);
        self
    }

    pub fn with_completion(self, completion: impl Into<String>) -> Self {
        lock(&self.completions).push_back(completion.into());
        self
    }

    /// Reply returned once the queue is drained, forever.
    pub fn repeating(mut self, reply: Message) -> Self {
        self.repeat_reply = Some(reply);
        self
    }

    pub fn generations(&self) -> Vec<RecordedGeneration> {
        lock(&self.generations).clone()
    }

    pub fn generate_count(&self) -> usize {
        lock(&self.generations).len()
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn generate(
        &self,
        directive: &SystemDirective,
        history: &[Message],
        tools: &[ToolSchema],
    ) -> Result<Message, LlmError> {
        lock(&self.generations).push(RecordedGeneration {
            directive: directive.clone(),
            history: history.to_vec(),
            tool_names: tools.iter().map(|tool| tool.name.clone()).collect(),
        });

        let queued = lock(&self.replies).pop_front();
        queued.or_else(|| self.repeat_reply.clone()).ok_or(LlmError::Exhausted("generate"))
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        lock(&self.prompts).push(prompt.to_string());
        lock(&self.completions).pop_front().ok_or(LlmError::Exhausted("complete"))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use carline_core::domain::{Message, SystemDirective};

    use super::ScriptedLlmClient;
    use crate::llm::{LlmClient, LlmError};

    #[tokio::test]
    async fn replays_in_order_then_reports_exhaustion() {
        let client = ScriptedLlmClient::new()
            .with_replies([Message::assistant("first"), Message::assistant("second")])
            .with_completion("true");
        let directive = SystemDirective::new("test");

        let first = client.generate(&directive, &[], &[]).await.expect("first reply");
        let second = client.generate(&directive, &[Message::user("hi")], &[]).await.expect("second");
        assert_eq!(first.text(), "first");
        assert_eq!(second.text(), "second");
        assert!(matches!(
            client.generate(&directive, &[], &[]).await,
            Err(LlmError::Exhausted("generate"))
        ));

        assert_eq!(client.complete("q").await.expect("completion"), "true");
        assert!(client.complete("q").await.is_err());

        assert_eq!(client.generate_count(), 3);
        assert_eq!(client.generations()[1].history, vec![Message::user("hi")]);
        assert_eq!(client.prompts(), vec!["q".to_string(), "q".to_string()]);
    }

    #[tokio::test]
    async fn repeating_reply_never_runs_out() {
        let client = ScriptedLlmClient::new().repeating(Message::assistant("again"));
        let directive = SystemDirective::new("test");
        for _ in 0..5 {
            let reply = client.generate(&directive, &[], &[]).await.expect("repeat");
            assert_eq!(reply.text(), "again");
        }
    }
}
