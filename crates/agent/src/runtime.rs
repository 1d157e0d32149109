use std::sync::Arc;

use carline_core::audit::{AuditContext, AuditSink, TracingAuditSink};
use carline_core::config::AppConfig;
use carline_core::domain::{ConversationState, Domain, Message};
use carline_core::errors::{ApplicationError, DomainError};
use carline_core::flows::FlowTransitionError;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::completion::{oracle_for, KeywordConjunctionOracle, SemanticOracle};
use crate::domain_loop::DomainLoop;
use crate::guardrails::LoopGuardPolicy;
use crate::llm::{LlmClient, LlmError};
use crate::openai::OpenAiClient;
use crate::router::{MasterRouter, RouteOutcome};
use crate::tools::{rental_registry, sales_registry, ToolError, ToolRegistry};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("text generation failed: {0}")]
    Generation(#[from] LlmError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("agent misconfigured: {0}")]
    Configuration(String),
}

impl From<FlowTransitionError> for AgentError {
    fn from(error: FlowTransitionError) -> Self {
        Self::Domain(DomainError::FlowTransition(error))
    }
}

impl From<ToolError> for AgentError {
    fn from(error: ToolError) -> Self {
        Self::Configuration(error.to_string())
    }
}

impl From<AgentError> for ApplicationError {
    fn from(error: AgentError) -> Self {
        match error {
            AgentError::Generation(error) => Self::Generation(error.to_string()),
            AgentError::Domain(error) => Self::Domain(error),
            AgentError::Configuration(message) => Self::Configuration(message),
        }
    }
}

/// Entry point for callers: one `process` call handles one user turn.
pub struct AgentRuntime {
    router: MasterRouter,
    actor: String,
}

impl AgentRuntime {
    pub fn from_config(config: &AppConfig) -> Result<Self, AgentError> {
        let llm = OpenAiClient::from_config(&config.llm)
            .map_err(|error| AgentError::Configuration(error.to_string()))?;
        Self::with_llm(config, Arc::new(llm))
    }

    pub fn with_llm(config: &AppConfig, llm: Arc<dyn LlmClient>) -> Result<Self, AgentError> {
        Self::with_audit_sink(config, llm, Arc::new(TracingAuditSink))
    }

    pub fn with_audit_sink(
        config: &AppConfig,
        llm: Arc<dyn LlmClient>,
        sink: Arc<dyn AuditSink>,
    ) -> Result<Self, AgentError> {
        let guard = LoopGuardPolicy::from(&config.agent);

        let rental = DomainLoop::new(
            Domain::Rental,
            llm.clone(),
            rental_registry(&config.rental)?,
            oracle_for(
                config.agent.rental_completion,
                KeywordConjunctionOracle::rental(),
                SemanticOracle::rental(llm.clone()),
            ),
        );
        let sales = DomainLoop::new(
            Domain::Sales,
            llm.clone(),
            sales_registry(&config.sales)?,
            oracle_for(
                config.agent.sales_completion,
                KeywordConjunctionOracle::sales(),
                SemanticOracle::sales(llm.clone()),
            ),
        );

        let configure = |domain_loop: DomainLoop| {
            domain_loop
                .with_guard(guard)
                .with_parallel_tool_calls(config.agent.parallel_tool_calls)
                .with_audit_sink(sink.clone())
        };

        let router = MasterRouter::new(llm, configure(rental), configure(sales)).with_audit_sink(sink.clone());
        Ok(Self { router, actor: "carline-agent".to_string() })
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn tools(&self, domain: Domain) -> &ToolRegistry {
        self.router.domain_loop(domain).registry()
    }

    pub async fn process(&self, state: ConversationState) -> Result<ConversationState, AgentError> {
        self.process_detailed(state).await.map(|outcome| outcome.state)
    }

    /// Same as `process`, keeping which assistant ran and whether the guard stopped it.
    pub async fn process_detailed(&self, state: ConversationState) -> Result<RouteOutcome, AgentError> {
        let correlation_id = Uuid::new_v4().to_string();
        let audit = AuditContext::new(None, correlation_id.as_str(), self.actor.as_str());
        let history_before = state.history.len();

        let outcome = self.router.route(state, &audit).await?;
        info!(
            event_name = "runtime.turn_processed",
            correlation_id = %correlation_id,
            intent = outcome.state.intent.as_str(),
            slots_complete = outcome.state.slots_complete,
            appended = outcome.state.history.len().saturating_sub(history_before),
            halted = outcome.halted.unwrap_or("no"),
            "conversation turn processed"
        );
        Ok(outcome)
    }

    pub async fn handle_user_message(
        &self,
        mut state: ConversationState,
        text: impl Into<String>,
    ) -> Result<ConversationState, AgentError> {
        state.push(Message::user(text));
        self.process(state).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use carline_core::audit::InMemoryAuditSink;
    use carline_core::config::{AppConfig, CompletionStrategy};
    use carline_core::domain::{ConversationState, Domain, Intent, Message, ToolCallRequest};
    use carline_core::errors::{ApplicationError, InterfaceError};
    use serde_json::json;

    use super::{AgentError, AgentRuntime};
    use crate::llm::LlmError;
    use crate::testing::ScriptedLlmClient;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.rental.api_base_url = "http://127.0.0.1:9".to_string();
        config.sales.api_base_url = "http://127.0.0.1:9".to_string();
        config.sales.leasing_base_url = "http://127.0.0.1:9".to_string();
        config
    }

    #[tokio::test]
    async fn rental_turn_uses_semantic_completion_by_default() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_reply(Message::assistant("באיזה תאריך תרצה לאסוף?"))
                .with_completion("false"),
        );
        let runtime = AgentRuntime::with_llm(&config(), llm.clone()).expect("runtime");

        let state = runtime
            .handle_user_message(ConversationState::new(), "אני רוצה להשכיר רכב לשבוע")
            .await
            .expect("turn processed");

        assert_eq!(state.intent, Intent::Rental);
        assert!(!state.slots_complete);
        assert_eq!(state.history.len(), 2);
        assert_eq!(llm.prompts().len(), 1);
        assert_eq!(llm.generations()[0].tool_names.len(), 3);
    }

    #[tokio::test]
    async fn sales_turn_resolves_argument_errors_locally() {
        let mut config = config();
        config.agent.sales_completion = CompletionStrategy::Keyword;
        let llm = Arc::new(ScriptedLlmClient::new().with_replies([
            Message::assistant_with_tools(
                "",
                vec![ToolCallRequest::new("c1", "get_leasing_car_details", json!({}))],
            ),
            Message::assistant("איזה רכב מעניין אותך?"),
        ]));
        let sink = InMemoryAuditSink::default();
        let runtime =
            AgentRuntime::with_audit_sink(&config, llm, Arc::new(sink.clone())).expect("runtime");

        let state = runtime
            .handle_user_message(ConversationState::new(), "מחפש ליסינג לרכב משפחתי עד 3000 שקל")
            .await
            .expect("turn processed");

        assert_eq!(state.intent, Intent::Sales);
        assert!(state.slots_complete);
        assert!(state.history[2].text().contains("missing required argument `car_id`"));
        assert!(sink.events().iter().all(|event| event.correlation_id == sink.events()[0].correlation_id));
        assert!(sink.events().iter().any(|event| event.domain == Some(Domain::Sales)));
    }

    #[tokio::test]
    async fn generation_failure_surfaces_as_service_unavailable() {
        let runtime = AgentRuntime::with_llm(&config(), Arc::new(ScriptedLlmClient::new())).expect("runtime");

        let error = runtime
            .handle_user_message(ConversationState::new(), "שלום")
            .await
            .expect_err("no scripted reply");
        assert!(matches!(error, AgentError::Generation(LlmError::Exhausted("generate"))));

        let interface = ApplicationError::from(error).into_interface("corr-1");
        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
    }

    #[test]
    fn registries_expose_domain_tools() {
        let runtime = AgentRuntime::with_llm(&config(), Arc::new(ScriptedLlmClient::new())).expect("runtime");
        assert_eq!(runtime.tools(Domain::Rental).len(), 3);
        assert_eq!(runtime.tools(Domain::Sales).len(), 7);
    }
}
