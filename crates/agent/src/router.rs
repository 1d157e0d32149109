use std::sync::Arc;

use carline_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
use carline_core::domain::{check_tool_pairing, ConversationState, Domain, Intent};
use carline_core::errors::DomainError;
use carline_core::flows::{routed_intent, FlowAction, FlowContext, FlowEngine, FlowEvent, MasterRouterFlow};
use tracing::info;

use crate::domain_loop::DomainLoop;
use crate::intent::{IntentClassifier, KeywordIntentClassifier};
use crate::llm::LlmClient;
use crate::prompts::clarification_directive;
use crate::runtime::AgentError;

#[derive(Clone, Debug, PartialEq)]
pub struct RouteOutcome {
    pub state: ConversationState,
    /// `None` when the router asked the user to clarify.
    pub delegated_to: Option<Domain>,
    pub halted: Option<&'static str>,
}

/// Picks the assistant for a conversation and runs it.
pub struct MasterRouter {
    classifier: Arc<dyn IntentClassifier>,
    llm: Arc<dyn LlmClient>,
    rental: DomainLoop,
    sales: DomainLoop,
    engine: FlowEngine<MasterRouterFlow>,
    audit_sink: Arc<dyn AuditSink>,
}

impl MasterRouter {
    pub fn new(llm: Arc<dyn LlmClient>, rental: DomainLoop, sales: DomainLoop) -> Self {
        Self {
            classifier: Arc::new(KeywordIntentClassifier::new()),
            llm,
            rental,
            sales,
            engine: FlowEngine::default(),
            audit_sink: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = sink;
        self
    }

    pub fn domain_loop(&self, domain: Domain) -> &DomainLoop {
        match domain {
            Domain::Rental => &self.rental,
            Domain::Sales => &self.sales,
        }
    }

    pub async fn route(
        &self,
        mut state: ConversationState,
        audit: &AuditContext,
    ) -> Result<RouteOutcome, AgentError> {
        check_tool_pairing(&state.history)?;
        let intent = self.resolve_intent(&state, audit)?;

        let outcome = self.engine.apply_with_audit(
            &self.engine.initial_state(),
            &FlowEvent::IntentClassified(intent),
            &FlowContext::default(),
            self.audit_sink.as_ref(),
            audit,
        )?;

        if !outcome.to.is_terminal() {
            return Err(DomainError::InvariantViolation(format!(
                "router finished in non-terminal state {:?}",
                outcome.to
            ))
            .into());
        }

        let mut delegated_to = None;
        let mut halted = None;
        for action in outcome.actions {
            match action {
                FlowAction::RequestClarification => {
                    if !state.pending_tool_calls().is_empty() {
                        return Err(DomainError::InvariantViolation(
                            "cannot ask for clarification while tool calls are pending".to_string(),
                        )
                        .into());
                    }
                    let reply = self.llm.generate(&clarification_directive(), &state.history, &[]).await?;
                    state.push(reply);
                    state.intent = Intent::Unknown;
                }
                FlowAction::DelegateToDomain(domain) => {
                    state.intent = routed_intent(&outcome.to);
                    state.slots_complete = false;
                    let result = self.domain_loop(domain).run(state, audit).await?;
                    state = result.state;
                    halted = result.halted;
                    delegated_to = Some(domain);
                }
                other => {
                    return Err(DomainError::InvariantViolation(format!(
                        "{other:?} is not a routing action"
                    ))
                    .into());
                }
            }
        }

        Ok(RouteOutcome { state, delegated_to, halted })
    }

    fn resolve_intent(&self, state: &ConversationState, audit: &AuditContext) -> Result<Intent, AgentError> {
        if state.intent.is_resolved() {
            info!(
                event_name = "router.intent_classified",
                correlation_id = %audit.correlation_id,
                intent = state.intent.as_str(),
                sticky = true,
                "keeping resolved intent"
            );
            self.audit_routing(audit, state.intent, true);
            return Ok(state.intent);
        }

        let score = self.classifier.score(&state.history);
        let intent = state.intent.resolve(score.intent())?;
        info!(
            event_name = "router.intent_classified",
            correlation_id = %audit.correlation_id,
            intent = intent.as_str(),
            rental_hits = score.rental,
            sales_hits = score.sales,
            sticky = false,
            "classified conversation intent"
        );
        self.audit_routing(audit, intent, false);
        Ok(intent)
    }

    fn audit_routing(&self, audit: &AuditContext, intent: Intent, sticky: bool) {
        self.audit_sink.emit(
            AuditEvent::new(audit, "router.intent_classified", AuditCategory::Routing, AuditOutcome::Success)
                .with_metadata("intent", intent.as_str())
                .with_metadata("sticky", sticky.to_string()),
        );
    }
}
