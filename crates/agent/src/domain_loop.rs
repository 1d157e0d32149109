//! Assistant / Tool-Execution cycle shared by the rental and sales assistants.
//!
//! The flow table in `carline_core::flows` decides every step. Each transition
//! hands back a list of `FlowAction`s; this module performs them in order and
//! feeds the resulting event back into the table.

use std::collections::VecDeque;
use std::sync::Arc;

use carline_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
use carline_core::domain::{check_tool_pairing, ConversationState, Domain, Message, SystemDirective, ToolCallRequest};
use carline_core::errors::DomainError;
use carline_core::flows::{DomainLoopFlow, FlowAction, FlowContext, FlowEngine, FlowEvent, FlowState};
use futures::future::join_all;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::completion::CompletionOracle;
use crate::guardrails::{LoopDecision, LoopGuard, LoopGuardPolicy};
use crate::llm::{LlmClient, ToolSchema};
use crate::prompts::directive_for;
use crate::runtime::AgentError;
use crate::tools::{render_tool_content, ToolRegistry};

#[derive(Clone, Debug, PartialEq)]
pub struct LoopOutcome {
    pub state: ConversationState,
    /// Guard reason code when the run was stopped early.
    pub halted: Option<&'static str>,
    pub assistant_turns: u32,
    pub tool_invocations: usize,
}

/// Guard verdict that `ResolveOutstandingCalls` and `EmitFinalReply` act on.
struct Stop {
    reason_code: &'static str,
    user_message: String,
    detail: String,
}

struct LoopRun {
    state: ConversationState,
    guard: LoopGuard,
    assistant_turns: u32,
    tool_invocations: usize,
    stop: Option<Stop>,
}

pub struct DomainLoop {
    domain: Domain,
    directive: SystemDirective,
    registry: ToolRegistry,
    oracle: Arc<dyn CompletionOracle>,
    llm: Arc<dyn LlmClient>,
    guard: LoopGuardPolicy,
    parallel_tool_calls: bool,
    engine: FlowEngine<DomainLoopFlow>,
    audit_sink: Arc<dyn AuditSink>,
}

impl DomainLoop {
    pub fn new(
        domain: Domain,
        llm: Arc<dyn LlmClient>,
        registry: ToolRegistry,
        oracle: Arc<dyn CompletionOracle>,
    ) -> Self {
        Self {
            domain,
            directive: directive_for(domain),
            registry,
            oracle,
            llm,
            guard: LoopGuardPolicy::default(),
            parallel_tool_calls: true,
            engine: FlowEngine::new(DomainLoopFlow::new(domain)),
            audit_sink: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_guard(mut self, guard: LoopGuardPolicy) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = sink;
        self
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Runs the cycle until the assistant answers without tool calls or the
    /// guard stops it.
    pub async fn run(
        &self,
        state: ConversationState,
        audit: &AuditContext,
    ) -> Result<LoopOutcome, AgentError> {
        check_tool_pairing(&state.history)?;

        let audit = audit.for_domain(self.domain);
        let schemas = self.registry.schemas();
        let flow = self.engine.flow();
        let mut flow_state = flow.entry_state(!state.pending_tool_calls().is_empty());
        let mut actions: VecDeque<FlowAction> = flow.entry_actions(flow_state).into();
        let mut run = LoopRun {
            state,
            guard: self.guard.start(),
            assistant_turns: 0,
            tool_invocations: 0,
            stop: None,
        };

        while let Some(action) = actions.pop_front() {
            let Some((event, context)) = self.perform(action, &mut run, &schemas, &audit).await? else {
                continue;
            };
            let outcome = self.engine.apply_with_audit(
                &flow_state,
                &event,
                &context,
                self.audit_sink.as_ref(),
                &audit,
            )?;
            flow_state = outcome.to;
            actions.extend(outcome.actions);
        }

        if !flow_state.is_terminal() {
            return Err(DomainError::InvariantViolation(format!(
                "domain loop ran out of work in state {flow_state:?}"
            ))
            .into());
        }

        Ok(LoopOutcome {
            state: run.state,
            halted: run.stop.map(|stop| stop.reason_code),
            assistant_turns: run.assistant_turns,
            tool_invocations: run.tool_invocations,
        })
    }

    /// Carries out one action. Returns the event to feed back into the flow
    /// table, if the action produced one.
    async fn perform(
        &self,
        action: FlowAction,
        run: &mut LoopRun,
        schemas: &[ToolSchema],
        audit: &AuditContext,
    ) -> Result<Option<(FlowEvent, FlowContext)>, AgentError> {
        match action {
            FlowAction::InvokeGenerator => {
                if let LoopDecision::Halt { reason_code, user_message, detail } =
                    run.guard.before_turn(run.assistant_turns)
                {
                    return Ok(Some(self.stop(run, Stop { reason_code, user_message, detail }, audit)));
                }

                let reply = self.generate(&run.state, schemas, audit).await?;
                run.assistant_turns += 1;
                let pending = reply.pending_tool_calls().len();
                info!(
                    event_name = "loop.assistant_turn",
                    domain = %self.domain,
                    correlation_id = %audit.correlation_id,
                    turn = run.assistant_turns,
                    tool_calls = pending,
                    "assistant replied"
                );
                run.state.push(reply);
                Ok(Some((FlowEvent::AssistantReplied { pending_tool_calls: pending }, FlowContext::default())))
            }
            FlowAction::EvaluateSlots => {
                self.evaluate_slots(&mut run.state).await;
                Ok(None)
            }
            FlowAction::DispatchToolCalls => {
                let pending = run.state.pending_tool_calls().len();
                if pending == 0 {
                    return Ok(Some((FlowEvent::NothingPending, FlowContext::default())));
                }
                if let LoopDecision::Halt { reason_code, user_message, detail } =
                    run.guard.observe_batch(run.state.pending_tool_calls())
                {
                    return Ok(Some(self.stop(run, Stop { reason_code, user_message, detail }, audit)));
                }

                let results = self.tool_execution_step(&run.state, audit).await;
                let appended = results.len();
                run.tool_invocations += appended;
                run.state.history.extend(results);
                Ok(Some((
                    FlowEvent::ToolResultsAppended { results: appended },
                    FlowContext::with_pending_tool_calls(pending),
                )))
            }
            FlowAction::ResolveOutstandingCalls => {
                let detail = run.stop.as_ref().map(|stop| stop.detail.as_str()).unwrap_or("loop stopped");
                let results: Vec<_> = run
                    .state
                    .pending_tool_calls()
                    .iter()
                    .map(|call| {
                        let content = json!({"error": format!("not executed: {detail}")});
                        Message::tool_result(call.id.clone(), content.to_string())
                    })
                    .collect();
                run.state.history.extend(results);
                Ok(None)
            }
            FlowAction::EmitFinalReply => {
                if let Some(stop) = &run.stop {
                    run.state.push(Message::assistant(stop.user_message.clone()));
                }
                debug!(
                    domain = %self.domain,
                    correlation_id = %audit.correlation_id,
                    slots_complete = run.state.slots_complete,
                    "final reply ready"
                );
                Ok(None)
            }
            FlowAction::RequestClarification | FlowAction::DelegateToDomain(_) => {
                Err(DomainError::InvariantViolation(format!("{action:?} is not a domain loop action")).into())
            }
        }
    }

    /// Invokes every pending call of the latest assistant turn and returns one
    /// `ToolResult` per call, in request order. Returns nothing when the latest
    /// message carries no calls.
    pub async fn tool_execution_step(
        &self,
        state: &ConversationState,
        audit: &AuditContext,
    ) -> Vec<Message> {
        let calls = state.pending_tool_calls();
        if calls.is_empty() {
            return Vec::new();
        }

        if self.parallel_tool_calls {
            join_all(calls.iter().map(|call| self.invoke(call, audit))).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.invoke(call, audit).await);
            }
            results
        }
    }

    async fn generate(
        &self,
        state: &ConversationState,
        schemas: &[ToolSchema],
        audit: &AuditContext,
    ) -> Result<Message, AgentError> {
        match self.llm.generate(&self.directive, &state.history, schemas).await {
            Ok(reply) => {
                self.audit_sink.emit(
                    AuditEvent::new(audit, "llm.generate", AuditCategory::Generation, AuditOutcome::Success)
                        .with_metadata("tool_calls", reply.pending_tool_calls().len().to_string()),
                );
                Ok(reply)
            }
            Err(error) => {
                self.audit_sink.emit(
                    AuditEvent::new(audit, "llm.generate", AuditCategory::Generation, AuditOutcome::Failed)
                        .with_metadata("error", error.to_string()),
                );
                Err(error.into())
            }
        }
    }

    async fn invoke(&self, call: &ToolCallRequest, audit: &AuditContext) -> Message {
        let known = self.registry.get(&call.name).is_some();
        let value = self.registry.invoke(&call.name, call.arguments.clone()).await;
        info!(
            event_name = "loop.tool_invoked",
            domain = %self.domain,
            correlation_id = %audit.correlation_id,
            tool = %call.name,
            tool_call_id = %call.id,
            "tool call answered"
        );

        let outcome = if !known {
            AuditOutcome::Rejected
        } else if value.get("error").is_some() {
            AuditOutcome::Failed
        } else {
            AuditOutcome::Success
        };
        self.audit_sink.emit(
            AuditEvent::new(audit, "loop.tool_invoked", AuditCategory::Tool, outcome)
                .with_metadata("tool", call.name.clone())
                .with_metadata("tool_call_id", call.id.clone()),
        );

        Message::tool_result(call.id.clone(), render_tool_content(&value))
    }

    async fn evaluate_slots(&self, state: &mut ConversationState) {
        match self.oracle.is_complete(&state.history).await {
            Ok(complete) => {
                debug!(
                    domain = %self.domain,
                    strategy = self.oracle.strategy().as_str(),
                    complete,
                    "slot completion evaluated"
                );
                state.slots_complete |= complete;
            }
            Err(error) => {
                warn!(
                    domain = %self.domain,
                    strategy = self.oracle.strategy().as_str(),
                    error = %error,
                    "slot completion check failed; keeping previous value"
                );
            }
        }
    }

    fn stop(&self, run: &mut LoopRun, stop: Stop, audit: &AuditContext) -> (FlowEvent, FlowContext) {
        warn!(
            event_name = "loop.guard_halted",
            domain = %self.domain,
            correlation_id = %audit.correlation_id,
            reason = stop.reason_code,
            detail = %stop.detail,
            unresolved_calls = run.state.pending_tool_calls().len(),
            "domain loop stopped by guard"
        );

        run.stop = Some(stop);
        (FlowEvent::GuardHalted, FlowContext::default())
    }
}
