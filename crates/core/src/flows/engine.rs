use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::{Domain, Intent};
use crate::flows::states::{
    FlowAction, FlowContext, FlowEvent, FlowState, FlowType, TransitionOutcome,
};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> FlowState;
    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Top-level routing: classify once, then either clarify or hand off.
#[derive(Clone, Debug, Default)]
pub struct MasterRouterFlow;

impl FlowDefinition for MasterRouterFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::MasterRouter
    }

    fn initial_state(&self) -> FlowState {
        FlowState::Routing
    }

    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        _context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_master_router(current, event)
    }
}

/// The Assistant / Tool-Execution cycle of one domain assistant.
#[derive(Clone, Debug)]
pub struct DomainLoopFlow {
    pub domain: Domain,
}

impl DomainLoopFlow {
    pub fn new(domain: Domain) -> Self {
        Self { domain }
    }

    /// A conversation that ends with unanswered tool calls resumes in tool execution.
    pub fn entry_state(&self, has_pending_calls: bool) -> FlowState {
        if has_pending_calls {
            FlowState::ToolExecution
        } else {
            self.initial_state()
        }
    }

    /// Work to perform on entry, before any event has been applied.
    pub fn entry_actions(&self, state: FlowState) -> Vec<FlowAction> {
        match state {
            FlowState::Assistant => vec![FlowAction::InvokeGenerator],
            FlowState::ToolExecution => vec![FlowAction::DispatchToolCalls],
            _ => Vec::new(),
        }
    }
}

impl FlowDefinition for DomainLoopFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::DomainLoop(self.domain)
    }

    fn initial_state(&self) -> FlowState {
        FlowState::Assistant
    }

    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_domain_loop(self.flow_type(), current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow(&self) -> &F {
        &self.flow
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_state(&self) -> FlowState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        let flow = format!("{:?}", self.flow_type());
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("flow", flow)
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("flow", flow)
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<MasterRouterFlow> {
    fn default() -> Self {
        Self::new(MasterRouterFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("{flow:?}: invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { flow: FlowType, state: FlowState, event: FlowEvent },
    #[error("{flow:?}: {actual} tool results appended for {expected} pending calls")]
    UnresolvedToolCalls { flow: FlowType, expected: usize, actual: usize },
}

fn transition_master_router(
    current: &FlowState,
    event: &FlowEvent,
) -> Result<TransitionOutcome, FlowTransitionError> {
    let (to, actions) = match (current, event) {
        (FlowState::Routing, FlowEvent::IntentClassified(intent)) => match intent.domain() {
            Some(domain) => {
                (FlowState::Delegated(domain), vec![FlowAction::DelegateToDomain(domain)])
            }
            None => (FlowState::Clarifying, vec![FlowAction::RequestClarification]),
        },
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                flow: FlowType::MasterRouter,
                state: *current,
                event: *event,
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event, actions })
}

fn transition_domain_loop(
    flow: FlowType,
    current: &FlowState,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        DispatchToolCalls, EmitFinalReply, EvaluateSlots, InvokeGenerator, ResolveOutstandingCalls,
    };
    use FlowEvent::{AssistantReplied, GuardHalted, NothingPending, ToolResultsAppended};
    use FlowState::{Assistant, Terminal, ToolExecution};

    let (to, actions) = match (current, event) {
        (Assistant, AssistantReplied { pending_tool_calls: 0 }) => {
            (Terminal, vec![EvaluateSlots, EmitFinalReply])
        }
        (Assistant, AssistantReplied { .. }) => (ToolExecution, vec![EvaluateSlots, DispatchToolCalls]),
        (ToolExecution, ToolResultsAppended { results }) => {
            if *results != context.pending_tool_calls {
                return Err(FlowTransitionError::UnresolvedToolCalls {
                    flow,
                    expected: context.pending_tool_calls,
                    actual: *results,
                });
            }
            (Assistant, vec![InvokeGenerator])
        }
        (ToolExecution, NothingPending) => (Terminal, Vec::new()),
        (Assistant, GuardHalted) => (Terminal, vec![EmitFinalReply]),
        (ToolExecution, GuardHalted) => (Terminal, vec![ResolveOutstandingCalls, EmitFinalReply]),
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                flow,
                state: *current,
                event: *event,
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event, actions })
}

/// Intent implied by a terminal router state.
pub fn routed_intent(state: &FlowState) -> Intent {
    match state {
        FlowState::Delegated(domain) => Intent::from(*domain),
        _ => Intent::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::{Domain, Intent};
    use crate::flows::engine::{
        routed_intent, DomainLoopFlow, FlowDefinition, FlowEngine, FlowTransitionError,
        MasterRouterFlow,
    };
    use crate::flows::states::{FlowAction, FlowContext, FlowEvent, FlowState, FlowType};

    #[test]
    fn router_delegates_resolved_intent() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(
                &engine.initial_state(),
                &FlowEvent::IntentClassified(Intent::Rental),
                &FlowContext::default(),
            )
            .expect("routing -> delegated");

        assert_eq!(outcome.to, FlowState::Delegated(Domain::Rental));
        assert_eq!(outcome.actions, vec![FlowAction::DelegateToDomain(Domain::Rental)]);
        assert!(outcome.to.is_terminal());
        assert_eq!(routed_intent(&outcome.to), Intent::Rental);
    }

    #[test]
    fn router_clarifies_unknown_intent_and_stops() {
        let engine = FlowEngine::new(MasterRouterFlow);
        let outcome = engine
            .apply(
                &FlowState::Routing,
                &FlowEvent::IntentClassified(Intent::Unknown),
                &FlowContext::default(),
            )
            .expect("routing -> clarifying");
        assert_eq!(outcome.to, FlowState::Clarifying);
        assert_eq!(routed_intent(&outcome.to), Intent::Unknown);

        let error = engine
            .apply(
                &outcome.to,
                &FlowEvent::IntentClassified(Intent::Sales),
                &FlowContext::default(),
            )
            .expect_err("clarifying is terminal");
        assert!(matches!(
            error,
            FlowTransitionError::InvalidTransition {
                flow: FlowType::MasterRouter,
                state: FlowState::Clarifying,
                ..
            }
        ));
    }

    #[test]
    fn domain_loop_cycles_through_tool_execution() {
        let engine = FlowEngine::new(DomainLoopFlow::new(Domain::Sales));
        assert_eq!(engine.flow_type(), FlowType::DomainLoop(Domain::Sales));

        let to_tools = engine
            .apply(
                &FlowState::Assistant,
                &FlowEvent::AssistantReplied { pending_tool_calls: 2 },
                &FlowContext::default(),
            )
            .expect("assistant -> tools");
        assert_eq!(to_tools.to, FlowState::ToolExecution);
        assert!(to_tools.actions.contains(&FlowAction::DispatchToolCalls));

        let back = engine
            .apply(
                &to_tools.to,
                &FlowEvent::ToolResultsAppended { results: 2 },
                &FlowContext::with_pending_tool_calls(2),
            )
            .expect("tools -> assistant");
        assert_eq!(back.to, FlowState::Assistant);
        assert_eq!(back.actions, vec![FlowAction::InvokeGenerator]);

        let done = engine
            .apply(
                &back.to,
                &FlowEvent::AssistantReplied { pending_tool_calls: 0 },
                &FlowContext::default(),
            )
            .expect("assistant -> terminal");
        assert_eq!(done.to, FlowState::Terminal);
        assert!(done.actions.contains(&FlowAction::EmitFinalReply));
    }

    #[test]
    fn partial_tool_results_are_rejected() {
        let engine = FlowEngine::new(DomainLoopFlow::new(Domain::Rental));
        let error = engine
            .apply(
                &FlowState::ToolExecution,
                &FlowEvent::ToolResultsAppended { results: 1 },
                &FlowContext::with_pending_tool_calls(3),
            )
            .expect_err("every call needs a result");

        assert_eq!(
            error,
            FlowTransitionError::UnresolvedToolCalls {
                flow: FlowType::DomainLoop(Domain::Rental),
                expected: 3,
                actual: 1,
            }
        );
    }

    #[test]
    fn tool_execution_without_pending_calls_terminates() {
        let flow = DomainLoopFlow::new(Domain::Rental);
        assert_eq!(flow.entry_state(false), FlowState::Assistant);
        assert_eq!(flow.entry_state(true), FlowState::ToolExecution);

        let outcome = FlowEngine::new(flow)
            .apply(&FlowState::ToolExecution, &FlowEvent::NothingPending, &FlowContext::default())
            .expect("degenerate entry");
        assert_eq!(outcome.to, FlowState::Terminal);
        assert!(outcome.actions.is_empty());
    }

    #[test]
    fn domain_loop_entry_depends_on_pending_calls() {
        let flow = DomainLoopFlow::new(Domain::Rental);

        let fresh = flow.entry_state(false);
        assert_eq!(fresh, FlowState::Assistant);
        assert_eq!(flow.entry_actions(fresh), vec![FlowAction::InvokeGenerator]);

        let resumed = flow.entry_state(true);
        assert_eq!(resumed, FlowState::ToolExecution);
        assert_eq!(flow.entry_actions(resumed), vec![FlowAction::DispatchToolCalls]);
        assert!(flow.entry_actions(FlowState::Terminal).is_empty());
    }

    #[test]
    fn guard_halt_from_tool_execution_resolves_outstanding_calls() {
        let engine = FlowEngine::new(DomainLoopFlow::new(Domain::Sales));
        let outcome = engine
            .apply(&FlowState::ToolExecution, &FlowEvent::GuardHalted, &FlowContext::default())
            .expect("halt");
        assert_eq!(outcome.to, FlowState::Terminal);
        assert_eq!(
            outcome.actions,
            vec![FlowAction::ResolveOutstandingCalls, FlowAction::EmitFinalReply]
        );

        let error = engine
            .apply(&FlowState::Terminal, &FlowEvent::GuardHalted, &FlowContext::default())
            .expect_err("terminal accepts nothing");
        assert!(matches!(error, FlowTransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn replay_is_deterministic_for_same_event_sequence() {
        let engine = FlowEngine::new(DomainLoopFlow::new(Domain::Rental));
        let events = [
            (FlowEvent::AssistantReplied { pending_tool_calls: 1 }, 0),
            (FlowEvent::ToolResultsAppended { results: 1 }, 1),
            (FlowEvent::AssistantReplied { pending_tool_calls: 0 }, 0),
        ];

        let run = |engine: &FlowEngine<DomainLoopFlow>| {
            let mut state = engine.initial_state();
            let mut actions = Vec::new();
            for (event, pending) in &events {
                let outcome = engine
                    .apply(&state, event, &FlowContext::with_pending_tool_calls(*pending))
                    .expect("deterministic run");
                actions.push(outcome.actions);
                state = outcome.to;
            }
            (state, actions)
        };

        let first = run(&engine);
        assert_eq!(first, run(&engine));
        assert_eq!(first.0, FlowState::Terminal);
        assert_eq!(MasterRouterFlow.flow_type(), FlowType::MasterRouter);
    }

    #[test]
    fn flow_transition_emits_audit_event() {
        let engine = FlowEngine::new(DomainLoopFlow::new(Domain::Rental));
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(Some(Domain::Rental), "req-42", "domain-loop");

        engine
            .apply_with_audit(
                &FlowState::Assistant,
                &FlowEvent::AssistantReplied { pending_tool_calls: 1 },
                &FlowContext::default(),
                &sink,
                &audit,
            )
            .expect("transition should succeed");
        let _ = engine.apply_with_audit(
            &FlowState::Terminal,
            &FlowEvent::NothingPending,
            &FlowContext::default(),
            &sink,
            &audit,
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].correlation_id, "req-42");
        assert_eq!(events[0].event_type, "flow.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("ToolExecution"));
        assert_eq!(events[1].event_type, "flow.transition_rejected");
    }
}
