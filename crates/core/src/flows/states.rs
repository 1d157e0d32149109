use serde::{Deserialize, Serialize};

use crate::domain::{Domain, Intent};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    MasterRouter,
    DomainLoop(Domain),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowState {
    Routing,
    Clarifying,
    Delegated(Domain),
    Assistant,
    ToolExecution,
    Terminal,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Clarifying | Self::Delegated(_) | Self::Terminal)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    IntentClassified(Intent),
    AssistantReplied { pending_tool_calls: usize },
    ToolResultsAppended { results: usize },
    NothingPending,
    GuardHalted,
}

/// Facts about the conversation a transition may need to check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub pending_tool_calls: usize,
}

impl FlowContext {
    pub fn with_pending_tool_calls(pending_tool_calls: usize) -> Self {
        Self { pending_tool_calls }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    RequestClarification,
    DelegateToDomain(Domain),
    InvokeGenerator,
    EvaluateSlots,
    DispatchToolCalls,
    ResolveOutstandingCalls,
    EmitFinalReply,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: FlowState,
    pub to: FlowState,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}
