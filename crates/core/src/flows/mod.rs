pub mod engine;
pub mod states;

pub use engine::{
    routed_intent, DomainLoopFlow, FlowDefinition, FlowEngine, FlowTransitionError, MasterRouterFlow,
};
pub use states::{FlowAction, FlowContext, FlowEvent, FlowState, FlowType, TransitionOutcome};
