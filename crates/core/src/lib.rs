pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::conversation::{
    ConversationState, Domain, Intent, Message, SystemDirective, ToolCallRequest,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
