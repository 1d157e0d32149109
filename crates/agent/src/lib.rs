//! Agent runtime for the rental and sales assistants.
//!
//! A user turn flows through a fixed pipeline:
//! 1. **Routing** (`router`) - keyword intent classification, clarification when ambiguous
//! 2. **Domain loop** (`domain_loop`) - Assistant / Tool-Execution cycle per domain
//! 3. **Tools** (`tools`) - HTTP-backed registries for the rental and sales backends
//! 4. **Slot completion** (`completion`) - keyword or model-judged checklist
//!
//! # Key Types
//!
//! - `AgentRuntime` - wires config, model client and registries (see `runtime`)
//! - `LlmClient` - pluggable text-generation backend (`OpenAiClient`, `ScriptedLlmClient`)
//! - `LoopGuard` - iteration cap and repeated-batch detection
//!
//! The model only writes replies and requests tool calls. Routing, tool dispatch
//! and termination follow the actions emitted by the flow tables in `carline_core::flows`.

pub mod catalog;
pub mod completion;
pub mod domain_loop;
pub mod guardrails;
pub mod intent;
pub mod llm;
pub mod openai;
pub mod prompts;
pub mod router;
pub mod runtime;
pub mod testing;
pub mod tools;

pub use domain_loop::{DomainLoop, LoopOutcome};
pub use router::{MasterRouter, RouteOutcome};
pub use runtime::{AgentError, AgentRuntime};
