use carline_core::config::AgentConfig;
use carline_core::domain::ToolCallRequest;
use serde_json::Value;

use crate::prompts::GUARD_HALT_REPLY;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopDecision {
    Continue,
    Halt { reason_code: &'static str, user_message: String, detail: String },
}

impl LoopDecision {
    fn halt(reason_code: &'static str, detail: String) -> Self {
        Self::Halt { reason_code, user_message: GUARD_HALT_REPLY.to_string(), detail }
    }

    pub fn is_halt(&self) -> bool {
        matches!(self, Self::Halt { .. })
    }
}

/// Limits for one domain loop run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopGuardPolicy {
    pub max_iterations: u32,
    pub max_repeated_batches: u32,
}

impl Default for LoopGuardPolicy {
    fn default() -> Self {
        Self { max_iterations: 8, max_repeated_batches: 2 }
    }
}

impl From<&AgentConfig> for LoopGuardPolicy {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_iterations: config.max_loop_iterations,
            max_repeated_batches: config.max_repeated_tool_batches,
        }
    }
}

impl LoopGuardPolicy {
    pub fn start(self) -> LoopGuard {
        LoopGuard { policy: self, last_batch: None, consecutive: 0 }
    }
}

/// Per-run tracker. One instance per `DomainLoop::run`.
#[derive(Clone, Debug)]
pub struct LoopGuard {
    policy: LoopGuardPolicy,
    last_batch: Option<Vec<(String, Value)>>,
    consecutive: u32,
}

impl LoopGuard {
    /// Checked before each assistant turn with the number of turns already taken.
    pub fn before_turn(&self, completed_turns: u32) -> LoopDecision {
        if completed_turns >= self.policy.max_iterations {
            return LoopDecision::halt(
                "iteration_cap",
                format!("assistant turn limit of {} reached", self.policy.max_iterations),
            );
        }
        LoopDecision::Continue
    }

    /// Records a requested tool batch; halts when the same batch (names and
    /// arguments) comes back too many times in a row.
    pub fn observe_batch(&mut self, calls: &[ToolCallRequest]) -> LoopDecision {
        let batch: Vec<(String, Value)> =
            calls.iter().map(|call| (call.name.clone(), call.arguments.clone())).collect();

        if self.last_batch.as_ref() == Some(&batch) {
            self.consecutive += 1;
        } else {
            self.last_batch = Some(batch);
            self.consecutive = 1;
        }

        if self.consecutive > self.policy.max_repeated_batches {
            return LoopDecision::halt(
                "repeated_tool_batch",
                format!("same tool batch requested {} times in a row", self.consecutive),
            );
        }
        LoopDecision::Continue
    }
}

#[cfg(test)]
mod tests {
    use carline_core::domain::ToolCallRequest;
    use serde_json::json;

    use super::{LoopDecision, LoopGuardPolicy};
    use crate::prompts::GUARD_HALT_REPLY;

    fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCallRequest {
        ToolCallRequest::new(id, name, arguments)
    }

    #[test]
    fn iteration_cap_halts_at_limit() {
        let guard = LoopGuardPolicy { max_iterations: 3, max_repeated_batches: 2 }.start();
        assert_eq!(guard.before_turn(2), LoopDecision::Continue);

        let decision = guard.before_turn(3);
        let (reason_code, user_message) = match decision {
            LoopDecision::Halt { reason_code, user_message, .. } => (reason_code, user_message),
            LoopDecision::Continue => ("", String::new()),
        };
        assert_eq!(reason_code, "iteration_cap");
        assert_eq!(user_message, GUARD_HALT_REPLY);
    }

    #[test]
    fn identical_batches_halt_after_allowed_repeats() {
        let mut guard = LoopGuardPolicy::default().start();
        let batch = [call("a", "get_branches", json!({}))];

        assert_eq!(guard.observe_batch(&batch), LoopDecision::Continue);
        // Ids differ between turns; only names and arguments count.
        assert_eq!(guard.observe_batch(&[call("b", "get_branches", json!({}))]), LoopDecision::Continue);

        let decision = guard.observe_batch(&[call("c", "get_branches", json!({}))]);
        assert!(matches!(decision, LoopDecision::Halt { reason_code: "repeated_tool_batch", .. }));
    }

    #[test]
    fn a_different_batch_resets_the_streak() {
        let mut guard = LoopGuardPolicy { max_iterations: 8, max_repeated_batches: 1 }.start();
        let first = [call("a", "get_zero_km_car_details", json!({"car_id": "1"}))];
        let second = [call("b", "get_zero_km_car_details", json!({"car_id": "2"}))];

        assert!(!guard.observe_batch(&first).is_halt());
        assert!(!guard.observe_batch(&second).is_halt());
        assert!(!guard.observe_batch(&first).is_halt());
        assert!(guard.observe_batch(&first).is_halt());
    }
}
