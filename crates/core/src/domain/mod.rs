pub mod conversation;

pub use conversation::{
    check_tool_pairing, user_text, ConversationState, Domain, Intent, Message, SystemDirective,
    ToolCallRequest, UNKNOWN_TOOL_CALL_ID, UNKNOWN_TOOL_NAME,
};
