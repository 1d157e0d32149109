use std::io::Write;

use anyhow::{Context, Result};
use carline_agent::AgentRuntime;
use carline_core::domain::ConversationState;
use carline_core::errors::ApplicationError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

const EXIT_WORDS: &[&str] = &["exit", "quit", "יציאה"];
const RESET_WORD: &str = "/reset";

/// One conversation on stdin/stdout until EOF or an exit word.
pub async fn run(runtime: &AgentRuntime) -> Result<ConversationState> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    writeln!(stdout, "שלום! אפשר להשכיר או לקנות רכב. ('exit' ליציאה, '/reset' לשיחה חדשה)")?;
    converse(runtime, stdin, &mut stdout).await
}

/// Answers a single message and prints the assistant's reply.
pub async fn once(runtime: &AgentRuntime, message: &str, output: &mut impl Write) -> Result<ConversationState> {
    let state = runtime
        .handle_user_message(ConversationState::new(), message)
        .await
        .context("could not process message")?;
    writeln!(output, "{}", state.final_reply().unwrap_or_default())?;
    Ok(state)
}

/// Reads user turns line by line. A failed turn is reported and the
/// conversation continues from the state before it.
pub async fn converse<R, W>(runtime: &AgentRuntime, input: R, output: &mut W) -> Result<ConversationState>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut state = ConversationState::new();
    let mut lines = input.lines();

    loop {
        write!(output, "> ")?;
        output.flush()?;

        let Some(line) = lines.next_line().await.context("could not read input")? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&text) {
            break;
        }
        if text == RESET_WORD {
            state = ConversationState::new();
            writeln!(output, "(new conversation)")?;
            continue;
        }

        match runtime.handle_user_message(state.clone(), text).await {
            Ok(next) => {
                state = next;
                writeln!(output, "{}", state.final_reply().unwrap_or_default())?;
            }
            Err(error) => {
                tracing::warn!(error = %error, "turn failed");
                let interface = ApplicationError::from(error).into_interface("cli");
                writeln!(output, "! {}", interface.user_message())?;
            }
        }
    }

    Ok(state)
}
