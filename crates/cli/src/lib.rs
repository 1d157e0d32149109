pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use carline_agent::AgentRuntime;
use carline_core::config::{ConfigOverrides, LlmProvider};
use clap::{Parser, Subcommand};

use crate::commands::{config_failure, CommandResult, ConfigSelection};

#[derive(Debug, Parser)]
#[command(
    name = "carline",
    about = "Carline rental and sales assistant",
    long_about = "Chat with the vehicle rental and sales assistants, inspect configuration and list backend tools.",
    after_help = "Examples:\n  carline chat\n  carline chat --message \"אני רוצה להשכיר רכב לשבוע\"\n  carline classify \"רוצה לקנות רכב\"\n  carline tools --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a carline.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive conversation, or answer a single --message")]
    Chat {
        #[arg(long, help = "Process one message and exit")]
        message: Option<String>,
        #[arg(long, help = "Override llm.provider (openai|ollama)")]
        provider: Option<LlmProvider>,
        #[arg(long, help = "Override llm.model")]
        model: Option<String>,
        #[arg(long, help = "Override agent.max_loop_iterations")]
        max_iterations: Option<u32>,
    },
    #[command(about = "Show which assistant a message would be routed to (offline)")]
    Classify { text: String },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "List the tools available to each assistant")]
    Tools {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();
    let mut selection = ConfigSelection {
        path: cli.config,
        overrides: ConfigOverrides { log_level: cli.log_level, ..ConfigOverrides::default() },
    };

    let result = match cli.command {
        Command::Chat { message, provider, model, max_iterations } => {
            selection.overrides.llm_provider = provider;
            selection.overrides.llm_model = model;
            selection.overrides.max_loop_iterations = max_iterations;
            chat(&selection, message.as_deref()).await
        }
        Command::Classify { text } => commands::classify::run(&text),
        Command::Config => CommandResult::plain(commands::config::run(&selection)),
        Command::Tools { json } => commands::tools::run(&selection, json),
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}

async fn chat(selection: &ConfigSelection, message: Option<&str>) -> CommandResult {
    let config = match selection.load() {
        Ok(config) => config,
        Err(error) => return config_failure("chat", &error),
    };
    logging::init(&config);

    let runtime = match AgentRuntime::from_config(&config) {
        Ok(runtime) => runtime.with_actor("carline-cli"),
        Err(error) => return CommandResult::failure("chat", "runtime_init", error.to_string(), 2),
    };

    let outcome = match message {
        Some(message) => commands::chat::once(&runtime, message, &mut std::io::stdout()).await,
        None => commands::chat::run(&runtime).await,
    };

    match outcome {
        Ok(_) => CommandResult::plain(String::new()),
        Err(error) => CommandResult::failure("chat", "conversation", format!("{error:#}"), 1),
    }
}
