pub mod chat;
pub mod classify;
pub mod config;
pub mod tools;

use std::path::PathBuf;

use carline_core::config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn plain(output: impl Into<String>) -> Self {
        Self { exit_code: 0, output: output.into() }
    }
}

/// Config source shared by every command.
#[derive(Clone, Debug, Default)]
pub struct ConfigSelection {
    pub path: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

impl ConfigSelection {
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        AppConfig::load(LoadOptions {
            config_path: self.path.clone(),
            require_file: self.path.is_some(),
            overrides: self.overrides.clone(),
        })
    }
}

pub(crate) fn config_failure(command: &str, error: &ConfigError) -> CommandResult {
    CommandResult::failure(command, "config_validation", error.to_string(), 2)
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
