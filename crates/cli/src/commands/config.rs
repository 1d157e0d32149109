use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use carline_core::config::{AppConfig, ConfigOverrides};
use toml::Value;

use super::ConfigSelection;

/// Renders the effective configuration, one line per field with where it came from.
pub fn run(selection: &ConfigSelection) -> String {
    let config = match selection.load() {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = selection.path.clone().or_else(detect_config_path);
    let file_doc = load_config_file_doc(file_path.as_deref());
    let sources = SourceLookup {
        overrides: &selection.overrides,
        file_doc: file_doc.as_ref(),
        file_path: file_path.as_deref(),
    };

    let mut lines = vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for (key, value) in rendered_fields(&config) {
        lines.push(render_line(key, &value, sources.field_source(key)));
    }
    lines.join("\n")
}

fn rendered_fields(config: &AppConfig) -> Vec<(&'static str, String)> {
    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };

    vec![
        ("llm.provider", config.llm.provider.as_str().to_string()),
        ("llm.model", config.llm.model.clone()),
        ("llm.base_url", config.llm.effective_base_url()),
        ("llm.api_key", api_key.to_string()),
        ("llm.temperature", config.llm.temperature.to_string()),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string()),
        (
            "llm.max_tokens",
            config.llm.max_tokens.map(|tokens| tokens.to_string()).unwrap_or_else(|| "<unset>".to_string()),
        ),
        ("rental.api_base_url", config.rental.api_base_url.clone()),
        ("rental.site_base_url", config.rental.site_base_url.clone()),
        ("rental.agreement", config.rental.agreement.clone()),
        ("rental.product", config.rental.product.to_string()),
        ("rental.timeout_secs", config.rental.timeout_secs.to_string()),
        ("sales.api_base_url", config.sales.api_base_url.clone()),
        ("sales.leasing_base_url", config.sales.leasing_base_url.clone()),
        ("sales.timeout_secs", config.sales.timeout_secs.to_string()),
        ("agent.max_loop_iterations", config.agent.max_loop_iterations.to_string()),
        ("agent.max_repeated_tool_batches", config.agent.max_repeated_tool_batches.to_string()),
        ("agent.parallel_tool_calls", config.agent.parallel_tool_calls.to_string()),
        ("agent.rental_completion", config.agent.rental_completion.as_str().to_string()),
        ("agent.sales_completion", config.agent.sales_completion.as_str().to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", config.logging.format.as_str().to_string()),
    ]
}

struct SourceLookup<'a> {
    overrides: &'a ConfigOverrides,
    file_doc: Option<&'a Value>,
    file_path: Option<&'a Path>,
}

impl SourceLookup<'_> {
    fn field_source(&self, key_path: &str) -> String {
        if flag_sets(self.overrides, key_path) {
            return "flag".to_string();
        }

        for env_key in env_keys(key_path) {
            if env::var_os(&env_key).is_some() {
                return format!("env ({env_key})");
            }
        }

        if let Some(doc) = self.file_doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .file_path
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn flag_sets(overrides: &ConfigOverrides, key_path: &str) -> bool {
    match key_path {
        "logging.level" => overrides.log_level.is_some(),
        "llm.provider" => overrides.llm_provider.is_some(),
        "llm.model" => overrides.llm_model.is_some(),
        "llm.api_key" => overrides.llm_api_key.is_some(),
        "llm.base_url" => overrides.llm_base_url.is_some(),
        "agent.max_loop_iterations" => overrides.max_loop_iterations.is_some(),
        _ => false,
    }
}

/// `llm.api_key` -> `CARLINE_LLM_API_KEY`, plus the short logging aliases.
fn env_keys(key_path: &str) -> Vec<String> {
    let primary = format!("CARLINE_{}", key_path.replace('.', "_").to_ascii_uppercase());
    match key_path {
        "logging.level" => vec![primary, "CARLINE_LOG_LEVEL".to_string()],
        "logging.format" => vec![primary, "CARLINE_LOG_FORMAT".to_string()],
        _ => vec![primary],
    }
}

fn detect_config_path() -> Option<PathBuf> {
    ["carline.toml", "config/carline.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
