use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub rental: RentalConfig,
    pub sales: SalesConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_tokens: Option<u32>,
}

impl LlmConfig {
    /// Base URL of the OpenAI-compatible endpoint, falling back to the provider default.
    pub fn effective_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => self.provider.default_base_url().to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RentalConfig {
    pub api_base_url: String,
    pub site_base_url: String,
    pub agreement: String,
    pub product: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SalesConfig {
    pub api_base_url: String,
    pub leasing_base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_loop_iterations: u32,
    pub max_repeated_tool_batches: u32,
    pub parallel_tool_calls: bool,
    pub rental_completion: CompletionStrategy,
    pub sales_completion: CompletionStrategy,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStrategy {
    Keyword,
    Semantic,
}

impl CompletionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Semantic => "semantic",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub max_loop_iterations: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: None,
                model: "gpt-4o".to_string(),
                temperature: 0.1,
                timeout_secs: 60,
                max_tokens: None,
            },
            rental: RentalConfig {
                api_base_url: "https://backend-prod.shlomo.co.il".to_string(),
                site_base_url: "https://www.shlomo.co.il".to_string(),
                agreement: "121845".to_string(),
                product: 9807,
                timeout_secs: 30,
            },
            sales: SalesConfig {
                api_base_url: "https://sales-backend-prod.shlomo.co.il".to_string(),
                leasing_base_url: "https://shlomo-leasing-backend-prod.shlomo.co.il".to_string(),
                timeout_secs: 30,
            },
            agent: AgentConfig {
                max_loop_iterations: 8,
                max_repeated_tool_batches: 2,
                parallel_tool_calls: true,
                rental_completion: CompletionStrategy::Semantic,
                sales_completion: CompletionStrategy::Keyword,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for CompletionStrategy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "semantic" => Ok(Self::Semantic),
            other => Err(ConfigError::Validation(format!(
                "unsupported completion strategy `{other}` (expected keyword|semantic)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("carline.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = Some(max_tokens);
            }
        }

        if let Some(rental) = patch.rental {
            if let Some(api_base_url) = rental.api_base_url {
                self.rental.api_base_url = api_base_url;
            }
            if let Some(site_base_url) = rental.site_base_url {
                self.rental.site_base_url = site_base_url;
            }
            if let Some(agreement) = rental.agreement {
                self.rental.agreement = agreement;
            }
            if let Some(product) = rental.product {
                self.rental.product = product;
            }
            if let Some(timeout_secs) = rental.timeout_secs {
                self.rental.timeout_secs = timeout_secs;
            }
        }

        if let Some(sales) = patch.sales {
            if let Some(api_base_url) = sales.api_base_url {
                self.sales.api_base_url = api_base_url;
            }
            if let Some(leasing_base_url) = sales.leasing_base_url {
                self.sales.leasing_base_url = leasing_base_url;
            }
            if let Some(timeout_secs) = sales.timeout_secs {
                self.sales.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_loop_iterations) = agent.max_loop_iterations {
                self.agent.max_loop_iterations = max_loop_iterations;
            }
            if let Some(max_repeated_tool_batches) = agent.max_repeated_tool_batches {
                self.agent.max_repeated_tool_batches = max_repeated_tool_batches;
            }
            if let Some(parallel_tool_calls) = agent.parallel_tool_calls {
                self.agent.parallel_tool_calls = parallel_tool_calls;
            }
            if let Some(rental_completion) = agent.rental_completion {
                self.agent.rental_completion = rental_completion;
            }
            if let Some(sales_completion) = agent.sales_completion {
                self.agent.sales_completion = sales_completion;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CARLINE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("CARLINE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CARLINE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("CARLINE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("CARLINE_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("CARLINE_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("CARLINE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("CARLINE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CARLINE_LLM_MAX_TOKENS") {
            self.llm.max_tokens = Some(parse_u32("CARLINE_LLM_MAX_TOKENS", &value)?);
        }

        if let Some(value) = read_env("CARLINE_RENTAL_API_BASE_URL") {
            self.rental.api_base_url = value;
        }
        if let Some(value) = read_env("CARLINE_RENTAL_SITE_BASE_URL") {
            self.rental.site_base_url = value;
        }
        if let Some(value) = read_env("CARLINE_RENTAL_AGREEMENT") {
            self.rental.agreement = value;
        }
        if let Some(value) = read_env("CARLINE_RENTAL_PRODUCT") {
            self.rental.product = parse_u32("CARLINE_RENTAL_PRODUCT", &value)?;
        }
        if let Some(value) = read_env("CARLINE_RENTAL_TIMEOUT_SECS") {
            self.rental.timeout_secs = parse_u64("CARLINE_RENTAL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CARLINE_SALES_API_BASE_URL") {
            self.sales.api_base_url = value;
        }
        if let Some(value) = read_env("CARLINE_SALES_LEASING_BASE_URL") {
            self.sales.leasing_base_url = value;
        }
        if let Some(value) = read_env("CARLINE_SALES_TIMEOUT_SECS") {
            self.sales.timeout_secs = parse_u64("CARLINE_SALES_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CARLINE_AGENT_MAX_LOOP_ITERATIONS") {
            self.agent.max_loop_iterations =
                parse_u32("CARLINE_AGENT_MAX_LOOP_ITERATIONS", &value)?;
        }
        if let Some(value) = read_env("CARLINE_AGENT_MAX_REPEATED_TOOL_BATCHES") {
            self.agent.max_repeated_tool_batches =
                parse_u32("CARLINE_AGENT_MAX_REPEATED_TOOL_BATCHES", &value)?;
        }
        if let Some(value) = read_env("CARLINE_AGENT_PARALLEL_TOOL_CALLS") {
            self.agent.parallel_tool_calls =
                parse_bool("CARLINE_AGENT_PARALLEL_TOOL_CALLS", &value)?;
        }
        if let Some(value) = read_env("CARLINE_AGENT_RENTAL_COMPLETION") {
            self.agent.rental_completion = value.parse()?;
        }
        if let Some(value) = read_env("CARLINE_AGENT_SALES_COMPLETION") {
            self.agent.sales_completion = value.parse()?;
        }

        let log_level =
            read_env("CARLINE_LOGGING_LEVEL").or_else(|| read_env("CARLINE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CARLINE_LOGGING_FORMAT").or_else(|| read_env("CARLINE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(max_loop_iterations) = overrides.max_loop_iterations {
            self.agent.max_loop_iterations = max_loop_iterations;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_rental(&self.rental)?;
        validate_sales(&self.sales)?;
        validate_agent(&self.agent)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("carline.toml"), PathBuf::from("config/carline.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    validate_timeout("llm.timeout_secs", llm.timeout_secs)?;

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if let Some(base_url) = &llm.base_url {
        validate_http_url("llm.base_url", base_url)?;
    }

    if llm.provider == LlmProvider::OpenAi {
        let missing = llm
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "llm.api_key is required for the openai provider (set CARLINE_LLM_API_KEY)"
                    .to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_rental(rental: &RentalConfig) -> Result<(), ConfigError> {
    validate_http_url("rental.api_base_url", &rental.api_base_url)?;
    validate_http_url("rental.site_base_url", &rental.site_base_url)?;
    validate_timeout("rental.timeout_secs", rental.timeout_secs)?;

    if rental.agreement.trim().is_empty() {
        return Err(ConfigError::Validation("rental.agreement must not be empty".to_string()));
    }

    Ok(())
}

fn validate_sales(sales: &SalesConfig) -> Result<(), ConfigError> {
    validate_http_url("sales.api_base_url", &sales.api_base_url)?;
    validate_http_url("sales.leasing_base_url", &sales.leasing_base_url)?;
    validate_timeout("sales.timeout_secs", sales.timeout_secs)
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_loop_iterations == 0 {
        return Err(ConfigError::Validation(
            "agent.max_loop_iterations must be greater than zero".to_string(),
        ));
    }

    if agent.max_repeated_tool_batches == 0 {
        return Err(ConfigError::Validation(
            "agent.max_repeated_tool_batches must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn validate_timeout(key: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 || value > 300 {
        return Err(ConfigError::Validation(format!("{key} must be in range 1..=300")));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    rental: Option<RentalPatch>,
    sales: Option<SalesPatch>,
    agent: Option<AgentPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RentalPatch {
    api_base_url: Option<String>,
    site_base_url: Option<String>,
    agreement: Option<String>,
    product: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SalesPatch {
    api_base_url: Option<String>,
    leasing_base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_loop_iterations: Option<u32>,
    max_repeated_tool_batches: Option<u32>,
    parallel_tool_calls: Option<bool>,
    rental_completion: Option<CompletionStrategy>,
    sales_completion: Option<CompletionStrategy>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, CompletionStrategy, ConfigError, ConfigOverrides, LlmProvider, LoadOptions,
        LogFormat,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_match_production_endpoints() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        env::set_var("CARLINE_LLM_API_KEY", "sk-test");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.model == "gpt-4o", "default model should be gpt-4o")?;
            ensure(
                config.llm.effective_base_url() == "https://api.openai.com/v1",
                "openai base url should be the default",
            )?;
            ensure(config.rental.agreement == "121845", "rental agreement default")?;
            ensure(config.rental.product == 9807, "rental product default")?;
            ensure(config.agent.max_loop_iterations == 8, "loop cap default")?;
            ensure(
                config.agent.rental_completion == CompletionStrategy::Semantic
                    && config.agent.sales_completion == CompletionStrategy::Keyword,
                "completion strategies default to semantic rental and keyword sales",
            )?;
            Ok(())
        })();

        clear_vars(&["CARLINE_LLM_API_KEY"]);
        result
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_CARLINE_OPENAI_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("carline.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "openai"
api_key = "${TEST_CARLINE_OPENAI_KEY}"

[agent]
rental_completion = "keyword"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be interpolated from environment",
            )?;
            ensure(
                config.agent.rental_completion == CompletionStrategy::Keyword,
                "file should override completion strategy",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_CARLINE_OPENAI_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CARLINE_LLM_PROVIDER", "ollama");
        env::set_var("CARLINE_LOG_LEVEL", "warn");
        env::set_var("CARLINE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            ensure(
                config.llm.effective_base_url() == "http://localhost:11434/v1",
                "ollama runs without api key against the local endpoint",
            )?;
            Ok(())
        })();

        clear_vars(&["CARLINE_LLM_PROVIDER", "CARLINE_LOG_LEVEL", "CARLINE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CARLINE_LLM_MODEL", "gpt-4o-mini");
        env::set_var("CARLINE_RENTAL_TIMEOUT_SECS", "12");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("carline.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "ollama"
model = "llama3.1"

[rental]
timeout_secs = 45
api_base_url = "http://127.0.0.1:9000"

[agent]
max_loop_iterations = 5

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    max_loop_iterations: Some(3),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::Ollama, "file provider should apply")?;
            ensure(config.llm.model == "gpt-4o-mini", "env model should win over file")?;
            ensure(config.rental.timeout_secs == 12, "env timeout should win over file")?;
            ensure(
                config.rental.api_base_url == "http://127.0.0.1:9000",
                "file base url should win over defaults",
            )?;
            ensure(config.agent.max_loop_iterations == 3, "override should win over file")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(&["CARLINE_LLM_MODEL", "CARLINE_RENTAL_TIMEOUT_SECS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    llm_provider: Some(LlmProvider::OpenAi),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            }) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })()
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CARLINE_LLM_API_KEY", "sk-test");
        env::set_var("CARLINE_AGENT_MAX_LOOP_ITERATIONS", "many");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected env parse failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "CARLINE_AGENT_MAX_LOOP_ITERATIONS"
                ),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["CARLINE_LLM_API_KEY", "CARLINE_AGENT_MAX_LOOP_ITERATIONS"]);
        result
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("sk-test".to_string().into());
        assert!(config.validate().is_ok());

        config.llm.temperature = 2.5;
        assert!(
            matches!(config.validate(), Err(ConfigError::Validation(ref message)) if message.contains("temperature"))
        );

        config.llm.temperature = 0.1;
        config.sales.leasing_base_url = "ftp://leasing".to_string();
        assert!(
            matches!(config.validate(), Err(ConfigError::Validation(ref message)) if message.contains("sales.leasing_base_url"))
        );

        config.sales.leasing_base_url = "https://leasing.example".to_string();
        config.agent.max_loop_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CARLINE_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["CARLINE_LLM_API_KEY"]);
        result
    }
}
