//! Project configuration for oaift.
//!
//! Each project keeps one `oaift.toml`. Everything the pipelines need to
//! resolve at runtime is parameterized here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default model for both generation and fine-tuning.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// File name of the per-project configuration.
pub const CONFIG_FILE: &str = "oaift.toml";

/// Top-level project configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Dataset generation settings
    pub generation: GenerationConfig,

    /// Fine-tuning job settings
    #[serde(default)]
    pub fine_tune: FineTuneConfig,

    /// External validator process
    #[serde(default)]
    pub validator: ValidatorConfig,
}

/// Remote API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API key (supports `${VAR}` expansion); prefer `api_key_env`
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Environment variable name for the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum attempts per request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// A template variable value: text or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Variable {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Integer(n) => write!(f, "{n}"),
            Variable::Float(n) => write!(f, "{n}"),
            Variable::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Variable {
    fn from(s: &str) -> Self {
        Variable::Text(s.to_string())
    }
}

/// Generation configuration.
///
/// Immutable once loaded; one generation run owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model used to synthesize conversations
    #[serde(default = "default_model")]
    pub model: String,

    /// System prompt, sent with every request and prepended to every record
    pub system: String,

    /// User prompt template with `{{name}}` placeholders
    pub template: String,

    /// Topics; each one is interpolated as `{{topic}}`
    pub topics: Vec<String>,

    /// Requests issued per topic
    #[serde(default = "default_count")]
    pub count: usize,

    /// Extra template variables
    #[serde(default)]
    pub variables: BTreeMap<String, Variable>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Requests dispatched concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_count() -> usize {
    1
}

fn default_temperature() -> f64 {
    0.5
}

fn default_batch_size() -> usize {
    3
}

/// Number of training epochs: `"auto"` or an explicit count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Epochs {
    #[default]
    Auto,
    Count(u32),
}

impl Serialize for Epochs {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Epochs::Auto => serializer.serialize_str("auto"),
            Epochs::Count(n) => serializer.serialize_u32(*n),
        }
    }
}

impl<'de> Deserialize<'de> for Epochs {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => Ok(Epochs::Count(n)),
            Raw::Text(s) if s == "auto" => Ok(Epochs::Auto),
            Raw::Text(s) => Err(serde::de::Error::custom(format!(
                "expected \"auto\" or an integer, got \"{s}\""
            ))),
        }
    }
}

/// Fine-tuning job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FineTuneConfig {
    /// Base model to fine-tune
    #[serde(default = "default_model")]
    pub base_model: String,

    /// Training epochs
    #[serde(default)]
    pub epochs: Epochs,

    /// Suffix for the fine-tuned model name (defaults to the namespace name)
    #[serde(default)]
    pub suffix: Option<String>,
}

impl Default for FineTuneConfig {
    fn default() -> Self {
        Self {
            base_model: default_model(),
            epochs: Epochs::Auto,
            suffix: None,
        }
    }
}

/// External validator process configuration.
///
/// Runs from the project directory, so the default `scripts/validate.py`
/// is the copy written by `oaift init`. The dataset path is appended as the
/// last argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_validator_command")]
    pub command: String,

    #[serde(default = "default_validator_args")]
    pub args: Vec<String>,

    #[serde(default = "default_validator_timeout")]
    pub timeout_secs: u64,
}

fn default_validator_command() -> String {
    "python3".to_string()
}

fn default_validator_args() -> Vec<String> {
    vec!["scripts/validate.py".to_string()]
}

fn default_validator_timeout() -> u64 {
    300
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            command: default_validator_command(),
            args: default_validator_args(),
            timeout_secs: default_validator_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the pipelines rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let generation = &self.generation;
        if generation.topics.is_empty() {
            return Err(ConfigError::Invalid(
                "generation.topics must contain at least one topic".to_string(),
            ));
        }
        if generation.count == 0 {
            return Err(ConfigError::Invalid(
                "generation.count must be at least 1".to_string(),
            ));
        }
        if generation.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "generation.batch_size must be at least 1".to_string(),
            ));
        }
        if generation.system.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "generation.system must not be empty".to_string(),
            ));
        }
        if generation.template.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "generation.template must not be empty".to_string(),
            ));
        }
        if self.api.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "api.max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the API key from config or environment.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        self.api.resolve_api_key()
    }
}

impl ApiConfig {
    /// Resolve the API key: `api_key` (with `${VAR}` expansion), else `api_key_env`.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = &self.api_key {
            return Ok(expand_env_vars(key));
        }

        std::env::var(&self.api_key_env).map_err(|_| ConfigError::MissingApiKey {
            env_var: self.api_key_env.clone(),
        })
    }
}

/// Expand `${VAR_NAME}` occurrences from the environment.
///
/// Unset variables are left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    re.replace_all(s, |cap: &regex::Captures<'_>| {
        std::env::var(&cap[1]).unwrap_or_else(|_| cap[0].to_string())
    })
    .into_owned()
}

/// Template written by `oaift init`.
pub const CONFIG_TEMPLATE: &str = r#"# oaift project configuration

[api]
# API key is read from this env var (or set api_key = "${MY_VAR}")
api_key_env = "OPENAI_API_KEY"
base_url = "https://api.openai.com/v1"
timeout_secs = 120
max_retries = 3

[generation]
model = "gpt-3.5-turbo"
# The system prompt is sent as-is; only `template` is interpolated
system = "You are a helpful assistant that answers questions about Acme Widgets."
template = """
Write a realistic conversation between a user and an assistant about {{topic}}.
The assistant is an expert on {{product}}. Use {{turns}} turns.
"""
topics = ["pricing", "installation"]
count = 2
temperature = 0.5
batch_size = 3

[generation.variables]
product = "Acme Widgets"
turns = 4

[fine_tune]
base_model = "gpt-3.5-turbo"
epochs = "auto"
# suffix = "acme"

[validator]
# Runs from this directory; the dataset path is appended as the last argument
command = "python3"
args = ["scripts/validate.py"]
timeout_secs = 300
"#;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing API key: set {env_var} env var or api.api_key in config")]
    MissingApiKey { env_var: String },
}
