//! Configuration loading from gateway.toml.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use policy::ContextPolicy;
use runtime::{DispatchConfig, OrchestratorConfig, RetryPolicy};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "gateway.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub toolbox: ToolboxConfig,
    pub orchestrator: LoopConfig,
    pub server: ServerConfig,
    /// Context grants per tool. Absent means the built-in toolbox grants.
    pub grants: Option<BTreeMap<String, BTreeSet<String>>>,
    /// Policy file whose grants are added to the ones above.
    pub grants_file: Option<PathBuf>,
}

/// Planner provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Usually supplied through `OPENAI_API_KEY` instead.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    /// Timeout for one planner call, in seconds.
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: runtime::DEFAULT_MODEL.to_string(),
            base_url: runtime::providers::DEFAULT_BASE_URL.to_string(),
            system_prompt: None,
            max_tokens: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolboxConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Route overrides keyed by tool name, e.g. `get_balances = "/v2/balances"`.
    pub routes: BTreeMap<String, String>,
}

impl Default for ToolboxConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: toolbox::DEFAULT_TIMEOUT.as_secs(),
            routes: BTreeMap::new(),
        }
    }
}

/// Bounds on a single request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub max_rounds: u32,
    pub max_in_flight: usize,
    pub call_timeout_ms: u64,
    /// End-to-end budget for one request.
    pub request_timeout_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            max_in_flight: 4,
            call_timeout_ms: 10_000,
            request_timeout_secs: 60,
            retry_max_attempts: 3,
            retry_initial_delay_ms: 250,
            retry_max_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8081".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else `gateway.toml` if present, else defaults;
    /// then apply environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None if Path::new(CONFIG_FILE).exists() => Self::load(CONFIG_FILE)?,
            None => Self::default(),
        };
        Ok(config.with_env(|key| std::env::var(key).ok()))
    }

    /// Apply `OPENAI_API_KEY`, `TOOLBOX_API_BASE_URL` and `GATEWAY_MODEL`.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(key) = var("OPENAI_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(url) = var("TOOLBOX_API_BASE_URL") {
            self.toolbox.base_url = url;
        }
        if let Some(model) = var("GATEWAY_MODEL") {
            self.model.model = model;
        }
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.orchestrator.max_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.max_in_flight must be at least 1".into(),
            ));
        }
        if self.orchestrator.retry_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.retry_max_attempts must be at least 1".into(),
            ));
        }
        if self.orchestrator.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.request_timeout_secs must be positive".into(),
            ));
        }
        if let Some((tool, _)) = self.toolbox.routes.iter().find(|(_, r)| r.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "toolbox.routes.{tool} must not be empty"
            )));
        }
        self.policy()?;
        Ok(())
    }

    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.model
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    /// Inline grants (or the toolbox defaults) plus those of `grants_file`.
    pub fn policy(&self) -> Result<ContextPolicy, ConfigError> {
        let policy = match &self.grants {
            Some(grants) => ContextPolicy {
                grants: grants.clone(),
            },
            None => ContextPolicy::toolbox_defaults(),
        };
        policy.validate()?;

        match &self.grants_file {
            Some(path) => Ok(policy.merge(ContextPolicy::load(path)?)),
            None => Ok(policy),
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            max_in_flight: self.orchestrator.max_in_flight,
            call_timeout: Duration::from_millis(self.orchestrator.call_timeout_ms),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let o = &self.orchestrator;
        OrchestratorConfig {
            max_rounds: o.max_rounds,
            model_timeout: Duration::from_secs(self.model.timeout_secs),
            retry: RetryPolicy::new()
                .with_max_attempts(o.retry_max_attempts)
                .with_initial_delay(Duration::from_millis(o.retry_initial_delay_ms))
                .with_max_delay(Duration::from_millis(o.retry_max_delay_ms)),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.orchestrator.request_timeout_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid grants: {0}")]
    Policy(#[from] policy::Error),

    #[error("planner API key not configured: set OPENAI_API_KEY or model.api_key")]
    MissingApiKey,
}
