use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::time::Duration;

use minijinja::Environment;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Templating error in {0:?}: {1}")]
    Template(PathBuf, minijinja::Error),
}

fn default_poll_interval() -> NonZeroU64 {
    NonZeroU64::MIN.saturating_add(29)
}

fn default_webhook_timeout() -> u64 {
    10
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_prefix() -> String {
    "!".to_string()
}

fn default_confirm_timeout() -> u64 {
    30
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    500
}

fn default_llm_timeout() -> u64 {
    60
}

/// Treats a value that rendered to an empty string (e.g. an unset
/// environment variable) as absent.
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Seconds between two poll cycles (default: 30)
    #[serde(default = "default_poll_interval")]
    pub poll_interval: NonZeroU64,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub confirm: ConfirmConfig,
    /// Language-model integration. Absent disables `ask` and `diagnose`.
    #[serde(default)]
    pub llm: Option<LlmConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            notifications: NotificationsConfig::default(),
            api: ApiConfig::default(),
            confirm: ConfirmConfig::default(),
            llm: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NotificationsConfig {
    #[serde(default)]
    webhook_url: Option<String>,
    /// Seconds one delivery may take before it counts as failed (default: 10)
    #[serde(default = "default_webhook_timeout")]
    pub timeout: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout: default_webhook_timeout(),
        }
    }
}

impl NotificationsConfig {
    pub fn webhook_url(&self) -> Option<&str> {
        non_empty(&self.webhook_url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    token: Option<String>,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            token: None,
            prefix: default_prefix(),
        }
    }
}

impl ApiConfig {
    pub fn token(&self) -> Option<&str> {
        non_empty(&self.token)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ConfirmConfig {
    /// Seconds a destructive action waits for confirmation (default: 30)
    #[serde(default = "default_confirm_timeout")]
    pub timeout: u64,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            timeout: default_confirm_timeout(),
        }
    }
}

impl ConfirmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LlmConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request timeout in seconds (default: 60)
    #[serde(default = "default_llm_timeout")]
    pub timeout: u64,
}

impl LlmConfig {
    pub fn api_key(&self) -> Option<&str> {
        non_empty(&self.api_key)
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.get())
    }

    /// Effective settings with secrets reduced to whether they are set.
    pub fn summary(&self) -> String {
        let set = |v: Option<&str>| if v.is_some() { "set" } else { "unset" };
        let mut out = format!(
            "poll_interval: {}s\nwebhook: {} (timeout {}s)\napi: {} prefix {:?}, token {}\nconfirm timeout: {}s",
            self.poll_interval.get(),
            set(self.notifications.webhook_url()),
            self.notifications.timeout,
            self.api.listen,
            self.api.prefix,
            set(self.api.token()),
            self.confirm.timeout,
        );
        match &self.llm {
            Some(llm) => out.push_str(&format!(
                "\nllm: {} at {}, api key {}",
                llm.model,
                llm.endpoint,
                set(llm.api_key())
            )),
            None => out.push_str("\nllm: disabled"),
        }
        out
    }

    fn try_init_from_string(
        config: &str,
        path: &Path,
        vars: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let rendered = render_template(config, vars)
            .map_err(|e| ConfigError::Template(path.to_path_buf(), e))?;
        Ok(toml::from_str(&rendered)?)
    }

    /// Reads the config file, rendering `${ VAR }` placeholders from the
    /// process environment first. A missing file yields the defaults.
    pub fn try_init(path: &Path) -> Result<Self, ConfigError> {
        let config = match std::fs::read_to_string(path) {
            Ok(config) => config,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Config file {path:?} not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::try_init_from_string(&config, path, &vars)
    }
}

/// Renders `template_str` with `${ name }` placeholders. Unknown names render
/// as empty strings so an unset optional secret simply disables its feature.
pub fn render_template(
    template_str: &str,
    vars: &HashMap<String, String>,
) -> Result<String, minijinja::Error> {
    let mut env = Environment::new();

    let syntax = minijinja::syntax::SyntaxConfig::builder()
        .variable_delimiters("${", "}")
        .build()?;

    env.set_syntax(syntax);
    env.set_undefined_behavior(minijinja::UndefinedBehavior::Lenient);

    let template = env.template_from_str(template_str)?;
    template.render(vars)
}
