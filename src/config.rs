use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_model_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}

fn default_model() -> String {
    "openrouter/quasar-alpha".into()
}

fn default_model_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

fn default_max_turns() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    /// Container runtime used to isolate terminal commands.
    #[serde(default = "default_terminal_runner")]
    pub terminal_runner: String,
    #[serde(default = "default_terminal_image")]
    pub terminal_image: String,
    #[serde(default = "default_terminal_timeout")]
    pub terminal_timeout_secs: u64,
    #[serde(default = "default_browser_results")]
    pub browser_max_results: usize,
    #[serde(default = "default_browser_timeout")]
    pub browser_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            report_dir: default_report_dir(),
            terminal_runner: default_terminal_runner(),
            terminal_image: default_terminal_image(),
            terminal_timeout_secs: default_terminal_timeout(),
            browser_max_results: default_browser_results(),
            browser_timeout_secs: default_browser_timeout(),
        }
    }
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_terminal_runner() -> String {
    "docker".into()
}

fn default_terminal_image() -> String {
    "alpine".into()
}

fn default_terminal_timeout() -> u64 {
    30
}

fn default_browser_results() -> usize {
    5
}

fn default_browser_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Fallback filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "taskloop=info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|err| TaskError::Config(format!("Failed to parse configuration: {err}")))
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env(|key| env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        cfg.apply_env(|key| env::var(key).ok())?;
        Ok(cfg)
    }

    /// Applies overrides read through `lookup`. Unparseable numbers are
    /// rejected rather than ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_var("PORT", &port)?;
        }
        if let Some(key) = lookup("LLM_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(url) = lookup("LLM_API_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.model.model = model;
        }
        if let Some(turns) = lookup("AGENT_MAX_TURNS") {
            self.agent.max_turns = parse_var("AGENT_MAX_TURNS", &turns)?;
        }
        if let Some(dir) = lookup("REPORT_OUTPUT_DIR") {
            self.tools.report_dir = PathBuf::from(dir);
        }
        if let Some(image) = lookup("TERMINAL_IMAGE") {
            self.tools.terminal_image = image;
        }
        if let Some(runner) = lookup("TERMINAL_RUNNER") {
            self.tools.terminal_runner = runner;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            };
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| TaskError::Config(format!("invalid value `{raw}` for {key}")))
}
