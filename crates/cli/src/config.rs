//! Configuration loading from toolcall.toml.

use runtime::tools::builtin::ShellConfig;
use runtime::{DispatchConfig, ModelOptions, OpenAiBackend, ToolProtocol};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant running on the user's machine. \
Use the available tools when they help answer the request, and answer directly otherwise.";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub agent: AgentConfig,
    pub shell: ShellSection,
}

/// Model server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the OpenAI-compatible server.
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Offer tools as structured declarations. When false the tool
    /// catalogue goes into the system prompt instead.
    pub native_tools: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: runtime::providers::DEFAULT_ENDPOINT.to_string(),
            model: "phi-4-mini".to_string(),
            api_key: None,
            native_tools: true,
        }
    }
}

/// Conversation and dispatch settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub tool_timeout_secs: u64,
    pub max_rounds: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: 2048,
            temperature: 0.1,
            top_p: 0.9,
            tool_timeout_secs: 60,
            max_rounds: 16,
        }
    }
}

/// Shell tool settings. Unset fields use the platform default shell.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ShellSection {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
    pub working_dir: Option<PathBuf>,
    pub max_output_lines: Option<usize>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load configuration, falling back to defaults when the file is absent.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            tracing::debug!(path = %path.display(), "loading config");
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `TOOLCALL_*` overrides using the given variable lookup.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = var("TOOLCALL_ENDPOINT") {
            self.backend.endpoint = endpoint;
        }
        if let Some(model) = var("TOOLCALL_MODEL") {
            self.backend.model = model;
        }
        if let Some(key) = var("TOOLCALL_API_KEY") {
            self.backend.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.endpoint is empty".into()));
        }
        if self.backend.model.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.model is empty".into()));
        }
        if self.agent.max_tokens == 0 {
            return Err(ConfigError::Invalid("agent.max_tokens must be positive".into()));
        }
        if self.agent.max_rounds == 0 {
            return Err(ConfigError::Invalid("agent.max_rounds must be positive".into()));
        }
        if self.agent.tool_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "agent.tool_timeout_secs must be positive".into(),
            ));
        }
        if self.shell.max_output_lines == Some(0) {
            return Err(ConfigError::Invalid(
                "shell.max_output_lines must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn build_backend(&self) -> OpenAiBackend {
        let mut builder =
            OpenAiBackend::builder(&self.backend.model).endpoint(&self.backend.endpoint);
        if let Some(key) = &self.backend.api_key {
            builder = builder.api_key(key);
        }
        builder.build()
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            protocol: if self.backend.native_tools {
                ToolProtocol::Native
            } else {
                ToolProtocol::Textual
            },
            options: ModelOptions {
                temperature: Some(self.agent.temperature),
                top_p: Some(self.agent.top_p),
                max_output_tokens: Some(self.agent.max_tokens),
            },
            tool_timeout: Duration::from_secs(self.agent.tool_timeout_secs),
            max_rounds: self.agent.max_rounds,
        }
    }

    pub fn shell_config(&self) -> ShellConfig {
        let mut shell = ShellConfig::default();
        if let Some(program) = &self.shell.program {
            shell.program = program.clone();
        }
        if let Some(args) = &self.shell.args {
            shell.args = args.clone();
        }
        if let Some(lines) = self.shell.max_output_lines {
            shell.max_output_lines = lines;
        }
        shell.working_dir = self.shell.working_dir.clone();
        shell
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
}
