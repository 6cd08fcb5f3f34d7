//! Layered configuration for mcp-bridge.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars (including `.env`) > config file > defaults

use bridge_mcp::ServerSettings;
use bridge_types::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The default chat-completions base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

/// The default model to use.
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// The default max tokens for a response.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// The default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.5;

/// The default deadline for one LLM call, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// The default number of retries for transient API failures.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// The default bound on model-to-tools rounds per user turn.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

/// The default input that ends the session.
pub const DEFAULT_QUIT_COMMAND: &str = "quit";

/// The default system prompt prefixed to every request.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional assistant. \
When the user's request can be served by one of the available tools, call the most \
suitable tool with well-formed arguments, then answer using its result. \
If a tool reports an error, explain it briefly and suggest what to try instead.";

/// Resolved configuration for one bridge session.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub system_prompt: String,
    pub max_tool_rounds: usize,
    pub quit_command: String,
    pub server: ServerSettings,
    pub config_dir: PathBuf,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

/// `[api]` section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
}

/// `[session]` section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSettings {
    pub system_prompt: Option<String>,
    pub max_tool_rounds: Option<usize>,
    pub quit_command: Option<String>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub tool_timeout_ms: Option<u64>,
    pub max_tool_rounds: Option<usize>,
}

impl BridgeConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables (`.env` in the working directory is loaded first)
    /// 3. Config file (~/.mcp-bridge/config.toml)
    /// 4. Defaults
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        load_dotenv();
        let config_dir = config_dir();
        let settings = load_settings_file(&config_dir.join("config.toml"))?;
        Self::resolve(overrides, settings, config_dir, |key| {
            std::env::var(key).ok()
        })
    }

    /// Merge the layers. `env` looks up an environment variable; empty
    /// values count as unset.
    pub fn resolve(
        overrides: CliOverrides,
        settings: SettingsFile,
        config_dir: PathBuf,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let SettingsFile {
            api,
            session,
            mut server,
        } = settings;

        // API key: CLI > env > config file
        let api_key = overrides
            .api_key
            .or_else(|| env("API_KEY"))
            .or(api.api_key)
            .ok_or_else(|| ConfigError::MissingKey {
                key: "api_key (set API_KEY, pass --api-key or add to ~/.mcp-bridge/config.toml)"
                    .into(),
            })?;

        let base_url = overrides
            .base_url
            .or_else(|| env("BASE_URL"))
            .or(api.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let model = overrides
            .model
            .or_else(|| env("MODEL"))
            .or_else(|| env("MODEL_NAME"))
            .or(api.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let max_tokens = api.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        if max_tokens == 0 {
            return Err(invalid("api.max_tokens", "must be greater than zero"));
        }

        let temperature = api.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(invalid("api.temperature", "must be between 0.0 and 2.0"));
        }

        let timeout_secs = api.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(invalid("api.timeout_secs", "must be greater than zero"));
        }

        let max_tool_rounds = overrides
            .max_tool_rounds
            .or(session.max_tool_rounds)
            .unwrap_or(DEFAULT_MAX_TOOL_ROUNDS);
        if max_tool_rounds == 0 {
            return Err(invalid("session.max_tool_rounds", "must be at least 1"));
        }

        if let Some(ms) = overrides.tool_timeout_ms {
            server.tool_timeout_ms = ms;
        }
        if server.tool_timeout_ms == 0 {
            return Err(invalid("server.tool_timeout_ms", "must be greater than zero"));
        }

        let quit_command = session
            .quit_command
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .unwrap_or_else(|| DEFAULT_QUIT_COMMAND.to_string());

        Ok(BridgeConfig {
            api_key,
            base_url,
            model,
            max_tokens,
            temperature,
            timeout_secs,
            max_retries: api.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            system_prompt: session
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_tool_rounds,
            quit_command,
            server,
            config_dir,
        })
    }

    /// Deadline for one LLM call.
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        message: message.into(),
    }
}

/// Get the config directory path (~/.mcp-bridge/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MCP_BRIDGE_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcp-bridge")
}

/// Load `.env` from the working directory without overriding set variables.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("Failed to load .env: {e}"),
    }
}

/// Load and parse a TOML settings file. A missing file yields defaults; a
/// malformed one is an error.
pub fn load_settings_file(path: &Path) -> Result<SettingsFile, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(SettingsFile::default());
        }
        Err(e) => {
            return Err(ConfigError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            });
        }
    };
    tracing::debug!("Reading config from {}", path.display());
    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
