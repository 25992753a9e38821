//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::application::errors::ConfigError;

/// Bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub bot: BotConfig,
    pub gateway: GatewayConfig,
    pub plugins: PluginConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BotConfig {
    pub name: String,
    pub prefix: String,
}

/// Which gateway client to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GatewayKind {
    Console,
    Telegram,
}

impl GatewayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayKind::Console => "console",
            GatewayKind::Telegram => "telegram",
        }
    }
}

impl std::str::FromStr for GatewayKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(GatewayKind::Console),
            "telegram" => Ok(GatewayKind::Telegram),
            other => Err(ConfigError::InvalidValue(format!("unknown gateway '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GatewayConfig {
    pub kind: GatewayKind,
    pub token: Option<String>,
    /// Override for the Telegram Bot API server
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PluginConfig {
    pub enabled: bool,
    /// Directory scanned for plugin libraries at startup
    pub directory: Option<PathBuf>,
    /// Extra library files or plugin directories, loaded in order
    #[serde(default)]
    pub libraries: Vec<PathBuf>,
    /// Forward bus events to the process log
    #[serde(default = "default_true")]
    pub event_log: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                name: "lintas-bot".to_string(),
                prefix: "/".to_string(),
            },
            gateway: GatewayConfig {
                kind: GatewayKind::Console,
                token: None,
                api_base: None,
            },
            plugins: PluginConfig {
                enabled: true,
                directory: Some(PathBuf::from("./plugins")),
                libraries: Vec::new(),
                event_log: true,
            },
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_env() -> Self {
        // Load from environment variables
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Override fields from `BOT_TOKEN`, `BOT_PREFIX`, `BOT_GATEWAY` and `BOT_PLUGIN_DIR`
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("BOT_TOKEN") {
            self.gateway.token = Some(token);
        }

        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            self.bot.prefix = prefix;
        }

        if let Ok(kind) = std::env::var("BOT_GATEWAY") {
            match kind.parse() {
                Ok(kind) => self.gateway.kind = kind,
                Err(e) => tracing::warn!("Ignoring BOT_GATEWAY: {}", e),
            }
        }

        if let Ok(dir) = std::env::var("BOT_PLUGIN_DIR") {
            self.plugins.directory = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.name.trim().is_empty() {
            return Err(ConfigError::MissingField("bot.name".to_string()));
        }
        if self.bot.prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidValue("bot.prefix must not contain whitespace".to_string()));
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
