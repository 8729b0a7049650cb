use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

use super::ConfigError;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub event_log: EventLogConfig,
    #[serde(default)]
    pub welcome_channel: Option<ChannelSetting>,
    #[serde(default)]
    pub ready_channel: Option<ChannelSetting>,
    #[serde(default)]
    pub mirror: MirrorConfig,
}

#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    #[serde(default, deserialize_with = "deserialize_token")]
    pub bot_token: Option<SecretString>,
    #[serde(default = "default_use_privileged_intents")]
    pub use_privileged_intents: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_max_messages")]
    pub max_messages: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_messages: default_cache_max_messages(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Destination channels for each log category.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventLogConfig {
    #[serde(default)]
    pub messages: Option<ChannelSetting>,
    #[serde(default)]
    pub members: Option<ChannelSetting>,
    #[serde(default)]
    pub moderation: Option<ChannelSetting>,
    #[serde(default)]
    pub server: Option<ChannelSetting>,
    #[serde(default)]
    pub voice: Option<ChannelSetting>,
    /// How old an audit log entry may be and still explain a removal.
    #[serde(default = "default_audit_window_secs")]
    pub audit_window_secs: u64,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            messages: None,
            members: None,
            moderation: None,
            server: None,
            voice: None,
            audit_window_secs: default_audit_window_secs(),
        }
    }
}

impl EventLogConfig {
    pub fn audit_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.audit_window_secs.min(i64::MAX as u64) as i64)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MirrorConfig {
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    #[serde(default)]
    pub mappings: Vec<MirrorMapping>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_interval_ms: default_retry_interval_ms(),
            mappings: Vec::new(),
        }
    }
}

impl MirrorConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MirrorMapping {
    pub source_channel_id: u64,
    pub target_channel_id: u64,
    #[serde(default)]
    pub source_author_id: Option<u64>,
}

impl MirrorMapping {
    pub fn matches(&self, channel_id: u64, author_id: u64) -> bool {
        self.source_channel_id == channel_id
            && self
                .source_author_id
                .is_none_or(|expected| expected == author_id)
    }
}

/// A channel id as written in the config file.
///
/// Kept verbatim so a typo surfaces as a misconfiguration when the channel is
/// used instead of failing the whole file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ChannelSetting {
    Id(u64),
    Raw(String),
    Invalid(serde_yaml::Value),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    Disabled,
    Misconfigured(String),
    Channel(u64),
}

impl ChannelSetting {
    pub fn destination(&self) -> LogDestination {
        match self {
            Self::Id(0) => LogDestination::Disabled,
            Self::Id(id) => LogDestination::Channel(*id),
            Self::Raw(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return LogDestination::Disabled;
                }
                match trimmed.parse::<u64>() {
                    Ok(0) => LogDestination::Disabled,
                    Ok(id) => LogDestination::Channel(id),
                    Err(_) => LogDestination::Misconfigured(raw.clone()),
                }
            }
            Self::Invalid(value) => LogDestination::Misconfigured(render_value(value)),
        }
    }
}

fn render_value(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Number(number) => number.to_string(),
        serde_yaml::Value::Bool(flag) => flag.to_string(),
        other => serde_yaml::to_string(other)
            .map(|text| text.trim_end().to_string())
            .unwrap_or_else(|_| format!("{other:?}")),
    }
}

impl LogDestination {
    pub fn of(setting: Option<&ChannelSetting>) -> Self {
        setting.map_or(Self::Disabled, ChannelSetting::destination)
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let token = lookup("DISCORD_RELAY_BOT_TOKEN").or_else(|| lookup("DISCORD_TOKEN"));
        if let Some(value) = token.filter(|value| !value.is_empty()) {
            self.auth.bot_token = Some(SecretString::from(value));
        }
    }
}

fn deserialize_token<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.map(SecretString::from))
}

fn default_use_privileged_intents() -> bool {
    true
}

fn default_cache_max_messages() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_audit_window_secs() -> u64 {
    5
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_interval_ms() -> u64 {
    2000
}
