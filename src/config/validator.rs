use std::collections::HashSet;

use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::warn;

use super::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let token_missing = self
            .auth
            .bot_token
            .as_ref()
            .is_none_or(|token| token.expose_secret().trim().is_empty());
        if token_missing {
            return Err(ConfigError::InvalidConfig(
                "auth.bot_token cannot be empty".to_string(),
            ));
        }

        if self.mirror.retry_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "mirror.retry_attempts must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (index, mapping) in self.mirror.mappings.iter().enumerate() {
            if mapping.source_channel_id == 0 || mapping.target_channel_id == 0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "mirror.mappings[{index}] needs non-zero source_channel_id and target_channel_id"
                )));
            }
            if mapping.source_author_id == Some(0) {
                return Err(ConfigError::InvalidConfig(format!(
                    "mirror.mappings[{index}].source_author_id cannot be 0"
                )));
            }
            if !seen.insert((mapping.source_channel_id, mapping.source_author_id)) {
                warn!(
                    "mirror.mappings[{}] duplicates an earlier mapping for channel {} and will never match",
                    index, mapping.source_channel_id
                );
            }
        }

        Ok(())
    }
}
