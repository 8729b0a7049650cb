pub use self::parser::{
    ChannelSetting, Config, EventLogConfig, LogDestination, LoggingConfig, MirrorConfig,
    MirrorMapping,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;
