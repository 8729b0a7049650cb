use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "discord-relay-bot",
    version,
    about = "Mirrors Discord channels and logs guild activity"
)]
pub struct Args {
    /// Path to the YAML config file
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config.yaml")]
    pub config: PathBuf,
}
