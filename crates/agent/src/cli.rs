use clap::{Parser, Subcommand};
use infrastructure::config::{LogFormat, LogLevel};
use infrastructure::constants::DEFAULT_CONFIG_PATH;

#[derive(Parser, Debug)]
#[command(
    name = "ctflow-agent",
    about = "Connection-tracking flow dumper for Kubernetes Pod traffic",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "CTFLOW_CONFIG")]
    pub config: String,

    /// Log level override (takes precedence over config file)
    #[arg(short, long)]
    pub log_level: Option<LogLevel>,

    /// Log format: json (default, production) or text (development)
    #[arg(long)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Display version and build information
    Version,

    /// Dump the filtered connection table once and print it as JSON
    Dump {
        /// Zone to dump; defaults to every configured zone
        #[arg(short, long)]
        zone: Option<u16>,
    },
}

/// Parse CLI arguments.
pub fn parse() -> Cli {
    Cli::parse()
}
