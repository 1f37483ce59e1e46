use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "version-checkr",
    about = "Compare locked package versions across GitHub and GitLab repositories",
    version
)]
pub struct Cli {
    /// Config file [default: ./.version-checkr/config.toml, fallback ~/.config/version-checkr/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Report format
    #[arg(long, default_value = "terminal", value_name = "FORMAT")]
    pub format: ReportFormat,

    /// Exit with code 1 if any repository could not be scanned
    #[arg(long)]
    pub strict: bool,

    /// Maximum number of repositories scanned at once (overrides config)
    #[arg(long, value_name = "N")]
    pub max_concurrency: Option<usize>,

    /// Abort the run after this many seconds (overrides config)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    pub log_level: String,

    /// Log line format
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub log_format: LogFormat,

    /// Also list the lock files analysed for each repository
    #[arg(short, long)]
    pub verbose: bool,

    /// No banner or progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Terminal,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
