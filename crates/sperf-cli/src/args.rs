use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fmt;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sperf")]
#[command(
    about = "Find probable causes of DSE and Cassandra incidents in diagnostic bundles",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Log verbosity on stderr (RUST_LOG overrides)
    #[arg(long, default_value = "warn", global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Analyze a diagnostic bundle and print the report")]
    Analyze(AnalyzeArgs),

    #[command(about = "List the rules a run would evaluate")]
    Rules {
        #[arg(long, help = "Configuration file (default: $SPERF_CONFIG, then the user config dir)")]
        config: Option<PathBuf>,

        #[arg(long, default_value = "plain")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Args)]
pub struct AnalyzeArgs {
    /// Bundle root: one directory per node, or a DSE tarball with `nodes/`
    pub bundle: PathBuf,

    #[arg(long, help = "Configuration file (default: $SPERF_CONFIG, then the user config dir)")]
    pub config: Option<PathBuf>,

    #[arg(long, default_value = "plain")]
    pub format: OutputFormat,

    #[arg(long, value_name = "REGEX", help = "Log message marking the same instant on every node")]
    pub sync_marker: Option<String>,

    #[arg(long, value_parser = parse_time, help = "Ignore records before this time (RFC 3339)")]
    pub since: Option<DateTime<Utc>>,

    #[arg(long, value_parser = parse_time, help = "Ignore records after this time (RFC 3339)")]
    pub until: Option<DateTime<Utc>>,

    #[arg(long, help = "Stop scheduling rules after this many seconds")]
    pub timeout_secs: Option<u64>,

    #[arg(long, help = "Worker threads (0 = available parallelism)")]
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Plain => write!(f, "plain"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

/// RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC
fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| format!("'{}' is not an RFC 3339 timestamp", value))
}
