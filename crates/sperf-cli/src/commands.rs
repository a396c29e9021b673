use crate::args::{Cli, Commands};
use crate::handlers;
use anyhow::Result;
use tracing_subscriber::EnvFilter;

pub fn run(cli: Cli) -> Result<()> {
    init_logging(&cli);

    match cli.command {
        Commands::Analyze(args) => handlers::analyze::handle(args),
        Commands::Rules { config, format } => handlers::rules::handle(config.as_deref(), format),
    }
}

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_string()));
    // A second initialisation (library callers) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
