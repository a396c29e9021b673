use crate::args::{AnalyzeArgs, OutputFormat};
use anyhow::{Context, Result};
use sperf_runtime::{Config, Pipeline};

pub fn handle(args: AnalyzeArgs) -> Result<()> {
    let config = build_config(&args)?;
    tracing::debug!(
        bundle = %args.bundle.display(),
        format = %args.format,
        workers = config.engine.workers,
        "starting analysis"
    );
    let report = Pipeline::new(config)
        .run(&args.bundle)
        .with_context(|| format!("cannot analyze {}", args.bundle.display()))?;

    match args.format {
        OutputFormat::Json => println!("{}", report.to_json()?),
        OutputFormat::Plain => print!("{}", report.render_text()),
    }
    Ok(())
}

/// Loaded configuration with command-line overrides applied
fn build_config(args: &AnalyzeArgs) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref())?;

    if let Some(marker) = &args.sync_marker {
        config.alignment.sync_marker = Some(marker.clone());
    }
    if let Some(since) = args.since {
        config.filter.time_range.start = Some(since);
    }
    if let Some(until) = args.until {
        config.filter.time_range.end = Some(until);
    }
    if let Some(timeout) = args.timeout_secs {
        config.engine.timeout_secs = Some(timeout);
    }
    if let Some(workers) = args.workers {
        config.engine.workers = workers;
    }

    config.validate()?;
    Ok(config)
}
