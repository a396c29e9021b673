use crate::config::Config;
use crate::parse::{parse_bundle, worker_count};
use crate::Result;
use sperf_engine::{
    EvalOptions, Report, ReportInput, RuleContext, RuleEngine, RuleRegistry, Timeline,
    TimelineOptions,
};
use sperf_parsers::{Locator, ParserRegistry};
use std::path::Path;
use std::time::Instant;

/// End-to-end analysis: locate, parse, correlate, evaluate, aggregate.
///
/// Only setup errors and a missing bundle fail a run; everything else ends
/// up in the report.
pub struct Pipeline {
    config: Config,
    parsers: ParserRegistry,
    extra_rules: Vec<Box<dyn sperf_engine::Rule>>,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let parsers = ParserRegistry::new(&config.timestamps);
        Self {
            config,
            parsers,
            extra_rules: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register an additional rule after the configured catalog
    pub fn with_rule(mut self, rule: Box<dyn sperf_engine::Rule>) -> Self {
        self.extra_rules.push(rule);
        self
    }

    /// Rule set a run would evaluate, in merge order
    pub fn rule_registry(&self) -> Result<RuleRegistry> {
        Ok(RuleRegistry::with_builtin(&self.config.rules)?)
    }

    pub fn run(self, root: &Path) -> Result<Report> {
        let started = Instant::now();
        let deadline = self.config.timeout().map(|t| started + t);

        let sync_marker = self.config.sync_marker()?;
        let mut registry = self.rule_registry()?;
        for rule in self.extra_rules {
            registry.register(rule)?;
        }

        let locator = Locator::new(&self.config.locator, &self.parsers)?;
        let bundle = locator.locate(root)?;
        tracing::info!(
            bundle = %bundle.id,
            nodes = bundle.nodes.len(),
            files = bundle.files.len(),
            "located bundle"
        );

        let parsed = parse_bundle(&bundle, &self.parsers, self.config.engine.workers);

        let timeline = Timeline::build(
            parsed.records,
            &TimelineOptions {
                sync_marker,
                time_range: self.config.filter.time_range,
            },
        );
        if timeline.excluded() > 0 {
            tracing::info!(excluded = timeline.excluded(), "records outside the time range");
        }

        let engine = RuleEngine::new(registry);
        let ctx = RuleContext::new(&bundle, &timeline, &parsed.config);
        let outcome = engine.evaluate(
            &ctx,
            &EvalOptions {
                workers: worker_count(self.config.engine.workers, engine.registry().len()),
                deadline,
            },
        );

        let report = Report::build(ReportInput {
            bundle: &bundle,
            offsets: timeline.offsets(),
            outcome,
            warnings: &parsed.warnings,
            files: parsed.files,
        });
        tracing::info!(
            findings = report.findings.len(),
            status = ?report.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis finished"
        );
        Ok(report)
    }
}
