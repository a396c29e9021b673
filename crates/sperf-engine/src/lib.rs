// Engine layer - correlation, rule evaluation and reporting
// Sits between parsed records (parsers) and the pipeline/CLI (runtime)

pub mod error;

// Clock alignment and the merged timeline
pub mod timeline;

// Rule trait, registry and built-in catalog
pub mod rules;

// Parallel rule execution
pub mod engine;

// Aggregation and rendering
pub mod report;

pub use engine::{EvalOptions, EvalOutcome, RULE_EXECUTION_ERROR, RuleEngine};
pub use error::{Error, Result, RuleError};
pub use report::{
    FileRef, FileSummary, IncompleteFile, PARSE_WARNING, Report, ReportInput, ReportStatus,
    Summary, TextReport, UNPARSED_ARTIFACT,
};
pub use rules::{Rule, RuleContext, RuleRegistry, RuleSettings};
pub use timeline::{ClockOffsets, TimeRange, Timeline, TimelineEntry, TimelineOptions};
