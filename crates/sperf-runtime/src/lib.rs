pub mod config;
pub mod error;
pub mod parse;
pub mod pipeline;

pub use config::{
    AlignmentConfig, CONFIG_ENV, Config, EngineConfig, FilterConfig, resolve_config_path,
};
pub use error::{Error, Result};
pub use parse::{ParsedBundle, parse_bundle};
pub use pipeline::Pipeline;

// Re-exported so callers need only this crate for a run
pub use sperf_engine::{Report, ReportStatus, Rule, RuleContext, RuleError};
