// Error types
pub mod error;

// Parser trait and record streams
pub mod traits;

// Timestamp formats
pub mod timestamp;

// Parser implementations
pub mod config;
pub mod iostat;
pub mod log;
pub mod metrics;

// Kind -> parser table
pub mod registry;

// Bundle discovery
pub mod locator;

pub use traits::{ArtifactParser, ItemSink, LineDecoder, ParsedItem, ProbeResult, RecordStream};

pub use timestamp::{TimestampConfig, TimestampFormat, TimestampParser};

pub use config::ConfigDumpParser;
pub use iostat::IostatParser;
pub use log::SystemLogParser;
pub use metrics::MetricsCsvParser;

pub use registry::{ArtifactMetadata, ParserRegistry, get_all_artifacts, get_artifact_metadata};

pub use locator::{Locator, LocatorConfig};

pub use error::{Error, Result};
