// Command-line surface for sperf
//
// Thin wiring only: arguments become a runtime Config, the runtime Pipeline
// does the work, and the Report is printed as text or JSON. Logs go to
// stderr so stdout stays machine-readable.

mod args;
mod commands;
mod handlers;

pub use args::{AnalyzeArgs, Cli, Commands, LogLevel, OutputFormat};
pub use commands::run;
