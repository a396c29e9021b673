use std::fmt;

/// Result type for sperf-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while setting up the engine (never during evaluation:
/// evaluation failures become findings)
#[derive(Debug)]
pub enum Error {
    /// A configured rule is invalid (bad pattern, zero window, ...)
    InvalidRule { id: String, reason: String },

    /// Two rules were registered with the same id
    DuplicateRule(String),

    /// Invalid sync marker pattern
    InvalidMarker(regex::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidRule { id, reason } => write!(f, "Invalid rule '{}': {}", id, reason),
            Error::DuplicateRule(id) => write!(f, "Rule '{}' is registered twice", id),
            Error::InvalidMarker(err) => write!(f, "Invalid sync marker pattern: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidMarker(err) => Some(err),
            Error::InvalidRule { .. } | Error::DuplicateRule(_) => None,
        }
    }
}

/// Failure reported by a rule during evaluation.
///
/// Converted into a single `rule-execution-error` finding by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleError {
    pub message: String,
}

impl RuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RuleError {}
