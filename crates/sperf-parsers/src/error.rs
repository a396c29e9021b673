use std::fmt;
use std::path::PathBuf;

/// Result type for sperf-parsers operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the parsers layer
#[derive(Debug)]
pub enum Error {
    /// Bundle root missing or without any recognizable node directory.
    /// Fatal for the run: no partial bundle is analyzed.
    MissingBundle { root: PathBuf, reason: String },

    /// IO operation failed
    Io(std::io::Error),

    /// Invalid glob pattern in locator configuration
    Glob(globset::Error),

    /// Invalid regular expression in configuration
    Regex(regex::Error),

    /// No parser is registered for the artifact kind
    NoParser(sperf_types::ArtifactKind),
}

impl Error {
    pub fn missing_bundle(root: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::MissingBundle {
            root: root.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingBundle { root, reason } => {
                write!(f, "Missing bundle at {}: {}", root.display(), reason)
            }
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Glob(err) => write!(f, "Invalid glob pattern: {}", err),
            Error::Regex(err) => write!(f, "Invalid pattern: {}", err),
            Error::NoParser(kind) => write!(f, "No parser registered for {} artifacts", kind),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Glob(err) => Some(err),
            Error::Regex(err) => Some(err),
            Error::MissingBundle { .. } | Error::NoParser(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<globset::Error> for Error {
    fn from(err: globset::Error) -> Self {
        Error::Glob(err)
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Regex(err)
    }
}

