use std::fmt;

/// Result type for sperf-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the runtime layer
#[derive(Debug)]
pub enum Error {
    /// Locator or parser setup error (includes the fatal MissingBundle)
    Parsers(sperf_parsers::Error),

    /// Rule or alignment setup error
    Engine(sperf_engine::Error),

    /// IO operation failed
    Io(std::io::Error),

    /// Configuration error
    Config(String),
}

impl Error {
    /// True for the fatal "bundle root missing or unrecognizable" failure
    pub fn is_missing_bundle(&self) -> bool {
        matches!(
            self,
            Error::Parsers(sperf_parsers::Error::MissingBundle { .. })
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parsers(err) => write!(f, "{}", err),
            Error::Engine(err) => write!(f, "{}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Parsers(err) => Some(err),
            Error::Engine(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Config(_) => None,
        }
    }
}

impl From<sperf_parsers::Error> for Error {
    fn from(err: sperf_parsers::Error) -> Self {
        Error::Parsers(err)
    }
}

impl From<sperf_engine::Error> for Error {
    fn from(err: sperf_engine::Error) -> Self {
        Error::Engine(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}
