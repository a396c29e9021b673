use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sperf_engine::{RuleSettings, TimeRange};
use sperf_parsers::{LocatorConfig, TimestampConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "SPERF_CONFIG";

/// Resolve the configuration file path based on priority:
/// 1. Explicit path (with tilde expansion)
/// 2. SPERF_CONFIG environment variable (with tilde expansion)
/// 3. `<config dir>/sperf/config.toml`
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(expand_tilde(&path.to_string_lossy()));
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV)
        && !env_path.is_empty()
    {
        return Some(expand_tilde(&env_path));
    }

    dirs::config_dir().map(|dir| dir.join("sperf").join("config.toml"))
}

/// Expand tilde (~) in paths to the user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(path)
}

/// `[alignment]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Regex matched against log messages; `None` disables clock alignment
    pub sync_marker: Option<String>,
}

/// `[filter]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub time_range: TimeRange,
}

/// `[engine]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads for parsing and rule evaluation (0 = available parallelism)
    pub workers: usize,
    /// Run-level timeout; rules not started by then are skipped
    pub timeout_secs: Option<u64>,
}

/// Complete run configuration, loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub locator: LocatorConfig,
    pub timestamps: TimestampConfig,
    pub alignment: AlignmentConfig,
    pub filter: FilterConfig,
    pub engine: EngineConfig,
    pub rules: RuleSettings,
}

impl Config {
    /// Load using the path resolution order; a missing implicit file
    /// yields the defaults, a missing explicit file is an error
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let Some(path) = resolve_config_path(explicit_path) else {
            return Ok(Self::default());
        };
        if explicit_path.is_some() && !path.exists() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded config");
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Checks that do not need the bundle
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.filter.time_range.start, self.filter.time_range.end)
            && start > end
        {
            return Err(Error::Config(format!(
                "time range start {} is after end {}",
                start, end
            )));
        }
        if self.timestamps.formats.is_empty() {
            return Err(Error::Config(
                "at least one timestamp format is required".to_string(),
            ));
        }
        self.sync_marker()?;
        Ok(())
    }

    /// Compiled sync marker, if configured
    pub fn sync_marker(&self) -> Result<Option<Regex>> {
        match self.alignment.sync_marker.as_deref() {
            None | Some("") => Ok(None),
            Some(pattern) => Regex::new(pattern)
                .map(Some)
                .map_err(|e| sperf_engine::Error::InvalidMarker(e).into()),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.engine.timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sperf_types::Severity;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.engine.workers, 0);
        assert!(config.alignment.sync_marker.is_none());
        assert_eq!(config.rules.dropped_messages_cluster.window_secs, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[alignment]
sync_marker = "Starting listening for CQL clients"

[filter.time_range]
start = "2024-03-01T10:00:00Z"

[engine]
timeout_secs = 30

[rules]
disabled = ["metric-outlier"]

[rules.gc_pause]
warning_ms = 250

[[rules.windowed]]
id = "hints-overflow"
pattern = "Too many hints"
min_count = 3
window_secs = 60
severity = "critical"
"#,
        )?;

        let config = Config::load_from(&path)?;
        assert!(config.sync_marker()?.is_some());
        assert_eq!(
            config.filter.time_range.start,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.rules.gc_pause.warning_ms, 250);
        assert_eq!(config.rules.gc_pause.critical_ms, 1000);
        assert!(config.rules.is_disabled("metric-outlier"));
        assert_eq!(config.rules.windowed[0].min_nodes, 1);
        assert_eq!(config.rules.windowed[0].severity, Severity::Critical);
        assert_eq!(config.locator, LocatorConfig::default());
        Ok(())
    }

    #[test]
    fn test_save_and_load_roundtrip() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.engine.workers = 3;
        config.alignment.sync_marker = Some("marker".into());
        config.save_to(&path)?;

        assert_eq!(Config::load_from(&path)?, config);
        Ok(())
    }

    #[test]
    fn test_load_nonexistent_returns_default() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let config = Config::load_from(&temp_dir.path().join("missing.toml"))?;
        assert_eq!(config, Config::default());
        Ok(())
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = Config::load(Some(Path::new("/nonexistent/sperf.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_values_are_rejected() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.toml");

        std::fs::write(&path, "[alignment]\nsync_marker = \"(\"\n")?;
        assert!(matches!(Config::load_from(&path), Err(Error::Engine(_))));

        std::fs::write(
            &path,
            "[filter.time_range]\nstart = \"2024-03-02T00:00:00Z\"\nend = \"2024-03-01T00:00:00Z\"\n",
        )?;
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));

        std::fs::write(&path, "[engine]\nworkers = \"many\"\n")?;
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
        Ok(())
    }
}
