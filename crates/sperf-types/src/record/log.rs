use crate::{NodeId, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Log severity as printed by logback in Cassandra/DSE logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            other => Err(crate::Error::InvalidValue(format!("log level '{}'", other))),
        }
    }
}

/// One parsed log record (header line plus any continuation lines)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub id: RecordId,
    pub node: NodeId,
    /// Node-local time as written in the log
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub thread: String,
    /// Originating component, e.g. `GCInspector`
    pub component: String,
    pub message: String,
    /// Continuation lines (stack traces, StatusLogger tables)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detail: Vec<String>,
    /// Structured fields extracted by pattern match
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    pub line: u64,
}

impl LogEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn field_u64(&self, name: &str) -> Option<u64> {
        self.field(name).and_then(|v| v.parse().ok())
    }

    pub fn field_f64(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(|v| v.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileId;
    use chrono::TimeZone;

    #[test]
    fn test_level_parse_and_order() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("NOTICE".parse::<LogLevel>().is_err());
        assert!(LogLevel::Error > LogLevel::Warn);
    }

    #[test]
    fn test_typed_field_access() {
        let mut fields = BTreeMap::new();
        fields.insert("gc_ms".to_string(), "812".to_string());
        fields.insert("collector".to_string(), "G1 Young Generation".to_string());
        let event = LogEvent {
            id: RecordId::new(FileId(0), 0),
            node: NodeId::from("n1"),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            level: LogLevel::Warn,
            thread: "Service Thread".to_string(),
            component: "GCInspector".to_string(),
            message: "G1 Young Generation GC in 812ms.".to_string(),
            detail: Vec::new(),
            fields,
            line: 1,
        };
        assert_eq!(event.field_u64("gc_ms"), Some(812));
        assert_eq!(event.field_u64("collector"), None);
        assert_eq!(event.field("missing"), None);
    }
}
