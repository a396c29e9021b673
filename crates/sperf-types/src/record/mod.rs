// NOTE: Record Model Rationale
//
// Why keep observed timestamps on records?
// - Records are immutable once parsed; clock alignment happens later and per node
// - The timeline carries the normalized time next to each RecordId instead
// - Re-running alignment with a different sync marker never touches parsed data
//
// Why are config entries not records?
// - They have no timestamp and never appear on the timeline
// - Only cross-node comparison (config drift) consumes them

mod config;
mod log;
mod metric;
mod warning;

pub use config::ConfigEntry;
pub use log::{LogEvent, LogLevel};
pub use metric::MetricSample;
pub use warning::ParseWarning;

use crate::{NodeId, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A timestamped record that can be placed on the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    Log(LogEvent),
    Metric(MetricSample),
}

impl Record {
    pub fn id(&self) -> RecordId {
        match self {
            Record::Log(e) => e.id,
            Record::Metric(m) => m.id,
        }
    }

    pub fn node(&self) -> &NodeId {
        match self {
            Record::Log(e) => &e.node,
            Record::Metric(m) => &m.node,
        }
    }

    /// Node-local observed time
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Record::Log(e) => e.timestamp,
            Record::Metric(m) => m.timestamp,
        }
    }

    /// 1-based source line the record started on
    pub fn line(&self) -> u64 {
        match self {
            Record::Log(e) => e.line,
            Record::Metric(m) => m.line,
        }
    }

    pub fn as_log(&self) -> Option<&LogEvent> {
        match self {
            Record::Log(e) => Some(e),
            Record::Metric(_) => None,
        }
    }

    pub fn as_metric(&self) -> Option<&MetricSample> {
        match self {
            Record::Metric(m) => Some(m),
            Record::Log(_) => None,
        }
    }
}
