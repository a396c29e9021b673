use crate::{FileId, NodeId, RecordId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Finding severity, ordered `Info < Warning < Critical`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            other => Err(crate::Error::InvalidValue(format!("severity '{}'", other))),
        }
    }
}

/// Inclusive time interval on the normalized clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window; the bounds are swapped if given out of order
    pub fn new(a: DateTime<Utc>, b: DateTime<Utc>) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    pub fn instant(at: DateTime<Utc>) -> Self {
        Self { start: at, end: at }
    }

    /// Smallest window covering every given time, or None for an empty input
    pub fn covering(times: impl IntoIterator<Item = DateTime<Utc>>) -> Option<Self> {
        let mut iter = times.into_iter();
        let first = iter.next()?;
        let (start, end) = iter.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t)));
        Some(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }

    /// Inclusive overlap: windows that touch at a single instant overlap
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn union(&self, other: &TimeWindow) -> TimeWindow {
        TimeWindow {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Reference to the data a finding is based on
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    /// A parsed log event or metric sample
    Record { record: RecordId },
    /// A file (optionally a line in it) that has no parsed record
    File {
        file: FileId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line: Option<u64>,
    },
}

impl Evidence {
    pub fn record(id: RecordId) -> Self {
        Evidence::Record { record: id }
    }

    pub fn file(file: FileId, line: Option<u64>) -> Self {
        Evidence::File { file, line }
    }
}

/// A single diagnostic conclusion. Never mutated after the rule returns it;
/// the aggregator only merges duplicates into new values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub rule: String,
    pub severity: Severity,
    pub nodes: BTreeSet<NodeId>,
    /// What the finding is about within its rule and nodes (a thread pool,
    /// a metric series); part of the finding's identity when deduplicating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<TimeWindow>,
    pub explanation: String,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
}

impl Finding {
    pub fn new(rule: impl Into<String>, severity: Severity, explanation: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            severity,
            nodes: BTreeSet::new(),
            subject: None,
            window: None,
            explanation: explanation.into(),
            evidence: Vec::new(),
        }
    }

    pub fn with_node(mut self, node: NodeId) -> Self {
        self.nodes.insert(node);
        self
    }

    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_records(mut self, records: impl IntoIterator<Item = RecordId>) -> Self {
        self.evidence.extend(records.into_iter().map(Evidence::record));
        self
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence.push(evidence);
        self
    }

    /// Earliest time covered, used for ordering
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.window.map(|w| w.start)
    }
}
