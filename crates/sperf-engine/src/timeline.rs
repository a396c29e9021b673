// Time alignment and correlation
//
// Every record keeps its node-local timestamp; the timeline carries the
// normalized time next to the record id. Order is
// (normalized time, node, file, seq), which is total and independent of
// the order parsers finished in.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sperf_types::{LogEvent, MetricSample, NodeId, Record, RecordId};
use std::collections::{BTreeMap, HashMap};

/// Inclusive filter on normalized time; either bound may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| at >= s) && self.end.is_none_or(|e| at <= e)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Per-node clock offsets relative to a reference node.
///
/// `offset = observed(node) - observed(reference)` for the sync marker, so
/// `normalized = observed - offset`. Nodes without an entry have offset zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockOffsets {
    pub reference: Option<NodeId>,
    pub offsets_ms: BTreeMap<NodeId, i64>,
}

impl ClockOffsets {
    /// Estimate offsets from the earliest sync marker occurrence per node.
    ///
    /// Needs markers on at least two nodes; otherwise every offset is zero.
    pub fn from_markers(records: &[Record], marker: &Regex) -> Self {
        let mut first_seen: BTreeMap<&NodeId, DateTime<Utc>> = BTreeMap::new();
        for event in records.iter().filter_map(Record::as_log) {
            if !marker.is_match(&event.message) {
                continue;
            }
            first_seen
                .entry(&event.node)
                .and_modify(|t| *t = (*t).min(event.timestamp))
                .or_insert(event.timestamp);
        }

        if first_seen.len() < 2 {
            tracing::debug!(
                marked_nodes = first_seen.len(),
                "sync marker seen on fewer than two nodes; offsets are zero"
            );
            return Self::default();
        }

        let mut marked = first_seen.into_iter();
        let Some((reference, reference_at)) = marked.next() else {
            return Self::default();
        };

        let mut offsets_ms = BTreeMap::new();
        offsets_ms.insert(reference.clone(), 0);
        for (node, at) in marked {
            let offset = (at - reference_at).num_milliseconds();
            tracing::debug!(node = %node, offset_ms = offset, "clock offset");
            offsets_ms.insert(node.clone(), offset);
        }

        Self {
            reference: Some(reference.clone()),
            offsets_ms,
        }
    }

    pub fn offset(&self, node: &NodeId) -> Duration {
        Duration::milliseconds(self.offsets_ms.get(node).copied().unwrap_or(0))
    }

    pub fn normalize(&self, node: &NodeId, observed: DateTime<Utc>) -> DateTime<Utc> {
        observed - self.offset(node)
    }

    pub fn is_aligned(&self) -> bool {
        self.reference.is_some()
    }
}

/// Timeline construction options
#[derive(Debug, Clone, Default)]
pub struct TimelineOptions {
    pub sync_marker: Option<Regex>,
    pub time_range: TimeRange,
}

/// Position of one record on the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineEntry {
    /// Normalized time
    pub at: DateTime<Utc>,
    pub id: RecordId,
}

/// Merged, time-ordered view over all records of a bundle.
///
/// Built once per run and read-only afterwards. Owns the records; everything
/// downstream refers to them by `RecordId`.
#[derive(Debug, Default)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
    /// Same order as `entries`
    records: Vec<Record>,
    index: HashMap<RecordId, usize>,
    offsets: ClockOffsets,
    excluded: usize,
}

impl Timeline {
    pub fn build(records: Vec<Record>, options: &TimelineOptions) -> Self {
        let offsets = match &options.sync_marker {
            Some(marker) => ClockOffsets::from_markers(&records, marker),
            None => ClockOffsets::default(),
        };

        let total = records.len();
        let mut placed: Vec<(TimelineEntry, Record)> = records
            .into_iter()
            .filter_map(|record| {
                let at = offsets.normalize(record.node(), record.timestamp());
                options.time_range.contains(at).then(|| {
                    let entry = TimelineEntry {
                        at,
                        id: record.id(),
                    };
                    (entry, record)
                })
            })
            .collect();
        let excluded = total - placed.len();

        placed.sort_by(|(a, ra), (b, rb)| {
            a.at.cmp(&b.at)
                .then_with(|| ra.node().cmp(rb.node()))
                .then_with(|| a.id.cmp(&b.id))
        });

        let (entries, records): (Vec<_>, Vec<_>) = placed.into_iter().unzip();
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id, i))
            .collect();

        tracing::debug!(
            records = entries.len(),
            excluded,
            aligned = offsets.is_aligned(),
            "built timeline"
        );

        Self {
            entries,
            records,
            index,
            offsets,
            excluded,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn offsets(&self) -> &ClockOffsets {
        &self.offsets
    }

    /// Records dropped by the time-range filter
    pub fn excluded(&self) -> usize {
        self.excluded
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Records in timeline order with their normalized time
    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, &Record)> {
        self.entries
            .iter()
            .zip(&self.records)
            .map(|(entry, record)| (entry.at, record))
    }

    pub fn logs(&self) -> impl Iterator<Item = (DateTime<Utc>, &LogEvent)> {
        self.iter()
            .filter_map(|(at, record)| record.as_log().map(|log| (at, log)))
    }

    pub fn metrics(&self) -> impl Iterator<Item = (DateTime<Utc>, &MetricSample)> {
        self.iter()
            .filter_map(|(at, record)| record.as_metric().map(|m| (at, m)))
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.index.get(&id).map(|&i| &self.records[i])
    }

    pub fn normalized(&self, id: RecordId) -> Option<DateTime<Utc>> {
        self.index.get(&id).map(|&i| self.entries[i].at)
    }

    /// Metric samples grouped into per-(node, metric) series, in time order
    pub fn metric_series(&self) -> MetricSeries {
        let mut series = MetricSeries::new();
        for (at, sample) in self.metrics() {
            series
                .entry(SeriesKey {
                    node: sample.node.clone(),
                    name: sample.name.clone(),
                })
                .or_default()
                .push(SeriesPoint {
                    at,
                    value: sample.value,
                    id: sample.id,
                });
        }
        series
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey {
    pub node: NodeId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub at: DateTime<Utc>,
    pub value: f64,
    pub id: RecordId,
}

pub type MetricSeries = BTreeMap<SeriesKey, Vec<SeriesPoint>>;
