use crate::error::{Error, Result};
use chrono::{DateTime, Duration, TimeDelta, Utc};
use sperf_types::{NodeId, RecordId, TimeWindow};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// One timeline event fed to a windowed rule
#[derive(Debug, Clone)]
pub struct WindowEvent {
    pub at: DateTime<Utc>,
    pub node: NodeId,
    pub id: RecordId,
    /// Rule-specific weight (e.g. number of dropped messages)
    pub weight: u64,
}

/// A maximal run of events during which the window condition held
#[derive(Debug, Clone, PartialEq)]
pub struct Burst {
    pub window: TimeWindow,
    pub nodes: BTreeSet<NodeId>,
    pub records: Vec<RecordId>,
    pub total_weight: u64,
}

impl Burst {
    pub fn count(&self) -> usize {
        self.records.len()
    }
}

/// Window length for rule `id`, rejected when chrono cannot represent it
pub fn window_span(id: &str, secs: u64) -> Result<TimeDelta> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| Error::InvalidRule {
            id: id.to_string(),
            reason: format!("window_secs {} is out of range", secs),
        })
}

/// Sliding window over time-sorted events.
///
/// Expired events are discarded as the window advances, and distinct nodes
/// are counted incrementally, so a pass is O(n) amortized.
struct SlidingWindow<'a> {
    span: Duration,
    items: VecDeque<&'a WindowEvent>,
    per_node: HashMap<&'a NodeId, usize>,
}

impl<'a> SlidingWindow<'a> {
    fn new(span: Duration) -> Self {
        Self {
            span,
            items: VecDeque::new(),
            per_node: HashMap::new(),
        }
    }

    fn push(&mut self, event: &'a WindowEvent) {
        // A span reaching past the calendar's start never expires anything
        let horizon = event.at.checked_sub_signed(self.span);
        while let Some(front) = self.items.front() {
            if horizon.is_none_or(|h| front.at >= h) {
                break;
            }
            if let Some(count) = self.per_node.get_mut(&front.node) {
                *count -= 1;
                if *count == 0 {
                    self.per_node.remove(&front.node);
                }
            }
            self.items.pop_front();
        }
        self.items.push_back(event);
        *self.per_node.entry(&event.node).or_insert(0) += 1;
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn distinct_nodes(&self) -> usize {
        self.per_node.len()
    }
}

struct OpenBurst<'a> {
    events: Vec<&'a WindowEvent>,
}

impl<'a> OpenBurst<'a> {
    fn close(self) -> Option<Burst> {
        let window = TimeWindow::covering(self.events.iter().map(|e| e.at))?;
        let mut records: Vec<RecordId> = self.events.iter().map(|e| e.id).collect();
        records.sort();
        records.dedup();
        Some(Burst {
            window,
            nodes: self.events.iter().map(|e| e.node.clone()).collect(),
            records,
            total_weight: self.events.iter().map(|e| e.weight).sum(),
        })
    }
}

/// Find bursts: periods where at least `min_count` events on at least
/// `min_nodes` distinct nodes fall within `span` of each other.
///
/// `events` must be sorted by time. Consecutive triggering positions extend
/// the same burst, so one burst yields one result.
pub fn detect_bursts(
    events: &[WindowEvent],
    span: Duration,
    min_count: usize,
    min_nodes: usize,
) -> Vec<Burst> {
    let mut window = SlidingWindow::new(span);
    let mut bursts = Vec::new();
    let mut open: Option<OpenBurst<'_>> = None;

    for event in events {
        window.push(event);
        let triggered = window.len() >= min_count.max(1) && window.distinct_nodes() >= min_nodes;

        if triggered {
            match open.as_mut() {
                Some(burst) => burst.events.push(event),
                None => {
                    open = Some(OpenBurst {
                        events: window.items.iter().copied().collect(),
                    })
                }
            }
        } else if let Some(burst) = open.take().and_then(OpenBurst::close) {
            bursts.push(burst);
        }
    }

    if let Some(burst) = open.and_then(OpenBurst::close) {
        bursts.push(burst);
    }
    bursts
}

/// Run burst detection separately for each node
pub fn detect_node_bursts(
    events: &[WindowEvent],
    span: Duration,
    min_count: usize,
) -> Vec<Burst> {
    let mut by_node: BTreeMap<&NodeId, Vec<WindowEvent>> = BTreeMap::new();
    for event in events {
        by_node.entry(&event.node).or_default().push(event.clone());
    }
    by_node
        .values()
        .flat_map(|node_events| detect_bursts(node_events, span, min_count, 1))
        .collect()
}
