// Rules over log events
//
// Field names (`event`, `gc_ms`, `dropped`, `pool`, `pending`, `blocked`,
// `tombstones`, `slow_ops`, `slowest_ms`) come from structured extraction at
// parse time.

use super::settings::{
    BlockedThreadsSettings, ClusterWindow, GcPauseSettings, NodeWindow, PatternSettings,
    PendingCompactionsSettings, SlowQuerySettings, TombstoneSettings,
};
use super::window::{WindowEvent, detect_bursts, detect_node_bursts, window_span};
use super::{Rule, RuleContext};
use crate::error::{Error, Result, RuleError};
use crate::timeline::Timeline;
use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use sperf_types::{Finding, LogEvent, LogLevel, NodeId, RecordId, Severity, TimeWindow};
use std::collections::BTreeMap;

type RuleResult = std::result::Result<Vec<Finding>, RuleError>;

/// Log events whose extracted `event` field equals `kind`, as window events
fn events_of_kind(ctx: &RuleContext<'_>, kind: &str, weight_field: Option<&str>) -> Vec<WindowEvent> {
    ctx.timeline
        .logs()
        .filter(|(_, log)| log.field("event") == Some(kind))
        .map(|(at, log)| WindowEvent {
            at,
            node: log.node.clone(),
            id: log.id,
            weight: weight_field.and_then(|f| log.field_u64(f)).unwrap_or(1),
        })
        .collect()
}

/// Matching events of one node (and subject, where the rule has one)
struct Hits {
    times: Vec<DateTime<Utc>>,
    records: Vec<RecordId>,
    max: u64,
    /// Events at or above the critical threshold of a two-level rule
    critical: usize,
}

impl Hits {
    fn new() -> Self {
        Self {
            times: Vec::new(),
            records: Vec::new(),
            max: 0,
            critical: 0,
        }
    }

    fn add(&mut self, at: DateTime<Utc>, id: RecordId, value: u64) {
        self.times.push(at);
        self.records.push(id);
        self.max = self.max.max(value);
    }

    fn add_leveled(&mut self, at: DateTime<Utc>, id: RecordId, value: u64, severity: Severity) {
        if severity == Severity::Critical {
            self.critical += 1;
        }
        self.add(at, id, value);
    }

    fn severity(&self) -> Severity {
        if self.critical > 0 {
            Severity::Critical
        } else {
            Severity::Warning
        }
    }

    fn finding(self, rule: &str, severity: Severity, node: NodeId, explanation: String) -> Option<Finding> {
        let window = TimeWindow::covering(self.times)?;
        Some(
            Finding::new(rule, severity, explanation)
                .with_node(node)
                .with_window(window)
                .with_records(self.records),
        )
    }
}

/// Two-level threshold: `>= critical` is critical, `>= warning` is warning
fn level(value: u64, warning: u64, critical: u64) -> Option<Severity> {
    if value >= critical {
        Some(Severity::Critical)
    } else if value >= warning {
        Some(Severity::Warning)
    } else {
        None
    }
}

fn node_list<'a>(nodes: impl IntoIterator<Item = &'a NodeId>) -> String {
    nodes
        .into_iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

// --- dropped messages ---

pub struct DroppedMessagesCluster {
    settings: ClusterWindow,
    span: TimeDelta,
}

impl DroppedMessagesCluster {
    pub const ID: &'static str = "dropped-messages-cluster";

    pub fn new(settings: ClusterWindow) -> Result<Self> {
        let span = window_span(Self::ID, settings.window_secs)?;
        Ok(Self { settings, span })
    }
}

impl Rule for DroppedMessagesCluster {
    fn id(&self) -> &str {
        Self::ID
    }

    fn description(&self) -> &str {
        "Dropped messages on several nodes at about the same time"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleResult {
        let events = events_of_kind(ctx, "dropped_messages", Some("dropped"));
        let min_nodes = self.settings.min_nodes.max(2);
        let bursts = detect_bursts(&events, self.span, min_nodes, min_nodes);

        Ok(bursts
            .into_iter()
            .map(|burst| {
                let explanation = format!(
                    "dropped messages on {} nodes within {}s ({} messages dropped in {} events; nodes: {})",
                    burst.nodes.len(),
                    self.settings.window_secs,
                    burst.total_weight,
                    burst.count(),
                    node_list(&burst.nodes),
                );
                Finding::new(Self::ID, Severity::Critical, explanation)
                    .with_nodes(burst.nodes)
                    .with_window(burst.window)
                    .with_records(burst.records)
            })
            .collect())
    }
}

pub struct DroppedMessagesNode {
    settings: NodeWindow,
    span: TimeDelta,
}

impl DroppedMessagesNode {
    pub const ID: &'static str = "dropped-messages-node";

    pub fn new(settings: NodeWindow) -> Result<Self> {
        let span = window_span(Self::ID, settings.window_secs)?;
        Ok(Self { settings, span })
    }
}

impl Rule for DroppedMessagesNode {
    fn id(&self) -> &str {
        Self::ID
    }

    fn description(&self) -> &str {
        "Repeated dropped-message reports on a single node"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleResult {
        let events = events_of_kind(ctx, "dropped_messages", Some("dropped"));
        let bursts = detect_node_bursts(&events, self.span, self.settings.min_count);

        Ok(bursts
            .into_iter()
            .map(|burst| {
                let explanation = format!(
                    "{} dropped-message reports within {}s ({} messages dropped)",
                    burst.count(),
                    self.settings.window_secs,
                    burst.total_weight,
                );
                Finding::new(Self::ID, Severity::Warning, explanation)
                    .with_nodes(burst.nodes)
                    .with_window(burst.window)
                    .with_records(burst.records)
            })
            .collect())
    }
}

// --- GC ---

pub struct GcPause {
    settings: GcPauseSettings,
}

impl GcPause {
    pub const ID: &'static str = "gc-pause";

    pub fn new(settings: GcPauseSettings) -> Self {
        Self { settings }
    }
}

impl Rule for GcPause {
    fn id(&self) -> &str {
        Self::ID
    }

    fn description(&self) -> &str {
        "Long garbage collection pauses"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleResult {
        let mut per_node: BTreeMap<NodeId, Hits> = BTreeMap::new();
        for (at, log) in ctx.timeline.logs() {
            let Some(ms) = log.field_u64("gc_ms") else {
                continue;
            };
            if let Some(severity) = level(ms, self.settings.warning_ms, self.settings.critical_ms) {
                per_node
                    .entry(log.node.clone())
                    .or_insert_with(Hits::new)
                    .add_leveled(at, log.id, ms, severity);
            }
        }

        Ok(per_node
            .into_iter()
            .filter_map(|(node, hits)| {
                let mut explanation = format!(
                    "{} GC pauses of at least {}ms (longest {}ms",
                    hits.records.len(),
                    self.settings.warning_ms,
                    hits.max,
                );
                if hits.critical > 0 {
                    explanation.push_str(&format!(
                        ", {} of at least {}ms",
                        hits.critical, self.settings.critical_ms
                    ));
                }
                explanation.push(')');
                let severity = hits.severity();
                hits.finding(Self::ID, severity, node, explanation)
            })
            .collect())
    }
}

pub struct GcPressure {
    settings: NodeWindow,
    span: TimeDelta,
}

impl GcPressure {
    pub const ID: &'static str = "gc-pressure";

    pub fn new(settings: NodeWindow) -> Result<Self> {
        let span = window_span(Self::ID, settings.window_secs)?;
        Ok(Self { settings, span })
    }
}

impl Rule for GcPressure {
    fn id(&self) -> &str {
        Self::ID
    }

    fn description(&self) -> &str {
        "Frequent garbage collections on a node"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleResult {
        let events = events_of_kind(ctx, "gc_pause", Some("gc_ms"));
        let bursts = detect_node_bursts(&events, self.span, self.settings.min_count);

        Ok(bursts
            .into_iter()
            .map(|burst| {
                let explanation = format!(
                    "{} GC pauses within {}s ({}ms paused in total)",
                    burst.count(),
                    self.settings.window_secs,
                    burst.total_weight,
                );
                Finding::new(Self::ID, Severity::Warning, explanation)
                    .with_nodes(burst.nodes)
                    .with_window(burst.window)
                    .with_records(burst.records)
            })
            .collect())
    }
}

// --- StatusLogger thread pools ---

fn pool_rows(timeline: &Timeline) -> impl Iterator<Item = (DateTime<Utc>, &LogEvent)> {
    timeline
        .logs()
        .filter(|(_, log)| log.field("event") == Some("thread_pool"))
}

pub struct PendingCompactions {
    settings: PendingCompactionsSettings,
}

impl PendingCompactions {
    pub const ID: &'static str = "pending-compactions";

    pub fn new(settings: PendingCompactionsSettings) -> Self {
        Self { settings }
    }
}

impl Rule for PendingCompactions {
    fn id(&self) -> &str {
        Self::ID
    }

    fn description(&self) -> &str {
        "Compaction backlog reported by StatusLogger"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleResult {
        let mut per_node: BTreeMap<NodeId, Hits> = BTreeMap::new();
        for (at, log) in pool_rows(ctx.timeline) {
            if log.field("pool") != Some(self.settings.pool.as_str()) {
                continue;
            }
            let Some(pending) = log.field_u64("pending") else {
                continue;
            };
            if pending >= self.settings.min_pending {
                per_node
                    .entry(log.node.clone())
                    .or_insert_with(Hits::new)
                    .add(at, log.id, pending);
            }
        }

        Ok(per_node
            .into_iter()
            .filter_map(|(node, hits)| {
                let explanation = format!(
                    "{} pending tasks reached {} (threshold {}, {} reports)",
                    self.settings.pool,
                    hits.max,
                    self.settings.min_pending,
                    hits.records.len(),
                );
                hits.finding(Self::ID, Severity::Warning, node, explanation)
            })
            .collect())
    }
}

pub struct BlockedThreads {
    settings: BlockedThreadsSettings,
}

impl BlockedThreads {
    pub const ID: &'static str = "blocked-threads";

    pub fn new(settings: BlockedThreadsSettings) -> Self {
        Self { settings }
    }
}

impl Rule for BlockedThreads {
    fn id(&self) -> &str {
        Self::ID
    }

    fn description(&self) -> &str {
        "Thread pools with blocked tasks"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleResult {
        let min_blocked = self.settings.min_blocked.max(1);
        let mut groups: BTreeMap<(NodeId, String), Hits> = BTreeMap::new();
        for (at, log) in pool_rows(ctx.timeline) {
            let (Some(pool), Some(blocked)) = (log.field("pool"), log.field_u64("blocked")) else {
                continue;
            };
            if blocked >= min_blocked {
                groups
                    .entry((log.node.clone(), pool.to_string()))
                    .or_insert_with(Hits::new)
                    .add(at, log.id, blocked);
            }
        }

        Ok(groups
            .into_iter()
            .filter_map(|((node, pool), hits)| {
                let explanation = format!(
                    "{} had up to {} blocked tasks ({} reports)",
                    pool,
                    hits.max,
                    hits.records.len(),
                );
                hits.finding(Self::ID, Severity::Warning, node, explanation)
                    .map(|f| f.with_subject(pool))
            })
            .collect())
    }
}

// --- tombstones ---

pub struct TombstoneScan {
    settings: TombstoneSettings,
}

impl TombstoneScan {
    pub const ID: &'static str = "tombstone-scan";

    pub fn new(settings: TombstoneSettings) -> Self {
        Self { settings }
    }
}

impl Rule for TombstoneScan {
    fn id(&self) -> &str {
        Self::ID
    }

    fn description(&self) -> &str {
        "Reads scanning many tombstones"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleResult {
        let mut per_node: BTreeMap<NodeId, Hits> = BTreeMap::new();
        for (at, log) in ctx.timeline.logs() {
            let Some(tombstones) = log.field_u64("tombstones") else {
                continue;
            };
            if let Some(severity) = level(tombstones, self.settings.warning, self.settings.critical) {
                per_node
                    .entry(log.node.clone())
                    .or_insert_with(Hits::new)
                    .add_leveled(at, log.id, tombstones, severity);
            }
        }

        Ok(per_node
            .into_iter()
            .filter_map(|(node, hits)| {
                let mut explanation = format!(
                    "{} reads scanned at least {} tombstones (most {}",
                    hits.records.len(),
                    self.settings.warning,
                    hits.max,
                );
                if hits.critical > 0 {
                    explanation.push_str(&format!(
                        ", {} of at least {}",
                        hits.critical, self.settings.critical
                    ));
                }
                explanation.push(')');
                let severity = hits.severity();
                hits.finding(Self::ID, severity, node, explanation)
            })
            .collect())
    }
}

// --- schema ---

pub struct SchemaDisagreement {
    pattern: Regex,
}

impl SchemaDisagreement {
    pub const ID: &'static str = "schema-disagreement";

    pub fn new(settings: &PatternSettings) -> Result<Self> {
        let pattern = Regex::new(&settings.pattern).map_err(|e| Error::InvalidRule {
            id: Self::ID.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { pattern })
    }
}

impl Rule for SchemaDisagreement {
    fn id(&self) -> &str {
        Self::ID
    }

    fn description(&self) -> &str {
        "Nodes reporting schema version disagreement"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleResult {
        let mut per_node: BTreeMap<NodeId, Hits> = BTreeMap::new();
        for (at, log) in ctx.timeline.logs() {
            if self.pattern.is_match(&log.message) {
                per_node
                    .entry(log.node.clone())
                    .or_insert_with(Hits::new)
                    .add(at, log.id, 0);
            }
        }

        Ok(per_node
            .into_iter()
            .filter_map(|(node, hits)| {
                let explanation = format!(
                    "schema disagreement reported {} times",
                    hits.records.len()
                );
                hits.finding(Self::ID, Severity::Critical, node, explanation)
            })
            .collect())
    }
}

// --- errors ---

pub struct ErrorBurst {
    settings: NodeWindow,
    span: TimeDelta,
}

impl ErrorBurst {
    pub const ID: &'static str = "error-burst";

    pub fn new(settings: NodeWindow) -> Result<Self> {
        let span = window_span(Self::ID, settings.window_secs)?;
        Ok(Self { settings, span })
    }
}

impl Rule for ErrorBurst {
    fn id(&self) -> &str {
        Self::ID
    }

    fn description(&self) -> &str {
        "Bursts of ERROR-level log events on a node"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleResult {
        let events: Vec<WindowEvent> = ctx
            .timeline
            .logs()
            .filter(|(_, log)| log.level >= LogLevel::Error)
            .map(|(at, log)| WindowEvent {
                at,
                node: log.node.clone(),
                id: log.id,
                weight: 1,
            })
            .collect();
        let bursts = detect_node_bursts(&events, self.span, self.settings.min_count);

        Ok(bursts
            .into_iter()
            .map(|burst| {
                let explanation = format!(
                    "{} errors within {}s",
                    burst.count(),
                    self.settings.window_secs,
                );
                Finding::new(Self::ID, Severity::Warning, explanation)
                    .with_nodes(burst.nodes)
                    .with_window(burst.window)
                    .with_records(burst.records)
            })
            .collect())
    }
}

// --- slow queries ---

/// Slowest operation seen on one node
struct Slowest<'a> {
    ms: u64,
    query: &'a str,
}

pub struct SlowQueries {
    settings: SlowQuerySettings,
}

impl SlowQueries {
    pub const ID: &'static str = "slow-queries";

    pub fn new(settings: SlowQuerySettings) -> Self {
        Self { settings }
    }
}

impl Rule for SlowQueries {
    fn id(&self) -> &str {
        Self::ID
    }

    fn description(&self) -> &str {
        "Operations reported slow by the monitoring task in debug.log"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleResult {
        let mut per_node: BTreeMap<NodeId, (Hits, u64, Option<Slowest<'_>>)> = BTreeMap::new();
        for (at, log) in ctx.timeline.logs() {
            if log.field("event") != Some("slow_queries") {
                continue;
            }
            let ops = log.field_u64("slow_ops").unwrap_or(0);
            let slowest_ms = log.field_u64("slowest_ms").unwrap_or(0);
            let (hits, total, slowest) = per_node
                .entry(log.node.clone())
                .or_insert_with(|| (Hits::new(), 0, None));
            hits.add(at, log.id, slowest_ms);
            *total += ops;
            if let Some(query) = log.field("slowest_query")
                && slowest.as_ref().is_none_or(|s| slowest_ms > s.ms)
            {
                *slowest = Some(Slowest { ms: slowest_ms, query });
            }
        }

        Ok(per_node
            .into_iter()
            .filter(|(_, (_, total, _))| *total >= self.settings.min_operations.max(1))
            .filter_map(|(node, (hits, total, slowest))| {
                let severity = if hits.max >= self.settings.critical_ms {
                    Severity::Critical
                } else {
                    Severity::Warning
                };
                let mut explanation = format!(
                    "{} slow operations in {} reports",
                    total,
                    hits.records.len()
                );
                if let Some(slowest) = slowest {
                    explanation.push_str(&format!(
                        " (slowest {}ms: {})",
                        slowest.ms,
                        sperf_types::truncate(slowest.query, 120)
                    ));
                }
                hits.finding(Self::ID, severity, node, explanation)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::settings::RuleSettings;
    use crate::rules::test_support::{Fixture, at};

    fn dropped(fixture: &mut Fixture, node: &str, secs: i64, count: u32) -> RecordId {
        let message = format!(
            "MUTATION messages were dropped in last 5000 ms: {} internal and 0 cross node. Mean internal dropped latency: 2730 ms",
            count
        );
        fixture.log(node, secs, LogLevel::Info, "MessagingService", &message)
    }

    #[test]
    fn test_dropped_messages_on_two_nodes_is_one_critical_finding() {
        let mut fixture = Fixture::default();
        let a = dropped(&mut fixture, "10.0.0.1", 0, 10);
        let b = dropped(&mut fixture, "10.0.0.2", 1, 5);

        let rule = DroppedMessagesCluster::new(RuleSettings::default().dropped_messages_cluster).unwrap();
        let findings = fixture.run(&rule);
        assert_eq!(findings.len(), 1);

        let finding = &findings[0];
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.nodes.len(), 2);
        assert_eq!(finding.window, Some(TimeWindow::new(at(0), at(1))));
        assert_eq!(
            finding.evidence,
            vec![
                sperf_types::Evidence::record(a),
                sperf_types::Evidence::record(b)
            ]
        );
        assert!(finding.explanation.contains("15 messages dropped"));
    }

    #[test]
    fn test_dropped_messages_far_apart_are_not_clustered() {
        let mut fixture = Fixture::default();
        dropped(&mut fixture, "10.0.0.1", 0, 10);
        dropped(&mut fixture, "10.0.0.2", 30, 5);

        let rule = DroppedMessagesCluster::new(RuleSettings::default().dropped_messages_cluster).unwrap();
        assert!(fixture.run(&rule).is_empty());
    }

    #[test]
    fn test_dropped_messages_node_threshold() {
        let mut fixture = Fixture::default();
        for i in 0..5 {
            dropped(&mut fixture, "10.0.0.1", i * 5, 1);
        }
        dropped(&mut fixture, "10.0.0.2", 0, 1);

        let rule = DroppedMessagesNode::new(RuleSettings::default().dropped_messages_node).unwrap();
        let findings = fixture.run(&rule);
        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings[0].nodes.iter().next().map(NodeId::as_str),
            Some("10.0.0.1")
        );
    }

    #[test]
    fn test_gc_pause_is_one_finding_per_node_at_worst_level() {
        let mut fixture = Fixture::default();
        let gc = |ms: u32| format!("G1 Young Generation GC in {}ms.  G1 Eden Space: 1 -> 0;", ms);
        fixture.log("n1", 0, LogLevel::Info, "GCInspector", &gc(200));
        fixture.log("n1", 10, LogLevel::Warn, "GCInspector", &gc(600));
        fixture.log("n1", 20, LogLevel::Warn, "GCInspector", &gc(700));
        fixture.log("n1", 30, LogLevel::Warn, "GCInspector", &gc(1500));
        fixture.log("n2", 5, LogLevel::Warn, "GCInspector", &gc(550));

        let findings = fixture.run(&GcPause::new(GcPauseSettings::default()));
        assert_eq!(findings.len(), 2);

        let n1 = findings.iter().find(|f| f.nodes.contains(&NodeId::from("n1"))).unwrap();
        assert_eq!(n1.severity, Severity::Critical);
        assert_eq!(n1.evidence.len(), 3);
        assert_eq!(n1.window, Some(TimeWindow::new(at(10), at(30))));
        assert_eq!(
            n1.explanation,
            "3 GC pauses of at least 500ms (longest 1500ms, 1 of at least 1000ms)"
        );

        let n2 = findings.iter().find(|f| f.nodes.contains(&NodeId::from("n2"))).unwrap();
        assert_eq!(n2.severity, Severity::Warning);
        assert_eq!(n2.explanation, "1 GC pauses of at least 500ms (longest 550ms)");
    }

    #[test]
    fn test_gc_pressure() {
        let mut fixture = Fixture::default();
        for i in 0..12 {
            fixture.log("n1", i * 3, LogLevel::Info, "GCInspector", "ParNew GC in 210ms.");
        }
        let findings = fixture.run(&GcPressure::new(RuleSettings::default().gc_pressure).unwrap());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].evidence.len(), 12);
    }

    #[test]
    fn test_status_logger_rules() {
        let mut fixture = Fixture::default();
        fixture.log("n1", 0, LogLevel::Info, "StatusLogger", "CompactionExecutor   2   150   1234   0   0");
        fixture.log("n1", 5, LogLevel::Info, "StatusLogger", "CompactionExecutor   2   40   1300   0   0");
        fixture.log("n1", 5, LogLevel::Info, "StatusLogger", "Native-Transport-Requests   128   0   99   3   12");

        let pending = fixture.run(&PendingCompactions::new(Default::default()));
        assert_eq!(pending.len(), 1);
        assert!(pending[0].explanation.contains("reached 150"));

        let blocked = fixture.run(&BlockedThreads::new(Default::default()));
        assert_eq!(blocked.len(), 1);
        assert!(blocked[0].explanation.starts_with("Native-Transport-Requests"));
        assert_eq!(blocked[0].subject.as_deref(), Some("Native-Transport-Requests"));
    }

    #[test]
    fn test_blocked_pools_survive_aggregation() {
        let mut fixture = Fixture::default();
        fixture.log("n1", 0, LogLevel::Info, "StatusLogger", "Native-Transport-Requests   128   0   99   3   12");
        fixture.log("n1", 60, LogLevel::Info, "StatusLogger", "Native-Transport-Requests   128   0   99   3   15");
        fixture.log("n1", 0, LogLevel::Info, "StatusLogger", "MutationStage   32   10   500   7   7");

        let findings = fixture.run(&BlockedThreads::new(Default::default()));
        assert_eq!(findings.len(), 2);

        let merged = crate::report::aggregate(findings);
        let pools: Vec<_> = merged.iter().filter_map(|f| f.subject.as_deref()).collect();
        assert_eq!(pools, vec!["MutationStage", "Native-Transport-Requests"]);
        assert!(merged[0].explanation.starts_with("MutationStage had up to 7"));
        assert!(merged[1].explanation.starts_with("Native-Transport-Requests had up to 3"));
    }

    #[test]
    fn test_tombstone_levels() {
        let mut fixture = Fixture::default();
        let read = |n: u32| format!("Read 10 live rows and {} tombstone cells for query SELECT * FROM ks.t", n);
        fixture.log("n1", 0, LogLevel::Warn, "ReadCommand", &read(500));
        fixture.log("n1", 1, LogLevel::Warn, "ReadCommand", &read(5000));
        fixture.log("n1", 2, LogLevel::Error, "ReadCommand", &read(200_000));

        let findings = fixture.run(&TombstoneScan::new(TombstoneSettings::default()));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[0].evidence.len(), 2);
        assert_eq!(
            findings[0].explanation,
            "2 reads scanned at least 1000 tombstones (most 200000, 1 of at least 100000)"
        );
    }

    #[test]
    fn test_window_beyond_range_is_invalid_rule() {
        let settings = NodeWindow {
            min_count: 1,
            window_secs: u64::MAX,
        };
        assert!(matches!(
            GcPressure::new(settings),
            Err(Error::InvalidRule { ref id, .. }) if id == "gc-pressure"
        ));
        assert!(DroppedMessagesCluster::new(ClusterWindow {
            window_secs: u64::MAX,
            min_nodes: 2,
        })
        .is_err());
    }

    #[test]
    fn test_schema_disagreement() {
        let mut fixture = Fixture::default();
        fixture.log("n1", 0, LogLevel::Warn, "MigrationManager", "Schema version mismatch detected");
        fixture.log("n2", 0, LogLevel::Info, "MigrationManager", "Schema agreed");

        let rule = SchemaDisagreement::new(&PatternSettings::default()).unwrap();
        let findings = fixture.run(&rule);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);
    }

    #[test]
    fn test_invalid_schema_pattern_is_error() {
        let settings = PatternSettings {
            pattern: "(".to_string(),
        };
        assert!(matches!(
            SchemaDisagreement::new(&settings),
            Err(Error::InvalidRule { .. })
        ));
    }

    fn slow_report(fixture: &mut Fixture, node: &str, secs: i64, detail: &[&str]) -> RecordId {
        let message = format!("{} operations were slow in the last 5003 msecs:", detail.len());
        fixture.log_with_detail(node, secs, LogLevel::Debug, "MonitoringTask", &message, detail)
    }

    #[test]
    fn test_slow_queries_per_node() {
        let mut fixture = Fixture::default();
        slow_report(
            &mut fixture,
            "n1",
            0,
            &["<SELECT * FROM ks.events WHERE id = 1 LIMIT 5000>, time 573 msec - slow timeout 500 msec"],
        );
        slow_report(
            &mut fixture,
            "n1",
            30,
            &[
                "<SELECT * FROM ks.users LIMIT 100>, was slow 2 times: avg/min/max 644/567/721 msec - slow timeout 500 msec/cross-node",
                "<SELECT * FROM ks.events WHERE id = 2 LIMIT 5000>, time 12050 msec - slow timeout 500 msec",
            ],
        );
        slow_report(
            &mut fixture,
            "n2",
            10,
            &["<SELECT * FROM ks.users LIMIT 100>, time 610 msec - slow timeout 500 msec"],
        );

        let findings = fixture.run(&SlowQueries::new(SlowQuerySettings::default()));
        assert_eq!(findings.len(), 2);

        let n1 = findings.iter().find(|f| f.nodes.contains(&NodeId::from("n1"))).unwrap();
        assert_eq!(n1.severity, Severity::Critical);
        assert_eq!(n1.window, Some(TimeWindow::new(at(0), at(30))));
        assert_eq!(
            n1.explanation,
            "3 slow operations in 2 reports (slowest 12050ms: SELECT * FROM ks.events WHERE id = 2 LIMIT 5000)"
        );

        let n2 = findings.iter().find(|f| f.nodes.contains(&NodeId::from("n2"))).unwrap();
        assert_eq!(n2.severity, Severity::Warning);
    }

    #[test]
    fn test_slow_queries_minimum_operations() {
        let mut fixture = Fixture::default();
        slow_report(
            &mut fixture,
            "n1",
            0,
            &["<SELECT * FROM ks.t>, time 600 msec - slow timeout 500 msec"],
        );
        let settings = SlowQuerySettings {
            min_operations: 2,
            ..Default::default()
        };
        assert!(fixture.run(&SlowQueries::new(settings)).is_empty());
    }

    #[test]
    fn test_error_burst() {
        let mut fixture = Fixture::default();
        for i in 0..20 {
            fixture.log("n1", i, LogLevel::Error, "CassandraDaemon", "Exception in thread");
        }
        for i in 0..19 {
            fixture.log("n2", i, LogLevel::Error, "CassandraDaemon", "Exception in thread");
        }
        let findings = fixture.run(&ErrorBurst::new(RuleSettings::default().error_burst).unwrap());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].evidence.len(), 20);
    }
}
