// Rule set
//
// Rules are pure functions over a read-only context. They never see each
// other's output and may run in any order or in parallel.

mod config_drift;
mod custom;
mod logs;
mod metrics;
pub mod settings;
pub mod window;

pub use config_drift::ConfigDrift;
pub use custom::{CustomThresholdRule, CustomWindowedRule};
pub use logs::{
    BlockedThreads, DroppedMessagesCluster, DroppedMessagesNode, ErrorBurst, GcPause, GcPressure,
    PendingCompactions, SchemaDisagreement, SlowQueries, TombstoneScan,
};
pub use metrics::{MetricOutlier, SystemBottleneck};
pub use settings::{RuleSettings, ThresholdRuleConfig, WindowedRuleConfig};

use crate::error::{Error, Result, RuleError};
use crate::timeline::{MetricSeries, Timeline};
use sperf_types::{Bundle, ConfigEntry, Finding};

/// A diagnostic rule
pub trait Rule: Send + Sync {
    /// Stable rule identifier, used in findings
    fn id(&self) -> &str;

    /// One-line description shown by `sperf rules`
    fn description(&self) -> &str;

    /// Evaluate against the whole context.
    ///
    /// Must not mutate shared state; failures are reported through `RuleError`.
    fn evaluate(&self, ctx: &RuleContext<'_>) -> std::result::Result<Vec<Finding>, RuleError>;
}

/// Read-only input shared by all rules of a run
pub struct RuleContext<'a> {
    pub bundle: &'a Bundle,
    pub timeline: &'a Timeline,
    pub config: &'a [ConfigEntry],
    series: MetricSeries,
}

impl<'a> RuleContext<'a> {
    pub fn new(bundle: &'a Bundle, timeline: &'a Timeline, config: &'a [ConfigEntry]) -> Self {
        Self {
            bundle,
            timeline,
            config,
            series: timeline.metric_series(),
        }
    }

    /// Metric samples grouped by (node, metric name), in timeline order
    pub fn series(&self) -> &MetricSeries {
        &self.series
    }
}

/// Explicit, ordered rule set handed to the engine.
///
/// Registration order is the order findings are merged in.
#[derive(Default)]
pub struct RuleRegistry {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in catalog configured by `settings`, followed by the
    /// user-defined windowed and threshold rules
    pub fn with_builtin(settings: &RuleSettings) -> Result<Self> {
        let mut registry = Self::new();
        let builtin: Vec<Box<dyn Rule>> = vec![
            Box::new(DroppedMessagesCluster::new(settings.dropped_messages_cluster)?),
            Box::new(DroppedMessagesNode::new(settings.dropped_messages_node)?),
            Box::new(GcPause::new(settings.gc_pause)),
            Box::new(GcPressure::new(settings.gc_pressure)?),
            Box::new(PendingCompactions::new(settings.pending_compactions.clone())),
            Box::new(BlockedThreads::new(settings.blocked_threads)),
            Box::new(TombstoneScan::new(settings.tombstone_scan)),
            Box::new(SchemaDisagreement::new(&settings.schema_disagreement)?),
            Box::new(ErrorBurst::new(settings.error_burst)?),
            Box::new(SlowQueries::new(settings.slow_queries)),
            Box::new(MetricOutlier::new(settings.metric_outlier)),
            Box::new(SystemBottleneck::new(settings.system_bottleneck)),
            Box::new(ConfigDrift::new(settings.config_drift.clone())),
        ];
        for rule in builtin {
            if settings.is_disabled(rule.id()) {
                tracing::debug!(rule = rule.id(), "rule disabled");
                continue;
            }
            registry.register(rule)?;
        }

        for config in &settings.windowed {
            if !settings.is_disabled(&config.id) {
                registry.register(Box::new(CustomWindowedRule::new(config)?))?;
            }
        }
        for config in &settings.threshold {
            if !settings.is_disabled(&config.id) {
                registry.register(Box::new(CustomThresholdRule::new(config)?))?;
            }
        }
        Ok(registry)
    }

    /// Add a rule; ids must be unique
    pub fn register(&mut self, rule: Box<dyn Rule>) -> Result<()> {
        if self.rules.iter().any(|r| r.id() == rule.id()) {
            return Err(Error::DuplicateRule(rule.id().to_string()));
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn rules(&self) -> &[Box<dyn Rule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.id()).collect()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::timeline::TimelineOptions;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use sperf_types::{
        ArtifactFile, ArtifactKind, FileId, LogEvent, LogLevel, MetricSample, NodeId, Record,
        RecordId,
    };
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    pub fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    /// Records and config entries for an in-memory bundle
    #[derive(Default)]
    pub struct Fixture {
        records: Vec<Record>,
        config: Vec<ConfigEntry>,
        seqs: BTreeMap<u32, u32>,
        files: BTreeMap<u32, (String, String)>,
    }

    impl Fixture {
        fn file_for(&mut self, node: &str, name: &str) -> u32 {
            if let Some((&id, _)) = self
                .files
                .iter()
                .find(|(_, (n, f))| n == node && f == name)
            {
                return id;
            }
            let id = self.files.len() as u32;
            self.files.insert(id, (node.to_string(), name.to_string()));
            id
        }

        fn next_id(&mut self, file: u32) -> RecordId {
            let seq = self.seqs.entry(file).or_insert(0);
            let id = RecordId::new(FileId(file), *seq);
            *seq += 1;
            id
        }

        pub fn log(
            &mut self,
            node: &str,
            secs: i64,
            level: LogLevel,
            component: &str,
            message: &str,
        ) -> RecordId {
            self.log_with_detail(node, secs, level, component, message, &[])
        }

        /// A log event followed by continuation lines
        pub fn log_with_detail(
            &mut self,
            node: &str,
            secs: i64,
            level: LogLevel,
            component: &str,
            message: &str,
            detail: &[&str],
        ) -> RecordId {
            let detail: Vec<String> = detail.iter().map(|l| l.to_string()).collect();
            let file = self.file_for(node, "system.log");
            let id = self.next_id(file);
            self.records.push(Record::Log(LogEvent {
                id,
                node: NodeId::from(node),
                timestamp: at(secs),
                level,
                thread: "main".into(),
                component: component.into(),
                message: message.into(),
                fields: sperf_parsers::log::fields::extract(component, message, &detail),
                detail,
                line: id.seq as u64 + 1,
            }));
            id
        }

        pub fn metric(&mut self, node: &str, secs: i64, name: &str, value: f64) -> RecordId {
            let file = self.file_for(node, "metrics.csv");
            let id = self.next_id(file);
            self.records.push(Record::Metric(MetricSample {
                id,
                node: NodeId::from(node),
                name: name.into(),
                timestamp: at(secs),
                value,
                unit: None,
                tags: BTreeMap::new(),
                line: id.seq as u64 + 1,
            }));
            id
        }

        pub fn config(&mut self, node: &str, file_name: &str, key: &str, value: &str) {
            let file = self.file_for(node, file_name);
            self.config.push(ConfigEntry {
                node: NodeId::from(node),
                file: FileId(file),
                key: key.into(),
                value: value.into(),
                line: self.config.len() as u64 + 1,
            });
        }

        pub fn bundle(&self) -> Bundle {
            let files = self
                .files
                .iter()
                .map(|(&id, (node, name))| ArtifactFile {
                    id: FileId(id),
                    node: NodeId::from(node.as_str()),
                    kind: if name.ends_with(".log") {
                        ArtifactKind::Log
                    } else if name.ends_with(".csv") {
                        ArtifactKind::Metrics
                    } else {
                        ArtifactKind::Config
                    },
                    path: PathBuf::from(format!("/bundle/{}/conf/{}", node, name)),
                    relative_path: format!("conf/{}", name),
                })
                .collect();
            // Ids are fixture-assigned; keep them instead of re-sorting
            Bundle {
                id: "fixture".into(),
                root: PathBuf::from("/bundle"),
                nodes: Vec::new(),
                files,
                skipped: Vec::new(),
            }
        }

        pub fn timeline(&self) -> Timeline {
            Timeline::build(self.records.clone(), &TimelineOptions::default())
        }

        /// Evaluate one rule against the fixture
        pub fn run(&self, rule: &dyn Rule) -> Vec<Finding> {
            let bundle = self.bundle();
            let timeline = self.timeline();
            let ctx = RuleContext::new(&bundle, &timeline, &self.config);
            rule.evaluate(&ctx).expect("rule evaluation")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_order() {
        let registry = RuleRegistry::with_builtin(&RuleSettings::default()).unwrap();
        assert_eq!(
            registry.ids(),
            vec![
                "dropped-messages-cluster",
                "dropped-messages-node",
                "gc-pause",
                "gc-pressure",
                "pending-compactions",
                "blocked-threads",
                "tombstone-scan",
                "schema-disagreement",
                "error-burst",
                "slow-queries",
                "metric-outlier",
                "system-bottleneck",
                "config-drift",
            ]
        );
    }

    #[test]
    fn test_disabled_and_custom_rules() {
        let settings = RuleSettings {
            disabled: vec!["gc-pause".into(), "config-drift".into()],
            threshold: vec![ThresholdRuleConfig {
                id: "heap-high".into(),
                metric: "heap_used".into(),
                max: 1.0,
                severity: sperf_types::Severity::Warning,
                description: None,
            }],
            ..Default::default()
        };
        let registry = RuleRegistry::with_builtin(&settings).unwrap();
        let ids = registry.ids();
        assert!(!ids.contains(&"gc-pause"));
        assert!(!ids.contains(&"config-drift"));
        assert_eq!(ids.last(), Some(&"heap-high"));
    }

    #[test]
    fn test_out_of_range_window_fails_registry() {
        let mut settings = RuleSettings::default();
        settings.error_burst.window_secs = u64::MAX;
        assert!(matches!(
            RuleRegistry::with_builtin(&settings),
            Err(Error::InvalidRule { id, .. }) if id == "error-burst"
        ));
    }

    #[test]
    fn test_custom_rule_cannot_shadow_builtin() {
        let settings = RuleSettings {
            windowed: vec![WindowedRuleConfig {
                id: "gc-pause".into(),
                pattern: "GC".into(),
                min_count: 1,
                window_secs: 1,
                min_nodes: 1,
                severity: sperf_types::Severity::Info,
                description: None,
            }],
            ..Default::default()
        };
        assert!(matches!(
            RuleRegistry::with_builtin(&settings),
            Err(Error::DuplicateRule(id)) if id == "gc-pause"
        ));
    }
}
