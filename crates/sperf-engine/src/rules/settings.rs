use serde::{Deserialize, Serialize};
use sperf_types::Severity;

/// Thresholds of the built-in rules plus user-defined rules
/// (the `[rules]` configuration section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSettings {
    /// Rule ids that are not registered at all
    pub disabled: Vec<String>,
    pub dropped_messages_cluster: ClusterWindow,
    pub dropped_messages_node: NodeWindow,
    pub gc_pause: GcPauseSettings,
    pub gc_pressure: NodeWindow,
    pub pending_compactions: PendingCompactionsSettings,
    pub blocked_threads: BlockedThreadsSettings,
    pub tombstone_scan: TombstoneSettings,
    pub schema_disagreement: PatternSettings,
    pub error_burst: NodeWindow,
    pub slow_queries: SlowQuerySettings,
    pub metric_outlier: OutlierSettings,
    pub system_bottleneck: BottleneckSettings,
    pub config_drift: ConfigDriftSettings,
    /// `[[rules.windowed]]`
    pub windowed: Vec<WindowedRuleConfig>,
    /// `[[rules.threshold]]`
    pub threshold: Vec<ThresholdRuleConfig>,
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self {
            disabled: Vec::new(),
            dropped_messages_cluster: ClusterWindow {
                window_secs: 5,
                min_nodes: 2,
            },
            dropped_messages_node: NodeWindow {
                min_count: 5,
                window_secs: 60,
            },
            gc_pause: GcPauseSettings::default(),
            gc_pressure: NodeWindow {
                min_count: 10,
                window_secs: 60,
            },
            pending_compactions: PendingCompactionsSettings::default(),
            blocked_threads: BlockedThreadsSettings::default(),
            tombstone_scan: TombstoneSettings::default(),
            schema_disagreement: PatternSettings::default(),
            error_burst: NodeWindow {
                min_count: 20,
                window_secs: 60,
            },
            slow_queries: SlowQuerySettings::default(),
            metric_outlier: OutlierSettings::default(),
            system_bottleneck: BottleneckSettings::default(),
            config_drift: ConfigDriftSettings::default(),
            windowed: Vec::new(),
            threshold: Vec::new(),
        }
    }
}

impl RuleSettings {
    pub fn is_disabled(&self, id: &str) -> bool {
        self.disabled.iter().any(|d| d == id)
    }
}

/// Events on at least `min_nodes` distinct nodes within `window_secs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterWindow {
    pub window_secs: u64,
    pub min_nodes: usize,
}

/// At least `min_count` events on one node within `window_secs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeWindow {
    pub min_count: usize,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcPauseSettings {
    pub warning_ms: u64,
    pub critical_ms: u64,
}

impl Default for GcPauseSettings {
    fn default() -> Self {
        Self {
            warning_ms: 500,
            critical_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingCompactionsSettings {
    pub pool: String,
    pub min_pending: u64,
}

impl Default for PendingCompactionsSettings {
    fn default() -> Self {
        Self {
            pool: "CompactionExecutor".to_string(),
            min_pending: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockedThreadsSettings {
    pub min_blocked: u64,
}

impl Default for BlockedThreadsSettings {
    fn default() -> Self {
        Self { min_blocked: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TombstoneSettings {
    pub warning: u64,
    pub critical: u64,
}

impl Default for TombstoneSettings {
    fn default() -> Self {
        Self {
            warning: 1000,
            critical: 100_000,
        }
    }
}

/// debug.log "operations were slow" reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlowQuerySettings {
    /// Slow operations a node must report in total before it is flagged
    pub min_operations: u64,
    /// A single operation at least this slow makes the finding critical
    pub critical_ms: u64,
}

impl Default for SlowQuerySettings {
    fn default() -> Self {
        Self {
            min_operations: 1,
            critical_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSettings {
    pub pattern: String,
}

impl Default for PatternSettings {
    fn default() -> Self {
        Self {
            pattern: r"(?i)schema (version )?(mismatch|disagreement)|schema versions? (do not|don't) match|(no|not reached) schema agreement|schema agreement not reached|could not reach schema agreement".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierSettings {
    /// Distance from the trailing mean, in standard deviations
    pub sigma: f64,
    /// Number of previous samples forming the baseline
    pub window: usize,
    /// Baseline size needed before samples are judged
    pub min_samples: usize,
}

impl Default for OutlierSettings {
    fn default() -> Self {
        Self {
            sigma: 3.0,
            window: 30,
            min_samples: 10,
        }
    }
}

/// iostat limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BottleneckSettings {
    /// user + system + nice + steal
    pub cpu_percent: f64,
    pub iowait_percent: f64,
    pub queue_depth: f64,
    /// Share of samples that must exceed a limit before it is reported
    pub min_share_percent: f64,
}

impl Default for BottleneckSettings {
    fn default() -> Self {
        Self {
            cpu_percent: 50.0,
            iowait_percent: 5.0,
            queue_depth: 1.0,
            min_share_percent: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigDriftSettings {
    /// Keys expected to differ per node
    pub ignore_keys: Vec<String>,
}

impl Default for ConfigDriftSettings {
    fn default() -> Self {
        Self {
            ignore_keys: [
                "listen_address",
                "rpc_address",
                "broadcast_address",
                "broadcast_rpc_address",
                "native_transport_address",
                "initial_token",
                "dc",
                "rack",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
        }
    }
}

/// User-defined windowed rule: `min_count` log messages matching `pattern`
/// within `window_secs`, on at least `min_nodes` nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowedRuleConfig {
    pub id: String,
    pub pattern: String,
    pub min_count: usize,
    pub window_secs: u64,
    #[serde(default = "default_min_nodes")]
    pub min_nodes: usize,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub description: Option<String>,
}

/// User-defined threshold rule: samples of `metric` above `max`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRuleConfig {
    pub id: String,
    pub metric: String,
    pub max: f64,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_min_nodes() -> usize {
    1
}

fn default_severity() -> Severity {
    Severity::Warning
}
