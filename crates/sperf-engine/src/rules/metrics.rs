// Rules over metric series

use super::settings::{BottleneckSettings, OutlierSettings};
use super::{Rule, RuleContext};
use crate::error::RuleError;
use crate::timeline::SeriesPoint;
use chrono::{DateTime, Utc};
use sperf_types::{Finding, NodeId, RecordId, Severity, TimeWindow};
use std::collections::{BTreeMap, VecDeque};

type RuleResult = std::result::Result<Vec<Finding>, RuleError>;

pub struct MetricOutlier {
    settings: OutlierSettings,
}

impl MetricOutlier {
    pub const ID: &'static str = "metric-outlier";

    pub fn new(settings: OutlierSettings) -> Self {
        Self { settings }
    }

    /// Points deviating from the trailing baseline, with their distance in
    /// standard deviations
    fn outliers<'p>(&self, points: &'p [SeriesPoint]) -> Vec<(&'p SeriesPoint, f64)> {
        let capacity = self.settings.window.max(1);
        let min_samples = self.settings.min_samples.clamp(2, capacity);
        let mut baseline: VecDeque<f64> = VecDeque::with_capacity(capacity);
        let mut found = Vec::new();

        for point in points {
            if baseline.len() >= min_samples {
                let n = baseline.len() as f64;
                let mean = baseline.iter().sum::<f64>() / n;
                let variance = baseline.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                let std = variance.sqrt();
                // Flat baseline: any change would be an infinite deviation
                if std > 0.0 {
                    let distance = (point.value - mean).abs() / std;
                    if distance > self.settings.sigma {
                        found.push((point, distance));
                    }
                }
            }
            if baseline.len() == capacity {
                baseline.pop_front();
            }
            baseline.push_back(point.value);
        }
        found
    }
}

impl Rule for MetricOutlier {
    fn id(&self) -> &str {
        Self::ID
    }

    fn description(&self) -> &str {
        "Metric samples far outside their trailing baseline"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleResult {
        let mut findings = Vec::new();
        for (key, points) in ctx.series() {
            let outliers = self.outliers(points);
            let Some(window) = TimeWindow::covering(outliers.iter().map(|(p, _)| p.at)) else {
                continue;
            };
            let worst = outliers.iter().map(|(_, d)| *d).fold(0.0_f64, f64::max);
            let explanation = format!(
                "{}: {} samples more than {}σ from the trailing mean (worst {:.1}σ)",
                key.name,
                outliers.len(),
                self.settings.sigma,
                worst,
            );
            findings.push(
                Finding::new(Self::ID, Severity::Warning, explanation)
                    .with_node(key.node.clone())
                    .with_window(window)
                    .with_records(outliers.iter().map(|(p, _)| p.id)),
            );
        }
        Ok(findings)
    }
}

/// One resource dimension judged by `SystemBottleneck`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Resource {
    Cpu,
    IoWait,
    DiskQueue,
}

impl Resource {
    fn label(&self) -> &'static str {
        match self {
            Resource::Cpu => "CPU busy",
            Resource::IoWait => "CPU iowait",
            Resource::DiskQueue => "disk queue depth",
        }
    }

    fn unit(&self) -> &'static str {
        match self {
            Resource::Cpu | Resource::IoWait => "%",
            Resource::DiskQueue => "",
        }
    }
}

const CPU_BUSY: [&str; 4] = ["cpu.%user", "cpu.%system", "cpu.%nice", "cpu.%steal"];

fn is_queue_metric(name: &str) -> bool {
    name.starts_with("disk.") && (name.ends_with(".aqu-sz") || name.ends_with(".avgqu-sz"))
}

/// One observation of a resource: a value and the records it came from
struct Observation {
    at: DateTime<Utc>,
    value: f64,
    records: Vec<RecordId>,
}

pub struct SystemBottleneck {
    settings: BottleneckSettings,
}

impl SystemBottleneck {
    pub const ID: &'static str = "system-bottleneck";

    pub fn new(settings: BottleneckSettings) -> Self {
        Self { settings }
    }

    fn limit(&self, resource: Resource) -> f64 {
        match resource {
            Resource::Cpu => self.settings.cpu_percent,
            Resource::IoWait => self.settings.iowait_percent,
            Resource::DiskQueue => self.settings.queue_depth,
        }
    }

    /// Observations per (node, resource) built from the iostat series
    fn observations(ctx: &RuleContext<'_>) -> BTreeMap<(NodeId, Resource), Vec<Observation>> {
        let mut cpu: BTreeMap<NodeId, BTreeMap<DateTime<Utc>, Observation>> = BTreeMap::new();
        let mut result: BTreeMap<(NodeId, Resource), Vec<Observation>> = BTreeMap::new();

        for (key, points) in ctx.series() {
            let name = key.name.as_str();
            if CPU_BUSY.contains(&name) {
                // Busy CPU is the sum of several columns at the same instant
                let per_time = cpu.entry(key.node.clone()).or_default();
                for point in points {
                    let obs = per_time.entry(point.at).or_insert_with(|| Observation {
                        at: point.at,
                        value: 0.0,
                        records: Vec::new(),
                    });
                    obs.value += point.value;
                    obs.records.push(point.id);
                }
            } else if name == "cpu.%iowait" || is_queue_metric(name) {
                let resource = if name == "cpu.%iowait" {
                    Resource::IoWait
                } else {
                    Resource::DiskQueue
                };
                result
                    .entry((key.node.clone(), resource))
                    .or_default()
                    .extend(points.iter().map(|p| Observation {
                        at: p.at,
                        value: p.value,
                        records: vec![p.id],
                    }));
            }
        }

        for (node, per_time) in cpu {
            result.insert((node, Resource::Cpu), per_time.into_values().collect());
        }
        result
    }
}

impl Rule for SystemBottleneck {
    fn id(&self) -> &str {
        Self::ID
    }

    fn description(&self) -> &str {
        "Sustained CPU, iowait or disk queue saturation from iostat"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleResult {
        let mut findings = Vec::new();
        for ((node, resource), observations) in Self::observations(ctx) {
            if observations.is_empty() {
                continue;
            }
            let limit = self.limit(resource);
            let over: Vec<&Observation> =
                observations.iter().filter(|o| o.value > limit).collect();
            let share = over.len() as f64 * 100.0 / observations.len() as f64;
            if over.is_empty() || share <= self.settings.min_share_percent {
                continue;
            }
            let Some(window) = TimeWindow::covering(over.iter().map(|o| o.at)) else {
                continue;
            };

            let peak = over.iter().map(|o| o.value).fold(f64::MIN, f64::max);
            let mut records: Vec<RecordId> =
                over.iter().flat_map(|o| o.records.iter().copied()).collect();
            records.sort();

            let explanation = format!(
                "{} above {}{} in {} of {} samples ({:.1}%, peak {:.1}{})",
                resource.label(),
                limit,
                resource.unit(),
                over.len(),
                observations.len(),
                share,
                peak,
                resource.unit(),
            );
            findings.push(
                Finding::new(Self::ID, Severity::Warning, explanation)
                    .with_node(node)
                    .with_window(window)
                    .with_records(records),
            );
        }
        Ok(findings)
    }
}
