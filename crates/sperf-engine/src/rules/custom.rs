// User-defined rules from `[[rules.windowed]]` and `[[rules.threshold]]`

use super::settings::{ThresholdRuleConfig, WindowedRuleConfig};
use super::window::{WindowEvent, detect_bursts, detect_node_bursts, window_span};
use super::{Rule, RuleContext};
use crate::error::{Error, Result, RuleError};
use chrono::TimeDelta;
use regex::Regex;
use sperf_types::{Finding, Severity, TimeWindow};

fn invalid(id: &str, reason: impl Into<String>) -> Error {
    Error::InvalidRule {
        id: id.to_string(),
        reason: reason.into(),
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(invalid(id, "rule id must not be empty"));
    }
    Ok(())
}

/// `min_count` log messages matching a pattern within a time window
pub struct CustomWindowedRule {
    id: String,
    description: String,
    pattern: Regex,
    min_count: usize,
    span: TimeDelta,
    min_nodes: usize,
    severity: Severity,
}

impl CustomWindowedRule {
    pub fn new(config: &WindowedRuleConfig) -> Result<Self> {
        validate_id(&config.id)?;
        if config.min_count == 0 {
            return Err(invalid(&config.id, "min_count must be at least 1"));
        }
        if config.window_secs == 0 {
            return Err(invalid(&config.id, "window_secs must be at least 1"));
        }
        let pattern = Regex::new(&config.pattern).map_err(|e| invalid(&config.id, e.to_string()))?;

        Ok(Self {
            id: config.id.clone(),
            description: config
                .description
                .clone()
                .unwrap_or_else(|| format!("Log messages matching /{}/", config.pattern)),
            pattern,
            min_count: config.min_count,
            span: window_span(&config.id, config.window_secs)?,
            min_nodes: config.min_nodes.max(1),
            severity: config.severity,
        })
    }
}

impl Rule for CustomWindowedRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> std::result::Result<Vec<Finding>, RuleError> {
        let events: Vec<WindowEvent> = ctx
            .timeline
            .logs()
            .filter(|(_, log)| self.pattern.is_match(&log.message))
            .map(|(at, log)| WindowEvent {
                at,
                node: log.node.clone(),
                id: log.id,
                weight: 1,
            })
            .collect();

        let bursts = if self.min_nodes > 1 {
            detect_bursts(&events, self.span, self.min_count, self.min_nodes)
        } else {
            detect_node_bursts(&events, self.span, self.min_count)
        };

        Ok(bursts
            .into_iter()
            .map(|burst| {
                let explanation = format!(
                    "{} matching messages on {} node(s) within {}s",
                    burst.count(),
                    burst.nodes.len(),
                    self.span.num_seconds(),
                );
                Finding::new(self.id.clone(), self.severity, explanation)
                    .with_nodes(burst.nodes)
                    .with_window(burst.window)
                    .with_records(burst.records)
            })
            .collect())
    }
}

/// Samples of one metric above a fixed limit
pub struct CustomThresholdRule {
    id: String,
    description: String,
    metric: String,
    max: f64,
    severity: Severity,
}

impl CustomThresholdRule {
    pub fn new(config: &ThresholdRuleConfig) -> Result<Self> {
        validate_id(&config.id)?;
        if config.metric.trim().is_empty() {
            return Err(invalid(&config.id, "metric must not be empty"));
        }
        if !config.max.is_finite() {
            return Err(invalid(&config.id, "max must be a finite number"));
        }
        Ok(Self {
            id: config.id.clone(),
            description: config
                .description
                .clone()
                .unwrap_or_else(|| format!("{} above {}", config.metric, config.max)),
            metric: config.metric.clone(),
            max: config.max,
            severity: config.severity,
        })
    }
}

impl Rule for CustomThresholdRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> std::result::Result<Vec<Finding>, RuleError> {
        let mut findings = Vec::new();
        let per_node = ctx.series().iter().filter(|(key, _)| key.name == self.metric);
        for (key, points) in per_node {
            let over: Vec<_> = points.iter().filter(|p| p.value > self.max).collect();
            let Some(window) = TimeWindow::covering(over.iter().map(|p| p.at)) else {
                continue;
            };
            let peak = over.iter().map(|p| p.value).fold(f64::MIN, f64::max);
            let explanation = format!(
                "{} above {} in {} samples (peak {})",
                self.metric,
                self.max,
                over.len(),
                peak,
            );
            findings.push(
                Finding::new(self.id.clone(), self.severity, explanation)
                    .with_node(key.node.clone())
                    .with_window(window)
                    .with_records(over.iter().map(|p| p.id)),
            );
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::Fixture;
    use sperf_types::LogLevel;

    fn windowed(min_count: usize, min_nodes: usize) -> WindowedRuleConfig {
        WindowedRuleConfig {
            id: "hints-overflow".into(),
            pattern: "Too many hints".into(),
            min_count,
            window_secs: 30,
            min_nodes,
            severity: Severity::Critical,
            description: None,
        }
    }

    #[test]
    fn test_windowed_rule_per_node() {
        let mut fixture = Fixture::default();
        for i in 0..3 {
            fixture.log("n1", i, LogLevel::Warn, "HintsService", "Too many hints pending");
        }
        fixture.log("n2", 0, LogLevel::Warn, "HintsService", "Too many hints pending");

        let rule = CustomWindowedRule::new(&windowed(3, 1)).unwrap();
        assert_eq!(rule.description(), "Log messages matching /Too many hints/");
        let findings = fixture.run(&rule);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "hints-overflow");
        assert_eq!(findings[0].severity, Severity::Critical);
    }

    #[test]
    fn test_windowed_rule_across_nodes() {
        let mut fixture = Fixture::default();
        fixture.log("n1", 0, LogLevel::Warn, "HintsService", "Too many hints pending");
        fixture.log("n2", 10, LogLevel::Warn, "HintsService", "Too many hints pending");

        let findings = fixture.run(&CustomWindowedRule::new(&windowed(2, 2)).unwrap());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].nodes.len(), 2);
    }

    #[test]
    fn test_invalid_windowed_config() {
        let mut config = windowed(0, 1);
        assert!(CustomWindowedRule::new(&config).is_err());
        config.min_count = 1;
        config.pattern = "[unclosed".into();
        assert!(matches!(
            CustomWindowedRule::new(&config),
            Err(Error::InvalidRule { ref id, .. }) if id == "hints-overflow"
        ));
    }

    #[test]
    fn test_window_out_of_range_is_invalid() {
        let mut config = windowed(1, 1);
        config.window_secs = u64::MAX;
        assert!(matches!(
            CustomWindowedRule::new(&config),
            Err(Error::InvalidRule { ref id, ref reason }) if id == "hints-overflow" && reason.contains("out of range")
        ));
    }

    #[test]
    fn test_threshold_rule() {
        let mut fixture = Fixture::default();
        fixture.metric("n1", 0, "heap_used_ratio", 0.5);
        fixture.metric("n1", 1, "heap_used_ratio", 0.95);
        fixture.metric("n2", 0, "heap_used_ratio", 0.9);
        fixture.metric("n2", 0, "other", 9.0);

        let rule = CustomThresholdRule::new(&ThresholdRuleConfig {
            id: "heap-high".into(),
            metric: "heap_used_ratio".into(),
            max: 0.9,
            severity: Severity::Warning,
            description: None,
        })
        .unwrap();
        let findings = fixture.run(&rule);
        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings[0].explanation,
            "heap_used_ratio above 0.9 in 1 samples (peak 0.95)"
        );
    }
}
