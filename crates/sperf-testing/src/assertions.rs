//! Custom assertions for report validation.
//!
//! All checks work on the JSON form of the report, so the same helpers
//! serve in-process runs and CLI output.

use anyhow::{Context, Result};
use serde_json::Value;

fn findings(report: &Value) -> Result<&Vec<Value>> {
    report["findings"]
        .as_array()
        .context("Expected 'findings' array in report JSON")
}

/// Findings produced by one rule
pub fn findings_of<'a>(report: &'a Value, rule: &str) -> Result<Vec<&'a Value>> {
    Ok(findings(report)?
        .iter()
        .filter(|f| f["rule"] == rule)
        .collect())
}

/// Assert the number of findings a rule produced.
pub fn assert_rule_count(report: &Value, rule: &str, expected: usize) -> Result<()> {
    let actual = findings_of(report, rule)?.len();
    if actual != expected {
        anyhow::bail!(
            "Expected {} '{}' findings, got {}:\n{}",
            expected,
            rule,
            actual,
            serde_json::to_string_pretty(&report["findings"])?
        );
    }
    Ok(())
}

/// Assert the summary counters.
pub fn assert_summary(report: &Value, critical: u64, warning: u64, info: u64) -> Result<()> {
    let summary = &report["summary"];
    let actual = (
        summary["critical"].as_u64().context("summary.critical")?,
        summary["warning"].as_u64().context("summary.warning")?,
        summary["info"].as_u64().context("summary.info")?,
    );
    if actual != (critical, warning, info) {
        anyhow::bail!(
            "Expected summary {:?}, got {:?}",
            (critical, warning, info),
            actual
        );
    }
    Ok(())
}

/// Assert the report status (`complete` or `truncated`).
pub fn assert_status(report: &Value, expected: &str) -> Result<()> {
    let status = report["status"].as_str().context("Expected 'status' string")?;
    if status != expected {
        anyhow::bail!("Expected status '{}', got '{}'", expected, status);
    }
    Ok(())
}

/// Assert that a finding names exactly the given nodes.
pub fn assert_finding_nodes(finding: &Value, expected: &[&str]) -> Result<()> {
    let nodes: Vec<&str> = finding["nodes"]
        .as_array()
        .context("Expected 'nodes' array in finding")?
        .iter()
        .filter_map(Value::as_str)
        .collect();
    if nodes != expected {
        anyhow::bail!("Expected nodes {:?}, got {:?}", expected, nodes);
    }
    Ok(())
}

/// Assert that findings are ordered by descending severity.
pub fn assert_severity_order(report: &Value) -> Result<()> {
    let rank = |s: &str| match s {
        "critical" => 2,
        "warning" => 1,
        _ => 0,
    };
    let ranks: Vec<i32> = findings(report)?
        .iter()
        .map(|f| rank(f["severity"].as_str().unwrap_or_default()))
        .collect();
    if ranks.windows(2).any(|w| w[0] < w[1]) {
        anyhow::bail!("Findings are not ordered by severity: {:?}", ranks);
    }
    Ok(())
}
