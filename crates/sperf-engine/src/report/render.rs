use super::{Report, ReportStatus};
use chrono::{DateTime, Utc};
use sperf_types::{Evidence, Finding, NodeId, TimeWindow};
use std::fmt;

/// Evidence references printed per finding before eliding the rest
const MAX_EVIDENCE: usize = 5;

/// Human-readable rendering of a report
pub struct TextReport<'a> {
    report: &'a Report,
}

impl<'a> TextReport<'a> {
    pub fn new(report: &'a Report) -> Self {
        Self { report }
    }

    fn header(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let report = self.report;
        let status = match report.status {
            ReportStatus::Complete => "complete",
            ReportStatus::Truncated => "TRUNCATED (run timeout; findings are partial)",
        };
        writeln!(f, "bundle {}: {}", report.bundle_id, status)?;
        writeln!(f, "nodes: {}", join(report.nodes.iter().map(NodeId::as_str)))?;

        let offsets = &report.clock_offsets;
        if let Some(reference) = &offsets.reference {
            let shifted: Vec<String> = offsets
                .offsets_ms
                .iter()
                .filter(|(node, _)| *node != reference)
                .map(|(node, ms)| format!("{} {:+}ms", node, ms))
                .collect();
            writeln!(
                f,
                "clock offsets (reference {}): {}",
                reference,
                join(shifted.iter().map(String::as_str))
            )?;
        }
        if !report.skipped_rules.is_empty() {
            writeln!(
                f,
                "rules not run: {}",
                join(report.skipped_rules.iter().map(String::as_str))
            )?;
        }
        Ok(())
    }

    fn finding(&self, f: &mut fmt::Formatter, finding: &Finding) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            finding.severity.as_str().to_uppercase(),
            finding.rule
        )?;
        if !finding.nodes.is_empty() {
            write!(f, " ({})", join(finding.nodes.iter().map(NodeId::as_str)))?;
        }
        if let Some(window) = &finding.window {
            write!(f, " {}", format_window(window))?;
        }
        writeln!(f)?;
        writeln!(f, "    {}", finding.explanation)?;

        if !finding.evidence.is_empty() {
            let shown: Vec<String> = finding
                .evidence
                .iter()
                .take(MAX_EVIDENCE)
                .map(format_evidence)
                .collect();
            let rest = finding.evidence.len().saturating_sub(MAX_EVIDENCE);
            if rest > 0 {
                writeln!(f, "    evidence: {} (+{} more)", shown.join(", "), rest)?;
            } else {
                writeln!(f, "    evidence: {}", shown.join(", "))?;
            }
        }
        Ok(())
    }

    fn files(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let report = self.report;
        if !report.unclassified_files.is_empty() {
            writeln!(f)?;
            writeln!(f, "unclassified files:")?;
            for file in &report.unclassified_files {
                writeln!(f, "    {}/{}", file.node, file.path)?;
            }
        }
        if !report.incomplete_files.is_empty() {
            writeln!(f)?;
            writeln!(f, "incomplete files:")?;
            for file in &report.incomplete_files {
                let noun = if file.warnings == 1 { "line" } else { "lines" };
                writeln!(
                    f,
                    "    {}/{} ({} unparsed {})",
                    file.node, file.path, file.warnings, noun
                )?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.header(f)?;
        writeln!(f)?;

        let report = self.report;
        if report.findings.is_empty() {
            writeln!(f, "no issues detected")?;
        } else {
            for finding in &report.findings {
                self.finding(f, finding)?;
            }
            writeln!(f)?;
            writeln!(
                f,
                "{} findings: {} critical, {} warning, {} info",
                report.summary.total(),
                report.summary.critical,
                report.summary.warning,
                report.summary.info
            )?;
        }

        self.files(f)
    }
}

fn join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(", ")
}

fn format_time(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

fn format_window(window: &TimeWindow) -> String {
    if window.start == window.end {
        format_time(&window.start)
    } else {
        format!("{} .. {}", format_time(&window.start), format_time(&window.end))
    }
}

fn format_evidence(evidence: &Evidence) -> String {
    match evidence {
        Evidence::Record { record } => record.to_string(),
        Evidence::File { file, line: Some(line) } => format!("{}:{}", file, line),
        Evidence::File { file, line: None } => file.to_string(),
    }
}
