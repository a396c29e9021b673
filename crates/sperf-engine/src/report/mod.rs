// Report assembly
//
// Everything below the engine that went wrong without aborting the run
// (unparseable lines, unknown files, failed rules, the run timeout) is
// surfaced here as findings or status, never as an error.

mod aggregate;
mod render;

pub use aggregate::{aggregate, report_order};
pub use render::TextReport;

use crate::engine::EvalOutcome;
use crate::timeline::ClockOffsets;
use serde::{Deserialize, Serialize};
use sperf_types::{
    ArtifactKind, Bundle, Evidence, FileId, Finding, NodeId, ParseWarning, Severity, SkippedPath,
};
use std::collections::BTreeMap;

pub const PARSE_WARNING: &str = "parse-warning";
pub const UNPARSED_ARTIFACT: &str = "unparsed-artifact";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Complete,
    /// The run timeout stopped rule scheduling; findings are partial
    Truncated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

impl Summary {
    pub fn of(findings: &[Finding]) -> Self {
        let mut summary = Self::default();
        for finding in findings {
            match finding.severity {
                Severity::Critical => summary.critical += 1,
                Severity::Warning => summary.warning += 1,
                Severity::Info => summary.info += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.critical + self.warning + self.info
    }
}

/// A file the locator could not classify
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub file: FileId,
    pub node: NodeId,
    pub path: String,
}

/// A file with at least one unparseable record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompleteFile {
    pub file: FileId,
    pub node: NodeId,
    pub path: String,
    pub warnings: usize,
}

/// Per-file parse statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub file: FileId,
    pub node: NodeId,
    pub path: String,
    pub kind: ArtifactKind,
    /// Records or config entries produced
    pub items: usize,
    pub warnings: usize,
    /// Timestamp format locked for the file, if it has timestamps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_format: Option<String>,
}

/// Final output of a run. Field order is the serialized order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub bundle_id: String,
    pub status: ReportStatus,
    pub nodes: Vec<NodeId>,
    pub clock_offsets: ClockOffsets,
    pub findings: Vec<Finding>,
    pub unclassified_files: Vec<FileRef>,
    pub incomplete_files: Vec<IncompleteFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_rules: Vec<String>,
    pub files: Vec<FileSummary>,
    pub summary: Summary,
}

/// Everything the report is assembled from
pub struct ReportInput<'a> {
    pub bundle: &'a Bundle,
    pub offsets: &'a ClockOffsets,
    pub outcome: EvalOutcome,
    pub warnings: &'a [ParseWarning],
    pub files: Vec<FileSummary>,
}

impl Report {
    pub fn build(input: ReportInput<'_>) -> Self {
        let ReportInput {
            bundle,
            offsets,
            outcome,
            warnings,
            mut files,
        } = input;

        let mut findings = outcome.findings;
        findings.extend(warnings.iter().map(|w| parse_warning_finding(bundle, w)));
        findings.extend(bundle.skipped.iter().map(skipped_path_finding));

        let unclassified_files: Vec<FileRef> = bundle
            .files_of_kind(ArtifactKind::Unknown)
            .map(|f| FileRef {
                file: f.id,
                node: f.node.clone(),
                path: f.relative_path.clone(),
            })
            .collect();
        findings.extend(unclassified_files.iter().map(unparsed_artifact_finding));

        let mut per_file: BTreeMap<FileId, usize> = BTreeMap::new();
        for warning in warnings {
            *per_file.entry(warning.file).or_insert(0) += 1;
        }
        let incomplete_files = per_file
            .into_iter()
            .map(|(file, count)| {
                let (node, path) = describe_file(bundle, file, warnings);
                IncompleteFile {
                    file,
                    node,
                    path,
                    warnings: count,
                }
            })
            .collect();

        let findings = aggregate(findings);
        let summary = Summary::of(&findings);
        files.sort_by_key(|f| f.file);

        Self {
            bundle_id: bundle.id.clone(),
            status: if outcome.truncated {
                ReportStatus::Truncated
            } else {
                ReportStatus::Complete
            },
            nodes: bundle.node_ids(),
            clock_offsets: offsets.clone(),
            findings,
            unclassified_files,
            incomplete_files,
            skipped_rules: outcome.skipped,
            files,
            summary,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == ReportStatus::Complete
    }

    pub fn render_text(&self) -> String {
        TextReport::new(self).to_string()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn describe_file(bundle: &Bundle, file: FileId, warnings: &[ParseWarning]) -> (NodeId, String) {
    if let Some(f) = bundle.file(file) {
        return (f.node.clone(), f.relative_path.clone());
    }
    warnings
        .iter()
        .find(|w| w.file == file)
        .map(|w| (w.node.clone(), w.path.display().to_string()))
        .unwrap_or_else(|| (NodeId::from(""), file.to_string()))
}

pub fn parse_warning_finding(bundle: &Bundle, warning: &ParseWarning) -> Finding {
    let path = bundle
        .file(warning.file)
        .map(|f| f.relative_path.clone())
        .unwrap_or_else(|| warning.path.display().to_string());
    let (explanation, line) = if warning.line > 0 {
        (
            format!("{}:{}: {}", path, warning.line, warning.reason),
            Some(warning.line),
        )
    } else {
        (format!("{}: {}", path, warning.reason), None)
    };
    Finding::new(PARSE_WARNING, Severity::Info, explanation)
        .with_node(warning.node.clone())
        .with_evidence(Evidence::file(warning.file, line))
}

/// A path the locator could not read; nothing under it was analyzed
pub fn skipped_path_finding(skipped: &SkippedPath) -> Finding {
    Finding::new(
        PARSE_WARNING,
        Severity::Info,
        format!("{}: skipped: {}", skipped.path, skipped.reason),
    )
    .with_node(skipped.node.clone())
}

pub fn unparsed_artifact_finding(file: &FileRef) -> Finding {
    Finding::new(
        UNPARSED_ARTIFACT,
        Severity::Info,
        format!("{}: not a recognized artifact; not analyzed", file.path),
    )
    .with_node(file.node.clone())
    .with_evidence(Evidence::file(file.file, None))
}
