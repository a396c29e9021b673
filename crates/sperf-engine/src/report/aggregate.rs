// Finding deduplication and ordering

use chrono::Duration;
use sperf_types::{Finding, NodeId};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// A finding being merged, remembering the widest window it absorbed.
/// The explanation of that widest original is kept.
struct Merged {
    finding: Finding,
    widest: Duration,
}

impl Merged {
    fn new(finding: Finding) -> Self {
        let widest = finding.window.map(|w| w.duration()).unwrap_or_else(Duration::zero);
        Self { finding, widest }
    }

    fn absorb(&mut self, other: Finding) {
        let other_width = other.window.map(|w| w.duration()).unwrap_or_else(Duration::zero);
        if other_width > self.widest {
            self.widest = other_width;
            self.finding.explanation = other.explanation;
        }
        self.finding.window = match (self.finding.window, other.window) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        };
        self.finding.severity = self.finding.severity.max(other.severity);
        self.finding.evidence.extend(other.evidence);
    }

    fn finish(mut self) -> Finding {
        self.finding.evidence.sort();
        self.finding.evidence.dedup();
        self.finding
    }
}

/// Collapse duplicates and sort.
///
/// Findings with the same rule, node set and subject merge when their windows overlap;
/// the sweep runs over windows sorted by start, so chains of overlaps merge
/// transitively. Window-less findings merge only with identical explanations.
pub fn aggregate(findings: Vec<Finding>) -> Vec<Finding> {
    let mut groups: BTreeMap<(String, BTreeSet<NodeId>, Option<String>), Vec<Finding>> =
        BTreeMap::new();
    for finding in findings {
        groups
            .entry((finding.rule.clone(), finding.nodes.clone(), finding.subject.clone()))
            .or_default()
            .push(finding);
    }

    let mut out = Vec::new();
    for (_, group) in groups {
        let (mut windowed, unwindowed): (Vec<_>, Vec<_>) =
            group.into_iter().partition(|f| f.window.is_some());

        windowed.sort_by(|a, b| a.window.cmp(&b.window).then_with(|| a.explanation.cmp(&b.explanation)));
        let mut current: Option<Merged> = None;
        for finding in windowed {
            let overlaps = current.as_ref().is_some_and(|merged| {
                matches!(
                    (merged.finding.window, finding.window),
                    (Some(a), Some(b)) if a.overlaps(&b)
                )
            });
            if overlaps {
                if let Some(merged) = current.as_mut() {
                    merged.absorb(finding);
                }
            } else if let Some(done) = current.replace(Merged::new(finding)) {
                out.push(done.finish());
            }
        }
        if let Some(done) = current {
            out.push(done.finish());
        }

        let mut by_explanation: BTreeMap<String, Merged> = BTreeMap::new();
        for finding in unwindowed {
            match by_explanation.get_mut(&finding.explanation) {
                Some(merged) => merged.absorb(finding),
                None => {
                    by_explanation.insert(finding.explanation.clone(), Merged::new(finding));
                }
            }
        }
        out.extend(by_explanation.into_values().map(Merged::finish));
    }

    out.sort_by(report_order);
    out
}

/// Severity descending, then earliest start (window-less last), then rule,
/// node set, subject and explanation
pub fn report_order(a: &Finding, b: &Finding) -> Ordering {
    b.severity
        .cmp(&a.severity)
        .then_with(|| match (a.start(), b.start()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.rule.cmp(&b.rule))
        .then_with(|| a.nodes.cmp(&b.nodes))
        .then_with(|| a.subject.cmp(&b.subject))
        .then_with(|| a.explanation.cmp(&b.explanation))
}
