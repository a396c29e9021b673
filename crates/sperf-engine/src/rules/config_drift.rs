use super::settings::ConfigDriftSettings;
use super::{Rule, RuleContext};
use crate::error::RuleError;
use sperf_types::{ConfigEntry, Evidence, Finding, NodeId, Severity};
use std::collections::BTreeMap;

/// Configuration keys whose value differs between nodes.
///
/// Entries are compared per file name (`cassandra.yaml` on one node against
/// `cassandra.yaml` on the others), so node directory layout does not matter.
pub struct ConfigDrift {
    settings: ConfigDriftSettings,
}

impl ConfigDrift {
    pub const ID: &'static str = "config-drift";

    pub fn new(settings: ConfigDriftSettings) -> Self {
        Self { settings }
    }

    fn is_ignored(&self, key: &str) -> bool {
        self.settings.ignore_keys.iter().any(|ignored| {
            key == ignored
                || key
                    .strip_suffix(ignored.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

impl Rule for ConfigDrift {
    fn id(&self) -> &str {
        Self::ID
    }

    fn description(&self) -> &str {
        "Configuration values that differ between nodes"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> std::result::Result<Vec<Finding>, RuleError> {
        // (file name, key) -> node -> first entry seen
        let mut grouped: BTreeMap<(String, &str), BTreeMap<&NodeId, &ConfigEntry>> = BTreeMap::new();
        for entry in ctx.config {
            if self.is_ignored(&entry.key) {
                continue;
            }
            let file_name = ctx
                .bundle
                .file(entry.file)
                .and_then(|f| f.path.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| RuleError::new(format!("config entry refers to unknown file {}", entry.file)))?;
            grouped
                .entry((file_name, entry.key.as_str()))
                .or_default()
                .entry(&entry.node)
                .or_insert(entry);
        }

        let mut findings = Vec::new();
        for ((file_name, key), per_node) in grouped {
            if per_node.len() < 2 {
                continue;
            }
            let mut values = per_node.values().map(|e| e.value.as_str());
            let first = values.next();
            if values.all(|v| Some(v) == first) {
                continue;
            }

            let listing = per_node
                .iter()
                .map(|(node, entry)| format!("{}={}", node, entry.value))
                .collect::<Vec<_>>()
                .join(", ");
            let mut finding = Finding::new(
                Self::ID,
                Severity::Warning,
                format!("{}: '{}' differs across nodes ({})", file_name, key, listing),
            )
            .with_nodes(per_node.keys().map(|n| (*n).clone()));
            for entry in per_node.values() {
                finding = finding.with_evidence(Evidence::file(entry.file, Some(entry.line)));
            }
            findings.push(finding);
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::Fixture;

    #[test]
    fn test_differing_value_is_reported_once() {
        let mut fixture = Fixture::default();
        fixture.config("n1", "cassandra.yaml", "concurrent_writes", "32");
        fixture.config("n2", "cassandra.yaml", "concurrent_writes", "64");
        fixture.config("n3", "cassandra.yaml", "concurrent_writes", "32");
        fixture.config("n1", "cassandra.yaml", "cluster_name", "prod");
        fixture.config("n2", "cassandra.yaml", "cluster_name", "prod");

        let findings = fixture.run(&ConfigDrift::new(ConfigDriftSettings::default()));
        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(
            finding.explanation,
            "cassandra.yaml: 'concurrent_writes' differs across nodes (n1=32, n2=64, n3=32)"
        );
        assert_eq!(finding.nodes.len(), 3);
        assert_eq!(finding.evidence.len(), 3);
        assert!(finding.window.is_none());
    }

    #[test]
    fn test_node_specific_keys_are_ignored() {
        let mut fixture = Fixture::default();
        fixture.config("n1", "cassandra.yaml", "listen_address", "10.0.0.1");
        fixture.config("n2", "cassandra.yaml", "listen_address", "10.0.0.2");
        fixture.config("n1", "cassandra-rackdc.properties", "rack", "r1");
        fixture.config("n2", "cassandra-rackdc.properties", "rack", "r2");

        assert!(fixture.run(&ConfigDrift::new(ConfigDriftSettings::default())).is_empty());
    }

    #[test]
    fn test_same_key_in_different_files_is_not_compared() {
        let mut fixture = Fixture::default();
        fixture.config("n1", "jvm.options", "Xmx", "8G");
        fixture.config("n2", "jvm-server.options", "Xmx", "16G");

        assert!(fixture.run(&ConfigDrift::new(ConfigDriftSettings::default())).is_empty());
    }
}
