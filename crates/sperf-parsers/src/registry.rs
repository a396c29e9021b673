use crate::config::ConfigDumpParser;
use crate::iostat::IostatParser;
use crate::log::SystemLogParser;
use crate::metrics::MetricsCsvParser;
use crate::timestamp::TimestampConfig;
use crate::traits::{ArtifactParser, ProbeResult};
use crate::{Error, Result};
use sperf_types::ArtifactKind;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct ArtifactMetadata {
    pub kind: ArtifactKind,
    pub description: &'static str,
    pub default_globs: &'static [&'static str],
}

const ARTIFACTS: &[ArtifactMetadata] = &[
    ArtifactMetadata {
        kind: ArtifactKind::Log,
        description: "Cassandra/DSE logs",
        default_globs: &["**/system.log*", "**/debug.log*", "**/output.log*"],
    },
    ArtifactMetadata {
        kind: ArtifactKind::Metrics,
        description: "Metrics exports",
        default_globs: &["**/*metrics*.csv", "**/*.metrics"],
    },
    ArtifactMetadata {
        kind: ArtifactKind::Iostat,
        description: "iostat captures",
        default_globs: &["**/iostat*"],
    },
    ArtifactMetadata {
        kind: ArtifactKind::Config,
        description: "Configuration dumps",
        default_globs: &[
            "**/*.yaml",
            "**/*.yml",
            "**/jvm*.options",
            "**/*.properties",
        ],
    },
];

pub fn get_all_artifacts() -> &'static [ArtifactMetadata] {
    ARTIFACTS
}

pub fn get_artifact_metadata(kind: ArtifactKind) -> Option<&'static ArtifactMetadata> {
    ARTIFACTS.iter().find(|a| a.kind == kind)
}

/// Explicit artifact kind -> parser table.
///
/// Built once per run from configuration; shared read-only by the parse workers.
pub struct ParserRegistry {
    parsers: BTreeMap<ArtifactKind, Box<dyn ArtifactParser>>,
}

impl ParserRegistry {
    /// Registry with every built-in parser
    pub fn new(timestamps: &TimestampConfig) -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(SystemLogParser::new(timestamps.clone())));
        registry.register(Box::new(MetricsCsvParser::new(timestamps.clone())));
        registry.register(Box::new(IostatParser::new(timestamps.clone())));
        registry.register(Box::new(ConfigDumpParser));
        registry
    }

    pub fn empty() -> Self {
        Self {
            parsers: BTreeMap::new(),
        }
    }

    /// Register a parser, replacing any previous parser of the same kind
    pub fn register(&mut self, parser: Box<dyn ArtifactParser>) {
        self.parsers.insert(parser.kind(), parser);
    }

    pub fn get(&self, kind: ArtifactKind) -> Result<&dyn ArtifactParser> {
        self.parsers
            .get(&kind)
            .map(|p| p.as_ref())
            .ok_or(Error::NoParser(kind))
    }

    pub fn kinds(&self) -> impl Iterator<Item = ArtifactKind> + '_ {
        self.parsers.keys().copied()
    }

    /// Pick the most likely kind for `head` among `candidates`.
    ///
    /// Highest confidence wins; ties go to the earlier candidate.
    pub fn sniff(&self, head: &str, candidates: &[ArtifactKind]) -> Option<ArtifactKind> {
        let mut best: Option<(ArtifactKind, f32)> = None;
        for kind in candidates {
            let Some(parser) = self.parsers.get(kind) else {
                continue;
            };
            let result = parser.probe(head);
            if !result.is_match() {
                continue;
            }
            let confidence = result.confidence();
            if best.is_none_or(|(_, c)| confidence > c) {
                best = Some((*kind, confidence));
            }
        }
        best.map(|(kind, _)| kind)
    }

    /// Probe one kind directly
    pub fn probe(&self, kind: ArtifactKind, head: &str) -> ProbeResult {
        self.parsers
            .get(&kind)
            .map(|p| p.probe(head))
            .unwrap_or(ProbeResult::NoMatch)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new(&TimestampConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_recognized_kind_has_parser() {
        let registry = ParserRegistry::default();
        for meta in get_all_artifacts() {
            assert!(registry.get(meta.kind).is_ok(), "{}", meta.kind);
        }
        assert!(matches!(
            registry.get(ArtifactKind::Unknown),
            Err(Error::NoParser(ArtifactKind::Unknown))
        ));
    }

    #[test]
    fn test_sniff_prefers_highest_confidence() {
        let registry = ParserRegistry::default();
        let all = [
            ArtifactKind::Config,
            ArtifactKind::Log,
            ArtifactKind::Metrics,
            ArtifactKind::Iostat,
        ];

        let log = "INFO  [main] 2024-03-01 10:00:00,000 CassandraDaemon.java:1 - hi\n";
        assert_eq!(registry.sniff(log, &all), Some(ArtifactKind::Log));

        let csv = "timestamp,metric,value\n2024-03-01T10:00:00Z,cpu,1\n";
        assert_eq!(registry.sniff(csv, &all), Some(ArtifactKind::Metrics));

        let iostat = "03/01/2024 10:00:00 AM\navg-cpu:  %user\n";
        assert_eq!(registry.sniff(iostat, &all), Some(ArtifactKind::Iostat));

        assert_eq!(
            registry.sniff("num_tokens: 16\n", &all),
            Some(ArtifactKind::Config)
        );
        assert_eq!(registry.sniff("just some prose here\n", &all), None);
    }

    #[test]
    fn test_sniff_limited_to_candidates() {
        let registry = ParserRegistry::default();
        let log = "INFO  [main] 2024-03-01 10:00:00,000 CassandraDaemon.java:1 - hi\n";
        assert_eq!(registry.sniff(log, &[ArtifactKind::Metrics]), None);
    }
}
