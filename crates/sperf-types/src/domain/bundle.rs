use super::ids::{FileId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Classification of a file found in a node directory.
///
/// Parser selection is an explicit table keyed by this enum
/// (see `sperf_parsers::ParserRegistry`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Cassandra/DSE log file (system.log, debug.log, output.log)
    Log,
    /// Metrics export (CSV samples)
    Metrics,
    /// iostat capture
    Iostat,
    /// Configuration dump (cassandra.yaml, jvm.options, ...)
    Config,
    /// Not recognized; kept so the report can list it
    Unknown,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::Log,
        ArtifactKind::Metrics,
        ArtifactKind::Iostat,
        ArtifactKind::Config,
        ArtifactKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Log => "log",
            ArtifactKind::Metrics => "metrics",
            ArtifactKind::Iostat => "iostat",
            ArtifactKind::Config => "config",
            ArtifactKind::Unknown => "unknown",
        }
    }

    /// Whether records from this kind land on the timeline
    pub fn is_timeline_source(&self) -> bool {
        matches!(
            self,
            ArtifactKind::Log | ArtifactKind::Metrics | ArtifactKind::Iostat
        )
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified file inside a node directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub id: FileId,
    pub node: NodeId,
    pub kind: ArtifactKind,
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the node directory, with `/` separators
    pub relative_path: String,
}

/// Per-node grouping of classified files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeArtifacts {
    pub node: NodeId,
    pub root: PathBuf,
    pub artifacts: BTreeMap<ArtifactKind, Vec<FileId>>,
}

impl NodeArtifacts {
    pub fn new(node: NodeId, root: PathBuf) -> Self {
        Self {
            node,
            root,
            artifacts: BTreeMap::new(),
        }
    }

    pub fn files_of(&self, kind: ArtifactKind) -> &[FileId] {
        self.artifacts.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when at least one file was classified as something other than Unknown
    pub fn has_recognized_artifacts(&self) -> bool {
        self.artifacts
            .iter()
            .any(|(kind, files)| *kind != ArtifactKind::Unknown && !files.is_empty())
    }
}

/// An entry the locator could not read while walking a node directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPath {
    pub node: NodeId,
    /// Path relative to the node directory (or the bundle root)
    pub path: String,
    pub reason: String,
}

/// Root collection of per-node artifact sets.
///
/// Built once by the locator and read-only for the rest of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub id: String,
    pub root: PathBuf,
    /// Sorted by node id
    pub nodes: Vec<NodeArtifacts>,
    /// File table indexed by `FileId`
    pub files: Vec<ArtifactFile>,
    /// Unreadable entries left out of the file table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedPath>,
}

impl Bundle {
    /// Assemble a bundle from classified files.
    ///
    /// Files are re-sorted by (node, relative path) and their ids reassigned so
    /// that id assignment never depends on directory enumeration order.
    pub fn assemble(
        root: PathBuf,
        node_roots: BTreeMap<NodeId, PathBuf>,
        mut files: Vec<ArtifactFile>,
    ) -> Self {
        files.sort_by(|a, b| {
            a.node
                .cmp(&b.node)
                .then_with(|| a.relative_path.cmp(&b.relative_path))
        });

        let mut nodes: BTreeMap<NodeId, NodeArtifacts> = node_roots
            .into_iter()
            .map(|(node, dir)| (node.clone(), NodeArtifacts::new(node, dir)))
            .collect();

        for (index, file) in files.iter_mut().enumerate() {
            file.id = FileId(index as u32);
            let entry = nodes
                .entry(file.node.clone())
                .or_insert_with(|| NodeArtifacts::new(file.node.clone(), PathBuf::new()));
            entry.artifacts.entry(file.kind).or_default().push(file.id);
        }

        let id = crate::bundle_hash(
            nodes.keys().map(NodeId::as_str),
            files
                .iter()
                .map(|f| format!("{}/{}", f.node, f.relative_path)),
        );

        Self {
            id,
            root,
            nodes: nodes.into_values().collect(),
            files,
            skipped: Vec::new(),
        }
    }

    pub fn file(&self, id: FileId) -> Option<&ArtifactFile> {
        self.files.get(id.index())
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.node.clone()).collect()
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeArtifacts> {
        self.nodes.iter().find(|n| &n.node == id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn files_of_kind(&self, kind: ArtifactKind) -> impl Iterator<Item = &ArtifactFile> {
        self.files.iter().filter(move |f| f.kind == kind)
    }
}
