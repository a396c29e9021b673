// Bundle discovery
//
// Layout: one subdirectory per node under the bundle root, or under
// `<root>/nodes/` for DSE diagnostic tarballs. Files are classified by glob
// (relative to the node directory) and, when globs are ambiguous or silent,
// by sniffing the first bytes.

use crate::registry::{ParserRegistry, get_artifact_metadata};
use crate::{Error, Result};
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use sperf_types::{ArtifactFile, ArtifactKind, Bundle, FileId, NodeId, SkippedPath};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Bytes read from a file for content sniffing
const SNIFF_BYTES: u64 = 4096;

/// Directory holding node subdirectories in DSE diagnostic bundles
const NODES_DIR: &str = "nodes";

/// Filename conventions (the `[locator]` configuration section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub log_glob: Vec<String>,
    pub metrics_glob: Vec<String>,
    pub iostat_glob: Vec<String>,
    pub config_glob: Vec<String>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        let globs = |kind| -> Vec<String> {
            get_artifact_metadata(kind)
                .map(|m| m.default_globs.iter().map(|g| g.to_string()).collect())
                .unwrap_or_default()
        };
        Self {
            log_glob: globs(ArtifactKind::Log),
            metrics_glob: globs(ArtifactKind::Metrics),
            iostat_glob: globs(ArtifactKind::Iostat),
            config_glob: globs(ArtifactKind::Config),
        }
    }
}

impl LocatorConfig {
    fn patterns(&self) -> [(ArtifactKind, &[String]); 4] {
        [
            (ArtifactKind::Log, self.log_glob.as_slice()),
            (ArtifactKind::Metrics, self.metrics_glob.as_slice()),
            (ArtifactKind::Iostat, self.iostat_glob.as_slice()),
            (ArtifactKind::Config, self.config_glob.as_slice()),
        ]
    }
}

pub struct Locator<'a> {
    globs: Vec<(ArtifactKind, GlobSet)>,
    registry: &'a ParserRegistry,
}

impl<'a> Locator<'a> {
    pub fn new(config: &LocatorConfig, registry: &'a ParserRegistry) -> Result<Self> {
        let mut globs = Vec::new();
        for (kind, patterns) in config.patterns() {
            let mut builder = GlobSetBuilder::new();
            for pattern in patterns {
                builder.add(compile_glob(pattern)?);
            }
            globs.push((kind, builder.build()?));
        }
        Ok(Self { globs, registry })
    }

    /// Enumerate node directories and classify every file in them.
    ///
    /// Fails with `MissingBundle` when the root does not exist or no node
    /// directory holds a recognized artifact.
    pub fn locate(&self, root: &Path) -> Result<Bundle> {
        if !root.is_dir() {
            return Err(Error::missing_bundle(
                root,
                "bundle root does not exist or is not a directory",
            ));
        }

        let nodes_parent = if root.join(NODES_DIR).is_dir() {
            root.join(NODES_DIR)
        } else {
            root.to_path_buf()
        };

        let mut node_roots = BTreeMap::new();
        let mut files = Vec::new();
        let mut skipped = Vec::new();

        for node_dir in list_node_dirs(&nodes_parent, &mut skipped) {
            let Some(name) = node_dir.file_name().and_then(|n| n.to_str()) else {
                tracing::warn!(path = %node_dir.display(), "skipping node directory with non UTF-8 name");
                continue;
            };
            let node = NodeId::new(name);
            let node_files = self.scan_node(&node, &node_dir, &mut skipped);
            if node_files.is_empty() {
                tracing::debug!(path = %node_dir.display(), "skipping empty directory");
                continue;
            }
            tracing::debug!(node = %node, files = node_files.len(), "discovered node");
            node_roots.insert(node, node_dir);
            files.extend(node_files);
        }

        let recognized = files.iter().any(|f| f.kind != ArtifactKind::Unknown);
        if !recognized {
            let reason = if node_roots.is_empty() {
                "no node directories found"
            } else {
                "no node directory contains a recognized artifact"
            };
            return Err(Error::missing_bundle(root, reason));
        }

        let mut bundle = Bundle::assemble(root.to_path_buf(), node_roots, files);
        bundle.skipped = skipped;
        tracing::info!(
            bundle = %bundle.id,
            nodes = bundle.nodes.len(),
            files = bundle.files.len(),
            skipped = bundle.skipped.len(),
            "located bundle"
        );
        Ok(bundle)
    }

    /// Classify every file under one node directory.
    ///
    /// Symlinks are followed (collectors link log directories into the
    /// bundle). Entries that cannot be read, including link loops and
    /// dangling links, are recorded in `skipped` and the walk goes on.
    fn scan_node(
        &self,
        node: &NodeId,
        node_dir: &Path,
        skipped: &mut Vec<SkippedPath>,
    ) -> Vec<ArtifactFile> {
        let mut files = Vec::new();
        let walker = WalkDir::new(node_dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    skipped.push(skipped_entry(node.clone(), node_dir, &err));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative_path = relative_slash_path(node_dir, path);
            let kind = self.classify(path, &relative_path);
            tracing::debug!(node = %node, path = %relative_path, kind = %kind, "classified file");

            files.push(ArtifactFile {
                // Reassigned by Bundle::assemble
                id: FileId(0),
                node: node.clone(),
                kind,
                path: path.to_path_buf(),
                relative_path,
            });
        }
        files
    }

    /// Glob first; sniff content when no glob or several globs match
    pub fn classify(&self, path: &Path, relative_path: &str) -> ArtifactKind {
        let matched: Vec<ArtifactKind> = self
            .globs
            .iter()
            .filter(|(_, set)| set.is_match(relative_path))
            .map(|(kind, _)| *kind)
            .collect();

        if let [kind] = matched.as_slice() {
            return *kind;
        }

        let head = match read_head(path) {
            Ok(Some(head)) => head,
            Ok(None) => return ArtifactKind::Unknown,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read file for sniffing");
                return matched.first().copied().unwrap_or(ArtifactKind::Unknown);
            }
        };

        if matched.is_empty() {
            let all: Vec<ArtifactKind> = self.registry.kinds().collect();
            self.registry
                .sniff(&head, &all)
                .unwrap_or(ArtifactKind::Unknown)
        } else {
            self.registry
                .sniff(&head, &matched)
                .unwrap_or(matched[0])
        }
    }
}

fn compile_glob(pattern: &str) -> Result<Glob> {
    Ok(GlobBuilder::new(pattern).literal_separator(true).build()?)
}

fn list_node_dirs(parent: &Path, skipped: &mut Vec<SkippedPath>) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(parent)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) if entry.file_type().is_dir() && !is_hidden(&entry) => {
                dirs.push(entry.into_path())
            }
            Ok(_) => {}
            Err(err) => {
                let node = err
                    .path()
                    .and_then(|p| p.file_name())
                    .map(|n| NodeId::new(n.to_string_lossy()))
                    .unwrap_or_else(|| NodeId::new(""));
                skipped.push(skipped_entry(node, parent, &err));
            }
        }
    }
    dirs
}

fn skipped_entry(node: NodeId, base: &Path, err: &walkdir::Error) -> SkippedPath {
    let path = err
        .path()
        .map(|p| relative_slash_path(base, p))
        .unwrap_or_default();
    let reason = match err.io_error() {
        Some(io) => io.to_string(),
        None if err.loop_ancestor().is_some() => "symlink loop".to_string(),
        None => err.to_string(),
    };
    tracing::warn!(node = %node, path = %path, reason = %reason, "skipping unreadable entry");
    SkippedPath { node, path, reason }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

fn relative_slash_path(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// First bytes of a file as text; `None` for binary content
fn read_head(path: &Path) -> std::io::Result<Option<String>> {
    let mut buf = Vec::new();
    File::open(path)?.take(SNIFF_BYTES).read_to_end(&mut buf)?;
    if buf.contains(&0) {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const LOG_LINE: &str = "INFO  [main] 2024-03-01 10:00:00,000 CassandraDaemon.java:1 - started\n";

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn locate(root: &Path) -> Result<Bundle> {
        let registry = ParserRegistry::default();
        Locator::new(&LocatorConfig::default(), &registry)?.locate(root)
    }

    #[test]
    fn test_classifies_by_glob() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        write(dir.path(), "10.0.0.1/logs/cassandra/system.log", LOG_LINE.as_bytes());
        write(dir.path(), "10.0.0.1/logs/cassandra/debug.log.1", LOG_LINE.as_bytes());
        write(dir.path(), "10.0.0.1/conf/cassandra.yaml", b"num_tokens: 16\n");
        write(dir.path(), "10.0.0.1/conf/jvm.options", b"-Xmx8G\n");
        write(dir.path(), "10.0.0.1/metrics.csv", b"timestamp,metric,value\n");
        write(dir.path(), "10.0.0.1/os/iostat", b"avg-cpu:  %user\n");
        write(dir.path(), "10.0.0.2/logs/cassandra/system.log", LOG_LINE.as_bytes());

        let bundle = locate(dir.path())?;
        assert_eq!(bundle.nodes.len(), 2);

        let node = &bundle.nodes[0];
        assert_eq!(node.node.as_str(), "10.0.0.1");
        assert_eq!(node.files_of(ArtifactKind::Log).len(), 2);
        assert_eq!(node.files_of(ArtifactKind::Config).len(), 2);
        assert_eq!(node.files_of(ArtifactKind::Metrics).len(), 1);
        assert_eq!(node.files_of(ArtifactKind::Iostat).len(), 1);
        assert!(node.files_of(ArtifactKind::Unknown).is_empty());
        Ok(())
    }

    #[test]
    fn test_unrecognized_files_are_kept_as_unknown() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        write(dir.path(), "n1/system.log", LOG_LINE.as_bytes());
        write(dir.path(), "n1/notes.txt", b"just some prose here\n");
        write(dir.path(), "n1/heap.hprof", &[0u8, 1, 2, 3]);

        let bundle = locate(dir.path())?;
        let unknown: Vec<_> = bundle
            .files_of_kind(ArtifactKind::Unknown)
            .map(|f| f.relative_path.as_str())
            .collect();
        assert_eq!(unknown, vec!["heap.hprof", "notes.txt"]);
        Ok(())
    }

    #[test]
    fn test_sniffs_unmatched_filenames() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        write(dir.path(), "n1/cassandra-renamed.txt", LOG_LINE.as_bytes());

        let bundle = locate(dir.path())?;
        assert_eq!(bundle.files[0].kind, ArtifactKind::Log);
        Ok(())
    }

    #[test]
    fn test_nodes_subdirectory_layout() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        write(dir.path(), "nodes/10.0.0.1/logs/cassandra/system.log", LOG_LINE.as_bytes());
        write(dir.path(), "nodes/10.0.0.2/logs/cassandra/system.log", LOG_LINE.as_bytes());

        let bundle = locate(dir.path())?;
        assert_eq!(
            bundle.node_ids(),
            vec![NodeId::from("10.0.0.1"), NodeId::from("10.0.0.2")]
        );
        Ok(())
    }

    #[test]
    fn test_hidden_entries_are_skipped() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        write(dir.path(), "n1/system.log", LOG_LINE.as_bytes());
        write(dir.path(), "n1/.DS_Store", b"junk");
        write(dir.path(), ".cache/system.log", LOG_LINE.as_bytes());

        let bundle = locate(dir.path())?;
        assert_eq!(bundle.nodes.len(), 1);
        assert_eq!(bundle.files.len(), 1);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_entries_are_skipped_not_fatal() -> anyhow::Result<()> {
        use std::os::unix::fs::symlink;

        let dir = TempDir::new()?;
        write(dir.path(), "n1/logs/system.log", LOG_LINE.as_bytes());
        write(dir.path(), "n2/logs/system.log", LOG_LINE.as_bytes());
        symlink(dir.path().join("n1"), dir.path().join("n1/logs/loop"))?;
        symlink(dir.path().join("missing.log"), dir.path().join("n2/logs/debug.log"))?;

        let bundle = locate(dir.path())?;
        assert_eq!(bundle.nodes.len(), 2);
        assert_eq!(bundle.files_of_kind(ArtifactKind::Log).count(), 2);

        let skipped: Vec<(&str, &str)> = bundle
            .skipped
            .iter()
            .map(|s| (s.node.as_str(), s.path.as_str()))
            .collect();
        assert_eq!(skipped, vec![("n1", "logs/loop"), ("n2", "logs/debug.log")]);
        assert_eq!(bundle.skipped[0].reason, "symlink loop");
        Ok(())
    }

    #[test]
    fn test_missing_root_is_missing_bundle() {
        let dir = TempDir::new().unwrap();
        let err = locate(&dir.path().join("does-not-exist")).unwrap_err();
        assert!(matches!(err, Error::MissingBundle { .. }));
    }

    #[test]
    fn test_root_without_recognized_artifacts_is_missing_bundle() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "n1/readme.txt", b"nothing to see\n");
        let err = locate(dir.path()).unwrap_err();
        assert!(matches!(err, Error::MissingBundle { .. }));
    }

    #[test]
    fn test_custom_globs() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        write(dir.path(), "n1/cass.out", LOG_LINE.as_bytes());

        let config = LocatorConfig {
            log_glob: vec!["**/*.out".to_string()],
            ..LocatorConfig::default()
        };
        let registry = ParserRegistry::default();
        let bundle = Locator::new(&config, &registry)?.locate(dir.path())?;
        assert_eq!(bundle.files[0].kind, ArtifactKind::Log);
        Ok(())
    }

    #[test]
    fn test_invalid_glob_is_error() {
        let config = LocatorConfig {
            log_glob: vec!["[".to_string()],
            ..LocatorConfig::default()
        };
        let registry = ParserRegistry::default();
        assert!(matches!(
            Locator::new(&config, &registry),
            Err(Error::Glob(_))
        ));
    }
}
